//! Planning error types.

/// Errors raised while assembling the extension catalog.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A target lists no source files.
    #[error("extension '{name}' has no source files")]
    EmptyTarget { name: String },

    /// Two catalog entries share a module name.
    #[error("extension '{name}' is defined more than once")]
    DuplicateTarget { name: String },

    /// A target definition is structurally invalid.
    #[error("invalid extension '{name}': {detail}")]
    InvalidTarget { name: String, detail: String },
}

/// Result type alias for planning operations.
pub type Result<T> = std::result::Result<T, PlanError>;
