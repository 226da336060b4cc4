//! Build execution errors.

use std::path::PathBuf;

use extforge_arch::ArchError;
use extforge_plan::PlanError;
use thiserror::Error;

/// Failure of a single compiler or linker invocation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Failed {
        program: String,
        status: String,
        /// Raw compiler diagnostics (stderr followed by stdout).
        log: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Exit status and diagnostic text, for reporting.
    pub fn status_and_log(&self) -> (String, String) {
        match self {
            Self::Failed { status, log, .. } => (status.clone(), log.clone()),
            other => ("not run".to_string(), other.to_string()),
        }
    }
}

/// Errors that can occur while building extensions.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A target's compilation or link step failed.
    #[error("failed to build extension '{target}' ({status}):\n{log}")]
    CompileFailure {
        target: String,
        status: String,
        log: String,
    },

    /// Two targets would write the same output file.
    #[error("output path {} is claimed by both '{first}' and '{second}'", .path.display())]
    OutputCollision {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("extension '{target}' source {} does not exist", .path.display())]
    MissingSource { target: String, path: PathBuf },

    #[error("failed to start build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("framework probe failed: {detail}")]
    FrameworkProbe { detail: String },

    #[error("load check failed for '{module}': {detail}")]
    LoadCheck { module: String, detail: String },

    #[error("cannot pin framework requirement: {detail}")]
    Pin { detail: String },

    #[error(transparent)]
    Arch(#[from] ArchError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid version: {0}")]
    Semver(#[from] semver::Error),
}

/// Result type alias for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;
