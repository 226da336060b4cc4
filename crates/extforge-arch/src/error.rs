//! Error types for capability resolution and toolchain validation.

use std::path::PathBuf;

use crate::toolchain::ToolchainVersion;

/// Errors that can occur while resolving capabilities or validating the toolchain.
#[derive(Debug, thiserror::Error)]
pub enum ArchError {
    /// Neither the override list nor device probing produced a capability.
    #[error(
        "no compute capabilities resolved; set TORCH_CUDA_ARCH_LIST or build on a machine with supported GPUs"
    )]
    NoCapabilitiesResolved,

    /// A capability token could not be parsed.
    #[error("invalid compute capability '{token}' (expected MAJOR.MINOR or MAJOR.MINOR+PTX)")]
    InvalidCapability {
        /// The offending token.
        token: String,
    },

    /// No working `nvcc` at the declared root or any conventional install path.
    #[error("cannot find a CUDA toolchain with nvcc; tried: {}", format_paths(.tried))]
    ToolchainNotFound {
        /// Every root that was probed, in probe order.
        tried: Vec<PathBuf>,
    },

    /// The detected toolchain cannot target a requested capability.
    #[error("CUDA {required} or higher is required for compute capability {capability} (detected {detected})")]
    ToolchainTooOld {
        /// The requested capability that cannot be satisfied.
        capability: String,
        /// Minimum toolchain version for that capability.
        required: ToolchainVersion,
        /// The toolchain version actually installed.
        detected: ToolchainVersion,
    },

    /// A version string could not be parsed.
    #[error("cannot parse toolchain version from '{output}'")]
    VersionParse {
        /// The text that failed to parse.
        output: String,
    },

    /// A probe subprocess could not be run or reported failure.
    #[error("failed to run {program}: {detail}")]
    Probe {
        /// The program that was invoked.
        program: String,
        /// What went wrong.
        detail: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(no candidates)".into();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for capability and toolchain operations.
pub type Result<T> = std::result::Result<T, ArchError>;
