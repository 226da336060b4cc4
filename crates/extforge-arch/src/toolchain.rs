//! CUDA toolchain discovery and version probing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ArchError, Result};

#[cfg(windows)]
const NVCC: &str = "nvcc.exe";
#[cfg(not(windows))]
const NVCC: &str = "nvcc";

/// Install roots probed, in order, when no explicit root is declared.
pub const CONVENTIONAL_ROOTS: &[&str] = &[
    "/usr/local/cuda",
    "/usr/local/cuda-12.9",
    "/usr/local/cuda-12.8",
    "/usr/local/cuda-12.4",
    "/usr/local/cuda-12.3",
    "/usr/local/cuda-12.0",
];

/// A `major.minor.patch` toolchain version as reported by `nvcc`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ToolchainVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolchainVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `"12"`, `"12.9"` or `"12.9.1"`; missing components are zero.
    pub fn parse(s: &str) -> Result<Self> {
        let err = || ArchError::VersionParse {
            output: s.to_string(),
        };
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| err()),
                None if required => Err(err()),
                None => Ok(0),
            }
        };
        let version = Self::new(next(true)?, next(false)?, next(false)?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(version)
    }
}

impl fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ToolchainVersion {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Extract the release version from `nvcc -V` output.
///
/// The token following `release` is used, e.g. `release 12.9, V12.9.41`
/// yields `12.9.0`.
pub fn parse_nvcc_version(output: &str) -> Result<ToolchainVersion> {
    let mut tokens = output.split_whitespace();
    tokens
        .find(|t| *t == "release")
        .and_then(|_| tokens.next())
        .map(|t| t.trim_end_matches(','))
        .ok_or_else(|| ArchError::VersionParse {
            output: output.trim().to_string(),
        })
        .and_then(ToolchainVersion::parse)
}

/// An installed toolchain with a working compiler binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub root: PathBuf,
    pub nvcc: PathBuf,
}

impl Toolchain {
    /// Adopt `root` if it contains `bin/nvcc`.
    pub fn at(root: &Path) -> Option<Self> {
        let nvcc = root.join("bin").join(NVCC);
        nvcc.is_file().then(|| Self {
            root: root.to_path_buf(),
            nvcc,
        })
    }

    pub fn include_dir(&self) -> PathBuf {
        self.root.join("include")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib64")
    }

    /// Run `nvcc -V` and parse the reported release.
    pub fn probe_version(&self) -> Result<ToolchainVersion> {
        let output = Command::new(&self.nvcc)
            .arg("-V")
            .output()
            .map_err(|e| ArchError::Probe {
                program: self.nvcc.display().to_string(),
                detail: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ArchError::Probe {
                program: self.nvcc.display().to_string(),
                detail: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        parse_nvcc_version(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Conventional roots followed by `cuda_root` (from `CUDA_ROOT`) if set.
pub fn candidate_roots(cuda_root: Option<&Path>) -> Vec<PathBuf> {
    CONVENTIONAL_ROOTS
        .iter()
        .map(PathBuf::from)
        .chain(cuda_root.map(Path::to_path_buf))
        .collect()
}

/// Locate the toolchain.
///
/// An explicit root is authoritative: it is adopted if it holds a compiler
/// and is an error otherwise. Without one, the first candidate holding a
/// compiler wins.
pub fn discover_toolchain(explicit: Option<&Path>, candidates: &[PathBuf]) -> Result<Toolchain> {
    if let Some(root) = explicit {
        return Toolchain::at(root)
            .inspect(|tc| info!("Using CUDA toolchain at {}", tc.root.display()))
            .ok_or_else(|| ArchError::ToolchainNotFound {
                tried: vec![root.to_path_buf()],
            });
    }

    for root in candidates {
        if !root.exists() {
            continue;
        }
        match Toolchain::at(root) {
            Some(toolchain) => {
                info!("Found CUDA at: {}", root.display());
                return Ok(toolchain);
            }
            None => warn!(
                "Found CUDA directory at {} but nvcc compiler not found",
                root.display()
            ),
        }
    }

    Err(ArchError::ToolchainNotFound {
        tried: candidates.to_vec(),
    })
}
