//! Build tag generation and framework requirement pinning.

use std::fmt;
use std::fs;
use std::path::Path;

use log::{info, warn};
use semver::Version;

use crate::error::{BuildError, Result};

const UNPINNED_FRAMEWORK: &str = "\"torch\"";

/// Framework/toolchain tag embedded in the distributable artifact name.
///
/// `("2.8.0", "12.9.1", "+post1")` renders as `280.129.post1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTag {
    framework: String,
    toolchain: String,
    suffix: Option<String>,
}

impl BuildTag {
    /// `None` when either version is missing.
    pub fn new(framework_version: &str, toolchain_version: &str, suffix: &str) -> Option<Self> {
        let framework_version = framework_version.trim();
        let toolchain_version = toolchain_version.trim();
        if framework_version.is_empty() || toolchain_version.is_empty() {
            return None;
        }

        let framework = framework_version.replace('.', "");
        let toolchain: String = toolchain_version.split('.').take(2).collect();
        let suffix = suffix.trim();
        let suffix = suffix.strip_prefix('+').unwrap_or(suffix);
        Some(Self {
            framework,
            toolchain,
            suffix: (!suffix.is_empty()).then(|| suffix.to_string()),
        })
    }

    /// The rendered tag, or an empty string when a version is missing.
    pub fn generate(framework_version: &str, toolchain_version: &str, suffix: &str) -> String {
        match Self::new(framework_version, toolchain_version, suffix) {
            Some(tag) => tag.to_string(),
            None => {
                warn!("Missing PyTorch or CUDA version information; build tag omitted");
                String::new()
            }
        }
    }
}

impl fmt::Display for BuildTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.framework, self.toolchain)?;
        if let Some(suffix) = &self.suffix {
            write!(f, ".{suffix}")?;
        }
        Ok(())
    }
}

/// Parse a framework release, accepting `2.8` as `2.8.0` and dropping any
/// local `+cu…` segment.
fn parse_release(version: &str) -> Result<Version> {
    let public = version.split('+').next().unwrap_or(version).trim();
    let padded = match public.matches('.').count() {
        0 => format!("{public}.0.0"),
        1 => format!("{public}.0"),
        _ => public.to_string(),
    };
    Ok(Version::parse(&padded)?)
}

/// Rewrite the unpinned `"torch"` dependency to the patch series of `version`:
/// `"torch>=X.Y.Z,<X.Y.(Z+1)"`.
pub fn pin_framework_requirement(pyproject: &str, version: &str) -> Result<String> {
    let floor = parse_release(version)?;
    let next_patch = floor.patch.checked_add(1).ok_or_else(|| BuildError::Pin {
        detail: format!("patch component of {floor} has no successor"),
    })?;
    let ceiling = Version::new(floor.major, floor.minor, next_patch);

    if !pyproject.contains(UNPINNED_FRAMEWORK) {
        return Err(BuildError::Pin {
            detail: format!("no unpinned {UNPINNED_FRAMEWORK} dependency found"),
        });
    }
    Ok(pyproject.replace(
        UNPINNED_FRAMEWORK,
        &format!("\"torch>={floor},<{ceiling}\""),
    ))
}

/// Pin the framework requirement in a `pyproject.toml` file in place.
pub fn pin_pyproject(path: &Path, version: &str) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let pinned = pin_framework_requirement(&text, version)?;
    fs::write(path, pinned)?;
    info!("Pinned torch to the {version} patch series in {}", path.display());
    Ok(())
}
