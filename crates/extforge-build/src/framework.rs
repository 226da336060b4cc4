//! Host framework introspection through the Python interpreter.

use std::path::PathBuf;
use std::process::Command;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, Result};

const PROBE_SCRIPT: &str = r#"
import json, sysconfig
import torch
from torch.utils import cpp_extension
print(json.dumps({
    "version": torch.__version__,
    "cxx11_abi": bool(torch._C._GLIBCXX_USE_CXX11_ABI),
    "include_dirs": cpp_extension.include_paths() + [sysconfig.get_paths()["include"]],
    "library_dirs": cpp_extension.library_paths(),
    "ext_suffix": sysconfig.get_config_var("EXT_SUFFIX") or ".so",
}))
"#;

/// What the installed framework reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    /// Public version with any local `+cu…` segment removed.
    pub version: String,
    pub cxx11_abi: bool,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub library_dirs: Vec<PathBuf>,
    #[serde(default = "default_ext_suffix")]
    pub ext_suffix: String,
}

fn default_ext_suffix() -> String {
    ".so".to_string()
}

impl FrameworkInfo {
    /// Parse the probe script's JSON output.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut info: Self = serde_json::from_str(text.trim())?;
        info.version = strip_local_version(&info.version).to_string();
        Ok(info)
    }
}

/// Drop a PEP 440 local segment: `2.8.0+cu128` → `2.8.0`.
pub fn strip_local_version(version: &str) -> &str {
    version.split('+').next().unwrap_or(version).trim()
}

/// Runs the configured interpreter to introspect the framework.
#[derive(Debug, Clone)]
pub struct FrameworkProbe {
    python: PathBuf,
}

impl FrameworkProbe {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    pub fn python(&self) -> &PathBuf {
        &self.python
    }

    pub fn probe(&self) -> Result<FrameworkInfo> {
        debug!("probing framework with {}", self.python.display());
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .output()
            .map_err(|e| BuildError::FrameworkProbe {
                detail: format!("cannot run {}: {e}", self.python.display()),
            })?;

        if !output.status.success() {
            return Err(BuildError::FrameworkProbe {
                detail: format!(
                    "{} exited with {}: {}",
                    self.python.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let info = FrameworkInfo::from_json(&String::from_utf8_lossy(&output.stdout))?;
        info!("Using PyTorch version: {}", info.version);
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_output() {
        let info = FrameworkInfo::from_json(
            r#"{"version": "2.8.0+cu128", "cxx11_abi": true,
                "include_dirs": ["/site/torch/include"],
                "library_dirs": ["/site/torch/lib"],
                "ext_suffix": ".cpython-312-x86_64-linux-gnu.so"}"#,
        )
        .unwrap();
        assert_eq!(info.version, "2.8.0");
        assert!(info.cxx11_abi);
        assert_eq!(info.library_dirs, [PathBuf::from("/site/torch/lib")]);
        assert_eq!(info.ext_suffix, ".cpython-312-x86_64-linux-gnu.so");
    }

    #[test]
    fn missing_optional_fields_default() {
        let info = FrameworkInfo::from_json(r#"{"version": "2.6.0", "cxx11_abi": false}"#).unwrap();
        assert!(info.include_dirs.is_empty());
        assert_eq!(info.ext_suffix, ".so");
    }

    #[test]
    fn malformed_output_is_json_error() {
        assert!(matches!(
            FrameworkInfo::from_json("Traceback (most recent call last):"),
            Err(BuildError::Json(_))
        ));
    }

    #[test]
    fn local_segment_stripped() {
        assert_eq!(strip_local_version("2.7.1+cu126"), "2.7.1");
        assert_eq!(strip_local_version("2.7.1"), "2.7.1");
    }

    #[test]
    fn missing_interpreter_is_probe_error() {
        let err = FrameworkProbe::new("/nonexistent/extforge/python")
            .probe()
            .unwrap_err();
        assert!(matches!(err, BuildError::FrameworkProbe { .. }));
    }
}
