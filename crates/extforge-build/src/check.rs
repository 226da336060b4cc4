//! Post-build load check: import each module and look up its entry points.

use std::path::{Path, PathBuf};
use std::process::Command;

use extforge_plan::ExtensionTarget;
use log::{debug, info};

use crate::error::{BuildError, Result};

/// Imports built modules with the configured interpreter.
#[derive(Debug, Clone)]
pub struct LoadCheck {
    python: PathBuf,
    lib_dir: PathBuf,
}

impl LoadCheck {
    pub fn new(python: impl Into<PathBuf>, lib_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            lib_dir: lib_dir.into(),
        }
    }

    /// Python source that imports `target` from `lib_dir` and exits non-zero
    /// if any entry point is missing under `torch.ops.<namespace>`.
    pub fn script(lib_dir: &Path, target: &ExtensionTarget) -> Result<String> {
        // JSON string and list literals are valid Python literals.
        let lib_dir = serde_json::to_string(&lib_dir.display().to_string())?;
        let module = serde_json::to_string(target.name())?;

        let mut script = format!(
            "import importlib, sys\nsys.path.insert(0, {lib_dir})\nimport torch\nimportlib.import_module({module})\n"
        );
        if let Some(namespace) = target.op_namespace() {
            let namespace = serde_json::to_string(namespace)?;
            let entry_points = serde_json::to_string(target.entry_points())?;
            script.push_str(&format!(
                "ops = getattr(torch.ops, {namespace})\n\
                 missing = [name for name in {entry_points} if not hasattr(ops, name)]\n\
                 if missing:\n    \
                 sys.exit(\"missing entry points: \" + \", \".join(missing))\n"
            ));
        }
        Ok(script)
    }

    pub fn check(&self, target: &ExtensionTarget) -> Result<()> {
        let script = Self::script(&self.lib_dir, target)?;
        debug!("load check for {}:\n{script}", target.name());

        let failure = |detail: String| BuildError::LoadCheck {
            module: target.name().to_string(),
            detail,
        };
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(&script)
            .output()
            .map_err(|e| failure(format!("cannot run {}: {e}", self.python.display())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("import failed")
                .trim()
                .to_string();
            return Err(failure(detail));
        }

        info!(
            "{} loaded ({} entry points)",
            target.name(),
            target.entry_points().len()
        );
        Ok(())
    }
}
