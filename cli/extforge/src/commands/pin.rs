//! `extforge pin`: pin the framework dependency to one patch series.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use extforge_build::{pin_pyproject, FrameworkProbe};

use crate::config::Settings;

pub fn run(settings: &Settings, version: Option<&str>, pyproject: Option<&Path>) -> Result<()> {
    let version = match version.map(String::from).or_else(|| settings.framework_version.clone()) {
        Some(version) => version,
        None => {
            FrameworkProbe::new(&settings.python)
                .probe()
                .context("no --framework-version or TORCH_VERSION given and the installed framework could not be probed")?
                .version
        }
    };
    let path = pyproject_path(settings, pyproject);
    pin_pyproject(&path, &version).with_context(|| format!("pinning torch in {}", path.display()))?;
    println!("Pinned torch to {version} in {}", path.display());
    Ok(())
}

fn pyproject_path(settings: &Settings, explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| settings.project_dir.join("pyproject.toml"), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::{EnvConfig, Overrides};

    const PYPROJECT: &str = "[project]\nname = \"quantattn\"\ndependencies = [\n    \"torch\",\n    \"numpy\",\n]\n";

    fn settings(dir: &Path, env: EnvConfig) -> Settings {
        Settings::resolve(dir, None, &env, &Overrides::default()).unwrap()
    }

    #[test]
    fn pins_project_pyproject_from_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        fs::write(&path, PYPROJECT).unwrap();

        run(&settings(dir.path(), EnvConfig::default()), Some("2.8.0"), None).unwrap();
        let pinned = fs::read_to_string(&path).unwrap();
        assert!(pinned.contains("\"torch>=2.8.0,<2.8.1\""));
        assert!(pinned.contains("\"numpy\""));
    }

    #[test]
    fn environment_version_and_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, PYPROJECT).unwrap();
        let env = EnvConfig {
            framework_version: Some("2.7.1+cu128".into()),
            ..EnvConfig::default()
        };

        run(&settings(dir.path(), env), None, Some(&path)).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("\"torch>=2.7.1,<2.7.2\""));
    }

    #[test]
    fn already_pinned_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            "dependencies = [\"torch>=2.8.0,<2.8.1\"]\n",
        )
        .unwrap();
        let err = run(&settings(dir.path(), EnvConfig::default()), Some("2.8.0"), None).unwrap_err();
        assert!(format!("{err:#}").contains("pyproject.toml"));
    }
}
