//! `extforge.toml` manifest parsing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use extforge_plan::{ExtensionCatalog, ExtensionTarget};
use serde::{Deserialize, Serialize};

pub const MANIFEST_NAME: &str = "extforge.toml";

/// The top-level manifest structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtforgeManifest {
    /// Project metadata (required).
    pub project: ProjectConfig,
    #[serde(default)]
    pub build: BuildConfig,
    /// Extension targets; the built-in catalog is used when empty.
    #[serde(default, rename = "extension")]
    pub extensions: Vec<ExtensionTarget>,
}

/// Project metadata section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    pub name: String,
    /// Directory extension sources are relative to.
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
}

fn default_source_root() -> PathBuf {
    PathBuf::from(".")
}

/// Build section. Relative paths resolve against the project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildConfig {
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default = "default_lib_dir")]
    pub lib_dir: PathBuf,
    /// Interpreter used for framework probing and load checks.
    #[serde(default = "default_python")]
    pub python: PathBuf,
    /// Host C++ compiler and linker driver; defaults per host flavor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_cxx: Option<PathBuf>,
    #[serde(default)]
    pub jobs: Option<usize>,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_lib_dir() -> PathBuf {
    PathBuf::from("build/lib")
}

fn default_python() -> PathBuf {
    PathBuf::from("python3")
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            lib_dir: default_lib_dir(),
            python: default_python(),
            host_cxx: None,
            jobs: None,
        }
    }
}

impl ExtforgeManifest {
    /// Search upward from `start_dir` for an `extforge.toml` file, parse and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(MANIFEST_NAME);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let manifest: ExtforgeManifest = toml::from_str(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((manifest, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    #[cfg(test)]
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing extforge.toml")
    }

    /// Declared extensions, or the built-in catalog when none are declared.
    pub fn catalog(&self) -> Result<ExtensionCatalog> {
        if self.extensions.is_empty() {
            return Ok(ExtensionCatalog::builtin());
        }
        ExtensionCatalog::new(self.extensions.clone()).context("invalid [[extension]] entries")
    }
}
