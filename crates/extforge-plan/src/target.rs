//! Extension target definitions.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use extforge_arch::CapabilityFamily;
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};

/// One independently compiled native module.
///
/// Deserializable from an `[[extension]]` manifest entry. Fields are only
/// reachable through accessors so a target cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExtensionTarget {
    /// Dotted module name, e.g. `quantattn._qattn_sm80`.
    name: String,
    /// Source files relative to the source root, compiled in this order.
    sources: Vec<PathBuf>,
    /// Capability families this module has kernels for.
    #[serde(default)]
    capabilities: BTreeSet<CapabilityFamily>,
    /// Build regardless of the resolved capabilities.
    #[serde(default)]
    always_build: bool,
    #[serde(default)]
    libraries: Vec<String>,
    #[serde(default)]
    library_dirs: Vec<PathBuf>,
    /// Operator namespace the module registers its entry points under.
    #[serde(default)]
    op_namespace: Option<String>,
    #[serde(default)]
    entry_points: Vec<String>,
}

impl ExtensionTarget {
    pub fn new<S, F>(name: impl Into<String>, sources: S, capabilities: F) -> Self
    where
        S: IntoIterator,
        S::Item: Into<PathBuf>,
        F: IntoIterator<Item = CapabilityFamily>,
    {
        Self {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            capabilities: capabilities.into_iter().collect(),
            always_build: false,
            libraries: Vec::new(),
            library_dirs: Vec::new(),
            op_namespace: None,
            entry_points: Vec::new(),
        }
    }

    pub fn always_built(mut self) -> Self {
        self.always_build = true;
        self
    }

    pub fn with_libraries<I: IntoIterator<Item = S>, S: Into<String>>(mut self, libs: I) -> Self {
        self.libraries = libs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_library_dirs<I: IntoIterator<Item = P>, P: Into<PathBuf>>(mut self, dirs: I) -> Self {
        self.library_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entry_points<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        namespace: impl Into<String>,
        entry_points: I,
    ) -> Self {
        self.op_namespace = Some(namespace.into());
        self.entry_points = entry_points.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn capabilities(&self) -> &BTreeSet<CapabilityFamily> {
        &self.capabilities
    }

    pub fn always_build(&self) -> bool {
        self.always_build
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    pub fn library_dirs(&self) -> &[PathBuf] {
        &self.library_dirs
    }

    pub fn op_namespace(&self) -> Option<&str> {
        self.op_namespace.as_deref()
    }

    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    /// Last dotted component, the name the module is imported under.
    pub fn leaf_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Relative artifact path without extension suffix (`a.b.c` → `a/b/c`).
    pub fn module_path(&self) -> PathBuf {
        self.name.split('.').collect::<PathBuf>()
    }

    /// Structural checks applied when a target enters a catalog.
    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: &str| PlanError::InvalidTarget {
            name: self.name.clone(),
            detail: detail.into(),
        };

        if self.name.is_empty() || self.name.split('.').any(|part| !is_identifier(part)) {
            return Err(invalid("module name must be dotted identifiers"));
        }
        if self.sources.is_empty() {
            return Err(PlanError::EmptyTarget {
                name: self.name.clone(),
            });
        }
        if let Some(source) = self.sources.iter().find(|s| escapes_root(s)) {
            return Err(invalid(&format!(
                "source '{}' must be a relative path inside the source root",
                source.display()
            )));
        }
        if self.capabilities.is_empty() && !self.always_build {
            return Err(invalid("no eligible capabilities and not always-build"));
        }
        if !self.entry_points.is_empty() && self.op_namespace.is_none() {
            return Err(invalid("entry points require an op-namespace"));
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn escapes_root(path: &Path) -> bool {
    use std::path::Component;
    path.components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fam(major: u32, minor: u32) -> CapabilityFamily {
        CapabilityFamily::new(major, minor)
    }

    #[test]
    fn names_and_paths() {
        let t = ExtensionTarget::new("pkg._ext", ["a.cu"], [fam(8, 0)]);
        assert_eq!(t.leaf_name(), "_ext");
        assert_eq!(t.module_path(), Path::new("pkg").join("_ext"));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn rejects_bad_definitions() {
        let no_sources = ExtensionTarget::new("pkg._ext", Vec::<PathBuf>::new(), [fam(8, 0)]);
        assert!(matches!(no_sources.validate(), Err(PlanError::EmptyTarget { .. })));

        let bad_name = ExtensionTarget::new("pkg..ext", ["a.cu"], [fam(8, 0)]);
        assert!(bad_name.validate().is_err());

        let escaping = ExtensionTarget::new("pkg.ext", ["../a.cu"], [fam(8, 0)]);
        assert!(escaping.validate().is_err());

        let no_caps = ExtensionTarget::new("pkg.ext", ["a.cu"], []);
        assert!(no_caps.validate().is_err());
        assert!(no_caps.always_built().validate().is_ok());
    }

    #[test]
    fn entry_points_need_namespace() {
        let t: ExtensionTarget = toml::from_str(
            r#"
name = "pkg._ops"
sources = ["ops.cu"]
capabilities = ["9.0"]
entry-points = ["forward"]
"#,
        )
        .unwrap();
        assert!(t.validate().is_err());
    }

    #[test]
    fn deserialize_manifest_entry() {
        let t: ExtensionTarget = toml::from_str(
            r#"
name = "pkg._qattn_sm90"
sources = ["csrc/pybind_sm90.cpp", "csrc/attn_sm90.cu"]
capabilities = ["9.0"]
libraries = ["cuda"]
op-namespace = "pkg_qattn_sm90"
entry-points = ["attn_inst_buf"]
"#,
        )
        .unwrap();
        assert_eq!(t.sources().len(), 2);
        assert!(t.capabilities().contains(&fam(9, 0)));
        assert_eq!(t.libraries(), ["cuda"]);
        assert!(!t.always_build());
        assert_eq!(t.op_namespace(), Some("pkg_qattn_sm90"));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn unknown_manifest_keys_rejected() {
        let result: std::result::Result<ExtensionTarget, _> = toml::from_str(
            r#"
name = "pkg._x"
sources = ["x.cu"]
capabilites = ["9.0"]
"#,
        );
        assert!(result.is_err());
    }
}
