//! Build planning: which targets to compile and with which flags.

use std::fmt;

use extforge_arch::{CapabilitySet, ValidatedCapabilities};
use log::{debug, info};

use crate::catalog::ExtensionCatalog;
use crate::flags::{FlagComposer, TargetFlags};
use crate::target::ExtensionTarget;

/// One target ready to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedExtension {
    pub target: ExtensionTarget,
    /// Resolved capabilities this target emits code for.
    pub capabilities: CapabilitySet,
    pub flags: TargetFlags,
}

/// The ordered set of targets a build compiles. Consumed once by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildPlan {
    entries: Vec<PlannedExtension>,
}

impl BuildPlan {
    pub fn new(entries: Vec<PlannedExtension>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlannedExtension] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PlannedExtension> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.target.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.target.name()).collect()
    }
}

impl fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Build Plan ({} targets) ===", self.entries.len())?;
        for entry in &self.entries {
            writeln!(f)?;
            let caps = if entry.capabilities.is_empty() {
                "(none)".to_string()
            } else {
                entry.capabilities.to_string()
            };
            writeln!(f, "--- {} [{}] ---", entry.target.name(), caps)?;
            for source in entry.target.sources() {
                writeln!(f, "  source: {}", source.display())?;
            }
            writeln!(f, "  nvcc:   {}", entry.flags.nvcc.join(" "))?;
            writeln!(f, "  cxx:    {}", entry.flags.cxx.join(" "))?;
            if !entry.target.libraries().is_empty() {
                writeln!(f, "  libs:   {}", entry.target.libraries().join(" "))?;
            }
        }
        Ok(())
    }
}

/// Selects catalog targets eligible for the validated capabilities.
#[derive(Debug, Clone)]
pub struct ExtensionPlanner {
    catalog: ExtensionCatalog,
    composer: FlagComposer,
}

impl ExtensionPlanner {
    pub fn new(catalog: ExtensionCatalog, composer: FlagComposer) -> Self {
        Self { catalog, composer }
    }

    pub fn catalog(&self) -> &ExtensionCatalog {
        &self.catalog
    }

    /// Build the plan.
    ///
    /// A target is planned iff one of its eligible families was resolved.
    /// Always-build targets are planned unconditionally with eligibility
    /// widened to every family in the catalog.
    pub fn plan(&self, validated: &ValidatedCapabilities) -> BuildPlan {
        let resolved = validated.capabilities();
        let supported = self.catalog.supported_families();
        let mut entries = Vec::new();

        for target in self.catalog.iter() {
            let eligible = if target.always_build() {
                &supported
            } else {
                target.capabilities()
            };
            let capabilities: CapabilitySet = resolved
                .iter()
                .filter(|c| eligible.contains(&c.family()))
                .copied()
                .collect();

            if capabilities.is_empty() && !target.always_build() {
                debug!("skipping {}: no eligible capability resolved", target.name());
                continue;
            }

            entries.push(PlannedExtension {
                target: target.clone(),
                capabilities,
                flags: self.composer.compose_target(eligible, resolved),
            });
        }

        info!("Planned {} extension target(s)", entries.len());
        BuildPlan::new(entries)
    }
}
