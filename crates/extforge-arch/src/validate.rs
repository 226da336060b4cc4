//! Toolchain validation against the requested capabilities.
//!
//! Runs once, globally, before planning. Planning only accepts a
//! [`ValidatedCapabilities`], so no plan can exist for a rejected build.

use std::ops::Deref;

use log::info;

use crate::capability::{CapabilityFamily, CapabilitySet};
use crate::error::{ArchError, Result};
use crate::toolchain::ToolchainVersion;

/// No build proceeds below this toolchain version.
pub const TOOLCHAIN_FLOOR: ToolchainVersion = ToolchainVersion::new(12, 0, 0);

/// Families introduced after the floor, with the first toolchain that targets them.
const MINIMUM_TOOLCHAIN: &[(CapabilityFamily, ToolchainVersion)] = &[
    (CapabilityFamily::new(8, 9), ToolchainVersion::new(12, 4, 0)),
    (CapabilityFamily::new(9, 0), ToolchainVersion::new(12, 3, 0)),
    (CapabilityFamily::new(12, 0), ToolchainVersion::new(12, 8, 0)),
];

/// Minimum toolchain able to target `family`, never below the floor.
pub fn minimum_toolchain_for(family: CapabilityFamily) -> ToolchainVersion {
    MINIMUM_TOOLCHAIN
        .iter()
        .find(|(f, _)| *f == family)
        .map(|(_, v)| (*v).max(TOOLCHAIN_FLOOR))
        .unwrap_or(TOOLCHAIN_FLOOR)
}

/// A capability set proven buildable by a specific toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCapabilities {
    capabilities: CapabilitySet,
    toolchain: ToolchainVersion,
}

impl ValidatedCapabilities {
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn toolchain(&self) -> ToolchainVersion {
        self.toolchain
    }
}

impl Deref for ValidatedCapabilities {
    type Target = CapabilitySet;

    fn deref(&self) -> &CapabilitySet {
        &self.capabilities
    }
}

/// Rejects capability/toolchain combinations the installed compiler cannot build.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolchainValidator;

impl ToolchainValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check every requested capability against `detected`.
    ///
    /// The floor applies to every capability, so a toolchain below it is
    /// reported against the first capability in the set.
    pub fn validate(
        &self,
        capabilities: CapabilitySet,
        detected: ToolchainVersion,
    ) -> Result<ValidatedCapabilities> {
        if capabilities.is_empty() {
            return Err(ArchError::NoCapabilitiesResolved);
        }

        for capability in &capabilities {
            let required = minimum_toolchain_for(capability.family());
            if detected < required {
                return Err(ArchError::ToolchainTooOld {
                    capability: capability.to_string(),
                    required,
                    detected,
                });
            }
        }

        info!("CUDA {detected} supports all requested capabilities");
        Ok(ValidatedCapabilities {
            capabilities,
            toolchain: detected,
        })
    }
}
