//! Build planning for extforge.
//!
//! Turns a validated capability set and a catalog of extension targets into a
//! [`BuildPlan`]: the ordered list of targets to compile, each restricted to
//! the architectures it supports and carrying its final compiler flags.

pub mod catalog;
pub mod error;
pub mod flags;
pub mod planner;
pub mod target;

pub use catalog::ExtensionCatalog;
pub use error::{PlanError, Result};
pub use flags::{arch_code, CommonFlags, FlagComposer, HostCompiler, TargetFlags};
pub use planner::{BuildPlan, ExtensionPlanner, PlannedExtension};
pub use target::ExtensionTarget;
