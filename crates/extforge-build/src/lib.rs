//! Extension build execution for extforge.
//!
//! Consumes a [`BuildPlan`](extforge_plan::BuildPlan) and drives the native
//! compiler for every planned target:
//! - **Driver:** a [`CompilerDriver`] seam with the real [`NvccDriver`]
//! - **Isolation:** [`IsolatedOutputs`] routes each target's objects into a
//!   private subdirectory so concurrent targets never share an object path
//! - **Coordination:** [`ParallelBuildCoordinator`] validates, then compiles
//!   targets on a bounded worker pool, aborting unscheduled work on failure
//! - **Packaging:** build tag generation, framework pinning, load checks

pub mod check;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod framework;
pub mod isolate;
pub mod pipeline;
pub mod report;
pub mod tag;

pub use check::LoadCheck;
pub use coordinator::{resolve_parallelism, BuildLayout, BuildState, ParallelBuildCoordinator};
pub use driver::{object_path, CompileContext, CompileRequest, CompilerDriver, LinkRequest, NvccDriver};
pub use error::{BuildError, DriverError, Result};
pub use framework::{FrameworkInfo, FrameworkProbe};
pub use isolate::IsolatedOutputs;
pub use pipeline::{plan_build, run_build, BuildInputs, PlannedBuild};
pub use report::{BuildReport, TargetOutcome, TargetReport};
pub use tag::{pin_framework_requirement, pin_pyproject, BuildTag};
