//! End-to-end build pipeline: resolve -> validate -> plan -> compile.

use std::time::Instant;

use extforge_arch::{CapabilityResolver, DeviceProbe, ToolchainValidator, ToolchainVersion, ValidatedCapabilities};
use extforge_plan::{BuildPlan, CommonFlags, ExtensionCatalog, ExtensionPlanner, FlagComposer, HostCompiler};
use log::info;

use crate::coordinator::ParallelBuildCoordinator;
use crate::driver::CompilerDriver;
use crate::error::Result;
use crate::report::BuildReport;

/// Everything planning depends on, captured before the pipeline starts.
#[derive(Debug, Clone)]
pub struct BuildInputs {
    /// Explicit capability list; `None` or blank probes attached devices.
    pub arch_list: Option<String>,
    /// Version reported by the discovered toolchain.
    pub toolchain_version: ToolchainVersion,
    pub catalog: ExtensionCatalog,
    pub common_flags: CommonFlags,
    pub host: HostCompiler,
}

/// Output of the planning stages.
#[derive(Debug, Clone)]
pub struct PlannedBuild {
    pub validated: ValidatedCapabilities,
    pub plan: BuildPlan,
}

/// Resolve capabilities, validate them against the toolchain and plan the
/// build. Never invokes a compiler.
pub fn plan_build<P: DeviceProbe>(inputs: BuildInputs, probe: P) -> Result<PlannedBuild> {
    let start = Instant::now();

    // Stage 1: capabilities
    let capabilities = CapabilityResolver::new(probe).resolve(inputs.arch_list.as_deref())?;

    // Stage 2: toolchain gate
    let validated = ToolchainValidator::new().validate(capabilities, inputs.toolchain_version)?;

    // Stage 3: plan
    let composer = FlagComposer::new(inputs.common_flags, inputs.host);
    let plan = ExtensionPlanner::new(inputs.catalog, composer).plan(&validated);

    info!(
        "Planned {} target(s) for [{}] in {} ms",
        plan.len(),
        validated.capabilities(),
        start.elapsed().as_millis()
    );
    Ok(PlannedBuild { validated, plan })
}

/// Plan, then compile the plan with `coordinator`.
///
/// Planning errors abort before any compiler runs. The returned report may
/// still record a failed target; see [`BuildReport::into_result`].
pub fn run_build<P: DeviceProbe, D: CompilerDriver>(
    inputs: BuildInputs,
    probe: P,
    coordinator: &mut ParallelBuildCoordinator<D>,
) -> Result<BuildReport> {
    let planned = plan_build(inputs, probe)?;
    coordinator.execute(planned.plan)
}
