//! `extforge build`: resolve, validate, plan, then compile every target.

use anyhow::{Context, Result};
use extforge_arch::NvidiaSmiProbe;
use extforge_build::{run_build, FrameworkProbe, NvccDriver, ParallelBuildCoordinator};
use log::info;

use crate::commands::find_toolchain;
use crate::commands::plan::inputs;
use crate::commands::tag::resolve_tag;
use crate::config::Settings;

/// Run the full pipeline and print the build report. Targets whose module is
/// newer than all of its sources are skipped unless `force` is set.
pub fn run(settings: &Settings, force: bool) -> Result<()> {
    let toolchain = find_toolchain(settings)?;
    let toolchain_version = toolchain
        .probe_version()
        .context("probing the CUDA toolchain version")?;
    let framework = FrameworkProbe::new(&settings.python)
        .probe()
        .context("the framework must be importable to build extensions")?;

    let inputs = inputs(settings, toolchain_version, framework.cxx11_abi);
    let layout = settings.layout(&framework.ext_suffix);
    let framework_version = framework.version.clone();
    let driver = NvccDriver::new(toolchain, &settings.host_cxx, framework).with_host(settings.host);
    let mut coordinator = ParallelBuildCoordinator::new(driver, layout, settings.jobs).with_force(force);
    info!("Building with {} parallel job(s)", coordinator.jobs());

    let report = run_build(inputs, NvidiaSmiProbe::default(), &mut coordinator)?;
    print!("{report}");

    let tag = resolve_tag(
        settings,
        || Some(framework_version),
        || Some(toolchain_version.to_string()),
    );
    if !tag.is_empty() {
        println!("Build tag: {tag}");
    }

    report.into_result()?;
    Ok(())
}
