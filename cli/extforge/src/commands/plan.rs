//! `extforge plan`: dry run of the planning stages.

use anyhow::{Context, Result};
use extforge_arch::{NvidiaSmiProbe, ToolchainVersion};
use extforge_build::{plan_build, BuildInputs, FrameworkProbe, PlannedBuild};
use extforge_plan::CommonFlags;
use log::warn;

use crate::commands::find_toolchain;
use crate::config::Settings;

/// Resolve, validate and plan, then print the result. No compiler runs.
///
/// Subprocesses run only for values not supplied: `nvcc -V` without
/// `--toolchain-version`, the interpreter without `--cxx11-abi`.
pub fn run(settings: &Settings, toolchain_version: Option<&str>, cxx11_abi: Option<bool>) -> Result<()> {
    let toolchain_version = match toolchain_version {
        Some(version) => ToolchainVersion::parse(version)?,
        None => find_toolchain(settings)?
            .probe_version()
            .context("probing the CUDA toolchain version")?,
    };
    let cxx11_abi = cxx11_abi.unwrap_or_else(|| match FrameworkProbe::new(&settings.python).probe() {
        Ok(info) => info.cxx11_abi,
        Err(e) => {
            warn!("{e}; assuming _GLIBCXX_USE_CXX11_ABI=1");
            true
        }
    });

    let planned = plan_build(inputs(settings, toolchain_version, cxx11_abi), NvidiaSmiProbe::default())?;
    print!("{}", render(&planned));
    Ok(())
}

pub(crate) fn inputs(settings: &Settings, toolchain_version: ToolchainVersion, cxx11_abi: bool) -> BuildInputs {
    BuildInputs {
        arch_list: settings.arch_list.clone(),
        toolchain_version,
        catalog: settings.catalog.clone(),
        common_flags: CommonFlags {
            nvcc_threads: settings.nvcc_threads,
            cxx11_abi,
        },
        host: settings.host,
    }
}

fn render(planned: &PlannedBuild) -> String {
    format!(
        "Capabilities: {}\nToolchain:    {}\n\n{}",
        planned.validated.capabilities(),
        planned.validated.toolchain(),
        planned.plan
    )
}
