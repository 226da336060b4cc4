//! `extforge doctor`: toolchain and project diagnostics.

use std::ffi::OsStr;
use std::process::Command;

use anyhow::Result;
use extforge_arch::{CapabilityResolver, NvidiaSmiProbe};

use crate::commands::find_toolchain;
use crate::config::Settings;
use crate::manifest::{ExtforgeManifest, MANIFEST_NAME};

/// Print toolchain diagnostic information.
pub fn run(settings: &Settings) -> Result<()> {
    println!("=== Extforge Doctor ===");
    println!();
    println!("Extforge version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("--- System Tools ---");
    print_tool_status("nvidia-smi", &["--version"]);
    print_tool_status(&settings.host_cxx, &["--version"]);
    print_tool_status(&settings.python, &["--version"]);
    println!();

    println!("--- CUDA Toolchain ---");
    match find_toolchain(settings) {
        Ok(toolchain) => {
            println!("  Root:    {}", toolchain.root.display());
            match toolchain.probe_version() {
                Ok(version) => println!("  nvcc:    {version}"),
                Err(e) => println!("  nvcc:    error: {e}"),
            }
        }
        Err(e) => println!("  {e}"),
    }
    println!();

    println!("--- Compute Capabilities ---");
    match CapabilityResolver::new(NvidiaSmiProbe::default()).resolve(settings.arch_list.as_deref()) {
        Ok(capabilities) => println!("  Resolved: {capabilities}"),
        Err(e) => println!("  {e}"),
    }
    println!();

    println!("--- Project Status ---");
    match ExtforgeManifest::find_and_load(&settings.project_dir) {
        Ok(Some((manifest, dir))) => {
            println!("  {MANIFEST_NAME}: found at {}", dir.display());
            println!("  Project:    {}", manifest.project.name);
        }
        Ok(None) => println!("  {MANIFEST_NAME}: not found (using built-in catalog)"),
        Err(e) => println!("  {MANIFEST_NAME}: error: {e:#}"),
    }
    println!("  Targets:    {}", settings.catalog.len());
    println!("  Jobs:       {}", settings.jobs);

    Ok(())
}

fn print_tool_status(program: impl AsRef<OsStr>, args: &[&str]) {
    let program = program.as_ref();
    let name = program.to_string_lossy();
    match Command::new(program).args(args).output() {
        Ok(output) => {
            // Older interpreters print the version on stderr.
            let text = if output.stdout.is_empty() {
                String::from_utf8_lossy(&output.stderr)
            } else {
                String::from_utf8_lossy(&output.stdout)
            };
            let first_line = text
                .lines()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("(unknown version)");
            println!("  {name}: {}", first_line.trim());
        }
        Err(_) => println!("  {name}: not found"),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{EnvConfig, Overrides, Settings};

    #[test]
    fn doctor_runs_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = Overrides {
            cuda_home: Some(dir.path().join("no-cuda")),
            ..Overrides::default()
        };
        let settings = Settings::resolve(dir.path(), None, &EnvConfig::default(), &overrides).unwrap();
        super::run(&settings).unwrap();
    }

    #[test]
    fn missing_tool_is_reported_not_fatal() {
        super::print_tool_status("extforge-no-such-tool", &["--version"]);
    }
}
