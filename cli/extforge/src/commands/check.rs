//! `extforge check`: import every built module and look up its entry points.

use anyhow::{bail, Context, Result};
use extforge_build::{BuildLayout, FrameworkProbe, LoadCheck};
use extforge_plan::{ExtensionCatalog, ExtensionTarget};

use crate::config::Settings;

pub fn run(settings: &Settings) -> Result<()> {
    let framework = FrameworkProbe::new(&settings.python)
        .probe()
        .context("the framework must be importable to load extensions")?;
    let layout = settings.layout(&framework.ext_suffix);

    let built = built_targets(&settings.catalog, &layout);
    if built.is_empty() {
        println!("No built extensions under {}", settings.lib_dir.display());
        return Ok(());
    }

    let checker = LoadCheck::new(&settings.python, &settings.lib_dir);
    let mut failures = 0;
    for target in &built {
        match checker.check(target) {
            Ok(()) => println!("  {:<28} ok", target.name()),
            Err(e) => {
                failures += 1;
                println!("  {:<28} FAILED  {e}", target.name());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} extension(s) failed to load", built.len());
    }
    Ok(())
}

/// Catalog targets whose artifact exists, in catalog order.
fn built_targets<'a>(catalog: &'a ExtensionCatalog, layout: &BuildLayout) -> Vec<&'a ExtensionTarget> {
    catalog
        .iter()
        .filter(|target| layout.artifact_path(target).is_file())
        .collect()
}
