//! `extforge tag`: print the framework/toolchain build tag.

use anyhow::Result;
use extforge_build::{BuildTag, FrameworkProbe};
use log::debug;

use crate::commands::find_toolchain;
use crate::config::Settings;

/// Print the tag, or an empty line when a version cannot be determined.
pub fn run(settings: &Settings) -> Result<()> {
    let tag = resolve_tag(
        settings,
        || {
            FrameworkProbe::new(&settings.python)
                .probe()
                .map(|info| info.version)
                .inspect_err(|e| debug!("framework probe failed: {e}"))
                .ok()
        },
        || {
            find_toolchain(settings)
                .and_then(|toolchain| toolchain.probe_version())
                .map(|version| version.to_string())
                .inspect_err(|e| debug!("toolchain probe failed: {e}"))
                .ok()
        },
    );
    println!("{tag}");
    Ok(())
}

/// Overrides first; the detectors only run for versions not overridden.
pub(crate) fn resolve_tag(
    settings: &Settings,
    detect_framework: impl FnOnce() -> Option<String>,
    detect_toolchain: impl FnOnce() -> Option<String>,
) -> String {
    let framework = settings
        .framework_version
        .clone()
        .or_else(detect_framework)
        .unwrap_or_default();
    let toolchain = settings
        .toolchain_version
        .clone()
        .or_else(detect_toolchain)
        .unwrap_or_default();
    BuildTag::generate(&framework, &toolchain, &settings.suffix)
}
