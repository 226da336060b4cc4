//! CLI command implementations.

pub mod build;
pub mod check;
pub mod clean;
pub mod doctor;
pub mod pin;
pub mod plan;
pub mod tag;

use extforge_arch::{candidate_roots, discover_toolchain, Toolchain};

use crate::config::Settings;

/// Locate the toolchain from `--cuda-home`/`CUDA_HOME`, else the conventional
/// roots followed by `CUDA_ROOT`.
pub(crate) fn find_toolchain(settings: &Settings) -> extforge_arch::Result<Toolchain> {
    let candidates = candidate_roots(settings.cuda_root.as_deref());
    discover_toolchain(settings.cuda_home.as_deref(), &candidates)
}
