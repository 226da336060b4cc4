//! `extforge clean`: remove build outputs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Settings;

/// Remove the object directory and the library directory.
pub fn run(settings: &Settings) -> Result<()> {
    remove(&settings.build_dir)?;
    remove(&settings.lib_dir)?;
    Ok(())
}

fn remove(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("removing {}", dir.display()))?;
        println!("Removed {}", dir.display());
    } else {
        println!("Already clean: {} does not exist", dir.display());
    }
    Ok(())
}
