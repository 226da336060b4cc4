//! Build report aggregating per-target outcomes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BuildError, Result};

/// What happened to one planned target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Built { artifact: PathBuf, duration: Duration },
    /// Artifact newer than every source; no compiler ran.
    UpToDate { artifact: PathBuf },
    Failed { status: String, log: String },
    /// Never started because an earlier failure aborted the build.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub name: String,
    pub outcome: TargetOutcome,
}

/// Summary of one coordinator run, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub targets: Vec<TargetReport>,
    /// Worker count used for compilation.
    pub jobs: usize,
    pub duration: Duration,
    /// Index into `targets` of the chronologically first failure.
    pub first_failure: Option<usize>,
}

impl BuildReport {
    pub fn succeeded(&self) -> bool {
        self.first_failure.is_none()
    }

    pub fn built(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, TargetOutcome::Built { .. }))
    }

    pub fn up_to_date(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, TargetOutcome::UpToDate { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(|t| matches!(t.outcome, TargetOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(|t| t.outcome == TargetOutcome::Skipped)
    }

    pub fn first_failure(&self) -> Option<&TargetReport> {
        self.first_failure.and_then(|i| self.targets.get(i))
    }

    /// `Err(CompileFailure)` for the first failed target, the report otherwise.
    pub fn into_result(self) -> Result<Self> {
        if let Some(TargetReport {
            name,
            outcome: TargetOutcome::Failed { status, log },
        }) = self.first_failure()
        {
            return Err(BuildError::CompileFailure {
                target: name.clone(),
                status: status.clone(),
                log: log.clone(),
            });
        }
        Ok(self)
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Build Report ===")?;
        writeln!(f, "Jobs: {}", self.jobs)?;
        writeln!(f, "Duration: {} ms", self.duration.as_millis())?;
        writeln!(
            f,
            "Result: {} ({} built, {} up to date, {} failed, {} skipped)",
            if self.succeeded() { "SUCCEEDED" } else { "FAILED" },
            self.built().count(),
            self.up_to_date().count(),
            self.failed().count(),
            self.skipped().count(),
        )?;

        if self.targets.is_empty() {
            return Ok(());
        }
        writeln!(f)?;
        writeln!(f, "--- Targets ---")?;
        for target in &self.targets {
            match &target.outcome {
                TargetOutcome::Built { artifact, duration } => writeln!(
                    f,
                    "  {:<28} built   {:>7.1}s  {}",
                    target.name,
                    duration.as_secs_f64(),
                    artifact.display()
                )?,
                TargetOutcome::UpToDate { artifact } => writeln!(
                    f,
                    "  {:<28} fresh             {}",
                    target.name,
                    artifact.display()
                )?,
                TargetOutcome::Failed { status, .. } => {
                    writeln!(f, "  {:<28} FAILED  ({status})", target.name)?
                }
                TargetOutcome::Skipped => writeln!(f, "  {:<28} skipped", target.name)?,
            }
        }
        Ok(())
    }
}
