//! Parallel build coordination.
//!
//! `Idle -> Validating -> Compiling -> {Done, Failed}`. Validation checks the
//! whole plan (sources present, every output path claimed once) before any
//! compiler runs. Compilation dispatches one task per target onto a bounded
//! worker pool; the first failure stops tasks that have not started yet while
//! in-flight ones finish on their own. Artifacts already written stay on disk.
//! A target whose artifact is newer than all of its sources is not rebuilt
//! unless forced.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use extforge_plan::{BuildPlan, ExtensionTarget, PlannedExtension};
use log::{debug, error, info};
use rayon::prelude::*;

use crate::driver::{object_path, CompileContext, CompileRequest, CompilerDriver, LinkRequest};
use crate::error::{BuildError, DriverError, Result};
use crate::isolate::IsolatedOutputs;
use crate::report::{BuildReport, TargetOutcome, TargetReport};

const NO_FAILURE: usize = usize::MAX;

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Validating,
    Compiling,
    Done,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Compiling => "compiling",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where sources are read from and outputs are written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    pub source_root: PathBuf,
    /// Intermediate objects, one subdirectory per target.
    pub build_dir: PathBuf,
    /// Linked modules, laid out by dotted module name.
    pub lib_dir: PathBuf,
    /// Interpreter extension suffix, e.g. `.cpython-312-x86_64-linux-gnu.so`.
    pub ext_suffix: String,
}

impl BuildLayout {
    pub fn new(
        source_root: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        lib_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            build_dir: build_dir.into(),
            lib_dir: lib_dir.into(),
            ext_suffix: ".so".to_string(),
        }
    }

    pub fn with_ext_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.ext_suffix = suffix.into();
        self
    }

    /// `lib_dir/a/b/c<ext_suffix>` for module `a.b.c`.
    pub fn artifact_path(&self, target: &ExtensionTarget) -> PathBuf {
        let mut path = self.lib_dir.join(target.module_path()).into_os_string();
        path.push(&self.ext_suffix);
        PathBuf::from(path)
    }
}

/// Worker count: explicit override, then the max-jobs signal, then logical
/// cores. Zero counts as unset.
pub fn resolve_parallelism(explicit: Option<usize>, max_jobs: Option<usize>) -> usize {
    explicit
        .filter(|&jobs| jobs > 0)
        .or(max_jobs.filter(|&jobs| jobs > 0))
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get))
}

/// Compiles a [`BuildPlan`] with up to `jobs` targets in flight.
pub struct ParallelBuildCoordinator<D> {
    driver: IsolatedOutputs<D>,
    layout: BuildLayout,
    jobs: usize,
    force: bool,
    state: BuildState,
}

impl<D: CompilerDriver> ParallelBuildCoordinator<D> {
    pub fn new(driver: D, layout: BuildLayout, jobs: usize) -> Self {
        Self {
            driver: IsolatedOutputs::new(driver),
            layout,
            jobs: jobs.max(1),
            force: false,
            state: BuildState::Idle,
        }
    }

    /// Rebuild every target even when its artifact is up to date.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn layout(&self) -> &BuildLayout {
        &self.layout
    }

    pub fn driver(&self) -> &D {
        self.driver.inner()
    }

    /// Validate then compile the plan.
    ///
    /// Validation errors are returned as `Err` with no compiler invoked.
    /// Target failures are recorded in the returned report; use
    /// [`BuildReport::into_result`] to turn them into an error.
    pub fn execute(&mut self, plan: BuildPlan) -> Result<BuildReport> {
        let start = Instant::now();

        self.state = BuildState::Validating;
        if let Err(e) = self.validate(&plan) {
            self.state = BuildState::Failed;
            return Err(e);
        }

        self.state = BuildState::Compiling;
        let entries = plan.into_entries();
        info!(
            "Compiling {} extension(s) with {} job(s)",
            entries.len(),
            self.jobs
        );
        let (targets, first_failure) = match self.compile_all(&entries) {
            Ok(result) => result,
            Err(e) => {
                self.state = BuildState::Failed;
                return Err(e);
            }
        };

        self.state = if first_failure.is_some() {
            BuildState::Failed
        } else {
            BuildState::Done
        };
        Ok(BuildReport {
            targets,
            jobs: self.jobs,
            duration: start.elapsed(),
            first_failure,
        })
    }

    fn validate(&self, plan: &BuildPlan) -> Result<()> {
        let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
        for entry in plan.entries() {
            let target = &entry.target;
            let object_dir = IsolatedOutputs::<D>::output_dir(
                &self.layout.build_dir,
                CompileContext::new(target.name()),
            );
            for source in target.sources() {
                let path = self.layout.source_root.join(source);
                if !path.is_file() {
                    return Err(BuildError::MissingSource {
                        target: target.name().to_string(),
                        path,
                    });
                }
                claim(&mut claimed, object_path(&object_dir, source), target.name())?;
            }
            claim(&mut claimed, self.layout.artifact_path(target), target.name())?;
        }
        debug!("validated {} output paths", claimed.len());
        Ok(())
    }

    fn compile_all(&self, entries: &[PlannedExtension]) -> Result<(Vec<TargetReport>, Option<usize>)> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("extforge-build-{i}"))
            .build()?;
        let abort = AtomicBool::new(false);
        let first_failure = AtomicUsize::new(NO_FAILURE);

        let outcomes: Vec<TargetOutcome> = pool.install(|| {
            entries
                .par_iter()
                .enumerate()
                .with_max_len(1)
                .map(|(index, entry)| {
                    let name = entry.target.name();
                    if abort.load(Ordering::Acquire) {
                        debug!("not starting {name}: build aborted");
                        return TargetOutcome::Skipped;
                    }
                    if !self.force {
                        let artifact = self.layout.artifact_path(&entry.target);
                        if is_up_to_date(&artifact, &self.layout.source_root, entry.target.sources()) {
                            info!("{name} is up to date");
                            return TargetOutcome::UpToDate { artifact };
                        }
                    }
                    match self.build_target(entry) {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            abort.store(true, Ordering::Release);
                            let _ = first_failure.compare_exchange(
                                NO_FAILURE,
                                index,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            );
                            error!("extension '{name}' failed: {e}");
                            let (status, log) = e.status_and_log();
                            TargetOutcome::Failed { status, log }
                        }
                    }
                })
                .collect()
        });

        let targets = entries
            .iter()
            .zip(outcomes)
            .map(|(entry, outcome)| TargetReport {
                name: entry.target.name().to_string(),
                outcome,
            })
            .collect();
        let first_failure = match first_failure.into_inner() {
            NO_FAILURE => None,
            index => Some(index),
        };
        Ok((targets, first_failure))
    }

    fn build_target(&self, entry: &PlannedExtension) -> std::result::Result<TargetOutcome, DriverError> {
        let started = Instant::now();
        let target = &entry.target;
        let ctx = CompileContext::new(target.name());
        info!("Building {}", target.name());

        let objects = self.driver.compile(
            ctx,
            &CompileRequest {
                sources: target.sources().to_vec(),
                source_root: self.layout.source_root.clone(),
                output_dir: self.layout.build_dir.clone(),
                flags: entry.flags.clone(),
                extension_name: target.leaf_name().to_string(),
            },
        )?;
        let artifact = self.driver.link(
            ctx,
            &LinkRequest {
                objects,
                output: self.layout.artifact_path(target),
                libraries: target.libraries().to_vec(),
                library_dirs: target.library_dirs().to_vec(),
            },
        )?;

        Ok(TargetOutcome::Built {
            artifact,
            duration: started.elapsed(),
        })
    }
}

/// True when `artifact` exists and is at least as new as every source.
/// Any unreadable timestamp counts as stale.
fn is_up_to_date(artifact: &Path, source_root: &Path, sources: &[PathBuf]) -> bool {
    let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified()).ok();
    let Some(built) = modified(artifact) else {
        return false;
    };
    sources
        .iter()
        .all(|source| modified(&source_root.join(source)).is_some_and(|changed| changed <= built))
}

fn claim<'a>(claimed: &mut HashMap<PathBuf, &'a str>, path: PathBuf, target: &'a str) -> Result<()> {
    match claimed.entry(path) {
        Entry::Occupied(existing) => Err(BuildError::OutputCollision {
            path: existing.key().clone(),
            first: existing.get().to_string(),
            second: target.to_string(),
        }),
        Entry::Vacant(slot) => {
            slot.insert(target);
            Ok(())
        }
    }
}
