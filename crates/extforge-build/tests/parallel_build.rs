use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, SystemTime};

use extforge_arch::{ArchError, CapabilityFamily, DeviceProbe, ToolchainVersion};
use extforge_build::{
    plan_build, run_build, BuildError, BuildInputs, BuildLayout, BuildState, CompileContext,
    CompileRequest, CompilerDriver, DriverError, LinkRequest, ParallelBuildCoordinator,
    TargetOutcome,
};
use extforge_plan::{BuildPlan, CommonFlags, ExtensionCatalog, ExtensionTarget, HostCompiler};

const SHARED_SOURCES: [&str; 2] = ["csrc/kernel.cu", "csrc/pybind.cpp"];

struct NoDevices;

impl DeviceProbe for NoDevices {
    fn device_capabilities(&self) -> extforge_arch::Result<Vec<(u32, u32)>> {
        Ok(Vec::new())
    }
}

/// Writes real files and records which target owns every object path that
/// is being written at any moment.
#[derive(Default)]
struct RecordingDriver {
    /// Object paths currently being written, by owning target.
    active: Mutex<HashMap<PathBuf, String>>,
    written: Mutex<Vec<PathBuf>>,
    collisions: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    compiles: AtomicUsize,
    fail_target: Option<String>,
}

impl RecordingDriver {
    fn failing(target: &str) -> Self {
        Self {
            fail_target: Some(target.to_string()),
            ..Self::default()
        }
    }

    fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl CompilerDriver for RecordingDriver {
    fn compile(&self, ctx: CompileContext<'_>, request: &CompileRequest) -> Result<Vec<PathBuf>, DriverError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let objects = request.object_paths();
        {
            let mut active = self.active.lock().unwrap();
            for object in &objects {
                if let Some(owner) = active.insert(object.clone(), ctx.target.to_string()) {
                    if owner != ctx.target {
                        self.collisions.lock().unwrap().push(object.clone());
                    }
                }
            }
        }

        thread::sleep(Duration::from_millis(40));
        let result = if self.fail_target.as_deref() == Some(ctx.target) {
            Err(DriverError::Failed {
                program: "nvcc".into(),
                status: "exit status: 2".into(),
                log: format!("{}: error: identifier \"wgmma\" is undefined", request.sources[0].display()),
            })
        } else {
            for object in &objects {
                fs::create_dir_all(object.parent().unwrap())?;
                fs::write(object, ctx.target)?;
            }
            self.written.lock().unwrap().extend(objects.iter().cloned());
            Ok(objects.clone())
        };

        {
            let mut active = self.active.lock().unwrap();
            for object in &objects {
                active.remove(object);
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn link(&self, ctx: CompileContext<'_>, request: &LinkRequest) -> Result<PathBuf, DriverError> {
        fs::create_dir_all(request.output.parent().unwrap())?;
        fs::write(&request.output, format!("module {}", ctx.target))?;
        Ok(request.output.clone())
    }
}

fn target(name: &str) -> ExtensionTarget {
    ExtensionTarget::new(name, SHARED_SOURCES, [CapabilityFamily::new(8, 0)])
}

fn inputs(arch_list: &str, version: ToolchainVersion, targets: Vec<ExtensionTarget>) -> BuildInputs {
    BuildInputs {
        arch_list: Some(arch_list.to_string()),
        toolchain_version: version,
        catalog: ExtensionCatalog::new(targets).unwrap(),
        common_flags: CommonFlags {
            nvcc_threads: 1,
            cxx11_abi: true,
        },
        host: HostCompiler::Gnu,
    }
}

fn plan(names: &[&str]) -> BuildPlan {
    let targets = names.iter().map(|n| target(n)).collect();
    plan_build(inputs("8.0", ToolchainVersion::new(12, 9, 0), targets), NoDevices)
        .unwrap()
        .plan
}

fn workspace() -> (tempfile::TempDir, BuildLayout) {
    let dir = tempfile::tempdir().unwrap();
    for source in SHARED_SOURCES {
        let path = dir.path().join("src").join(source);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "// source").unwrap();
    }
    let layout = BuildLayout::new(
        dir.path().join("src"),
        dir.path().join("build"),
        dir.path().join("lib"),
    );
    (dir, layout)
}

fn artifact(root: &Path, leaf: &str) -> PathBuf {
    root.join("lib").join("pkg").join(format!("{leaf}.so"))
}

#[test]
fn concurrent_targets_with_same_source_names_never_collide() {
    let (dir, layout) = workspace();
    let names = ["pkg._a", "pkg._b", "pkg._c", "pkg._d"];
    let mut coordinator = ParallelBuildCoordinator::new(RecordingDriver::default(), layout, 4);

    let report = coordinator.execute(plan(&names)).unwrap();
    assert!(report.succeeded());
    assert_eq!(coordinator.state(), BuildState::Done);

    let driver = coordinator.driver();
    assert!(driver.collisions.lock().unwrap().is_empty());
    assert!(driver.max_in_flight.load(Ordering::SeqCst) > 1);

    let written = driver.written.lock().unwrap();
    let unique: HashSet<_> = written.iter().collect();
    assert_eq!(written.len(), names.len() * SHARED_SOURCES.len());
    assert_eq!(unique.len(), written.len());

    for name in names {
        let object = dir.path().join("build").join(name).join("csrc/kernel.cu.o");
        assert_eq!(fs::read_to_string(object).unwrap(), name);
    }
}

#[test]
fn old_toolchain_fails_before_any_compiler_runs() {
    let (_dir, layout) = workspace();
    let hopper = ExtensionTarget::new("pkg._sm90", SHARED_SOURCES, [CapabilityFamily::new(9, 0)]);
    let mut coordinator = ParallelBuildCoordinator::new(RecordingDriver::default(), layout, 2);

    let err = run_build(
        inputs("9.0", ToolchainVersion::new(12, 2, 0), vec![hopper]),
        NoDevices,
        &mut coordinator,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        BuildError::Arch(ArchError::ToolchainTooOld { ref capability, .. }) if capability == "9.0"
    ));
    assert_eq!(coordinator.driver().compiles(), 0);
    assert_eq!(coordinator.state(), BuildState::Idle);
}

#[test]
fn failed_target_fails_build_and_keeps_sibling_artifacts() {
    let (dir, layout) = workspace();
    let names = ["pkg._a", "pkg._bad", "pkg._c"];

    let mut first = ParallelBuildCoordinator::new(RecordingDriver::default(), layout.clone(), 3);
    assert!(first.execute(plan(&names)).unwrap().succeeded());

    let mut second =
        ParallelBuildCoordinator::new(RecordingDriver::failing("pkg._bad"), layout, 3).with_force(true);
    let report = second.execute(plan(&names)).unwrap();
    assert_eq!(second.state(), BuildState::Failed);
    assert!(!report.succeeded());

    for leaf in ["_a", "_bad", "_c"] {
        let path = artifact(dir.path(), leaf);
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("module pkg.{leaf}"));
    }

    match report.into_result() {
        Err(BuildError::CompileFailure { target, status, log }) => {
            assert_eq!(target, "pkg._bad");
            assert_eq!(status, "exit status: 2");
            assert!(log.contains("wgmma"));
        }
        other => panic!("expected compile failure, got {other:?}"),
    }
}

#[test]
fn failure_stops_unscheduled_targets() {
    let (dir, layout) = workspace();
    let mut coordinator = ParallelBuildCoordinator::new(RecordingDriver::failing("pkg._bad"), layout, 1);

    let report = coordinator.execute(plan(&["pkg._bad", "pkg._b", "pkg._c"])).unwrap();

    assert_eq!(coordinator.driver().compiles(), 1);
    assert_eq!(report.first_failure().unwrap().name, "pkg._bad");
    assert_eq!(report.skipped().count(), 2);
    assert!(matches!(report.targets[1].outcome, TargetOutcome::Skipped));
    assert!(!artifact(dir.path(), "_b").exists());
}

#[test]
fn unchanged_rebuild_runs_no_compiler() {
    let (_dir, layout) = workspace();
    let names = ["pkg._a", "pkg._b"];

    let mut first = ParallelBuildCoordinator::new(RecordingDriver::default(), layout.clone(), 2);
    assert_eq!(first.execute(plan(&names)).unwrap().built().count(), 2);

    let mut second = ParallelBuildCoordinator::new(RecordingDriver::default(), layout, 2);
    let report = second.execute(plan(&names)).unwrap();
    assert_eq!(second.driver().compiles(), 0);
    assert_eq!(report.up_to_date().count(), 2);
    assert!(report.succeeded());
    assert_eq!(second.state(), BuildState::Done);
}

#[test]
fn touched_source_rebuilds_every_target_using_it() {
    let (dir, layout) = workspace();
    let names = ["pkg._a", "pkg._b"];
    let mut first = ParallelBuildCoordinator::new(RecordingDriver::default(), layout.clone(), 2);
    first.execute(plan(&names)).unwrap();

    fs::File::options()
        .write(true)
        .open(dir.path().join("src").join(SHARED_SOURCES[0]))
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(120))
        .unwrap();

    let mut second = ParallelBuildCoordinator::new(RecordingDriver::default(), layout, 2);
    let report = second.execute(plan(&names)).unwrap();
    assert_eq!(second.driver().compiles(), 2);
    assert_eq!(report.built().count(), 2);
}
