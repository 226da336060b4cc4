//! Configuration layering: manifest, then environment, then command line.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use extforge_build::{resolve_parallelism, BuildLayout};
use extforge_plan::{ExtensionCatalog, HostCompiler};
use log::warn;

use crate::manifest::{BuildConfig, ExtforgeManifest};

/// Environment variables extforge reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    /// `TORCH_CUDA_ARCH_LIST`
    pub arch_list: Option<String>,
    /// `CUDA_HOME`
    pub cuda_home: Option<PathBuf>,
    /// `CUDA_ROOT`
    pub cuda_root: Option<PathBuf>,
    /// `EXT_PARALLEL`
    pub ext_parallel: Option<usize>,
    /// `MAX_JOBS`
    pub max_jobs: Option<usize>,
    /// `TORCH_VERSION`
    pub framework_version: Option<String>,
    /// `CUDA_VERSION`
    pub toolchain_version: Option<String>,
    /// `EXTFORGE_WHEEL_VERSION_SUFFIX`
    pub wheel_suffix: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            arch_list: get("TORCH_CUDA_ARCH_LIST"),
            cuda_home: get("CUDA_HOME").map(PathBuf::from),
            cuda_root: get("CUDA_ROOT").map(PathBuf::from),
            ext_parallel: get("EXT_PARALLEL").and_then(|v| parse_count("EXT_PARALLEL", &v)),
            max_jobs: get("MAX_JOBS").and_then(|v| parse_count("MAX_JOBS", &v)),
            framework_version: get("TORCH_VERSION"),
            toolchain_version: get("CUDA_VERSION"),
            wheel_suffix: get("EXTFORGE_WHEEL_VERSION_SUFFIX"),
        }
    }
}

fn parse_count(name: &str, value: &str) -> Option<usize> {
    match value.trim().parse() {
        Ok(count) => Some(count),
        Err(_) => {
            warn!("ignoring {name}={value:?}: not a non-negative integer");
            None
        }
    }
}

/// Command-line overrides shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Capability list, e.g. "8.0;9.0+PTX" (overrides TORCH_CUDA_ARCH_LIST)
    #[arg(long)]
    pub arch_list: Option<String>,
    /// CUDA toolkit root (overrides CUDA_HOME)
    #[arg(long)]
    pub cuda_home: Option<PathBuf>,
    /// Extensions compiled concurrently (overrides EXT_PARALLEL)
    #[arg(short, long)]
    pub jobs: Option<usize>,
    /// Python interpreter with the framework installed
    #[arg(long)]
    pub python: Option<PathBuf>,
    /// Build tag suffix (overrides EXTFORGE_WHEEL_VERSION_SUFFIX)
    #[arg(long)]
    pub suffix: Option<String>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_dir: PathBuf,
    pub source_root: PathBuf,
    pub build_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub python: PathBuf,
    pub host: HostCompiler,
    pub host_cxx: PathBuf,
    pub arch_list: Option<String>,
    pub cuda_home: Option<PathBuf>,
    pub cuda_root: Option<PathBuf>,
    /// Extensions compiled concurrently.
    pub jobs: usize,
    /// nvcc `--threads` per invocation.
    pub nvcc_threads: usize,
    pub framework_version: Option<String>,
    pub toolchain_version: Option<String>,
    pub suffix: String,
    pub catalog: ExtensionCatalog,
}

impl Settings {
    pub fn resolve(
        project_dir: &Path,
        manifest: Option<&ExtforgeManifest>,
        env: &EnvConfig,
        overrides: &Overrides,
    ) -> Result<Self> {
        let default_build = BuildConfig::default();
        let build = manifest.map_or(&default_build, |m| &m.build);
        let source_root = manifest.map_or_else(|| PathBuf::from("."), |m| m.project.source_root.clone());
        let catalog = match manifest {
            Some(m) => m.catalog()?,
            None => ExtensionCatalog::builtin(),
        };

        let explicit_jobs = overrides.jobs.or(env.ext_parallel).or(build.jobs);
        let host = HostCompiler::detect();
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            source_root: project_dir.join(source_root),
            build_dir: project_dir.join(&build.build_dir),
            lib_dir: project_dir.join(&build.lib_dir),
            python: overrides.python.clone().unwrap_or_else(|| build.python.clone()),
            host,
            host_cxx: build
                .host_cxx
                .clone()
                .unwrap_or_else(|| PathBuf::from(host.default_cxx())),
            arch_list: overrides.arch_list.clone().or_else(|| env.arch_list.clone()),
            cuda_home: overrides.cuda_home.clone().or_else(|| env.cuda_home.clone()),
            cuda_root: env.cuda_root.clone(),
            jobs: resolve_parallelism(explicit_jobs, env.max_jobs),
            nvcc_threads: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            framework_version: env.framework_version.clone(),
            toolchain_version: env.toolchain_version.clone(),
            suffix: overrides
                .suffix
                .clone()
                .or_else(|| env.wheel_suffix.clone())
                .unwrap_or_default(),
            catalog,
        })
    }

    pub fn layout(&self, ext_suffix: &str) -> BuildLayout {
        BuildLayout::new(&self.source_root, &self.build_dir, &self.lib_dir).with_ext_suffix(ext_suffix)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn reads_known_variables() {
        let env = env(&[
            ("TORCH_CUDA_ARCH_LIST", "8.0;9.0"),
            ("CUDA_HOME", "/opt/cuda"),
            ("EXT_PARALLEL", "4"),
            ("MAX_JOBS", "16"),
            ("TORCH_VERSION", "2.8.0"),
            ("EXTFORGE_WHEEL_VERSION_SUFFIX", "+post1"),
        ]);
        assert_eq!(env.arch_list.as_deref(), Some("8.0;9.0"));
        assert_eq!(env.cuda_home, Some(PathBuf::from("/opt/cuda")));
        assert_eq!(env.ext_parallel, Some(4));
        assert_eq!(env.max_jobs, Some(16));
        assert_eq!(env.framework_version.as_deref(), Some("2.8.0"));
        assert!(env.toolchain_version.is_none());
        assert_eq!(env.wheel_suffix.as_deref(), Some("+post1"));
    }

    #[test]
    fn blank_and_unparseable_values_are_unset() {
        let env = env(&[("TORCH_CUDA_ARCH_LIST", "  "), ("EXT_PARALLEL", "four"), ("MAX_JOBS", "-1")]);
        assert!(env.arch_list.is_none());
        assert!(env.ext_parallel.is_none());
        assert!(env.max_jobs.is_none());
    }

    #[test]
    fn defaults_without_manifest() {
        let settings = Settings::resolve(Path::new("/proj"), None, &EnvConfig::default(), &Overrides::default()).unwrap();
        assert_eq!(settings.source_root, Path::new("/proj/."));
        assert_eq!(settings.build_dir, Path::new("/proj/build"));
        assert_eq!(settings.lib_dir, Path::new("/proj/build/lib"));
        assert_eq!(settings.python, Path::new("python3"));
        assert_eq!(settings.host_cxx, Path::new(settings.host.default_cxx()));
        assert!(settings.jobs >= 1);
        assert_eq!(settings.suffix, "");
        assert_eq!(settings.catalog.len(), ExtensionCatalog::builtin().len());
    }

    #[test]
    fn manifest_host_compiler_wins_over_flavor_default() {
        let manifest =
            ExtforgeManifest::from_str("[project]\nname = \"p\"\n[build]\nhost-cxx = \"clang++\"\n").unwrap();
        let settings = Settings::resolve(Path::new("/p"), Some(&manifest), &EnvConfig::default(), &Overrides::default()).unwrap();
        assert_eq!(settings.host_cxx, Path::new("clang++"));
    }

    #[test]
    fn command_line_beats_environment_beats_manifest() {
        let manifest = ExtforgeManifest::from_str(
            "[project]\nname = \"p\"\nsource-root = \"native\"\n[build]\njobs = 2\npython = \"py-manifest\"\n",
        )
        .unwrap();
        let env = env(&[("EXT_PARALLEL", "5"), ("TORCH_CUDA_ARCH_LIST", "8.9"), ("EXTFORGE_WHEEL_VERSION_SUFFIX", "env")]);

        let settings = Settings::resolve(Path::new("/p"), Some(&manifest), &env, &Overrides::default()).unwrap();
        assert_eq!(settings.jobs, 5);
        assert_eq!(settings.arch_list.as_deref(), Some("8.9"));
        assert_eq!(settings.python, Path::new("py-manifest"));
        assert_eq!(settings.source_root, Path::new("/p/native"));
        assert_eq!(settings.suffix, "env");

        let overrides = Overrides {
            arch_list: Some("12.0".into()),
            jobs: Some(7),
            python: Some(PathBuf::from("py-cli")),
            suffix: Some("cli".into()),
            ..Overrides::default()
        };
        let settings = Settings::resolve(Path::new("/p"), Some(&manifest), &env, &overrides).unwrap();
        assert_eq!(settings.jobs, 7);
        assert_eq!(settings.arch_list.as_deref(), Some("12.0"));
        assert_eq!(settings.python, Path::new("py-cli"));
        assert_eq!(settings.suffix, "cli");
    }

    #[test]
    fn manifest_jobs_used_without_env() {
        let manifest = ExtforgeManifest::from_str("[project]\nname = \"p\"\n[build]\njobs = 2\n").unwrap();
        let env = env(&[("MAX_JOBS", "9")]);
        let settings = Settings::resolve(Path::new("/p"), Some(&manifest), &env, &Overrides::default()).unwrap();
        assert_eq!(settings.jobs, 2);
    }

    #[test]
    fn max_jobs_is_the_fallback_signal() {
        let env = env(&[("MAX_JOBS", "9")]);
        let settings = Settings::resolve(Path::new("/p"), None, &env, &Overrides::default()).unwrap();
        assert_eq!(settings.jobs, 9);
    }
}
