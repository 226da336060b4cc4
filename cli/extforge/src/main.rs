//! extforge CLI: builds architecture-specific CUDA extension modules.

mod commands;
mod config;
mod manifest;

use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use env_logger::Builder as LogBuilder;
use log::LevelFilter;

use config::{EnvConfig, Overrides, Settings};
use manifest::ExtforgeManifest;

#[derive(Parser)]
#[command(name = "extforge", version, about = "Build orchestrator for GPU-architecture-specific extensions")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, validate, plan and compile every eligible extension
    Build {
        #[command(flatten)]
        overrides: Overrides,
        /// Rebuild every target even when its module is up to date
        #[arg(long)]
        force: bool,
    },
    /// Show the build plan without compiling anything
    Plan {
        #[command(flatten)]
        overrides: Overrides,
        /// Toolchain version to validate against instead of probing nvcc
        #[arg(long)]
        toolchain_version: Option<String>,
        /// Framework C++11 ABI bit instead of probing the interpreter
        #[arg(long)]
        cxx11_abi: Option<bool>,
    },
    /// Print the build tag for the artifact name
    Tag {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Check toolchain, devices and project status
    Doctor {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Import each built module and look up its entry points
    Check {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Pin the framework dependency in pyproject.toml to one patch series
    Pin {
        /// Framework version to pin (default: TORCH_VERSION or the installed one)
        #[arg(long)]
        framework_version: Option<String>,
        /// pyproject.toml to rewrite (default: project directory)
        #[arg(long)]
        pyproject: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Remove the build and library directories
    Clean {
        #[command(flatten)]
        overrides: Overrides,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    LogBuilder::from_default_env()
        .filter_level(level)
        .format_timestamp_secs()
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let env = EnvConfig::from_env();

    match cli.command {
        Commands::Build { overrides, force } => {
            let settings = load_settings(&cwd, &env, &overrides)?;
            commands::build::run(&settings, force)
        }

        Commands::Plan {
            overrides,
            toolchain_version,
            cxx11_abi,
        } => {
            let settings = load_settings(&cwd, &env, &overrides)?;
            commands::plan::run(&settings, toolchain_version.as_deref(), cxx11_abi)
        }

        Commands::Tag { overrides } => {
            let settings = load_settings(&cwd, &env, &overrides)?;
            commands::tag::run(&settings)
        }

        Commands::Doctor { overrides } => {
            let settings = load_settings(&cwd, &env, &overrides)?;
            commands::doctor::run(&settings)
        }

        Commands::Check { overrides } => {
            let settings = load_settings(&cwd, &env, &overrides)?;
            commands::check::run(&settings)
        }

        Commands::Pin {
            framework_version,
            pyproject,
            overrides,
        } => {
            let settings = load_settings(&cwd, &env, &overrides)?;
            commands::pin::run(&settings, framework_version.as_deref(), pyproject.as_deref())
        }

        Commands::Clean { overrides } => {
            let settings = load_settings(&cwd, &env, &overrides)?;
            commands::clean::run(&settings)
        }
    }
}

/// Manifest (if any) layered under the environment and command-line overrides.
fn load_settings(cwd: &Path, env: &EnvConfig, overrides: &Overrides) -> anyhow::Result<Settings> {
    let (manifest, project_dir) = match ExtforgeManifest::find_and_load(cwd)? {
        Some((manifest, dir)) => (Some(manifest), dir),
        None => (None, cwd.to_path_buf()),
    };
    Settings::resolve(&project_dir, manifest.as_ref(), env, overrides)
}
