//! Compiler driver seam and the real nvcc/host-compiler driver.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use extforge_arch::Toolchain;
use extforge_plan::{HostCompiler, TargetFlags};
use log::debug;

use crate::error::DriverError;
use crate::framework::FrameworkInfo;

/// Framework libraries every extension links against.
const FRAMEWORK_LIBRARIES: &[&str] = &["c10", "torch", "torch_cpu", "torch_python", "c10_cuda", "torch_cuda"];

/// Identity of the target a compiler invocation belongs to.
///
/// Passed explicitly through every driver call so no driver needs to know
/// which worker thread it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileContext<'a> {
    pub target: &'a str,
}

impl<'a> CompileContext<'a> {
    pub fn new(target: &'a str) -> Self {
        Self { target }
    }
}

/// Compile every source of one target into `output_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// Sources relative to `source_root`, compiled in order.
    pub sources: Vec<PathBuf>,
    pub source_root: PathBuf,
    pub output_dir: PathBuf,
    pub flags: TargetFlags,
    /// Import name of the module (`TORCH_EXTENSION_NAME`).
    pub extension_name: String,
}

impl CompileRequest {
    /// Object file each source compiles to, in source order.
    pub fn object_paths(&self) -> Vec<PathBuf> {
        self.sources
            .iter()
            .map(|source| object_path(&self.output_dir, source))
            .collect()
    }
}

/// Link a target's objects into its loadable module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub objects: Vec<PathBuf>,
    pub output: PathBuf,
    pub libraries: Vec<String>,
    pub library_dirs: Vec<PathBuf>,
}

/// Object path for `source`: the full relative path with `.o` appended, so
/// `ops.cu` and `ops.cpp` in one directory produce distinct objects.
pub fn object_path(output_dir: &Path, source: &Path) -> PathBuf {
    let mut name: OsString = source.as_os_str().to_owned();
    name.push(".o");
    output_dir.join(name)
}

/// Something that can turn sources into objects and objects into a module.
///
/// Implementations are shared by every build worker.
pub trait CompilerDriver: Send + Sync {
    /// Compile `request.sources`, returning the written object paths in source order.
    fn compile(&self, ctx: CompileContext<'_>, request: &CompileRequest) -> Result<Vec<PathBuf>, DriverError>;

    /// Link objects into `request.output`, returning the artifact path.
    fn link(&self, ctx: CompileContext<'_>, request: &LinkRequest) -> Result<PathBuf, DriverError>;
}

impl<D: CompilerDriver + ?Sized> CompilerDriver for &D {
    fn compile(&self, ctx: CompileContext<'_>, request: &CompileRequest) -> Result<Vec<PathBuf>, DriverError> {
        (**self).compile(ctx, request)
    }

    fn link(&self, ctx: CompileContext<'_>, request: &LinkRequest) -> Result<PathBuf, DriverError> {
        (**self).link(ctx, request)
    }
}

/// Drives `nvcc` for `.cu` sources and the host C++ compiler for everything
/// else, then links with the host compiler.
///
/// Host command lines follow the host flavor: `-c`/`-o`/`-shared`/`-l` for
/// GNU-style compilers, `/c`/`/Fo`/`/LD`/`/LIBPATH:` for MSVC `cl`.
#[derive(Debug, Clone)]
pub struct NvccDriver {
    toolchain: Toolchain,
    host_cxx: PathBuf,
    host: HostCompiler,
    framework: FrameworkInfo,
}

impl NvccDriver {
    pub fn new(toolchain: Toolchain, host_cxx: impl Into<PathBuf>, framework: FrameworkInfo) -> Self {
        Self {
            toolchain,
            host_cxx: host_cxx.into(),
            host: HostCompiler::Gnu,
            framework,
        }
    }

    pub fn with_host(mut self, host: HostCompiler) -> Self {
        self.host = host;
        self
    }

    /// `-I`/`-D` arguments; `prefix` is `-` for nvcc and GNU, `/` for `cl`.
    fn include_and_define_args(&self, request: &CompileRequest, prefix: char) -> Vec<String> {
        let mut args: Vec<String> = self
            .framework
            .include_dirs
            .iter()
            .chain(std::iter::once(&self.toolchain.include_dir()))
            .map(|dir| format!("{prefix}I{}", dir.display()))
            .collect();
        args.push(format!("{prefix}DTORCH_EXTENSION_NAME={}", request.extension_name));
        args.push(format!("{prefix}DTORCH_API_INCLUDE_EXTENSION_H"));
        args
    }

    fn toolchain_lib_dir(&self) -> PathBuf {
        match self.host {
            HostCompiler::Gnu => self.toolchain.lib_dir(),
            HostCompiler::Msvc => self.toolchain.root.join("lib").join("x64"),
        }
    }

    /// The command compiling one source.
    pub fn compile_command(&self, request: &CompileRequest, source: &Path) -> Command {
        let input = request.source_root.join(source);
        let output = object_path(&request.output_dir, source);
        let is_cuda = source.extension().is_some_and(|ext| ext == "cu");

        if is_cuda {
            let mut cmd = Command::new(&self.toolchain.nvcc);
            cmd.args(&request.flags.nvcc);
            match self.host {
                HostCompiler::Gnu => cmd.args(["-Xcompiler", "-fPIC"]),
                HostCompiler::Msvc => cmd.args(["-Xcompiler", "/MD"]),
            };
            cmd.args(self.include_and_define_args(request, '-'))
                .arg("-c")
                .arg(input)
                .arg("-o")
                .arg(output);
            return cmd;
        }

        let mut cmd = Command::new(&self.host_cxx);
        match self.host {
            HostCompiler::Gnu => {
                cmd.args(&request.flags.cxx)
                    .arg("-fPIC")
                    .args(self.include_and_define_args(request, '-'))
                    .arg("-c")
                    .arg(input)
                    .arg("-o")
                    .arg(output);
            }
            HostCompiler::Msvc => {
                let mut object = OsString::from("/Fo");
                object.push(output.as_os_str());
                cmd.args(["/nologo", "/MD"])
                    .args(&request.flags.cxx)
                    .args(self.include_and_define_args(request, '/'))
                    .arg("/c")
                    .arg(input)
                    .arg(object);
            }
        }
        cmd
    }

    /// The command linking one module.
    pub fn link_command(&self, request: &LinkRequest) -> Command {
        let toolchain_lib = self.toolchain_lib_dir();
        let lib_dirs = request
            .library_dirs
            .iter()
            .chain(&self.framework.library_dirs)
            .chain(std::iter::once(&toolchain_lib));
        let libs = request
            .libraries
            .iter()
            .map(String::as_str)
            .chain(FRAMEWORK_LIBRARIES.iter().copied())
            .chain(["cudart"]);

        let mut cmd = Command::new(&self.host_cxx);
        match self.host {
            HostCompiler::Gnu => {
                cmd.arg("-shared").args(&request.objects).arg("-o").arg(&request.output);
                for dir in lib_dirs {
                    cmd.arg(format!("-L{}", dir.display()));
                }
                for lib in libs {
                    cmd.arg(format!("-l{lib}"));
                }
            }
            HostCompiler::Msvc => {
                let mut artifact = OsString::from("/Fe");
                artifact.push(request.output.as_os_str());
                cmd.args(["/nologo", "/LD"]).args(&request.objects).arg(artifact).arg("/link");
                for dir in lib_dirs {
                    cmd.arg(format!("/LIBPATH:{}", dir.display()));
                }
                for lib in libs {
                    cmd.arg(format!("{lib}.lib"));
                }
            }
        }
        cmd
    }
}

impl CompilerDriver for NvccDriver {
    fn compile(&self, ctx: CompileContext<'_>, request: &CompileRequest) -> Result<Vec<PathBuf>, DriverError> {
        let mut objects = Vec::with_capacity(request.sources.len());
        for source in &request.sources {
            let object = object_path(&request.output_dir, source);
            if let Some(parent) = object.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!("[{}] compiling {}", ctx.target, source.display());
            run(&mut self.compile_command(request, source))?;
            objects.push(object);
        }
        Ok(objects)
    }

    fn link(&self, ctx: CompileContext<'_>, request: &LinkRequest) -> Result<PathBuf, DriverError> {
        if let Some(parent) = request.output.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("[{}] linking {}", ctx.target, request.output.display());
        run(&mut self.link_command(request))?;
        Ok(request.output.clone())
    }
}

fn run(cmd: &mut Command) -> Result<(), DriverError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!("{}", render(cmd));

    let output = cmd.output().map_err(|source| DriverError::Spawn {
        program: program.clone(),
        source,
    })?;
    if !output.status.success() {
        let mut log = String::from_utf8_lossy(&output.stderr).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stdout));
        return Err(DriverError::Failed {
            program,
            status: output.status.to_string(),
            log,
        });
    }
    Ok(())
}

fn render(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
