//! Compiler flag composition.
//!
//! Composition is a pure function of its inputs. Host-dependent values
//! (nvcc thread count, C++ ABI bit, host compiler flavor) are captured once in
//! [`CommonFlags`] and [`HostCompiler`] before planning starts.

use std::collections::BTreeSet;

use extforge_arch::{CapabilityFamily, CapabilitySet};

/// Numeric codes whose feature-gated instructions (wgmma on `90`, the
/// mxfp8/mxfp4/nvfp4 tensor ops on `120`) are only available under the
/// architecture-specific variant.
const FEATURE_SUFFIXES: &[(&str, &str)] = &[("90", "a"), ("120", "a")];

/// Architecture code used in codegen directives (`9.0` → `90a`, `8.9` → `89`).
pub fn arch_code(family: CapabilityFamily) -> String {
    let code = family.numeric_code();
    match FEATURE_SUFFIXES.iter().find(|(c, _)| *c == code) {
        Some((_, suffix)) => format!("{code}{suffix}"),
        None => code,
    }
}

/// Flags appended to every nvcc invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonFlags {
    /// Value for nvcc's `--threads`.
    pub nvcc_threads: usize,
    /// Whether the host framework was built with the C++11 ABI.
    pub cxx11_abi: bool,
}

impl CommonFlags {
    pub fn abi_define(&self) -> String {
        format!("-D_GLIBCXX_USE_CXX11_ABI={}", u8::from(self.cxx11_abi))
    }

    pub fn nvcc_tail(&self) -> Vec<String> {
        let mut flags: Vec<String> = [
            "-O3",
            "-std=c++17",
            "-U__CUDA_NO_HALF_OPERATORS__",
            "-U__CUDA_NO_HALF_CONVERSIONS__",
            "--use_fast_math",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        flags.push(format!("--threads={}", self.nvcc_threads));
        flags.extend(
            ["-diag-suppress=174", "-diag-suppress=177", "-diag-suppress=221"]
                .into_iter()
                .map(String::from),
        );
        flags.push(self.abi_define());
        flags
    }
}

/// Host C++ compiler flavor, which decides the host flag syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostCompiler {
    #[default]
    Gnu,
    Msvc,
}

impl HostCompiler {
    /// MSVC when building on Windows inside a Visual Studio environment or
    /// with `cl.exe` on `PATH`; GNU-style otherwise.
    pub fn detect() -> Self {
        if !cfg!(windows) {
            return Self::Gnu;
        }
        let in_vs_env = std::env::var_os("VCINSTALLDIR").is_some();
        let cl_on_path = std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).any(|dir| dir.join("cl.exe").is_file()))
            .unwrap_or(false);
        if in_vs_env || cl_on_path {
            Self::Msvc
        } else {
            Self::Gnu
        }
    }

    /// Compiler program used when the manifest names none.
    pub fn default_cxx(&self) -> &'static str {
        match self {
            Self::Gnu => "c++",
            Self::Msvc => "cl",
        }
    }

    pub fn flags(&self, common: &CommonFlags) -> Vec<String> {
        let base: &[&str] = match self {
            Self::Gnu => &["-g", "-O3", "-fopenmp", "-lgomp", "-std=c++17", "-DENABLE_BF16"],
            Self::Msvc => &["/O2", "/openmp", "/std:c++17", "-DENABLE_BF16"],
        };
        let mut flags: Vec<String> = base.iter().map(|s| s.to_string()).collect();
        flags.push(common.abi_define());
        flags
    }
}

/// Final flags for one extension target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFlags {
    /// Flags for `.cu` sources.
    pub nvcc: Vec<String>,
    /// Flags for host C++ sources.
    pub cxx: Vec<String>,
}

/// Builds per-target flag lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagComposer {
    common: CommonFlags,
    host: HostCompiler,
}

impl FlagComposer {
    pub fn new(common: CommonFlags, host: HostCompiler) -> Self {
        Self { common, host }
    }

    pub fn common(&self) -> &CommonFlags {
        &self.common
    }

    /// One `-gencode` pair per eligible resolved family, plus a
    /// virtual-architecture pair for each PTX-marked capability, in the
    /// iteration order of `resolved`. `8.0` and `8.0+PTX` share one real-code
    /// directive.
    pub fn codegen_directives(
        eligible: &BTreeSet<CapabilityFamily>,
        resolved: &CapabilitySet,
    ) -> Vec<String> {
        let mut flags = Vec::new();
        let mut emitted = BTreeSet::new();
        for capability in resolved.iter().filter(|c| eligible.contains(&c.family())) {
            let code = arch_code(capability.family());
            if emitted.insert(capability.family()) {
                flags.push("-gencode".to_string());
                flags.push(format!("arch=compute_{code},code=sm_{code}"));
            }
            if capability.ptx {
                flags.push("-gencode".to_string());
                flags.push(format!("arch=compute_{code},code=compute_{code}"));
            }
        }
        flags
    }

    /// nvcc flags: codegen directives followed by the common tail.
    pub fn compose(
        &self,
        eligible: &BTreeSet<CapabilityFamily>,
        resolved: &CapabilitySet,
    ) -> Vec<String> {
        let mut flags = Self::codegen_directives(eligible, resolved);
        flags.extend(self.common.nvcc_tail());
        flags
    }

    pub fn compose_target(
        &self,
        eligible: &BTreeSet<CapabilityFamily>,
        resolved: &CapabilitySet,
    ) -> TargetFlags {
        TargetFlags {
            nvcc: self.compose(eligible, resolved),
            cxx: self.host.flags(&self.common),
        }
    }
}
