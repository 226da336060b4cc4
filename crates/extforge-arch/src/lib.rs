//! Compute capability resolution and toolchain validation for extforge.
//!
//! Decides which GPU architectures a build targets and whether the installed
//! CUDA toolchain can produce code for them:
//! - **Capabilities:** parsed from an explicit override list or probed from
//!   attached devices
//! - **Toolchain:** discovered from an explicit root or conventional install
//!   paths, then version-probed through `nvcc -V`
//! - **Validation:** a static capability-family → minimum-toolchain table plus
//!   an absolute floor, checked before any planning happens

pub mod capability;
pub mod error;
pub mod resolve;
pub mod toolchain;
pub mod validate;

pub use capability::{CapabilityFamily, CapabilitySet, ComputeCapability};
pub use error::{ArchError, Result};
pub use resolve::{CapabilityResolver, DeviceProbe, NvidiaSmiProbe, MIN_SUPPORTED_MAJOR};
pub use toolchain::{candidate_roots, discover_toolchain, parse_nvcc_version, Toolchain, ToolchainVersion};
pub use validate::{minimum_toolchain_for, ToolchainValidator, ValidatedCapabilities, TOOLCHAIN_FLOOR};
