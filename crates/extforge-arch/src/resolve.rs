//! Capability resolution: explicit override list or attached-device probing.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;

use log::{info, warn};

use crate::capability::{CapabilitySet, ComputeCapability};
use crate::error::{ArchError, Result};

/// Devices below this major version are skipped during probing.
pub const MIN_SUPPORTED_MAJOR: u32 = 8;

/// Source of the native capabilities of attached devices.
pub trait DeviceProbe {
    /// `(major, minor)` of every attached device, in device index order.
    fn device_capabilities(&self) -> Result<Vec<(u32, u32)>>;
}

impl<P: DeviceProbe + ?Sized> DeviceProbe for &P {
    fn device_capabilities(&self) -> Result<Vec<(u32, u32)>> {
        (**self).device_capabilities()
    }
}

/// Queries attached GPUs through `nvidia-smi`.
///
/// A missing `nvidia-smi` binary, or one that exits non-zero because no
/// driver is loaded, counts as zero attached devices.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    program: PathBuf,
}

impl NvidiaSmiProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self::new("nvidia-smi")
    }
}

impl DeviceProbe for NvidiaSmiProbe {
    fn device_capabilities(&self) -> Result<Vec<(u32, u32)>> {
        let output = match Command::new(&self.program)
            .args(["--query-gpu=compute_cap", "--format=csv,noheader"])
            .output()
        {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("{} not found; assuming no attached GPUs", self.program.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ArchError::Probe {
                    program: self.program.display().to_string(),
                    detail: e.to_string(),
                })
            }
        };

        if !output.status.success() {
            warn!(
                "{} exited with {}; assuming no attached GPUs",
                self.program.display(),
                output.status
            );
            return Ok(Vec::new());
        }

        Ok(parse_smi_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `nvidia-smi --query-gpu=compute_cap --format=csv,noheader` output.
///
/// Lines that are not a capability (`[N/A]` for a device in a bad state) are
/// skipped with a warning.
pub fn parse_smi_output(output: &str) -> Vec<(u32, u32)> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .filter_map(|(index, line)| match line.parse::<ComputeCapability>() {
            Ok(cc) => Some((cc.major, cc.minor)),
            Err(e) => {
                warn!("skipping GPU {index}: {e}");
                None
            }
        })
        .collect()
}

/// Produces the non-empty capability set for a build.
#[derive(Debug, Clone)]
pub struct CapabilityResolver<P> {
    probe: P,
    min_major: u32,
}

impl<P: DeviceProbe> CapabilityResolver<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            min_major: MIN_SUPPORTED_MAJOR,
        }
    }

    /// Resolve capabilities.
    ///
    /// A non-blank `override_list` is parsed verbatim and the device probe is
    /// never consulted. Otherwise every attached device at or above the
    /// minimum major version contributes its native capability.
    pub fn resolve(&self, override_list: Option<&str>) -> Result<CapabilitySet> {
        let capabilities = match override_list {
            Some(list) if !list.trim().is_empty() => CapabilitySet::parse_list(list)?,
            _ => self.probe_devices()?,
        };

        if capabilities.is_empty() {
            return Err(ArchError::NoCapabilitiesResolved);
        }
        info!("Detected compute capabilities: {capabilities}");
        Ok(capabilities)
    }

    fn probe_devices(&self) -> Result<CapabilitySet> {
        let mut capabilities = CapabilitySet::new();
        for (index, (major, minor)) in self.probe.device_capabilities()?.into_iter().enumerate() {
            if major < self.min_major {
                warn!("skipping GPU {index} with compute capability {major}.{minor}");
                continue;
            }
            capabilities.insert(ComputeCapability::new(major, minor));
        }
        Ok(capabilities)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct FixedProbe {
        devices: Vec<(u32, u32)>,
        calls: Cell<usize>,
    }

    impl FixedProbe {
        fn new(devices: Vec<(u32, u32)>) -> Self {
            Self {
                devices,
                calls: Cell::new(0),
            }
        }
    }

    impl DeviceProbe for FixedProbe {
        fn device_capabilities(&self) -> Result<Vec<(u32, u32)>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.devices.clone())
        }
    }

    #[test]
    fn override_list_bypasses_probe() {
        let probe = FixedProbe::new(vec![]);
        let resolver = CapabilityResolver::new(&probe);
        let set = resolver.resolve(Some("8.0;8.9 9.0+PTX")).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn override_list_keeps_capabilities_below_probe_minimum() {
        let probe = FixedProbe::new(vec![(9, 0)]);
        let set = CapabilityResolver::new(&probe)
            .resolve(Some("7.5 8.0"))
            .unwrap();
        assert!(set.contains(&ComputeCapability::new(7, 5)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn blank_override_falls_back_to_probe() {
        let probe = FixedProbe::new(vec![(8, 9)]);
        let set = CapabilityResolver::new(&probe).resolve(Some("  ")).unwrap();
        assert_eq!(set.to_string(), "8.9");
        assert_eq!(probe.calls.get(), 1);
    }

    #[test]
    fn separator_only_override_is_fatal() {
        let probe = FixedProbe::new(vec![(9, 0)]);
        let err = CapabilityResolver::new(&probe).resolve(Some(";;")).unwrap_err();
        assert!(matches!(err, ArchError::NoCapabilitiesResolved));
    }

    #[test]
    fn probe_skips_old_devices() {
        let probe = FixedProbe::new(vec![(7, 5), (8, 6), (9, 0), (8, 6)]);
        let set = CapabilityResolver::new(&probe).resolve(None).unwrap();
        assert_eq!(set.to_string(), "8.6 9.0");
    }

    #[test]
    fn all_devices_too_old_is_fatal() {
        let probe = FixedProbe::new(vec![(7, 0), (6, 1)]);
        let err = CapabilityResolver::new(&probe).resolve(None).unwrap_err();
        assert!(matches!(err, ArchError::NoCapabilitiesResolved));
    }

    #[test]
    fn no_devices_is_fatal() {
        let probe = FixedProbe::new(vec![]);
        let err = CapabilityResolver::new(&probe).resolve(None).unwrap_err();
        assert!(matches!(err, ArchError::NoCapabilitiesResolved));
    }

    #[test]
    fn invalid_override_token_is_reported() {
        let probe = FixedProbe::new(vec![]);
        let err = CapabilityResolver::new(&probe)
            .resolve(Some("8.0 sm90"))
            .unwrap_err();
        assert!(matches!(err, ArchError::InvalidCapability { token } if token == "sm90"));
    }

    #[test]
    fn parse_smi_lines() {
        let devices = parse_smi_output("8.9\n9.0\n\n12.0\n");
        assert_eq!(devices, vec![(8, 9), (9, 0), (12, 0)]);
    }

    #[test]
    fn unreadable_device_line_is_skipped() {
        let devices = parse_smi_output("9.0\n[N/A]\n8.9\n");
        assert_eq!(devices, vec![(9, 0), (8, 9)]);
    }

    #[test]
    fn missing_smi_means_no_devices() {
        let probe = NvidiaSmiProbe::new("/nonexistent/extforge/nvidia-smi");
        assert!(probe.device_capabilities().unwrap().is_empty());
    }
}
