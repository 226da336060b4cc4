//! The catalog of known extension targets.

use std::collections::{BTreeSet, HashSet};

use extforge_arch::CapabilityFamily;

use crate::error::{PlanError, Result};
use crate::target::ExtensionTarget;

const SM80: CapabilityFamily = CapabilityFamily::new(8, 0);
const SM89: CapabilityFamily = CapabilityFamily::new(8, 9);
const SM90: CapabilityFamily = CapabilityFamily::new(9, 0);
const SM120: CapabilityFamily = CapabilityFamily::new(12, 0);

/// An ordered, validated set of extension targets with unique names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionCatalog {
    targets: Vec<ExtensionTarget>,
}

impl ExtensionCatalog {
    /// Validate each target and reject duplicate module names.
    pub fn new(targets: Vec<ExtensionTarget>) -> Result<Self> {
        let mut seen = HashSet::new();
        for target in &targets {
            target.validate()?;
            if !seen.insert(target.name().to_string()) {
                return Err(PlanError::DuplicateTarget {
                    name: target.name().to_string(),
                });
            }
        }
        Ok(Self { targets })
    }

    /// The quantized-attention kernel modules shipped with extforge.
    pub fn builtin() -> Self {
        let qattn_sm80 = ExtensionTarget::new(
            "quantattn._qattn_sm80",
            [
                "csrc/qattn/pybind_sm80.cpp",
                "csrc/qattn/qk_int_sv_f16_cuda_sm80.cu",
            ],
            [SM80],
        )
        .with_entry_points(
            "quantattn_qattn_sm80",
            [
                "qk_int8_sv_f16_accum_f32_attn",
                "qk_int8_sv_f16_accum_f16_attn",
                "qk_int8_sv_f16_accum_f16_attn_inst_buf",
                "qk_int8_sv_f16_accum_f16_fuse_v_mean_attn",
            ],
        );

        let qattn_sm89 = ExtensionTarget::new(
            "quantattn._qattn_sm89",
            [
                "csrc/qattn/pybind_sm89.cpp",
                "csrc/qattn/sm89_qk_int8_sv_f8_accum_f32_attn_inst_buf.cu",
                "csrc/qattn/sm89_qk_int8_sv_f8_accum_f16_attn_inst_buf.cu",
                "csrc/qattn/sm89_qk_int8_sv_f8_accum_f32_attn.cu",
                "csrc/qattn/sm89_qk_int8_sv_f8_accum_f32_fuse_v_scale_fuse_v_mean_attn.cu",
                "csrc/qattn/sm89_qk_int8_sv_f8_accum_f32_fuse_v_scale_attn.cu",
                "csrc/qattn/sm89_qk_int8_sv_f8_accum_f32_fuse_v_scale_attn_inst_buf.cu",
                "csrc/qattn/sm89_qk_int8_sv_f8_accum_f16_fuse_v_scale_attn_inst_buf.cu",
            ],
            [SM89, SM120],
        )
        .with_entry_points(
            "quantattn_qattn_sm89",
            [
                "qk_int8_sv_f8_accum_f32_fuse_v_scale_attn",
                "qk_int8_sv_f8_accum_f32_fuse_v_scale_attn_inst_buf",
                "qk_int8_sv_f8_accum_f16_fuse_v_scale_attn_inst_buf",
                "qk_int8_sv_f8_accum_f32_fuse_v_scale_fuse_v_mean_attn",
            ],
        );

        let qattn_sm90 = ExtensionTarget::new(
            "quantattn._qattn_sm90",
            [
                "csrc/qattn/pybind_sm90.cpp",
                "csrc/qattn/qk_int_sv_f8_cuda_sm90.cu",
            ],
            [SM90],
        )
        .with_libraries(["cuda"])
        .with_entry_points(
            "quantattn_qattn_sm90",
            ["qk_int8_sv_f8_accum_f32_attn_inst_buf"],
        );

        let fused = ExtensionTarget::new(
            "quantattn._fused",
            ["csrc/fused/pybind.cpp", "csrc/fused/fused.cu"],
            [SM80, SM89, SM90, SM120],
        )
        .always_built()
        .with_entry_points(
            "quantattn_fused",
            [
                "quant_per_block_int8_scale_cuda",
                "quant_per_block_int8_cuda",
                "quant_per_block_int8_fuse_sub_mean_cuda",
                "quant_per_warp_int8_cuda",
                "sub_mean_cuda",
                "transpose_pad_permute_cuda",
                "scale_fuse_quant_cuda",
                "mean_scale_fuse_quant_cuda",
            ],
        );

        Self {
            targets: vec![qattn_sm80, qattn_sm89, qattn_sm90, fused],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionTarget> {
        self.targets.iter().find(|t| t.name() == name)
    }

    /// Union of every target's eligible families.
    pub fn supported_families(&self) -> BTreeSet<CapabilityFamily> {
        self.targets
            .iter()
            .flat_map(|t| t.capabilities().iter().copied())
            .collect()
    }
}
