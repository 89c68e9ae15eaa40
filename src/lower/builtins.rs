//! Recognition tables for builtin calls, keyed by mangled name.
//!
//! OpenCL builtins arrive as calls to their Itanium-mangled names; the tables
//! here say which ones lower to dedicated SPIR-V sequences and which map onto
//! GLSL.std.450 extended instructions. A "direct" extended instruction is the
//! whole lowering; an "indirect" one needs a follow-up op (`clz` is
//! `FindUMsb` then a subtract from 31, the `*pi` trig family multiplies by
//! 1/π afterwards).

use crate::spv::spec::glsl;
use crate::spv::Opcode;
use lazy_static::lazy_static;

/// 1/π, used to implement acospi/asinpi/atan2pi.
pub const ONE_OVER_PI: f64 = 0.318309886183790671538;

pub const SAMPLER_INIT_FN: &str = "__translate_sampler_initializer";

pub const READ_IMAGE_2D: &str = "_Z11read_imagef14ocl_image2d_ro11ocl_samplerDv2_f";
pub const READ_IMAGE_3D: &str = "_Z11read_imagef14ocl_image3d_ro11ocl_samplerDv4_f";
pub const WRITE_IMAGE_2D: &str = "_Z12write_imagef14ocl_image2d_woDv2_iDv4_f";
pub const WRITE_IMAGE_3D: &str = "_Z12write_imagef14ocl_image3d_woDv4_iDv4_f";

/// Image-size queries; all answer out of one `OpImageQuerySize` on a
/// 2-component result.
pub const IMAGE_QUERY_FNS: [&str; 4] = [
    "_Z15get_image_width14ocl_image2d_ro",
    "_Z15get_image_width14ocl_image2d_wo",
    "_Z16get_image_height14ocl_image2d_ro",
    "_Z16get_image_height14ocl_image2d_wo",
];

/// Calls with this prefix were synthesized by an earlier pass to build a
/// composite value; they lower to `OpCompositeConstruct`.
pub const COMPOSITE_CONSTRUCT_PREFIX: &str = "clspv.composite_construct.";

pub fn is_unsigned_abs(name: &str) -> bool {
    matches!(name, "_Z3absj" | "_Z3absDv2_j" | "_Z3absDv3_j" | "_Z3absDv4_j")
}

pub fn is_popcount(name: &str) -> bool {
    matches!(
        name,
        "_Z8popcounti"
            | "_Z8popcountj"
            | "_Z8popcountDv2_i"
            | "_Z8popcountDv3_i"
            | "_Z8popcountDv4_i"
            | "_Z8popcountDv2_j"
            | "_Z8popcountDv3_j"
            | "_Z8popcountDv4_j"
    )
}

pub fn is_isinf(name: &str) -> bool {
    matches!(
        name,
        "__spirv_isinff" | "__spirv_isinfDv2_f" | "__spirv_isinfDv3_f" | "__spirv_isinfDv4_f"
    )
}

pub fn is_isnan(name: &str) -> bool {
    matches!(
        name,
        "__spirv_isnanf" | "__spirv_isnanDv2_f" | "__spirv_isnanDv3_f" | "__spirv_isnanDv4_f"
    )
}

pub fn is_all(name: &str) -> bool {
    matches!(name, "__spirv_allDv2_i" | "__spirv_allDv3_i" | "__spirv_allDv4_i")
}

pub fn is_any(name: &str) -> bool {
    matches!(name, "__spirv_anyDv2_i" | "__spirv_anyDv3_i" | "__spirv_anyDv4_i")
}

/// `spirv.atomic_*` intrinsics pass their operands through verbatim.
pub fn atomic_intrinsic(name: &str) -> Option<Opcode> {
    Some(match name {
        "spirv.atomic_add" => Opcode::OpAtomicIAdd,
        "spirv.atomic_sub" => Opcode::OpAtomicISub,
        "spirv.atomic_exchange" => Opcode::OpAtomicExchange,
        "spirv.atomic_inc" => Opcode::OpAtomicIIncrement,
        "spirv.atomic_dec" => Opcode::OpAtomicIDecrement,
        "spirv.atomic_compare_exchange" => Opcode::OpAtomicCompareExchange,
        "spirv.atomic_umin" => Opcode::OpAtomicUMin,
        "spirv.atomic_smin" => Opcode::OpAtomicSMin,
        "spirv.atomic_umax" => Opcode::OpAtomicUMax,
        "spirv.atomic_smax" => Opcode::OpAtomicSMax,
        "spirv.atomic_and" => Opcode::OpAtomicAnd,
        "spirv.atomic_or" => Opcode::OpAtomicOr,
        "spirv.atomic_xor" => Opcode::OpAtomicXor,
        _ => return None,
    })
}

enum Match {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Match {
    fn matches(&self, name: &str) -> bool {
        match self {
            Match::Exact(s) => name == *s,
            Match::Prefix(s) => name.starts_with(s),
        }
    }
}

use Match::{Exact, Prefix};

lazy_static! {
    /// Mangled name → direct GLSL.std.450 instruction, first match wins.
    static ref EXT_INST: Vec<(Match, u32)> = vec![
        (Exact("_Z3absi"), glsl::SAbs),
        (Exact("_Z3absDv2_i"), glsl::SAbs),
        (Exact("_Z3absDv3_i"), glsl::SAbs),
        (Exact("_Z3absDv4_i"), glsl::SAbs),
        (Exact("_Z5clampiii"), glsl::SClamp),
        (Exact("_Z5clampDv2_iS_S_"), glsl::SClamp),
        (Exact("_Z5clampDv3_iS_S_"), glsl::SClamp),
        (Exact("_Z5clampDv4_iS_S_"), glsl::SClamp),
        (Exact("_Z5clampjjj"), glsl::UClamp),
        (Exact("_Z5clampDv2_jS_S_"), glsl::UClamp),
        (Exact("_Z5clampDv3_jS_S_"), glsl::UClamp),
        (Exact("_Z5clampDv4_jS_S_"), glsl::UClamp),
        (Exact("_Z5clampfff"), glsl::FClamp),
        (Exact("_Z5clampDv2_fS_S_"), glsl::FClamp),
        (Exact("_Z5clampDv3_fS_S_"), glsl::FClamp),
        (Exact("_Z5clampDv4_fS_S_"), glsl::FClamp),
        (Exact("_Z3maxii"), glsl::SMax),
        (Exact("_Z3maxDv2_iS_"), glsl::SMax),
        (Exact("_Z3maxDv3_iS_"), glsl::SMax),
        (Exact("_Z3maxDv4_iS_"), glsl::SMax),
        (Exact("_Z3maxjj"), glsl::UMax),
        (Exact("_Z3maxDv2_jS_"), glsl::UMax),
        (Exact("_Z3maxDv3_jS_"), glsl::UMax),
        (Exact("_Z3maxDv4_jS_"), glsl::UMax),
        (Exact("_Z3maxff"), glsl::FMax),
        (Exact("_Z3maxDv2_fS_"), glsl::FMax),
        (Exact("_Z3maxDv3_fS_"), glsl::FMax),
        (Exact("_Z3maxDv4_fS_"), glsl::FMax),
        (Prefix("_Z4fmax"), glsl::FMax),
        (Exact("_Z3minii"), glsl::SMin),
        (Exact("_Z3minDv2_iS_"), glsl::SMin),
        (Exact("_Z3minDv3_iS_"), glsl::SMin),
        (Exact("_Z3minDv4_iS_"), glsl::SMin),
        (Exact("_Z3minjj"), glsl::UMin),
        (Exact("_Z3minDv2_jS_"), glsl::UMin),
        (Exact("_Z3minDv3_jS_"), glsl::UMin),
        (Exact("_Z3minDv4_jS_"), glsl::UMin),
        (Exact("_Z3minff"), glsl::FMin),
        (Exact("_Z3minDv2_fS_"), glsl::FMin),
        (Exact("_Z3minDv3_fS_"), glsl::FMin),
        (Exact("_Z3minDv4_fS_"), glsl::FMin),
        (Prefix("_Z4fmin"), glsl::FMin),
        (Prefix("_Z7degrees"), glsl::Degrees),
        (Prefix("_Z7radians"), glsl::Radians),
        (Prefix("_Z3mix"), glsl::FMix),
        (Prefix("_Z5acosh"), glsl::Acosh),
        (Prefix("_Z4acos"), glsl::Acos),
        (Prefix("_Z5asinh"), glsl::Asinh),
        (Prefix("_Z4asin"), glsl::Asin),
        (Prefix("_Z5atan2"), glsl::Atan2),
        (Prefix("_Z5atanh"), glsl::Atanh),
        (Prefix("_Z4atan"), glsl::Atan),
        (Prefix("_Z4ceil"), glsl::Ceil),
        (Prefix("_Z4sinh"), glsl::Sinh),
        (Prefix("_Z3sin"), glsl::Sin),
        (Prefix("_Z8half_sin"), glsl::Sin),
        (Prefix("_Z10native_sin"), glsl::Sin),
        (Prefix("_Z4cosh"), glsl::Cosh),
        (Prefix("_Z3cos"), glsl::Cos),
        (Prefix("_Z8half_cos"), glsl::Cos),
        (Prefix("_Z10native_cos"), glsl::Cos),
        (Prefix("_Z4tanh"), glsl::Tanh),
        (Prefix("_Z3tan"), glsl::Tan),
        (Prefix("_Z8half_tan"), glsl::Tan),
        (Prefix("_Z10native_tan"), glsl::Tan),
        (Prefix("_Z4exp2"), glsl::Exp2),
        (Prefix("_Z9half_exp2"), glsl::Exp2),
        (Prefix("_Z11native_exp2"), glsl::Exp2),
        (Prefix("_Z3exp"), glsl::Exp),
        (Prefix("_Z8half_exp"), glsl::Exp),
        (Prefix("_Z10native_exp"), glsl::Exp),
        (Prefix("_Z4log2"), glsl::Log2),
        (Prefix("_Z9half_log2"), glsl::Log2),
        (Prefix("_Z11native_log2"), glsl::Log2),
        (Prefix("_Z3log"), glsl::Log),
        (Prefix("_Z8half_log"), glsl::Log),
        (Prefix("_Z10native_log"), glsl::Log),
        (Prefix("_Z4fabs"), glsl::FAbs),
        (Prefix("_Z5floor"), glsl::Floor),
        (Prefix("_Z5ldexp"), glsl::Ldexp),
        (Prefix("_Z4powr"), glsl::Pow),
        (Prefix("_Z9half_powr"), glsl::Pow),
        (Prefix("_Z11native_powr"), glsl::Pow),
        (Prefix("_Z3pow"), glsl::Pow),
        (Prefix("_Z5round"), glsl::Round),
        (Prefix("_Z5rsqrt"), glsl::InverseSqrt),
        (Prefix("_Z10half_rsqrt"), glsl::InverseSqrt),
        (Prefix("_Z12native_rsqrt"), glsl::InverseSqrt),
        (Prefix("_Z4sqrt"), glsl::Sqrt),
        (Prefix("_Z9half_sqrt"), glsl::Sqrt),
        (Prefix("_Z11native_sqrt"), glsl::Sqrt),
        (Prefix("_Z5trunc"), glsl::Trunc),
        (Prefix("_Z5frexp"), glsl::Frexp),
        (Prefix("_Z4sign"), glsl::FSign),
        (Prefix("_Z6length"), glsl::Length),
        (Prefix("_Z8distance"), glsl::Distance),
        (Prefix("_Z4step"), glsl::Step),
        (Exact("_Z5crossDv3_fS_"), glsl::Cross),
        (Prefix("_Z9normalize"), glsl::Normalize),
        (Prefix("llvm.fmuladd."), glsl::Fma),
        (Exact("spirv.unpack.v2f16"), glsl::UnpackHalf2x16),
        (Exact("spirv.pack.v2f16"), glsl::PackHalf2x16),
        (Exact("clspv.fract.f"), glsl::Fract),
        (Exact("clspv.fract.v2f"), glsl::Fract),
        (Exact("clspv.fract.v3f"), glsl::Fract),
        (Exact("clspv.fract.v4f"), glsl::Fract),
    ];

    /// Mangled name → extended instruction implemented with a follow-up op.
    static ref INDIRECT_EXT_INST: Vec<(Match, u32)> = vec![
        (Prefix("_Z3clz"), glsl::FindUMsb),
        // Exact matches on the float arg: these need a multiply by a constant
        // of the right floating-point type.
        (Exact("_Z6acospif"), glsl::Acos),
        (Exact("_Z6acospiDv2_f"), glsl::Acos),
        (Exact("_Z6acospiDv3_f"), glsl::Acos),
        (Exact("_Z6acospiDv4_f"), glsl::Acos),
        (Exact("_Z6asinpif"), glsl::Asin),
        (Exact("_Z6asinpiDv2_f"), glsl::Asin),
        (Exact("_Z6asinpiDv3_f"), glsl::Asin),
        (Exact("_Z6asinpiDv4_f"), glsl::Asin),
        (Exact("_Z7atan2piff"), glsl::Atan2),
        (Exact("_Z7atan2piDv2_fS_"), glsl::Atan2),
        (Exact("_Z7atan2piDv3_fS_"), glsl::Atan2),
        (Exact("_Z7atan2piDv4_fS_"), glsl::Atan2),
    ];
}

pub fn ext_inst(name: &str) -> Option<u32> {
    EXT_INST.iter().find(|(m, _)| m.matches(name)).map(|&(_, e)| e)
}

pub fn indirect_ext_inst(name: &str) -> Option<u32> {
    INDIRECT_EXT_INST.iter().find(|(m, _)| m.matches(name)).map(|&(_, e)| e)
}

pub fn direct_or_indirect_ext_inst(name: &str) -> Option<u32> {
    ext_inst(name).or_else(|| indirect_ext_inst(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_table_prefers_earlier_rows() {
        // acosh must not be swallowed by the acos prefix.
        assert_eq!(ext_inst("_Z5acoshf"), Some(glsl::Acosh));
        assert_eq!(ext_inst("_Z4acosf"), Some(glsl::Acos));
        assert_eq!(ext_inst("_Z3maxff"), Some(glsl::FMax));
        assert_eq!(ext_inst("_Z3maxjj"), Some(glsl::UMax));
        assert_eq!(ext_inst("_Z8popcounti"), None);
        assert!(is_popcount("_Z8popcounti"));
    }

    #[test]
    fn indirect_table() {
        assert_eq!(indirect_ext_inst("_Z3clzj"), Some(glsl::FindUMsb));
        assert_eq!(indirect_ext_inst("_Z6acospif"), Some(glsl::Acos));
        assert_eq!(indirect_ext_inst("_Z4acosf"), None);
        assert_eq!(direct_or_indirect_ext_inst("_Z3clzj"), Some(glsl::FindUMsb));
        assert_eq!(direct_or_indirect_ext_inst("_Z4acosf"), Some(glsl::Acos));
    }

    #[test]
    fn compiler_synthesized_names() {
        // These names are produced by earlier passes, not by mangling.
        for name in ["clspv.fract.f", "clspv.fract.v2f", "clspv.fract.v3f", "clspv.fract.v4f"] {
            assert_eq!(ext_inst(name), Some(glsl::Fract));
        }
        assert!("clspv.composite_construct.v2f".starts_with(COMPOSITE_CONSTRUCT_PREFIX));
        assert_eq!(ext_inst("clspv.composite_construct.v2f"), None);
    }

    #[test]
    fn atomics_and_predicates() {
        assert_eq!(atomic_intrinsic("spirv.atomic_add"), Some(Opcode::OpAtomicIAdd));
        assert_eq!(atomic_intrinsic("spirv.atomic_nand"), None);
        assert!(is_unsigned_abs("_Z3absj"));
        assert!(!is_unsigned_abs("_Z3absi"));
        assert!(is_isinf("__spirv_isinff"));
        assert!(is_any("__spirv_anyDv3_i"));
    }
}
