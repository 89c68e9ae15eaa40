//! The slice of the SPIR-V 1.0 specification the producer targets: opcodes,
//! operand enums, and their printable names.
//!
//! Values are transcribed from the Khronos headers. Only what the lowering
//! can emit is listed; an unknown value prints as a raw number rather than
//! panicking, so the assembly emitter stays total.

pub const MAGIC: u32 = 0x0723_0203;
/// SPIR-V 1.0.
pub const VERSION: u32 = 0x0001_0000;
/// The registered generator id, in the high half-word.
pub const GENERATOR: u32 = 3 << 16;
pub const HEADER_LEN: usize = 5;

macro_rules! def_opcodes {
    ($($name:ident = $val:literal,)+) => {
        /// A SPIR-V opcode (the low 16 bits of an instruction's first word).
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct Opcode(u16);

        #[allow(non_upper_case_globals)]
        impl Opcode {
            $(pub const $name: Opcode = Opcode($val);)+

            pub fn as_u16(self) -> u16 {
                self.0
            }

            pub fn name(self) -> &'static str {
                match self.0 {
                    $($val => stringify!($name),)+
                    _ => "OpUnknown",
                }
            }
        }

        impl std::fmt::Debug for Opcode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", self.name(), self.0)
            }
        }
    };
}

def_opcodes! {
    OpNop = 0,
    OpUndef = 1,
    OpSource = 3,
    OpString = 7,
    OpExtension = 10,
    OpExtInstImport = 11,
    OpExtInst = 12,
    OpMemoryModel = 14,
    OpEntryPoint = 15,
    OpExecutionMode = 16,
    OpCapability = 17,
    OpTypeVoid = 19,
    OpTypeBool = 20,
    OpTypeInt = 21,
    OpTypeFloat = 22,
    OpTypeVector = 23,
    OpTypeImage = 25,
    OpTypeSampler = 26,
    OpTypeSampledImage = 27,
    OpTypeArray = 28,
    OpTypeRuntimeArray = 29,
    OpTypeStruct = 30,
    OpTypePointer = 32,
    OpTypeFunction = 33,
    OpConstantTrue = 41,
    OpConstantFalse = 42,
    OpConstant = 43,
    OpConstantComposite = 44,
    OpConstantNull = 46,
    OpSpecConstant = 50,
    OpSpecConstantComposite = 51,
    OpFunction = 54,
    OpFunctionParameter = 55,
    OpFunctionEnd = 56,
    OpFunctionCall = 57,
    OpVariable = 59,
    OpLoad = 61,
    OpStore = 62,
    OpCopyMemory = 63,
    OpAccessChain = 65,
    OpInBoundsAccessChain = 66,
    OpPtrAccessChain = 67,
    OpDecorate = 71,
    OpMemberDecorate = 72,
    OpVectorExtractDynamic = 77,
    OpVectorInsertDynamic = 78,
    OpVectorShuffle = 79,
    OpCompositeConstruct = 80,
    OpCompositeExtract = 81,
    OpCompositeInsert = 82,
    OpCopyObject = 83,
    OpSampledImage = 86,
    OpImageSampleExplicitLod = 88,
    OpImageWrite = 99,
    OpImageQuerySize = 104,
    OpConvertFToU = 109,
    OpConvertFToS = 110,
    OpConvertSToF = 111,
    OpConvertUToF = 112,
    OpUConvert = 113,
    OpSConvert = 114,
    OpFConvert = 115,
    OpBitcast = 124,
    OpIAdd = 128,
    OpFAdd = 129,
    OpISub = 130,
    OpFSub = 131,
    OpIMul = 132,
    OpFMul = 133,
    OpUDiv = 134,
    OpSDiv = 135,
    OpFDiv = 136,
    OpUMod = 137,
    OpSRem = 138,
    OpFRem = 140,
    OpDot = 148,
    OpAny = 154,
    OpAll = 155,
    OpIsNan = 156,
    OpIsInf = 157,
    OpLogicalNotEqual = 165,
    OpLogicalOr = 166,
    OpLogicalAnd = 167,
    OpLogicalNot = 168,
    OpSelect = 169,
    OpIEqual = 170,
    OpINotEqual = 171,
    OpUGreaterThan = 172,
    OpSGreaterThan = 173,
    OpUGreaterThanEqual = 174,
    OpSGreaterThanEqual = 175,
    OpULessThan = 176,
    OpSLessThan = 177,
    OpULessThanEqual = 178,
    OpSLessThanEqual = 179,
    OpFOrdEqual = 180,
    OpFUnordEqual = 181,
    OpFOrdNotEqual = 182,
    OpFUnordNotEqual = 183,
    OpFOrdLessThan = 184,
    OpFUnordLessThan = 185,
    OpFOrdGreaterThan = 186,
    OpFUnordGreaterThan = 187,
    OpFOrdLessThanEqual = 188,
    OpFUnordLessThanEqual = 189,
    OpFOrdGreaterThanEqual = 190,
    OpFUnordGreaterThanEqual = 191,
    OpShiftRightLogical = 194,
    OpShiftRightArithmetic = 195,
    OpShiftLeftLogical = 196,
    OpBitwiseOr = 197,
    OpBitwiseXor = 198,
    OpBitwiseAnd = 199,
    OpNot = 200,
    OpBitCount = 205,
    OpControlBarrier = 224,
    OpMemoryBarrier = 225,
    OpAtomicExchange = 229,
    OpAtomicCompareExchange = 230,
    OpAtomicIIncrement = 232,
    OpAtomicIDecrement = 233,
    OpAtomicIAdd = 234,
    OpAtomicISub = 235,
    OpAtomicSMin = 236,
    OpAtomicUMin = 237,
    OpAtomicSMax = 238,
    OpAtomicUMax = 239,
    OpAtomicAnd = 240,
    OpAtomicOr = 241,
    OpAtomicXor = 242,
    OpPhi = 245,
    OpLoopMerge = 246,
    OpSelectionMerge = 247,
    OpLabel = 248,
    OpBranch = 249,
    OpBranchConditional = 250,
    OpReturn = 253,
    OpReturnValue = 254,
}

impl Opcode {
    /// Does the instruction belong to the decoration region of a module?
    pub fn is_decoration(self) -> bool {
        self == Opcode::OpDecorate || self == Opcode::OpMemberDecorate
    }
}

macro_rules! def_value_enum {
    ($modname:ident { $($name:ident = $val:literal,)+ }) => {
        #[allow(non_upper_case_globals)]
        pub mod $modname {
            $(pub const $name: u32 = $val;)+

            // Fully qualified, as some of these modules define a `None`
            // constant of their own.
            pub fn name(v: u32) -> Option<&'static str> {
                match v {
                    $($val => Option::Some(stringify!($name)),)+
                    _ => Option::None,
                }
            }
        }
    };
}

def_value_enum!(capability {
    Shader = 1,
    Float16 = 9,
    Float64 = 10,
    Int64 = 11,
    Int16 = 22,
    ImageQuery = 50,
    StorageImageWriteWithoutFormat = 56,
    VariablePointers = 4442,
});

def_value_enum!(addressing_model {
    Logical = 0,
});

def_value_enum!(memory_model {
    GLSL450 = 1,
});

def_value_enum!(execution_model {
    GLCompute = 5,
});

def_value_enum!(execution_mode {
    LocalSize = 17,
});

def_value_enum!(source_language {
    Unknown = 0,
    OpenCL_C = 3,
});

def_value_enum!(storage_class {
    UniformConstant = 0,
    Input = 1,
    Uniform = 2,
    Output = 3,
    Workgroup = 4,
    CrossWorkgroup = 5,
    Private = 6,
    Function = 7,
    StorageBuffer = 12,
});

def_value_enum!(decoration {
    SpecId = 1,
    Block = 2,
    ArrayStride = 6,
    BuiltIn = 11,
    NonWritable = 24,
    NonReadable = 25,
    Binding = 33,
    DescriptorSet = 34,
    Offset = 35,
});

def_value_enum!(builtin {
    NumWorkgroups = 24,
    WorkgroupSize = 25,
    WorkgroupId = 26,
    LocalInvocationId = 27,
    GlobalInvocationId = 28,
});

def_value_enum!(dim {
    Dim1D = 0,
    Dim2D = 1,
    Dim3D = 2,
});

def_value_enum!(image_format {
    Unknown = 0,
});

def_value_enum!(function_control {
    None = 0,
    Inline = 1,
    DontInline = 2,
    Pure = 4,
    Const = 8,
});

def_value_enum!(selection_control {
    None = 0,
});

def_value_enum!(loop_control {
    None = 0,
});

def_value_enum!(scope {
    CrossDevice = 0,
    Device = 1,
    Workgroup = 2,
});

def_value_enum!(memory_access {
    None = 0,
    Volatile = 1,
    Aligned = 2,
});

def_value_enum!(image_operands {
    None = 0,
    Lod = 2,
});

/// Memory-semantics mask bits (a bitmask, unlike the enums above).
#[allow(non_upper_case_globals)]
pub mod memory_semantics {
    pub const SequentiallyConsistent: u32 = 0x10;
    pub const UniformMemory: u32 = 0x40;
}

/// GLSL.std.450 extended-instruction numbers.
#[allow(non_upper_case_globals)]
pub mod glsl {
    macro_rules! def_glsl {
        ($($name:ident = $val:literal,)+) => {
            $(pub const $name: u32 = $val;)+

            pub fn name(v: u32) -> Option<&'static str> {
                match v {
                    $($val => Some(stringify!($name)),)+
                    _ => None,
                }
            }
        };
    }

    def_glsl! {
        Round = 1,
        Trunc = 3,
        FAbs = 4,
        SAbs = 5,
        FSign = 6,
        Floor = 8,
        Ceil = 9,
        Fract = 10,
        Radians = 11,
        Degrees = 12,
        Sin = 13,
        Cos = 14,
        Tan = 15,
        Asin = 16,
        Acos = 17,
        Atan = 18,
        Sinh = 19,
        Cosh = 20,
        Tanh = 21,
        Asinh = 22,
        Acosh = 23,
        Atanh = 24,
        Atan2 = 25,
        Pow = 26,
        Exp = 27,
        Log = 28,
        Exp2 = 29,
        Log2 = 30,
        Sqrt = 31,
        InverseSqrt = 32,
        FMin = 37,
        UMin = 38,
        SMin = 39,
        FMax = 40,
        UMax = 41,
        SMax = 42,
        FClamp = 43,
        UClamp = 44,
        SClamp = 45,
        FMix = 46,
        Step = 48,
        Fma = 50,
        Frexp = 51,
        Ldexp = 53,
        PackHalf2x16 = 58,
        UnpackHalf2x16 = 62,
        Length = 66,
        Distance = 67,
        Cross = 68,
        Normalize = 69,
        FindUMsb = 75,
    }
}

pub const EXT_INST_GLSL_STD_450: &str = "GLSL.std.450";
pub const EXT_STORAGE_BUFFER_STORAGE_CLASS: &str = "SPV_KHR_storage_buffer_storage_class";
pub const EXT_VARIABLE_POINTERS: &str = "SPV_KHR_variable_pointers";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_names_round_trip() {
        assert_eq!(Opcode::OpTypeVoid.name(), "OpTypeVoid");
        assert_eq!(Opcode::OpTypeVoid.as_u16(), 19);
        assert_eq!(Opcode::OpLoopMerge.as_u16(), 246);
        assert!(Opcode::OpDecorate.is_decoration());
        assert!(!Opcode::OpExtInstImport.is_decoration());
    }

    #[test]
    fn enum_values_match_the_headers() {
        assert_eq!(storage_class::StorageBuffer, 12);
        assert_eq!(decoration::DescriptorSet, 34);
        assert_eq!(builtin::WorkgroupSize, 25);
        assert_eq!(capability::VariablePointers, 4442);
        assert_eq!(glsl::FindUMsb, 75);
        assert_eq!(
            memory_semantics::UniformMemory | memory_semantics::SequentiallyConsistent,
            0x50
        );
        assert_eq!(storage_class::name(12), Some("StorageBuffer"));
        assert_eq!(storage_class::name(99), None);
    }
}
