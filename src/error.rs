//! The single fatal-error surface of the lowering pass.
//!
//! Every condition here is a programmer/input-contract error with no recovery
//! path: callers are expected to print the message and abort. Conditions that
//! can be defaulted around (missing optional metadata, absent options) never
//! reach this type.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// An IR type was looked up before discovery registered it.
    #[error("no SPIR-V type registered for `{0}`")]
    UnknownType(String),

    /// An IR value was looked up before an id was assigned to it.
    #[error("no SPIR-V id registered for `{0}`")]
    UnknownValue(String),

    /// An IR construct the target has no lowering for.
    #[error("unsupported instruction: {0}")]
    UnsupportedInst(&'static str),

    /// A constant of a shape the emitter has no encoding for.
    #[error("unsupported constant: `{0}`")]
    UnsupportedConstant(String),

    /// A kernel argument of an opaque type that is neither a sampler nor an
    /// image.
    #[error("kernel argument has unsupported opaque type `{0}`")]
    UnsupportedArgType(String),

    /// Vulkan SPIR-V has no pointer comparison.
    #[error("pointer equality test is not supported for Vulkan, in function `{function}`")]
    PointerEquality { function: String },

    /// `<N x i8>` only lowers for N == 4 (folded into an `i32`).
    #[error("i8 vectors must have exactly 4 elements, found {0}")]
    WideByteVector(u32),

    /// Structurization should have left every loop with a single exit block.
    #[error("loop headed by block `{header}` has multiple exits")]
    MultiExitLoop { header: String },

    /// No in-loop block dominates the latch, so no continue target exists.
    #[error("no continue target for loop headed by block `{header}`")]
    NoContinueTarget { header: String },

    /// All kernels must agree on a fixed workgroup size (or all lack one).
    #[error("kernels disagree on reqd_work_group_size")]
    MismatchedWorkgroupSize,

    /// The storage-buffer rendition of `__constant` data is capped at 64 KiB.
    #[error("max __constant capacity of {limit} bytes exceeded: {used} bytes used")]
    ConstantDataTooLarge { used: u64, limit: u64 },

    /// A literal sampler appeared but no sampler map was supplied.
    #[error("kernel uses a literal sampler but no sampler map was provided")]
    MissingSamplerMap,

    /// A literal sampler's mask is absent from the sampler map.
    #[error("sampler literal {0} was not found in the sampler map")]
    UnknownSamplerLiteral(u32),

    /// The sampler-initializer argument must be an integer literal.
    #[error("argument of sampler initializer was not a constant")]
    NonConstantSamplerLiteral,
}
