//! `spvgen` is the final code-generation back-end of an offline OpenCL-to-Vulkan
//! compiler flow: it lowers a typed, single-static-assignment compute-kernel IR
//! into a SPIR-V 1.0 module a Vulkan driver can consume, and emits a sidecar
//! "descriptor map" describing how each kernel argument is bound to Vulkan
//! resources (descriptor sets, bindings, specialization constants).
//!
//! The input IR is expected to have been run through earlier passes already:
//! control flow is structured into single-entry/single-exit regions, and
//! OpenCL builtins appear as calls to their mangled names. This crate only
//! translates; it never optimizes.
//!
//! #### Notable types/modules
//!
//! * [`ir`]: the input IR the lowering consumes ([`ir::Module`], [`ir::Context`])
//! * [`lower::produce`]: the whole lowering pipeline, one call
//! * [`spv`]: SPIR-V instruction records, opcode/enum tables, serializers
//! * [`Options`]: the configuration surface (driver workarounds included)

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::dbg_macro,
    clippy::exit,
    clippy::filter_map_next,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::map_flatten,
    clippy::mem_forget,
    clippy::mut_mut,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::string_add_assign,
    clippy::todo,
    clippy::unimplemented,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// Crate-specific exceptions:
#![allow(
    // Lowering follows the shape of the instruction set it targets; a few of
    // the per-opcode match arms are naturally long.
    clippy::too_many_lines,
    // `match` is preferred over `if let` where the arms read like a table.
    clippy::single_match_else
)]

pub mod descmap;
mod error;
pub mod ir;
pub mod lower;
pub mod spv;

pub use error::{Error, Result};
pub use lower::{produce, Output};

#[doc(hidden)]
type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;
#[doc(hidden)]
type FxIndexSet<V> = indexmap::IndexSet<V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// How the lowered module is rendered by the serializer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Little-endian SPIR-V binary words.
    #[default]
    Binary,
    /// A textual assembly listing with symbolic enum names.
    Assembly,
    /// The binary words, rewritten as a C initializer list (`{119734787,...}`).
    CInitList,
}

/// The configuration surface of the lowering pass.
///
/// Everything here is a compile-time switch provided by the driver; there is
/// no runtime reconfiguration. The `hack_*` options exist to placate specific
/// Vulkan drivers and should be left off unless such a driver is targeted.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Emit module-scope `__constant` data as a descriptor-bound storage
    /// buffer instead of inlining it into the module. Enforces a 64 KiB cap.
    pub module_constants_in_storage_buffer: bool,

    /// Place plain-old-data kernel arguments in a Uniform-class buffer
    /// (descriptor map kind `pod_ubo`) instead of a storage buffer.
    pub pod_args_in_uniform_buffer: bool,

    /// Give every kernel its own descriptor set instead of sharing one.
    pub distinct_kernel_descriptor_sets: bool,

    /// Rewrite `undef` constants of numeric type as zero.
    pub hack_undef: bool,

    /// Store the workgroup-size constant into its Private variable at each
    /// kernel entry, for drivers that ignore variable initializers.
    pub hack_initializers: bool,

    /// Trace id assignment (via `log::debug!`).
    pub show_ids: bool,

    /// Output rendering mode.
    pub output: OutputFormat,

    /// The literal-sampler map: `(sampler mask literal, source expression)`
    /// pairs, in binding order. Required if the module initializes literal
    /// samplers.
    pub sampler_map: Vec<(u32, String)>,
}
