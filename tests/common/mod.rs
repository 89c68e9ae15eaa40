//! Shared helpers for the end-to-end tests: run the producer over a built-up
//! module and hand back the assembly listing (or binary words) plus the
//! descriptor map.

use spvgen::ir::Module;
use spvgen::{produce, Options, OutputFormat};

pub fn produce_asm(module: &mut Module, mut opts: Options) -> (String, String) {
    opts.output = OutputFormat::Assembly;
    let out = produce(module, &opts).expect("lowering should succeed");
    (String::from_utf8(out.shader).expect("assembly is text"), out.descriptor_map)
}

pub fn produce_words(module: &mut Module, mut opts: Options) -> Vec<u32> {
    opts.output = OutputFormat::Binary;
    let out = produce(module, &opts).expect("lowering should succeed");
    out.shader
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// Counts occurrences of an opcode's printed name at instruction position.
pub fn count_ops(asm: &str, opname: &str) -> usize {
    asm.lines().filter(|l| l.contains(&format!("\t{opname} ")) || l.ends_with(&format!("\t{opname}"))).count()
}
