//! Binary serialization of the instruction list.
//!
//! The five-word header goes out first with a placeholder bound; after the
//! instruction stream is written the bound is patched in place at its
//! recorded offset. An optional mode rewrites the binary as a C initializer
//! list of decimal words.

use super::{spec, Inst, Operand};

pub struct Writer {
    buf: Vec<u8>,
    bound_offset: usize,
}

impl Writer {
    /// Writes the module header, recording where the bound placeholder sits.
    pub fn new() -> Self {
        let mut w = Self { buf: Vec::new(), bound_offset: 0 };
        w.word(spec::MAGIC);
        w.word(spec::VERSION);
        w.word(spec::GENERATOR);
        // A bad bound for now; patched once the final id counter is known.
        w.bound_offset = w.buf.len();
        w.word(0);
        // Schema is reserved and must be 0.
        w.word(0);
        w
    }

    fn word(&mut self, word: u32) {
        self.buf.extend_from_slice(&word.to_le_bytes());
    }

    pub fn write_inst(&mut self, inst: &Inst) {
        // High 16 bits: word count. Low 16 bits: opcode.
        self.word(u32::from(inst.opcode.as_u16()) | (u32::from(inst.word_count()) << 16));
        let mut operands = inst.operands.iter();
        // A result type, when present, precedes the result id in the binary
        // form; the lowering stores it as the first operand.
        if inst.result_id.is_some() && takes_result_type(inst) {
            self.write_operand(operands.next().expect("missing result type operand"));
        }
        if let Some(id) = inst.result_id {
            self.word(id);
        }
        for op in operands {
            self.write_operand(op);
        }
    }

    fn write_operand(&mut self, op: &Operand) {
        match op {
            Operand::Id(id) => self.word(*id),
            Operand::LiteralInt(words) | Operand::LiteralFloat(words) => {
                for &w in words {
                    self.word(w);
                }
            }
            Operand::LiteralString(s) => {
                let bytes = s.as_bytes();
                let mut chunks = bytes.chunks_exact(4);
                for chunk in &mut chunks {
                    self.word(u32::from_le_bytes(chunk.try_into().unwrap()));
                }
                let mut last = 0u32;
                for (i, &b) in chunks.remainder().iter().enumerate() {
                    last |= u32::from(b) << (8 * i);
                }
                // Always one more word: it carries the terminating null (and
                // any remainder bytes).
                self.word(last);
            }
        }
    }

    /// Patches the recorded bound slot and returns the finished bytes.
    pub fn finish(mut self, bound: u32) -> Vec<u8> {
        self.buf[self.bound_offset..self.bound_offset + 4].copy_from_slice(&bound.to_le_bytes());
        self.buf
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes the whole module to binary words.
pub fn write_binary(insts: &[Inst], bound: u32) -> Vec<u8> {
    let mut w = Writer::new();
    for inst in insts {
        w.write_inst(inst);
    }
    w.finish(bound)
}

/// Rewrites a binary module as a C initializer list: `{119734787,\n65536,...}`.
pub fn c_initializer_list(binary: &[u8]) -> String {
    let mut out = String::from("{");
    let mut first = true;
    for chunk in binary.chunks_exact(4) {
        if !first {
            out.push_str(",\n");
        }
        first = false;
        out.push_str(&u32::from_le_bytes(chunk.try_into().unwrap()).to_string());
    }
    out.push_str("}\n");
    out
}

/// Which instructions carry a result *type* id before the result id. This is
/// exactly the set of result-producing opcodes the lowering emits that are
/// not type declarations or `OpLabel`-likes.
fn takes_result_type(inst: &Inst) -> bool {
    use super::Opcode as Op;
    !matches!(
        inst.opcode,
        Op::OpTypeVoid
            | Op::OpTypeBool
            | Op::OpTypeInt
            | Op::OpTypeFloat
            | Op::OpTypeVector
            | Op::OpTypeImage
            | Op::OpTypeSampler
            | Op::OpTypeSampledImage
            | Op::OpTypeArray
            | Op::OpTypeRuntimeArray
            | Op::OpTypeStruct
            | Op::OpTypePointer
            | Op::OpTypeFunction
            | Op::OpLabel
            | Op::OpExtInstImport
            | Op::OpString
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spv::{Opcode, Operand};

    fn words_of(bytes: &[u8]) -> Vec<u32> {
        bytes.chunks_exact(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect()
    }

    #[test]
    fn header_and_bound_patch() {
        let bytes = write_binary(&[], 42);
        let words = words_of(&bytes);
        assert_eq!(words, vec![spec::MAGIC, spec::VERSION, 3 << 16, 42, 0]);
    }

    #[test]
    fn word_count_and_opcode_packing() {
        let inst = Inst::new(Opcode::OpCapability, [Operand::num(spec::capability::Shader)]);
        let words = words_of(&write_binary(&[inst], 1));
        assert_eq!(words[5], (2 << 16) | 17);
        assert_eq!(words[6], 1);
    }

    #[test]
    fn result_type_precedes_result_id() {
        // %3 = OpIAdd %1 %2 %2  =>  [wc|op, type, result, x, y]
        let inst = Inst::with_result(
            Opcode::OpIAdd,
            3,
            [Operand::id(1), Operand::id(2), Operand::id(2)],
        );
        let words = words_of(&write_binary(&[inst], 4));
        assert_eq!(words[5..], [(5 << 16) | 128, 1, 3, 2, 2]);
    }

    #[test]
    fn type_insts_put_result_id_first() {
        let inst =
            Inst::with_result(Opcode::OpTypeInt, 7, [Operand::num(32), Operand::num(0)]);
        let words = words_of(&write_binary(&[inst], 8));
        assert_eq!(words[5..], [(4 << 16) | 21, 7, 32, 0]);
    }

    #[test]
    fn strings_are_null_terminated_and_padded() {
        let inst = Inst::with_result(
            Opcode::OpExtInstImport,
            1,
            [Operand::str("GLSL.std.450")],
        );
        let words = words_of(&write_binary(&[inst], 2));
        // 1 (wc/op) + 1 (result) + 4 (string words incl. terminator)
        assert_eq!(words[5], (6 << 16) | 11);
        assert_eq!(words[6], 1);
        assert_eq!(&words[7..], &[
            u32::from_le_bytes(*b"GLSL"),
            u32::from_le_bytes(*b".std"),
            u32::from_le_bytes(*b".450"),
            0,
        ]);
    }

    #[test]
    fn c_initializer_list_format() {
        let bytes = write_binary(&[], 1);
        let s = c_initializer_list(&bytes);
        assert_eq!(s, format!("{{{},\n{},\n{},\n1,\n0}}\n", spec::MAGIC, spec::VERSION, 3u32 << 16));
    }
}
