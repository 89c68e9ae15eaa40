//! SPIR-V instruction records and serializers.
//!
//! The lowering appends [`Inst`]s to one flat list; [`write`] streams that
//! list as binary words and [`asm`] as a textual listing. Word counts are
//! derived, never stored.

pub mod asm;
pub mod spec;
pub mod write;

pub use spec::Opcode;

use smallvec::SmallVec;

/// A SPIR-V result id. Id 0 is never a valid result.
pub type Id = u32;

/// One instruction operand. Word counts follow the binary form: an id is one
/// word, literals are one word each, strings are null-terminated and padded
/// to a word boundary.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Id(Id),
    /// One or more literal words holding an integer (e.g. both halves of a
    /// 64-bit constant, low word first).
    LiteralInt(SmallVec<[u32; 2]>),
    /// Literal words holding a float's bit pattern.
    LiteralFloat(SmallVec<[u32; 2]>),
    LiteralString(String),
}

impl Operand {
    pub fn id(id: Id) -> Self {
        Operand::Id(id)
    }

    /// A single literal integer word.
    pub fn num(v: u32) -> Self {
        Operand::LiteralInt([v].into_iter().collect())
    }

    pub fn ints(words: impl IntoIterator<Item = u32>) -> Self {
        Operand::LiteralInt(words.into_iter().collect())
    }

    pub fn floats(words: impl IntoIterator<Item = u32>) -> Self {
        Operand::LiteralFloat(words.into_iter().collect())
    }

    pub fn str(s: impl Into<String>) -> Self {
        Operand::LiteralString(s.into())
    }

    pub fn word_count(&self) -> u16 {
        match self {
            Operand::Id(_) => 1,
            Operand::LiteralInt(words) | Operand::LiteralFloat(words) => words.len() as u16,
            // Account for the terminating null character.
            Operand::LiteralString(s) => ((s.len() + 4) / 4) as u16,
        }
    }
}

/// An instruction record: opcode, optional result id, ordered operands.
///
/// Result *types* are not special-cased; where an opcode takes one it is
/// simply the first operand, exactly as it serializes.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Inst {
    pub opcode: Opcode,
    /// `None` for instructions that produce no result.
    pub result_id: Option<Id>,
    pub operands: SmallVec<[Operand; 4]>,
}

impl Inst {
    pub fn new(opcode: Opcode, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self { opcode, result_id: None, operands: operands.into_iter().collect() }
    }

    pub fn with_result(
        opcode: Opcode,
        result_id: Id,
        operands: impl IntoIterator<Item = Operand>,
    ) -> Self {
        assert_ne!(result_id, 0, "result id 0 was provided");
        Self { opcode, result_id: Some(result_id), operands: operands.into_iter().collect() }
    }

    /// Total word count, including the leading word-count/opcode word.
    pub fn word_count(&self) -> u16 {
        1 + u16::from(self.result_id.is_some())
            + self.operands.iter().map(Operand::word_count).sum::<u16>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_word_counts() {
        assert_eq!(Operand::id(5).word_count(), 1);
        assert_eq!(Operand::num(7).word_count(), 1);
        assert_eq!(Operand::ints([1, 2]).word_count(), 2);
        // "abc" + null terminator fits one word; "abcd" needs a second word
        // for its terminator.
        assert_eq!(Operand::str("abc").word_count(), 1);
        assert_eq!(Operand::str("abcd").word_count(), 2);
        assert_eq!(Operand::str("GLSL.std.450").word_count(), 4);
    }

    #[test]
    fn inst_word_counts() {
        let inst = Inst::new(Opcode::OpCapability, [Operand::num(1)]);
        assert_eq!(inst.word_count(), 2);
        let inst = Inst::with_result(
            Opcode::OpTypeInt,
            2,
            [Operand::num(32), Operand::num(0)],
        );
        assert_eq!(inst.word_count(), 4);
    }
}
