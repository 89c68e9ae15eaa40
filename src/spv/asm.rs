//! Textual assembly rendering of the instruction list.
//!
//! The header is five `;` comment lines; the bound is patched into its line
//! once known, the same way the binary writer patches its header word.
//! Result ids print as `%<decimal>` and enum-valued literal operands print
//! symbolically where the value is known.

use super::{spec, Inst, Opcode, Operand};
use itertools::Itertools;
use std::fmt::Write as _;

pub fn write_assembly(insts: &[Inst], bound: u32) -> String {
    let mut out = String::new();
    out.push_str("; SPIR-V\n");
    // The major version number is in the 2nd highest byte, the minor in the
    // 2nd lowest.
    let major = (spec::VERSION >> 16) & 0xFF;
    let minor = (spec::VERSION >> 8) & 0xFF;
    let _ = writeln!(out, "; Version: {major}.{minor}");
    let _ = writeln!(out, "; Generator: Codeplay; 0");
    out.push_str("; Bound: ");
    let bound_offset = out.len();
    // One space per digit of the largest possible id, overwritten below.
    out.push_str(&" ".repeat(10));
    out.push_str("\n; Schema: 0\n");

    for inst in insts {
        write_inst(&mut out, inst);
    }

    let digits = bound.to_string();
    out.replace_range(bound_offset..bound_offset + digits.len(), &digits);
    out
}

fn write_inst(out: &mut String, inst: &Inst) {
    if let Some(id) = inst.result_id {
        let _ = write!(out, "%{id} = ");
    }
    let _ = write!(out, "\t{}", inst.opcode.name());
    for (i, op) in inst.operands.iter().enumerate() {
        out.push(' ');
        write_operand(out, inst, i, op);
    }
    out.push('\n');
}

fn write_operand(out: &mut String, inst: &Inst, index: usize, op: &Operand) {
    match op {
        Operand::Id(id) => {
            let _ = write!(out, "%{id}");
        }
        Operand::LiteralString(s) => {
            let _ = write!(out, "\"{s}\"");
        }
        Operand::LiteralInt(words) => {
            if let [word] = words.as_slice() {
                if let Some(name) = symbolic_namer(inst, index).and_then(|namer| namer(*word)) {
                    out.push_str(name);
                    return;
                }
            }
            let _ = write!(out, "{}", words.iter().format(""));
        }
        Operand::LiteralFloat(words) => {
            for &word in words {
                let _ = write!(out, "{}", f32::from_bits(word));
            }
        }
    }
}

/// The enum namer for a literal operand position, if that position is
/// enum-valued for this opcode. Operand indices count the result type, when
/// present, as operand 0 (matching the stored operand order).
fn symbolic_namer(inst: &Inst, index: usize) -> Option<fn(u32) -> Option<&'static str>> {
    use Opcode as Op;
    match (inst.opcode, index) {
        (Op::OpCapability, 0) => Some(spec::capability::name),
        (Op::OpMemoryModel, 0) => Some(spec::addressing_model::name),
        (Op::OpMemoryModel, 1) => Some(spec::memory_model::name),
        (Op::OpEntryPoint, 0) => Some(spec::execution_model::name),
        (Op::OpExecutionMode, 1) => Some(spec::execution_mode::name),
        (Op::OpSource, 0) => Some(spec::source_language::name),
        (Op::OpDecorate, 1) | (Op::OpMemberDecorate, 2) => Some(spec::decoration::name),
        // `OpDecorate %x BuiltIn <role>`: the role is itself enum-valued.
        (Op::OpDecorate, 2)
            if inst.operands.get(1)
                == Some(&Operand::num(spec::decoration::BuiltIn)) =>
        {
            Some(spec::builtin::name)
        }
        (Op::OpTypePointer, 0) | (Op::OpVariable, 1) => Some(spec::storage_class::name),
        (Op::OpTypeImage, 1) => Some(spec::dim::name),
        (Op::OpTypeImage, 6) => Some(spec::image_format::name),
        (Op::OpFunction, 1) => Some(spec::function_control::name),
        (Op::OpSelectionMerge, 1) => Some(spec::selection_control::name),
        (Op::OpLoopMerge, 2) => Some(spec::loop_control::name),
        (Op::OpImageSampleExplicitLod, 3) | (Op::OpImageWrite, 3) => {
            Some(spec::image_operands::name)
        }
        (Op::OpCopyMemory, 2) => Some(spec::memory_access::name),
        (Op::OpExtInst, 2) => Some(spec::glsl::name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn header_carries_patched_bound() {
        let text = write_assembly(&[], 37);
        assert!(text.starts_with("; SPIR-V\n; Version: 1.0\n"));
        assert!(text.contains("; Bound: 37"));
        assert!(text.contains("; Schema: 0"));
    }

    #[test]
    fn symbolic_enums_and_ids() {
        let insts = vec![
            Inst::new(Opcode::OpCapability, [Operand::num(spec::capability::Shader)]),
            Inst::new(
                Opcode::OpMemoryModel,
                [
                    Operand::num(spec::addressing_model::Logical),
                    Operand::num(spec::memory_model::GLSL450),
                ],
            ),
            Inst::with_result(
                Opcode::OpTypePointer,
                3,
                [Operand::num(spec::storage_class::StorageBuffer), Operand::id(2)],
            ),
        ];
        let text = write_assembly(&insts, 4);
        assert!(text.contains("OpCapability Shader"));
        assert!(text.contains("OpMemoryModel Logical GLSL450"));
        assert!(text.contains("%3 = \tOpTypePointer StorageBuffer %2"));
    }

    #[test]
    fn builtin_decorations_print_their_role() {
        let inst = Inst::new(
            Opcode::OpDecorate,
            [
                Operand::id(9),
                Operand::num(spec::decoration::BuiltIn),
                Operand::num(spec::builtin::WorkgroupSize),
            ],
        );
        let text = write_assembly(&[inst], 10);
        assert!(text.contains("OpDecorate %9 BuiltIn WorkgroupSize"));
    }

    #[test]
    fn float_literals_print_as_decimal() {
        let inst = Inst::new(
            Opcode::OpImageWrite,
            [Operand::id(1), Operand::id(2), Operand::floats(smallvec![0.5f32.to_bits()] as smallvec::SmallVec<[u32; 1]>)],
        );
        let text = write_assembly(&[inst], 3);
        assert!(text.contains("OpImageWrite %1 %2 0.5"));
    }
}
