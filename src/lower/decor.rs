//! Late decorations: `ArrayStride` for every type the variable-pointer and
//! array paths marked, and `SpecId` for the array sizes of pointer-to-local
//! arguments. Inserted just past the last decoration already in the list.

use super::Producer;
use crate::ir::{self, layout, TypeKind};
use crate::spv::{self, spec, Opcode, Operand};
use crate::{Error, Result};

pub(crate) fn run(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    if p.types_needing_array_stride.is_empty() && p.local_args.is_empty() {
        return Ok(());
    }

    let mut ip = p.insts.len();
    let mut seen_decorations = false;
    for (i, inst) in p.insts.iter().enumerate() {
        if inst.opcode.is_decoration() {
            seen_decorations = true;
        } else if seen_decorations {
            ip = i;
            break;
        }
    }

    for ty in p.types_needing_array_stride.clone() {
        let elem = match *module.cx.type_kind(ty) {
            TypeKind::Pointer { pointee, .. } => pointee,
            TypeKind::Array { elem, .. } | TypeKind::Vector { elem, .. } => elem,
            _ => return Err(Error::UnknownType(module.cx.type_to_string(ty))),
        };
        let stride = layout::byte_size(&module.cx, elem);
        let target = p.lookup_type(&module.cx, ty)?;
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [
                    Operand::id(target),
                    Operand::num(spec::decoration::ArrayStride),
                    Operand::num(stride),
                ],
            ),
        );
        ip += 1;
    }

    // Tie each Workgroup array size to the spec id the runtime fills in.
    for (func, index) in p.local_args.clone() {
        let info = &p.local_arg_info[&(func, index)];
        let (size_id, spec_id) = (info.array_size_id, info.spec_id);
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [
                    Operand::id(size_id),
                    Operand::num(spec::decoration::SpecId),
                    Operand::num(spec_id as u32),
                ],
            ),
        );
        ip += 1;
    }
    Ok(())
}
