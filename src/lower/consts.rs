//! Constant emission, in discovery order. Scalars pack their literal words
//! directly; composites reference previously emitted element ids; `<4 x i8>`
//! values fold into one `i32` word (element 0 in the high byte).

use super::Producer;
use crate::ir::{self, ConstKind, TypeKind};
use crate::spv::{self, Opcode, Operand};
use crate::{Error, Result};
use arrayvec::ArrayVec;

pub(crate) fn generate(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    let ordered: Vec<ir::Const> = p.constants.iter().copied().collect();

    for ct in ordered {
        // Array-length constants were already emitted with the types.
        if p.allocated_consts.contains_key(&ct) {
            continue;
        }

        let def = module.cx.const_def(ct).clone();
        let result_ty = p.lookup_type(&module.cx, def.ty)?;

        p.const_map.insert(ct, p.next_id);

        match &def.kind {
            ConstKind::Undef => {
                let mut opcode = Opcode::OpUndef;
                if p.opts.hack_undef && is_numeric(&module.cx, def.ty) {
                    opcode = Opcode::OpConstantNull;
                }
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(opcode, id, [Operand::id(result_ty)]));
            }
            ConstKind::Bool(v) => {
                let opcode =
                    if *v { Opcode::OpConstantTrue } else { Opcode::OpConstantFalse };
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(opcode, id, [Operand::id(result_ty)]));
            }
            &ConstKind::Int(v) => {
                let width = match *module.cx.type_kind(def.ty) {
                    TypeKind::Int { width } => width,
                    _ => 32,
                };
                let mut words = ArrayVec::<u32, 2>::new();
                words.push((v & 0xFFFF_FFFF) as u32);
                if width > 32 {
                    words.push((v >> 32) as u32);
                }
                let id = p.reserve_id();
                if width == 32 && v == 0 {
                    p.constant_i32_zero_id = Some(id);
                }
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpConstant,
                    id,
                    [Operand::id(result_ty), Operand::ints(words)],
                ));
            }
            &ConstKind::Float(bits) => {
                if !matches!(*module.cx.type_kind(def.ty), TypeKind::Float { width: 32 }) {
                    return Err(Error::UnsupportedConstant(module.cx.const_to_string(ct)));
                }
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpConstant,
                    id,
                    [Operand::id(result_ty), Operand::floats([bits as u32])],
                ));
            }
            ConstKind::Composite(elems) => {
                if module.cx.is_4xi8(def.ty) {
                    // Fold the four bytes into one i32 word; undef lanes read
                    // as zero.
                    let mut folded: u32 = 0;
                    for &elem in elems {
                        let byte = match module.cx.const_def(elem).kind {
                            ConstKind::Int(v) => v,
                            _ => 0,
                        };
                        folded = (folded << 8) | ((byte & 0xFF) as u32);
                    }
                    let i32t = module.cx.t_i32();
                    let as_int = module.cx.c_int(i32t, u64::from(folded));
                    // An equal i32 constant may already carry this value.
                    if let Some(&existing) = p.const_map.get(&as_int) {
                        p.const_map.insert(ct, existing);
                        continue;
                    }
                    let id = p.reserve_id();
                    p.insts.push(spv::Inst::with_result(
                        Opcode::OpConstant,
                        id,
                        [Operand::id(result_ty), Operand::num(folded)],
                    ));
                    continue;
                }

                let mut ops = vec![Operand::id(result_ty)];
                for &elem in elems {
                    ops.push(Operand::id(p.const_id(&module.cx, elem)?));
                }
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(Opcode::OpConstantComposite, id, ops));
            }
            ConstKind::Null => {
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpConstantNull,
                    id,
                    [Operand::id(result_ty)],
                ));
            }
        }
    }
    Ok(())
}

fn is_numeric(cx: &ir::Context, ty: ir::Type) -> bool {
    match *cx.type_kind(ty) {
        TypeKind::Int { .. } | TypeKind::Float { .. } => true,
        TypeKind::Vector { elem, .. } => is_numeric(cx, elem),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;

    #[test]
    fn four_xi8_folds_big_endian_by_index() {
        let opts = Options::default();
        let mut module = ir::Module::new();
        let i8t = module.cx.t_i8();
        let v4 = module.cx.t_vec(i8t, 4);
        let b: Vec<ir::Const> = [1u8, 2, 3, 4]
            .iter()
            .map(|&x| module.cx.c_int(i8t, u64::from(x)))
            .collect();
        let v = module.cx.c_composite(v4, b.clone());
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, v4);
        p.find_constant(&mut module.cx, v);
        super::super::types::generate(&mut p, &mut module).unwrap();
        generate(&mut p, &mut module).unwrap();
        let folded = p
            .insts
            .iter()
            .find(|i| i.opcode == Opcode::OpConstant && i.operands[1] == Operand::num(0x01020304))
            .cloned();
        assert!(folded.is_some(), "expected the byte-folded i32 constant");
    }

    #[test]
    fn folded_value_reuses_existing_i32() {
        let opts = Options::default();
        let mut module = ir::Module::new();
        let i8t = module.cx.t_i8();
        let i32t = module.cx.t_i32();
        let v4 = module.cx.t_vec(i8t, 4);
        let existing = module.cx.c_int(i32t, 0x01020304);
        let b: Vec<ir::Const> = [1u8, 2, 3, 4]
            .iter()
            .map(|&x| module.cx.c_int(i8t, u64::from(x)))
            .collect();
        let v = module.cx.c_composite(v4, b);
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, i32t);
        p.find_type(&mut module.cx, v4);
        p.find_constant(&mut module.cx, existing);
        p.find_constant(&mut module.cx, v);
        super::super::types::generate(&mut p, &mut module).unwrap();
        generate(&mut p, &mut module).unwrap();
        assert_eq!(p.const_map[&existing], p.const_map[&v]);
    }

    #[test]
    fn hack_undef_rewrites_numeric_undef() {
        let mut opts = Options::default();
        opts.hack_undef = true;
        let mut module = ir::Module::new();
        let f32t = module.cx.t_f32();
        let u = module.cx.c_undef(f32t);
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, f32t);
        p.find_constant(&mut module.cx, u);
        super::super::types::generate(&mut p, &mut module).unwrap();
        generate(&mut p, &mut module).unwrap();
        assert!(p.insts.iter().any(|i| i.opcode == Opcode::OpConstantNull));
        assert!(!p.insts.iter().any(|i| i.opcode == Opcode::OpUndef));
    }

    #[test]
    fn i32_zero_id_is_remembered() {
        let opts = Options::default();
        let mut module = ir::Module::new();
        let zero = module.cx.c_i32(0);
        let i32t = module.cx.t_i32();
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, i32t);
        p.find_constant(&mut module.cx, zero);
        super::super::types::generate(&mut p, &mut module).unwrap();
        generate(&mut p, &mut module).unwrap();
        assert_eq!(p.constant_i32_zero_id, Some(p.const_map[&zero]));
    }
}
