//! Per-instruction lowering. Each IR instruction becomes one or more SPIR-V
//! instructions appended to the list; anything that references a label,
//! function id, or phi operand is recorded on the deferred list instead and
//! materialized by the fixup phase.

use super::discover::{widening_int_const, SelectArm};
use super::{args, builtins, DeferredInst, Producer};
use crate::ir::{
    self, AddrSpace, AtomicOp, BinOp, Block, CastOp, CmpPred, ConstKind, Func, InstKind, TypeKind,
    Value,
};
use crate::spv::{self, spec, Opcode, Operand};
use crate::{Error, Result};

pub(crate) fn func_body(p: &mut Producer<'_>, module: &mut ir::Module, func: Func) -> Result<()> {
    let is_kernel = module.func(func).is_kernel;
    let nblocks = module.func(func).blocks.len() as u32;

    for b in 0..nblocks {
        let block = Block(b);
        let label_id = p.reserve_id();
        p.block_map.insert((func, block), label_id);
        p.insts.push(spv::Inst::with_result(Opcode::OpLabel, label_id, []));

        // Stack allocations must precede everything else in the body.
        let insts = module.func(func).block(block).insts.clone();
        for &inst in &insts {
            if matches!(module.func(func).inst(inst).kind, InstKind::Alloca { .. }) {
                generate_inst(p, module, func, block, inst)?;
            }
        }

        if block == module.func(func).entry() && is_kernel {
            if p.opts.hack_initializers {
                entry_point_initial_stores(p);
            }
            args::insts_for_args(p, module, func)?;
        }

        for &inst in &insts {
            if !matches!(module.func(func).inst(inst).kind, InstKind::Alloca { .. }) {
                generate_inst(p, module, func, block, inst)?;
            }
        }
    }
    Ok(())
}

/// Drivers that ignore Private-variable initializers get an explicit store
/// of the workgroup-size value at every kernel entry.
fn entry_point_initial_stores(p: &mut Producer<'_>) {
    if let (Some(var), Some(value)) = (p.workgroup_size_var_id, p.workgroup_size_value_id) {
        p.insts
            .push(spv::Inst::new(Opcode::OpStore, [Operand::id(var), Operand::id(value)]));
    }
}

fn cast_opcode(op: CastOp) -> Opcode {
    match op {
        CastOp::Trunc | CastOp::ZExt => Opcode::OpUConvert,
        CastOp::SExt => Opcode::OpSConvert,
        CastOp::FpToUi => Opcode::OpConvertFToU,
        CastOp::FpToSi => Opcode::OpConvertFToS,
        CastOp::UiToFp => Opcode::OpConvertUToF,
        CastOp::SiToFp => Opcode::OpConvertSToF,
        CastOp::FpTrunc | CastOp::FpExt => Opcode::OpFConvert,
        CastOp::Bitcast => Opcode::OpBitcast,
    }
}

fn binary_opcode(op: BinOp, bool_result: bool) -> Opcode {
    if bool_result {
        // Bit operations on i1 are logical operations.
        match op {
            BinOp::Or => return Opcode::OpLogicalOr,
            BinOp::And => return Opcode::OpLogicalAnd,
            BinOp::Xor => return Opcode::OpLogicalNotEqual,
            _ => {}
        }
    }
    match op {
        BinOp::Add => Opcode::OpIAdd,
        BinOp::FAdd => Opcode::OpFAdd,
        BinOp::Sub => Opcode::OpISub,
        BinOp::FSub => Opcode::OpFSub,
        BinOp::Mul => Opcode::OpIMul,
        BinOp::FMul => Opcode::OpFMul,
        BinOp::UDiv => Opcode::OpUDiv,
        BinOp::SDiv => Opcode::OpSDiv,
        BinOp::FDiv => Opcode::OpFDiv,
        BinOp::URem => Opcode::OpUMod,
        BinOp::SRem => Opcode::OpSRem,
        BinOp::FRem => Opcode::OpFRem,
        BinOp::Shl => Opcode::OpShiftLeftLogical,
        BinOp::LShr => Opcode::OpShiftRightLogical,
        BinOp::AShr => Opcode::OpShiftRightArithmetic,
        BinOp::And => Opcode::OpBitwiseAnd,
        BinOp::Or => Opcode::OpBitwiseOr,
        BinOp::Xor => Opcode::OpBitwiseXor,
    }
}

fn cmp_opcode(pred: CmpPred) -> Opcode {
    match pred {
        CmpPred::IEq => Opcode::OpIEqual,
        CmpPred::INe => Opcode::OpINotEqual,
        CmpPred::IUgt => Opcode::OpUGreaterThan,
        CmpPred::IUge => Opcode::OpUGreaterThanEqual,
        CmpPred::IUlt => Opcode::OpULessThan,
        CmpPred::IUle => Opcode::OpULessThanEqual,
        CmpPred::ISgt => Opcode::OpSGreaterThan,
        CmpPred::ISge => Opcode::OpSGreaterThanEqual,
        CmpPred::ISlt => Opcode::OpSLessThan,
        CmpPred::ISle => Opcode::OpSLessThanEqual,
        CmpPred::FOeq => Opcode::OpFOrdEqual,
        CmpPred::FOgt => Opcode::OpFOrdGreaterThan,
        CmpPred::FOge => Opcode::OpFOrdGreaterThanEqual,
        CmpPred::FOlt => Opcode::OpFOrdLessThan,
        CmpPred::FOle => Opcode::OpFOrdLessThanEqual,
        CmpPred::FOne => Opcode::OpFOrdNotEqual,
        CmpPred::FUeq => Opcode::OpFUnordEqual,
        CmpPred::FUgt => Opcode::OpFUnordGreaterThan,
        CmpPred::FUge => Opcode::OpFUnordGreaterThanEqual,
        CmpPred::FUlt => Opcode::OpFUnordLessThan,
        CmpPred::FUle => Opcode::OpFUnordLessThanEqual,
        CmpPred::FUne => Opcode::OpFUnordNotEqual,
    }
}

fn atomic_opcode(op: AtomicOp) -> Opcode {
    match op {
        AtomicOp::Add => Opcode::OpAtomicIAdd,
        AtomicOp::Sub => Opcode::OpAtomicISub,
        AtomicOp::Xchg => Opcode::OpAtomicExchange,
        AtomicOp::SMin => Opcode::OpAtomicSMin,
        AtomicOp::SMax => Opcode::OpAtomicSMax,
        AtomicOp::UMin => Opcode::OpAtomicUMin,
        AtomicOp::UMax => Opcode::OpAtomicUMax,
        AtomicOp::And => Opcode::OpAtomicAnd,
        AtomicOp::Or => Opcode::OpAtomicOr,
        AtomicOp::Xor => Opcode::OpAtomicXor,
    }
}

/// The index-times-8 shift amount for a `<4 x i8>` element access: a known
/// constant for literal indices, an `OpIMul` otherwise.
fn byte_shift_amount(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
    index: Value,
) -> Result<spv::Id> {
    if let Value::Const(ct) = index {
        if let ConstKind::Int(i) = module.cx.const_def(ct).kind {
            let shift = module.cx.c_i32((i as u32) * 8);
            return p.const_id(&module.cx, shift);
        }
    }
    let i32t = module.cx.t_i32();
    let i32_id = p.lookup_type(&module.cx, i32t)?;
    let index_id = p.value_id(module, func, index)?;
    let eight = module.cx.c_i32(8);
    let eight_id = p.const_id(&module.cx, eight)?;
    let id = p.reserve_id();
    p.insts.push(spv::Inst::with_result(
        Opcode::OpIMul,
        id,
        [Operand::id(i32_id), Operand::id(index_id), Operand::id(eight_id)],
    ));
    Ok(id)
}

pub(crate) fn generate_inst(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
    block: Block,
    inst: ir::Inst,
) -> Result<()> {
    let def = module.func(func).inst(inst).clone();

    match &def.kind {
        InstKind::Cast { op, value } => {
            let src_ty = module.value_type(func, *value);
            if matches!(op, CastOp::ZExt | CastOp::SExt | CastOp::UiToFp)
                && module.cx.is_bool_or_bool_vector(src_ty)
            {
                // Widen the predicate by selecting between the two arms
                // registered during discovery.
                let res_ty = p.lookup_type(&module.cx, def.ty)?;
                let cond = p.value_id(module, func, *value)?;
                let (true_ct, false_ct) = match op {
                    CastOp::ZExt => {
                        let t = widening_int_const(&mut module.cx, def.ty, SelectArm::One);
                        (t, widening_int_const(&mut module.cx, def.ty, SelectArm::Zero))
                    }
                    CastOp::SExt => {
                        let t = widening_int_const(&mut module.cx, def.ty, SelectArm::AllOnes);
                        (t, widening_int_const(&mut module.cx, def.ty, SelectArm::Zero))
                    }
                    _ => (module.cx.c_f32(1.0), module.cx.c_f32(0.0)),
                };
                let true_id = p.const_id(&module.cx, true_ct)?;
                let false_id = p.const_id(&module.cx, false_ct)?;
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpSelect,
                    id,
                    [
                        Operand::id(res_ty),
                        Operand::id(cond),
                        Operand::id(true_id),
                        Operand::id(false_id),
                    ],
                ));
            } else if *op == CastOp::Trunc
                && matches!(*module.cx.type_kind(src_ty), TypeKind::Int { width: 32 })
                && matches!(*module.cx.type_kind(def.ty), TypeKind::Int { width: 8 })
            {
                // The target i8 is a 32-bit int; keep only the bottom byte.
                let src_ty_id = p.lookup_type(&module.cx, src_ty)?;
                let value_id = p.value_id(module, func, *value)?;
                let mask = module.cx.c_i32(0xFF);
                let mask_id = p.const_id(&module.cx, mask)?;
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpBitwiseAnd,
                    id,
                    [Operand::id(src_ty_id), Operand::id(value_id), Operand::id(mask_id)],
                ));
            } else {
                let res_ty = p.lookup_type(&module.cx, def.ty)?;
                let value_id = p.value_id(module, func, *value)?;
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    cast_opcode(*op),
                    id,
                    [Operand::id(res_ty), Operand::id(value_id)],
                ));
            }
        }

        InstKind::Binary { op, lhs, rhs } => {
            let bool_result = matches!(module.cx.type_kind(def.ty), TypeKind::Bool);
            let lhs_const = matches!(lhs, Value::Const(_));
            let rhs_const = matches!(rhs, Value::Const(_));
            if *op == BinOp::Xor && bool_result && (lhs_const || rhs_const) {
                // `xor i1 %x, true` is a logical not.
                let operand = if lhs_const { *rhs } else { *lhs };
                let res_ty = p.lookup_type(&module.cx, def.ty)?;
                let operand_id = p.value_id(module, func, operand)?;
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpLogicalNot,
                    id,
                    [Operand::id(res_ty), Operand::id(operand_id)],
                ));
            } else {
                let res_ty = p.lookup_type(&module.cx, def.ty)?;
                let lhs_id = p.value_id(module, func, *lhs)?;
                let rhs_id = p.value_id(module, func, *rhs)?;
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    binary_opcode(*op, bool_result),
                    id,
                    [Operand::id(res_ty), Operand::id(lhs_id), Operand::id(rhs_id)],
                ));
            }
        }

        InstKind::Cmp { pred, lhs, rhs } => {
            let lhs_ty = module.value_type(func, *lhs);
            if module.cx.as_pointer(lhs_ty).is_some() {
                return Err(Error::PointerEquality {
                    function: module.func(func).name.clone(),
                });
            }
            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let lhs_id = p.value_id(module, func, *lhs)?;
            let rhs_id = p.value_id(module, func, *rhs)?;
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(
                cmp_opcode(*pred),
                id,
                [Operand::id(res_ty), Operand::id(lhs_id), Operand::id(rhs_id)],
            ));
        }

        InstKind::Gep { base, indices } => generate_gep(p, module, func, inst, *base, indices)?,

        InstKind::ExtractValue { agg, indices } => {
            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let agg_id = p.value_id(module, func, *agg)?;
            let mut ops = vec![Operand::id(res_ty), Operand::id(agg_id)];
            ops.extend(indices.iter().map(|&i| Operand::num(i)));
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(Opcode::OpCompositeExtract, id, ops));
        }

        InstKind::InsertValue { agg, value, indices } => {
            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let value_id = p.value_id(module, func, *value)?;
            let agg_id = p.value_id(module, func, *agg)?;
            let mut ops =
                vec![Operand::id(res_ty), Operand::id(value_id), Operand::id(agg_id)];
            ops.extend(indices.iter().map(|&i| Operand::num(i)));
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(Opcode::OpCompositeInsert, id, ops));
        }

        InstKind::ExtractElement { vector, index } => {
            let comp_ty = module.value_type(func, *vector);
            if module.cx.is_4xi8(comp_ty) {
                // Element read on the folded i32: shift down, mask the byte.
                let comp_ty_id = p.lookup_type(&module.cx, comp_ty)?;
                let vector_id = p.value_id(module, func, *vector)?;
                let shift_id = byte_shift_amount(p, module, func, *index)?;
                let shifted = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpShiftRightLogical,
                    shifted,
                    [Operand::id(comp_ty_id), Operand::id(vector_id), Operand::id(shift_id)],
                ));
                let mask = module.cx.c_i32(0xFF);
                let mask_id = p.const_id(&module.cx, mask)?;
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpBitwiseAnd,
                    id,
                    [Operand::id(comp_ty_id), Operand::id(shifted), Operand::id(mask_id)],
                ));
                return Ok(());
            }

            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let vector_id = p.value_id(module, func, *vector)?;
            let (opcode, index_op) = match index {
                Value::Const(ct)
                    if matches!(module.cx.const_def(*ct).kind, ConstKind::Int(_)) =>
                {
                    let ConstKind::Int(i) = module.cx.const_def(*ct).kind else {
                        unreachable!()
                    };
                    (Opcode::OpCompositeExtract, Operand::num(i as u32))
                }
                _ => (
                    Opcode::OpVectorExtractDynamic,
                    Operand::id(p.value_id(module, func, *index)?),
                ),
            };
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(
                opcode,
                id,
                [Operand::id(res_ty), Operand::id(vector_id), index_op],
            ));
        }

        InstKind::InsertElement { vector, value, index } => {
            let comp_ty = module.value_type(func, *vector);
            if module.cx.is_4xi8(comp_ty) {
                // Clear the target byte, then OR in the shifted value.
                let res_ty = p.lookup_type(&module.cx, comp_ty)?;
                let shift_id = byte_shift_amount(p, module, func, *index)?;
                let mask = module.cx.c_i32(0xFF);
                let mask_const_id = p.const_id(&module.cx, mask)?;

                let mask_id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpShiftLeftLogical,
                    mask_id,
                    [Operand::id(res_ty), Operand::id(mask_const_id), Operand::id(shift_id)],
                ));
                let inv_mask_id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpNot,
                    inv_mask_id,
                    [Operand::id(res_ty), Operand::id(mask_id)],
                ));
                let vector_id = p.value_id(module, func, *vector)?;
                let cleared = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpBitwiseAnd,
                    cleared,
                    [Operand::id(res_ty), Operand::id(vector_id), Operand::id(inv_mask_id)],
                ));
                let value_id = p.value_id(module, func, *value)?;
                let shifted_value = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpShiftLeftLogical,
                    shifted_value,
                    [Operand::id(res_ty), Operand::id(value_id), Operand::id(shift_id)],
                ));
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpBitwiseOr,
                    id,
                    [Operand::id(res_ty), Operand::id(cleared), Operand::id(shifted_value)],
                ));
                return Ok(());
            }

            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let value_id = p.value_id(module, func, *value)?;
            let vector_id = p.value_id(module, func, *vector)?;
            let (opcode, ops) = match index {
                Value::Const(ct)
                    if matches!(module.cx.const_def(*ct).kind, ConstKind::Int(_)) =>
                {
                    let ConstKind::Int(i) = module.cx.const_def(*ct).kind else {
                        unreachable!()
                    };
                    (
                        Opcode::OpCompositeInsert,
                        vec![
                            Operand::id(res_ty),
                            Operand::id(value_id),
                            Operand::id(vector_id),
                            Operand::num(i as u32),
                        ],
                    )
                }
                _ => (
                    Opcode::OpVectorInsertDynamic,
                    vec![
                        Operand::id(res_ty),
                        Operand::id(vector_id),
                        Operand::id(value_id),
                        Operand::id(p.value_id(module, func, *index)?),
                    ],
                ),
            };
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(opcode, id, ops));
        }

        InstKind::ShuffleVector { a, b, mask } => {
            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let a_id = p.value_id(module, func, *a)?;
            let b_id = p.value_id(module, func, *b)?;
            let mut ops = vec![Operand::id(res_ty), Operand::id(a_id), Operand::id(b_id)];
            // An undefined lane is the 0xFFFFFFFF sentinel.
            ops.extend(mask.iter().map(|lane| Operand::num(lane.unwrap_or(0xFFFF_FFFF))));
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(Opcode::OpVectorShuffle, id, ops));
        }

        InstKind::Select { cond, if_true, if_false } => {
            // Selects over opaque handle pointers produce the handle type.
            let mut ty = def.ty;
            if let Some((_, pointee)) = module.cx.as_pointer(ty) {
                if module.cx.opaque_name(pointee).is_some() {
                    ty = pointee;
                }
            }
            let res_ty = p.lookup_type(&module.cx, ty)?;
            let cond_id = p.value_id(module, func, *cond)?;
            let t_id = p.value_id(module, func, *if_true)?;
            let f_id = p.value_id(module, func, *if_false)?;
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(
                Opcode::OpSelect,
                id,
                [
                    Operand::id(res_ty),
                    Operand::id(cond_id),
                    Operand::id(t_id),
                    Operand::id(f_id),
                ],
            ));
        }

        InstKind::Phi { .. } => {
            // Incoming blocks may not have ids yet.
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.deferred.push(DeferredInst {
                func,
                block,
                inst,
                insert_after: p.insts.len() - 1,
                reserved: Some(id),
                indirect: None,
            });
        }

        InstKind::Branch { .. } | InstKind::CondBranch { .. } => {
            // Labels may not have ids yet; merges need loop info.
            p.deferred.push(DeferredInst {
                func,
                block,
                inst,
                insert_after: p.insts.len() - 1,
                reserved: None,
                indirect: None,
            });
        }

        InstKind::Return { value } => match value {
            None => p.insts.push(spv::Inst::new(Opcode::OpReturn, [])),
            Some(v) => {
                let id = p.value_id(module, func, *v)?;
                p.insts.push(spv::Inst::new(Opcode::OpReturnValue, [Operand::id(id)]));
            }
        },

        InstKind::Alloca { .. } => {
            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(
                Opcode::OpVariable,
                id,
                [Operand::id(res_ty), Operand::num(spec::storage_class::Function)],
            ));
        }

        InstKind::Load { ptr } => {
            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let ptr_id = p.value_id(module, func, *ptr)?;
            // Driver workaround: loads of the workgroup-size variable become
            // a bitwise-and of the value with itself.
            if Some(ptr_id) == p.workgroup_size_var_id {
                let value = p.workgroup_size_value_id.expect("value id saved with var id");
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpBitwiseAnd,
                    id,
                    [Operand::id(res_ty), Operand::id(value), Operand::id(value)],
                ));
            } else {
                let id = p.reserve_id();
                p.inst_map.insert((func, inst), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpLoad,
                    id,
                    [Operand::id(res_ty), Operand::id(ptr_id)],
                ));
            }
        }

        InstKind::Store { ptr, value } => {
            let ptr_id = p.value_id(module, func, *ptr)?;
            let value_id = p.value_id(module, func, *value)?;
            p.insts.push(spv::Inst::new(
                Opcode::OpStore,
                [Operand::id(ptr_id), Operand::id(value_id)],
            ));
        }

        InstKind::AtomicRmw { op, ptr, value } => {
            let res_ty = p.lookup_type(&module.cx, def.ty)?;
            let ptr_id = p.value_id(module, func, *ptr)?;
            let i32t = module.cx.t_i32();
            let scope = p.known_const_id(
                &module.cx,
                &ir::ConstDef { ty: i32t, kind: ConstKind::Int(u64::from(spec::scope::Device)) },
            )?;
            let semantics_value = spec::memory_semantics::UniformMemory
                | spec::memory_semantics::SequentiallyConsistent;
            let semantics = p.known_const_id(
                &module.cx,
                &ir::ConstDef { ty: i32t, kind: ConstKind::Int(u64::from(semantics_value)) },
            )?;
            let value_id = p.value_id(module, func, *value)?;
            let id = p.reserve_id();
            p.inst_map.insert((func, inst), id);
            p.insts.push(spv::Inst::with_result(
                atomic_opcode(*op),
                id,
                [
                    Operand::id(res_ty),
                    Operand::id(ptr_id),
                    Operand::id(scope),
                    Operand::id(semantics),
                    Operand::id(value_id),
                ],
            ));
        }

        InstKind::Call { callee, args } => {
            let callee = callee.clone();
            let args = args.clone();
            generate_call(p, module, func, block, inst, &callee, &args)?;
        }

        InstKind::Switch => return Err(Error::UnsupportedInst("switch")),
        InstKind::IndirectBranch => return Err(Error::UnsupportedInst("indirect branch")),
        InstKind::AtomicCmpXchg => return Err(Error::UnsupportedInst("atomic cmpxchg")),
        InstKind::Fence => return Err(Error::UnsupportedInst("fence")),
    }
    Ok(())
}

fn generate_gep(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
    inst: ir::Inst,
    base: Value,
    indices: &[Value],
) -> Result<()> {
    let def_ty = module.func(func).inst(inst).ty;
    let base_ty = module.value_type(func, base);
    let base_space = module.cx.as_pointer(base_ty).map(|(s, _)| s);

    // Geps over rewritten `__constant` data produce private-space pointers.
    let base_is_const_arg = matches!(base, Value::Arg { func: f, index }
        if p.global_const_args.contains(&(f, index)));
    let result_ty = if base_space == Some(AddrSpace::ModuleScopePrivate) || base_is_const_arg {
        let (_, pointee) = module
            .cx
            .as_pointer(def_ty)
            .ok_or_else(|| Error::UnknownType(module.cx.type_to_string(def_ty)))?;
        module.cx.t_ptr(AddrSpace::ModuleScopePrivate, pointee)
    } else {
        def_ty
    };
    let res_ty_id = p.lookup_type(&module.cx, result_ty)?;

    // A gep whose base is a kernel argument addresses the resource variable
    // directly, stepping through the wrapper struct with an extra 0.
    let base_arg_key = match base {
        Value::Arg { func: f, index } if p.arg_gv.contains_key(&(f, index)) => Some((f, index)),
        _ => None,
    };
    let base_id = match base_arg_key {
        Some(key) => p.arg_gv_ids[&key],
        None => p.value_id(module, func, base)?,
    };

    let mut ops = vec![Operand::id(res_ty_id), Operand::id(base_id)];
    if base_arg_key.is_some() {
        let i32t = module.cx.t_i32();
        let zero = p.known_const_id(
            &module.cx,
            &ir::ConstDef { ty: i32t, kind: ConstKind::Int(0) },
        )?;
        ops.push(Operand::id(zero));
    }

    // A leading constant 0 folds away; any other leading index demands the
    // variable-pointers form.
    let mut opcode = Opcode::OpAccessChain;
    let mut skip = 0;
    let first_is_zero = matches!(indices.first(), Some(Value::Const(ct))
        if matches!(module.cx.const_def(*ct).kind, ConstKind::Int(0)));
    if base_arg_key.is_none() {
        if first_is_zero {
            skip = 1;
        } else {
            opcode = Opcode::OpPtrAccessChain;
        }
    }

    if opcode == Opcode::OpPtrAccessChain {
        p.uses_variable_pointers = true;
        // The result pointer will be indexed like an array; remember to give
        // it a stride.
        let space = module.cx.as_pointer(result_ty).map(|(s, _)| s);
        if space.map(Producer::storage_class) == Some(spec::storage_class::StorageBuffer) {
            p.types_needing_array_stride.insert(result_ty);
        }
    }

    for &index in &indices[skip..] {
        ops.push(Operand::id(p.value_id(module, func, index)?));
    }

    let id = p.reserve_id();
    p.inst_map.insert((func, inst), id);
    p.insts.push(spv::Inst::with_result(opcode, id, ops));
    Ok(())
}

fn generate_call(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
    block: Block,
    inst: ir::Inst,
    callee: &str,
    call_args: &[Value],
) -> Result<()> {
    let def_ty = module.func(func).inst(inst).ty;

    // Sampler initializers become a load of the corresponding sampler.
    if callee == builtins::SAMPLER_INIT_FN {
        if p.opts.sampler_map.is_empty() {
            return Err(Error::MissingSamplerMap);
        }
        let sampler_ty = p.sampler_ty.expect("sampler type exists with the map");
        let (_, sampler_struct) = module.cx.as_pointer(sampler_ty).unwrap();
        let res_ty = p.lookup_type(&module.cx, sampler_struct)?;
        let var_id = *p
            .inst_map
            .get(&(func, inst))
            .ok_or_else(|| Error::UnknownValue(callee.to_owned()))?;
        let id = p.reserve_id();
        p.inst_map.insert((func, inst), id);
        p.insts.push(spv::Inst::with_result(
            Opcode::OpLoad,
            id,
            [Operand::id(res_ty), Operand::id(var_id)],
        ));
        return Ok(());
    }

    if let Some(opcode) = builtins::atomic_intrinsic(callee) {
        let res_ty = p.lookup_type(&module.cx, def_ty)?;
        let mut ops = vec![Operand::id(res_ty)];
        for &a in call_args {
            ops.push(Operand::id(p.value_id(module, func, a)?));
        }
        let id = p.reserve_id();
        p.inst_map.insert((func, inst), id);
        p.insts.push(spv::Inst::with_result(opcode, id, ops));
        return Ok(());
    }

    if callee.starts_with("_Z3dot") {
        // Scalar "dot" is just a multiply.
        let arg_ty = module.value_type(func, call_args[0]);
        let opcode = if matches!(module.cx.type_kind(arg_ty), TypeKind::Vector { .. }) {
            Opcode::OpDot
        } else {
            Opcode::OpFMul
        };
        let res_ty = p.lookup_type(&module.cx, def_ty)?;
        let mut ops = vec![Operand::id(res_ty)];
        for &a in call_args {
            ops.push(Operand::id(p.value_id(module, func, a)?));
        }
        let id = p.reserve_id();
        p.inst_map.insert((func, inst), id);
        p.insts.push(spv::Inst::with_result(opcode, id, ops));
        return Ok(());
    }

    if callee.starts_with("_Z4fmod") {
        // OpenCL fmod takes the sign of the dividend, exactly OpFRem.
        let res_ty = p.lookup_type(&module.cx, def_ty)?;
        let mut ops = vec![Operand::id(res_ty)];
        for &a in call_args {
            ops.push(Operand::id(p.value_id(module, func, a)?));
        }
        let id = p.reserve_id();
        p.inst_map.insert((func, inst), id);
        p.insts.push(spv::Inst::with_result(Opcode::OpFRem, id, ops));
        return Ok(());
    }

    if callee.starts_with("spirv.store_null") {
        let ptr = p.value_id(module, func, call_args[0])?;
        let object = p.value_id(module, func, call_args[1])?;
        p.insts
            .push(spv::Inst::new(Opcode::OpStore, [Operand::id(ptr), Operand::id(object)]));
        return Ok(());
    }

    if callee.starts_with("spirv.copy_memory") {
        let const_int = |v: Value| match v {
            Value::Const(ct) => match module.cx.const_def(ct).kind {
                ConstKind::Int(i) => Some(i),
                _ => None,
            },
            _ => None,
        };
        let alignment = const_int(call_args[2]).unwrap_or(0) as u32;
        let volatile = const_int(call_args[3]).unwrap_or(0) != 0;
        let volatile_mask = if volatile { spec::memory_access::Volatile } else { 0 };
        let access = volatile_mask | spec::memory_access::Aligned;
        let dst = p.value_id(module, func, call_args[0])?;
        let src = p.value_id(module, func, call_args[1])?;
        p.insts.push(spv::Inst::new(
            Opcode::OpCopyMemory,
            [
                Operand::id(dst),
                Operand::id(src),
                Operand::num(access),
                Operand::num(alignment),
            ],
        ));
        return Ok(());
    }

    if builtins::is_unsigned_abs(callee) {
        // abs on unsigned data is the identity; alias the operand's id.
        let id = p.value_id(module, func, call_args[0])?;
        p.inst_map.insert((func, inst), id);
        return Ok(());
    }

    if callee == "__spirv_control_barrier" {
        let exec = p.value_id(module, func, call_args[0])?;
        let mem = p.value_id(module, func, call_args[1])?;
        let sem = p.value_id(module, func, call_args[2])?;
        p.insts.push(spv::Inst::new(
            Opcode::OpControlBarrier,
            [Operand::id(exec), Operand::id(mem), Operand::id(sem)],
        ));
        return Ok(());
    }

    if callee == "__spirv_memory_barrier" {
        let mem = p.value_id(module, func, call_args[0])?;
        let sem = p.value_id(module, func, call_args[1])?;
        p.insts.push(spv::Inst::new(
            Opcode::OpMemoryBarrier,
            [Operand::id(mem), Operand::id(sem)],
        ));
        return Ok(());
    }

    let classify_unary = if builtins::is_isinf(callee) {
        Some(Opcode::OpIsInf)
    } else if builtins::is_isnan(callee) {
        Some(Opcode::OpIsNan)
    } else if builtins::is_all(callee) {
        Some(Opcode::OpAll)
    } else if builtins::is_any(callee) {
        Some(Opcode::OpAny)
    } else {
        None
    };
    if let Some(opcode) = classify_unary {
        let res_ty = p.lookup_type(&module.cx, def_ty)?;
        let value = p.value_id(module, func, call_args[0])?;
        let id = p.reserve_id();
        p.inst_map.insert((func, inst), id);
        p.insts.push(spv::Inst::with_result(
            opcode,
            id,
            [Operand::id(res_ty), Operand::id(value)],
        ));
        return Ok(());
    }

    if callee == builtins::READ_IMAGE_2D || callee == builtins::READ_IMAGE_3D {
        let image = call_args[0];
        let sampler = call_args[1];
        let coordinate = call_args[2];

        let image_ptr_ty = module.value_type(func, image);
        let (_, image_ty) = module
            .cx
            .as_pointer(image_ptr_ty)
            .ok_or_else(|| Error::UnknownType(module.cx.type_to_string(image_ptr_ty)))?;
        let sampled_image_ty = *p
            .image_types
            .get(&image_ty)
            .ok_or_else(|| Error::UnknownType(module.cx.type_to_string(image_ty)))?;

        let image_id = p.value_id(module, func, image)?;
        let sampler_id = p.value_id(module, func, sampler)?;
        let sampled_image = p.reserve_id();
        p.insts.push(spv::Inst::with_result(
            Opcode::OpSampledImage,
            sampled_image,
            [Operand::id(sampled_image_ty), Operand::id(image_id), Operand::id(sampler_id)],
        ));

        let res_ty = p.lookup_type(&module.cx, def_ty)?;
        let coord_id = p.value_id(module, func, coordinate)?;
        let f32t = module.cx.t_f32();
        let lod = p.known_const_id(
            &module.cx,
            &ir::ConstDef { ty: f32t, kind: ConstKind::Float(u64::from(0.0f32.to_bits())) },
        )?;
        let id = p.reserve_id();
        p.inst_map.insert((func, inst), id);
        p.insts.push(spv::Inst::with_result(
            Opcode::OpImageSampleExplicitLod,
            id,
            [
                Operand::id(res_ty),
                Operand::id(sampled_image),
                Operand::id(coord_id),
                Operand::num(spec::image_operands::Lod),
                Operand::id(lod),
            ],
        ));
        return Ok(());
    }

    if callee == builtins::WRITE_IMAGE_2D || callee == builtins::WRITE_IMAGE_3D {
        let image = p.value_id(module, func, call_args[0])?;
        let coord = p.value_id(module, func, call_args[1])?;
        let texel = p.value_id(module, func, call_args[2])?;
        p.insts.push(spv::Inst::new(
            Opcode::OpImageWrite,
            [Operand::id(image), Operand::id(coord), Operand::id(texel)],
        ));
        return Ok(());
    }

    if builtins::IMAGE_QUERY_FNS.contains(&callee) {
        // %sizes = OpImageQuerySize %v2uint %image
        // %result = OpCompositeExtract %uint %sizes 0-or-1
        let i32t = module.cx.t_i32();
        let v2i32 = module.cx.t_vec(i32t, 2);
        let sizes_ty = p.lookup_type(&module.cx, v2i32)?;
        let image_id = p.value_id(module, func, call_args[0])?;
        let sizes = p.reserve_id();
        p.insts.push(spv::Inst::with_result(
            Opcode::OpImageQuerySize,
            sizes,
            [Operand::id(sizes_ty), Operand::id(image_id)],
        ));

        let res_ty = p.lookup_type(&module.cx, def_ty)?;
        let component = u32::from(callee.contains("height"));
        let id = p.reserve_id();
        p.inst_map.insert((func, inst), id);
        p.insts.push(spv::Inst::with_result(
            Opcode::OpCompositeExtract,
            id,
            [Operand::id(res_ty), Operand::id(sizes), Operand::num(component)],
        ));
        return Ok(());
    }

    // Everything else waits for function and label ids: extended
    // instructions, popcount, composite construction, plain calls.
    let reserved = p.reserve_id();
    p.inst_map.insert((func, inst), reserved);
    let indirect = if builtins::indirect_ext_inst(callee).is_some() {
        // The user-visible value is the follow-up instruction's.
        let follow_up = p.reserve_id();
        p.inst_map.insert((func, inst), follow_up);
        Some(follow_up)
    } else {
        None
    };
    p.deferred.push(DeferredInst {
        func,
        block,
        inst,
        insert_after: p.insts.len() - 1,
        reserved: Some(reserved),
        indirect,
    });
    Ok(())
}
