//! Deferred fixup: the second walk that runs once every label, function, and
//! phi operand has an id. Entries drain in reverse insertion order so that
//! earlier insertion points stay valid while later ones are spliced.
//!
//! This is also where structured control flow gets its merge instructions:
//! a branch out of a loop header gains an `OpLoopMerge` (merge = the loop's
//! unique exit, continue = the latch or the unique in-loop block dominating
//! it), and any other rejoining conditional branch gains an
//! `OpSelectionMerge` pointing at its false successor.

use super::{builtins, Producer};
use crate::ir::dom::{DomTree, LoopInfo};
use crate::ir::{self, Block, Func, InstKind, TypeKind};
use crate::spv::{self, spec, Opcode, Operand};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub(crate) fn run(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    let deferred = std::mem::take(&mut p.deferred);
    let mut analyses: FxHashMap<Func, (DomTree, LoopInfo)> = FxHashMap::default();

    for d in deferred.iter().rev() {
        let mut ip = d.insert_after + 1;
        // Phis sit first in their block; anything else inserts after them.
        while ip < p.insts.len() && p.insts[ip].opcode == Opcode::OpPhi {
            ip += 1;
        }

        let def = module.func(d.func).inst(d.inst).clone();
        let mut out: SmallVec<[spv::Inst; 2]> = SmallVec::new();

        match &def.kind {
            InstKind::Branch { target } => {
                emit_merge_if_needed(p, module, &mut analyses, d.func, d.block, None, &mut out)?;
                let target_id = block_id(p, d.func, *target)?;
                out.push(spv::Inst::new(Opcode::OpBranch, [Operand::id(target_id)]));
            }

            InstKind::CondBranch { cond, if_true, if_false } => {
                emit_merge_if_needed(
                    p,
                    module,
                    &mut analyses,
                    d.func,
                    d.block,
                    Some((*if_true, *if_false)),
                    &mut out,
                )?;
                let cond_id = p.value_id(module, d.func, *cond)?;
                let true_id = block_id(p, d.func, *if_true)?;
                let false_id = block_id(p, d.func, *if_false)?;
                out.push(spv::Inst::new(
                    Opcode::OpBranchConditional,
                    [Operand::id(cond_id), Operand::id(true_id), Operand::id(false_id)],
                ));
            }

            InstKind::Phi { incoming } => {
                let res_ty = p.lookup_type(&module.cx, def.ty)?;
                let mut ops = vec![Operand::id(res_ty)];
                for &(value, pred) in incoming {
                    ops.push(Operand::id(p.value_id(module, d.func, value)?));
                    ops.push(Operand::id(block_id(p, d.func, pred)?));
                }
                out.push(spv::Inst::with_result(
                    Opcode::OpPhi,
                    d.reserved.expect("phi reserves its id"),
                    ops,
                ));
            }

            InstKind::Call { callee, args } => {
                fixup_call(p, module, d.func, callee, args, def.ty, d, &mut out)?;
            }

            _ => unreachable!("only branches, phis and calls defer"),
        }

        p.insts.splice(ip..ip, out);
    }
    Ok(())
}

fn block_id(p: &Producer<'_>, func: Func, block: Block) -> Result<spv::Id> {
    p.block_map
        .get(&(func, block))
        .copied()
        .ok_or_else(|| Error::UnknownValue(format!("block #{}", block.0)))
}

/// Precedes a branch with its structured merge instruction, when one is due.
fn emit_merge_if_needed(
    p: &Producer<'_>,
    module: &ir::Module,
    analyses: &mut FxHashMap<Func, (DomTree, LoopInfo)>,
    func: Func,
    block: Block,
    cond_successors: Option<(Block, Block)>,
    out: &mut SmallVec<[spv::Inst; 2]>,
) -> Result<()> {
    let (dom, li) = analyses.entry(func).or_insert_with(|| {
        let fdef = module.func(func);
        let dom = DomTree::compute(fdef);
        let li = LoopInfo::compute(fdef, &dom);
        (dom, li)
    });

    if li.is_loop_header(block) {
        let lp = li.loop_with_header(block).expect("header has a loop");
        let header_name = || module.func(func).block(block).name.clone();

        // Structurization leaves every loop a single exit; that exit is the
        // merge block.
        let merge = lp
            .unique_exit()
            .ok_or_else(|| Error::MultiExitLoop { header: header_name() })?;

        // The continue target must dominate the back edge.
        let continue_block = if lp.is_latch(block) {
            block
        } else {
            let latch = lp
                .latch()
                .ok_or_else(|| Error::NoContinueTarget { header: header_name() })?;
            let mut candidate = None;
            for &b in &lp.blocks {
                if b == lp.header {
                    continue;
                }
                if dom.dominates(b, latch) {
                    candidate = Some(b);
                }
            }
            candidate.ok_or_else(|| Error::NoContinueTarget { header: header_name() })?
        };

        out.push(spv::Inst::new(
            Opcode::OpLoopMerge,
            [
                Operand::id(block_id(p, func, merge)?),
                Operand::id(block_id(p, func, continue_block)?),
                Operand::num(spec::loop_control::None),
            ],
        ));
    } else if let Some((if_true, if_false)) = cond_successors {
        // A conditional that can rejoin (no back edge among its successors)
        // merges at its false side.
        let has_back_edge =
            li.is_loop_header(if_true) || li.is_loop_header(if_false);
        if !has_back_edge {
            out.push(spv::Inst::new(
                Opcode::OpSelectionMerge,
                [
                    Operand::id(block_id(p, func, if_false)?),
                    Operand::num(spec::selection_control::None),
                ],
            ));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn fixup_call(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
    callee: &str,
    call_args: &[ir::Value],
    result_ty: ir::Type,
    d: &super::DeferredInst,
    out: &mut SmallVec<[spv::Inst; 2]>,
) -> Result<()> {
    let reserved = d.reserved.expect("deferred calls reserve their id");

    if let Some(ext) = builtins::direct_or_indirect_ext_inst(callee) {
        let import =
            p.ext_inst_import_id.ok_or_else(|| Error::UnknownValue("GLSL.std.450".into()))?;
        let res_ty_id = p.lookup_type(&module.cx, result_ty)?;
        let mut ops =
            vec![Operand::id(res_ty_id), Operand::id(import), Operand::num(ext)];
        for &a in call_args {
            ops.push(Operand::id(p.value_id(module, func, a)?));
        }
        out.push(spv::Inst::with_result(Opcode::OpExtInst, reserved, ops));

        if let Some(follow_up) = d.indirect {
            let indirect =
                builtins::indirect_ext_inst(callee).expect("indirect id implies a table hit");
            // One more instruction consumes the extended result:
            //   clz:  N - FindUMsb(x) with N = 31
            //   *pi:  result * (1/π)
            let (opcode, scalar) = if indirect == spec::glsl::FindUMsb {
                (Opcode::OpISub, module.cx.c_i32(31))
            } else {
                (Opcode::OpFMul, module.cx.c_f32(builtins::ONE_OVER_PI as f32))
            };
            let constant = if matches!(module.cx.type_kind(result_ty), TypeKind::Vector { .. }) {
                module.cx.c_splat(result_ty, scalar)
            } else {
                scalar
            };
            let const_id = p.const_id(&module.cx, constant)?;
            out.push(spv::Inst::with_result(
                opcode,
                follow_up,
                [Operand::id(res_ty_id), Operand::id(const_id), Operand::id(reserved)],
            ));
        }
        return Ok(());
    }

    if builtins::is_popcount(callee) {
        let res_ty_id = p.lookup_type(&module.cx, result_ty)?;
        let base = p.value_id(module, func, call_args[0])?;
        out.push(spv::Inst::with_result(
            Opcode::OpBitCount,
            reserved,
            [Operand::id(res_ty_id), Operand::id(base)],
        ));
        return Ok(());
    }

    if callee.starts_with(builtins::COMPOSITE_CONSTRUCT_PREFIX) {
        let res_ty_id = p.lookup_type(&module.cx, result_ty)?;
        let mut ops = vec![Operand::id(res_ty_id)];
        for &a in call_args {
            ops.push(Operand::id(p.value_id(module, func, a)?));
        }
        out.push(spv::Inst::with_result(Opcode::OpCompositeConstruct, reserved, ops));
        return Ok(());
    }

    // A plain function call.
    let res_ty_id = p.lookup_type(&module.cx, result_ty)?;
    let callee_id = module
        .func_by_name(callee)
        .and_then(|f| p.func_map.get(&f).copied())
        .unwrap_or_else(|| {
            // Emitting id 0 lets a validator point at the call; erroring out
            // here would hide the rest of the module.
            log::warn!("can't translate function call, missing builtin? {callee}");
            0
        });
    let mut ops = vec![Operand::id(res_ty_id), Operand::id(callee_id)];
    for &a in call_args {
        ops.push(Operand::id(p.value_id(module, func, a)?));
    }
    out.push(spv::Inst::with_result(Opcode::OpFunctionCall, reserved, ops));
    Ok(())
}
