//! Module-scope variable emission: literal samplers from the sampler map,
//! ordinary globals (including builtin variables and the workgroup-size
//! constant synthesis), and the Workgroup arrays behind pointer-to-local
//! arguments.

use super::{builtins, Producer};
use crate::ir::{self, layout, AddrSpace, ConstKind, Func, GlobalVar, InstKind, TypeKind, Value};
use crate::spv::{self, spec, Opcode, Operand};
use crate::{Error, Result};

/// One UniformConstant sampler variable per sampler-map entry, in its own
/// descriptor set, plus the rerouting of sampler-initializer calls onto those
/// variables.
pub(crate) fn generate_samplers(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    if p.opts.sampler_map.is_empty() {
        return Ok(());
    }
    let sampler_ty = p.sampler_ty.expect("sampler type is discovered with the map");
    let sampler_ty_id = p.lookup_type(&module.cx, sampler_ty)?;

    let descriptor_set = p.next_descriptor_set;
    let sampler_map = p.opts.sampler_map.clone();
    let mut binding = 0u32;
    for (literal, expr) in &sampler_map {
        let id = p.reserve_id();
        p.insts.push(spv::Inst::with_result(
            Opcode::OpVariable,
            id,
            [
                Operand::id(sampler_ty_id),
                Operand::num(spec::storage_class::UniformConstant),
            ],
        ));
        p.sampler_ids.insert(*literal, id);

        let mut ip = p.deco_insert_point();
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [
                    Operand::id(id),
                    Operand::num(spec::decoration::DescriptorSet),
                    Operand::num(descriptor_set),
                ],
            ),
        );
        ip += 1;
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [
                    Operand::id(id),
                    Operand::num(spec::decoration::Binding),
                    Operand::num(binding),
                ],
            ),
        );

        p.dmap.sampler(*literal, expr, descriptor_set, binding);
        binding += 1;
    }
    if binding > 0 {
        // We generated something; take the set.
        p.next_descriptor_set += 1;
    }

    // Calls to the sampler initializer resolve to the matching variable; the
    // later body emission turns each into a load.
    for f in 0..module.funcs.len() {
        let func = Func(f as u32);
        for ii in 0..module.func(func).insts.len() {
            let inst = ir::Inst(ii as u32);
            let def = module.func(func).inst(inst).clone();
            let InstKind::Call { callee, args } = &def.kind else { continue };
            if callee != builtins::SAMPLER_INIT_FN {
                continue;
            }
            let literal = match args.first() {
                Some(&Value::Const(ct)) => match module.cx.const_def(ct).kind {
                    ConstKind::Int(v) => v as u32,
                    _ => return Err(Error::NonConstantSamplerLiteral),
                },
                _ => return Err(Error::NonConstantSamplerLiteral),
            };
            let &var_id = p
                .sampler_ids
                .get(&literal)
                .ok_or(Error::UnknownSamplerLiteral(literal))?;
            p.inst_map.insert((func, inst), var_id);
        }
    }
    Ok(())
}

pub(crate) fn generate_global_var(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    gv: GlobalVar,
) -> Result<()> {
    if p.dead_globals.contains(&gv) {
        return Ok(());
    }
    let def = module.global(gv).clone();
    let builtin = Producer::builtin_for_name(&def.name);

    let mut initializer_id = 0;

    // The workgroup size is special: its value lives in a (spec) constant
    // composite that the variable merely points at.
    if builtin == Some(spec::builtin::WorkgroupSize) {
        initializer_id = synthesize_workgroup_size(p, module, &def)?;
    }

    if let Some(init) = def.initializer {
        // Undef initializers were never registered and stay unemitted.
        initializer_id = p.const_map.get(&init).copied().unwrap_or(0);
    }

    let external_init = initializer_id != 0
        && def.addr_space == AddrSpace::Constant
        && p.opts.module_constants_in_storage_buffer;

    let ptr_ty = module.cx.t_ptr(def.addr_space, def.value_type);
    let ptr_ty_id = p.lookup_type(&module.cx, ptr_ty)?;
    let mut ops = vec![
        Operand::id(ptr_ty_id),
        Operand::num(Producer::storage_class(def.addr_space)),
    ];
    if initializer_id != 0 && !external_init {
        ops.push(Operand::id(initializer_id));
    }
    let var_id = p.reserve_id();
    p.global_map.insert(gv, var_id);
    p.insts.push(spv::Inst::with_result(Opcode::OpVariable, var_id, ops));

    if let Some(builtin) = builtin {
        // WorkgroupSize decorates the value composite, not the variable.
        let target = if builtin == spec::builtin::WorkgroupSize {
            p.workgroup_size_value_id = Some(initializer_id);
            p.workgroup_size_var_id = Some(var_id);
            initializer_id
        } else {
            var_id
        };
        let ip = p.deco_insert_point();
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [
                    Operand::id(target),
                    Operand::num(spec::decoration::BuiltIn),
                    Operand::num(builtin),
                ],
            ),
        );
    } else if external_init {
        // Constant data provided by the host: binding 0 of a fresh set, with
        // the bytes spelled out in the descriptor map.
        let descriptor_set = p.next_descriptor_set;
        p.next_descriptor_set += 1;

        let data = layout::const_bytes(&module.cx, def.initializer.unwrap());
        p.dmap.constant_buffer(descriptor_set, &data);

        let mut ip = p.deco_insert_point();
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [Operand::id(var_id), Operand::num(spec::decoration::Binding), Operand::num(0)],
            ),
        );
        ip += 1;
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [
                    Operand::id(var_id),
                    Operand::num(spec::decoration::DescriptorSet),
                    Operand::num(descriptor_set),
                ],
            ),
        );
    }
    Ok(())
}

/// Builds the workgroup-size composite: from `reqd_work_group_size` when the
/// kernels fix one (they must agree), otherwise three spec constants
/// defaulting to 1, composed and decorated with SpecIds 0-2 later.
fn synthesize_workgroup_size(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    def: &ir::GlobalVarDef,
) -> Result<u32> {
    let vec_ty = def.value_type;
    let elem_ty = match *module.cx.type_kind(vec_ty) {
        TypeKind::Vector { elem, .. } => elem,
        _ => vec_ty,
    };

    let mut initializer_id = 0;
    let mut prev: Option<[u32; 3]> = None;
    let mut has_md = Vec::new();
    for f in 0..module.funcs.len() {
        let func = Func(f as u32);
        if module.func(func).blocks.is_empty() || !module.func(func).is_kernel {
            continue;
        }
        match module.func(func).reqd_work_group_size {
            Some(dims) => {
                has_md.push(true);
                match prev {
                    None => prev = Some(dims),
                    Some(p_dims) if p_dims != dims => {
                        return Err(Error::MismatchedWorkgroupSize);
                    }
                    Some(_) => continue,
                }
                let vec_ty_id = p.lookup_type(&module.cx, vec_ty)?;
                let mut ops = vec![Operand::id(vec_ty_id)];
                for d in dims {
                    let i32t = module.cx.t_i32();
                    ops.push(Operand::id(p.known_const_id(
                        &module.cx,
                        &ir::ConstDef { ty: i32t, kind: ConstKind::Int(u64::from(d)) },
                    )?));
                }
                initializer_id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpConstantComposite,
                    initializer_id,
                    ops,
                ));
            }
            None => has_md.push(false),
        }
    }

    // All kernels must agree on whether a size is fixed at all.
    if let Some(&first) = has_md.first() {
        if has_md.iter().any(|&h| h != first) {
            return Err(Error::MismatchedWorkgroupSize);
        }
    }

    if !has_md.first().copied().unwrap_or(false) {
        // No fixed size anywhere: specialize each dimension, default 1.
        let elem_ty_id = p.lookup_type(&module.cx, elem_ty)?;
        let mut dim_ids = Vec::with_capacity(3);
        for _ in 0..3 {
            let id = p.reserve_id();
            p.insts.push(spv::Inst::with_result(
                Opcode::OpSpecConstant,
                id,
                [Operand::id(elem_ty_id), Operand::num(1)],
            ));
            dim_ids.push(id);
        }
        p.builtin_dim_ids = dim_ids.clone();

        let vec_ty_id = p.lookup_type(&module.cx, vec_ty)?;
        initializer_id = p.reserve_id();
        let mut ops = vec![Operand::id(vec_ty_id)];
        ops.extend(dim_ids.into_iter().map(Operand::id));
        p.insts.push(spv::Inst::with_result(
            Opcode::OpSpecConstantComposite,
            initializer_id,
            ops,
        ));
    }
    Ok(initializer_id)
}

/// The Workgroup array variables behind pointer-to-local arguments, on their
/// pre-reserved ids.
pub(crate) fn generate_workgroup_vars(p: &mut Producer<'_>) {
    for (func, index) in p.local_args.clone() {
        let info = &p.local_arg_info[&(func, index)];
        let (var_id, ptr_ty_id) = (info.variable_id, info.ptr_array_type_id);
        p.insts.push(spv::Inst::with_result(
            Opcode::OpVariable,
            var_id,
            [Operand::id(ptr_ty_id), Operand::num(spec::storage_class::Workgroup)],
        ));
    }
}
