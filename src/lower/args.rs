//! Kernel-argument lowering.
//!
//! OpenCL kernel arguments have no Vulkan-side counterpart, so each one is
//! mapped to a module-scope resource variable: samplers and images land in
//! UniformConstant space, buffer pointers become runtime-arrayed storage
//! buffers, POD values are wrapped in a single-field block struct, and
//! pointer-to-local arguments turn into Workgroup arrays sized by a
//! specialization constant. Descriptor sets and bindings are assigned here,
//! and every argument contributes one record to the descriptor map.

use super::{GvarsForType, LocalArgInfo, Producer};
use crate::ir::{self, AddrSpace, Func, GlobalVarDef, InstKind, Type, Value};
use crate::spv::{self, spec, Opcode, Operand};
use crate::{Error, Result};
use rustc_hash::FxHashMap;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum ArgClass {
    Sampler,
    RoImage,
    WoImage,
    LocalPtr,
    Buffer(AddrSpace),
    Pod,
}

pub(crate) fn classify(cx: &ir::Context, ty: Type) -> Result<ArgClass> {
    if let Some((space, pointee)) = cx.as_pointer(ty) {
        if let Some(name) = cx.opaque_name(pointee) {
            return match name {
                "opencl.sampler_t" => Ok(ArgClass::Sampler),
                "opencl.image2d_ro_t" | "opencl.image3d_ro_t" => Ok(ArgClass::RoImage),
                "opencl.image2d_wo_t" | "opencl.image3d_wo_t" => Ok(ArgClass::WoImage),
                _ => Err(Error::UnsupportedArgType(name.to_owned())),
            };
        }
        if space == AddrSpace::Local {
            return Ok(ArgClass::LocalPtr);
        }
        return Ok(ArgClass::Buffer(space));
    }
    Ok(ArgClass::Pod)
}

/// The argKind field of the descriptor map. `pod` is remapped when POD
/// arguments live in a uniform buffer.
pub(crate) fn arg_kind_str(class: ArgClass, pod_in_ubo: bool) -> &'static str {
    match class {
        ArgClass::Sampler => "sampler",
        ArgClass::RoImage => "ro_image",
        ArgClass::WoImage => "wo_image",
        ArgClass::LocalPtr => "local",
        ArgClass::Buffer(_) => "buffer",
        ArgClass::Pod => {
            if pod_in_ubo {
                "pod_ubo"
            } else {
                "pod"
            }
        }
    }
}

fn arg_users(
    module: &ir::Module,
    func: Func,
    index: u32,
) -> impl Iterator<Item = &ir::InstDef> + '_ {
    let target = Value::Arg { func, index };
    module.func(func).insts.iter().filter(move |def| {
        super::discover::operand_values(def).contains(&target)
    })
}

pub(crate) fn arg_has_use(module: &ir::Module, func: Func, index: u32) -> bool {
    arg_users(module, func, index).next().is_some()
}

pub(crate) fn arg_has_only_gep_use(module: &ir::Module, func: Func, index: u32) -> bool {
    arg_users(module, func, index).all(|def| matches!(def.kind, InstKind::Gep { .. }))
}

/// A use that forces the argument's pointer type to be materialized: any
/// non-gep user, or a gep producing the same pointer type.
pub(crate) fn arg_has_nongep_or_sameptr_use(
    module: &ir::Module,
    func: Func,
    index: u32,
    ptr_ty: Type,
) -> bool {
    arg_users(module, func, index)
        .any(|def| !matches!(def.kind, InstKind::Gep { .. }) || def.ty == ptr_ty)
}

/// Discovery-time argument processing: creates (or reuses) the module-scope
/// resource variable per argument, reserves the id block for pointer-to-local
/// arguments, and interns the types argument access will need.
pub(crate) fn synthesize_kernel_arg_resources(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
    gvars_for_type: &mut GvarsForType,
    arg_ty_map: &mut FxHashMap<Type, Type>,
) -> Result<()> {
    let kernel_ordinal = func.0;
    let nparams = module.func(func).params.len();
    let mut has_arg_user = false;
    // The binding index; pointer-to-local arguments consume none.
    let mut binding: u32 = 0;

    for i in 0..nparams as u32 {
        let arg_ty = module.func(func).params[i as usize].ty;
        let class = classify(&module.cx, arg_ty)?;

        let var_space = match class {
            ArgClass::Sampler | ArgClass::RoImage | ArgClass::WoImage => {
                AddrSpace::UniformConstant
            }
            ArgClass::LocalPtr => AddrSpace::Local,
            ArgClass::Buffer(space) => space,
            ArgClass::Pod => {
                if p.opts.pod_args_in_uniform_buffer {
                    AddrSpace::Uniform
                } else {
                    AddrSpace::Global
                }
            }
        };

        if class == ArgClass::LocalPtr {
            let spec_id = p.arg_spec_ids[&(func, i)];
            let (_, elem_type) = module.cx.as_pointer(arg_ty).unwrap();
            let base = p.next_id;
            p.next_id += 5;
            p.local_arg_info.insert(
                (func, i),
                LocalArgInfo {
                    variable_id: base,
                    elem_type,
                    array_size_id: base + 1,
                    array_type_id: base + 2,
                    ptr_array_type_id: base + 3,
                    first_elem_ptr_id: base + 4,
                    spec_id,
                },
            );
            p.local_args.push((func, i));
        } else {
            // Constant and global pointers share wrapper structs; fold the
            // address space before consulting the reuse map.
            let tmp_ty = match class {
                ArgClass::Sampler | ArgClass::RoImage | ArgClass::WoImage => {
                    module.cx.as_pointer(arg_ty).unwrap().1
                }
                _ => match module.cx.as_pointer(arg_ty) {
                    Some((AddrSpace::Constant, pointee)) => {
                        module.cx.t_ptr(AddrSpace::Global, pointee)
                    }
                    _ => arg_ty,
                },
            };
            let is_handle =
                matches!(class, ArgClass::Sampler | ArgClass::RoImage | ArgClass::WoImage);
            let gv_ty = if is_handle {
                tmp_ty
            } else if let Some(&wrapped) = arg_ty_map.get(&tmp_ty) {
                wrapped
            } else {
                let wrapped = module.cx.t_struct([arg_ty]);
                arg_ty_map.insert(tmp_ty, wrapped);
                wrapped
            };

            // Reuse a variable created for a different kernel at the same
            // binding, unless descriptor sets are kept distinct.
            let mut gv = None;
            if !is_handle && !p.opts.distinct_kernel_descriptor_sets {
                if let Some(set) = gvars_for_type.get_mut(&gv_ty) {
                    let found = set
                        .iter()
                        .copied()
                        .find(|&(ordinal, b, _)| ordinal != kernel_ordinal && b == binding);
                    if let Some(entry) = found {
                        set.remove(&entry);
                        gv = Some(ir::GlobalVar(entry.2));
                    }
                }
            }
            let gv = gv.unwrap_or_else(|| {
                let name = format!("{}.arg.{binding}", module.func(func).name);
                module.add_global(GlobalVarDef {
                    name,
                    value_type: gv_ty,
                    addr_space: var_space,
                    initializer: None,
                })
            });
            gvars_for_type.entry(gv_ty).or_default().insert((kernel_ordinal, binding, gv.0));

            let gv_ptr_ty = {
                let space = module.global(gv).addr_space;
                module.cx.t_ptr(space, gv_ty)
            };
            p.find_type(&mut module.cx, gv_ptr_ty);
            p.arg_gv.insert((func, i), gv);
            binding += 1;
        }

        // Argument access goes through a pointer even for by-value arguments.
        if arg_has_use(module, func, i) {
            if module.cx.as_pointer(arg_ty).is_none() {
                let ptr_ty = module.cx.t_ptr(var_space, arg_ty);
                p.find_type(&mut module.cx, ptr_ty);
            }
            has_arg_user = true;
        }
    }

    if has_arg_user {
        // Constant 0 indexes through the wrapper structs.
        let zero = module.cx.c_i32(0);
        p.find_constant(&mut module.cx, zero);
        let i32t = module.cx.t_i32();
        p.find_type(&mut module.cx, i32t);
    }
    Ok(())
}

/// Emits the per-function prologue: descriptor-map records and binding
/// decorations for kernels, then `OpFunction` and (for non-kernels) the
/// parameter instructions.
pub(crate) fn func_prologue(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
) -> Result<()> {
    let is_kernel = module.func(func).is_kernel;
    let pod_ubo = p.opts.pod_args_in_uniform_buffer;

    if is_kernel {
        let mut ip = p.deco_insert_point();

        let descriptor_set = p.next_descriptor_set;
        if p.opts.distinct_kernel_descriptor_sets {
            p.next_descriptor_set += 1;
        }

        let fname = module.func(func).name.clone();

        // Descriptor-map records driven by explicit metadata, when present.
        let arg_map = module.func(func).arg_map.clone();
        if let Some(entries) = &arg_map {
            // The binding is the new argument index minus the number of
            // preceding pointer-to-local arguments.
            let mut num_ptr_local = 0u32;
            for e in entries {
                let kind =
                    if pod_ubo && e.arg_kind == "pod" { "pod_ubo" } else { e.arg_kind.as_str() };
                if e.spec_id > 0 {
                    num_ptr_local += 1;
                    let param_ty = module.func(func).params[e.new_index as usize].ty;
                    let elem = module.cx.as_pointer(param_ty).map_or(param_ty, |(_, t)| t);
                    let elem_size = ir::layout::byte_size(&module.cx, elem);
                    p.dmap.kernel_local_arg(&fname, &e.name, e.old_index, kind, elem_size, e.spec_id);
                } else {
                    p.dmap.kernel_arg(
                        &fname,
                        &e.name,
                        e.old_index,
                        descriptor_set,
                        e.new_index - num_ptr_local,
                        e.offset,
                        kind,
                    );
                }
            }
        }

        let nparams = module.func(func).params.len() as u32;
        let mut binding = 0u32;
        for i in 0..nparams {
            let (arg_ty, arg_name) = {
                let param = &module.func(func).params[i as usize];
                (param.ty, param.name.clone())
            };
            let class = classify(&module.cx, arg_ty)?;
            let uses_binding = class != ArgClass::LocalPtr;

            if arg_map.is_none() {
                let kind = arg_kind_str(class, pod_ubo);
                if uses_binding {
                    p.dmap.kernel_arg(&fname, &arg_name, i, descriptor_set, binding, 0, kind);
                } else {
                    let elem = module.cx.as_pointer(arg_ty).unwrap().1;
                    let elem_size = ir::layout::byte_size(&module.cx, elem);
                    let spec_id = p.arg_spec_ids[&(func, i)];
                    p.dmap.kernel_local_arg(&fname, &arg_name, i, kind, elem_size, spec_id);
                }
            }

            if uses_binding {
                let gv = p.arg_gv[&(func, i)];
                let var_id = p.global_map[&gv];
                p.arg_ids.insert((func, i), var_id);
                p.arg_gv_ids.insert((func, i), var_id);

                if p.gvar_with_binding.insert(gv) {
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
                    ip += 1;
                    p.insert_inst(
                        ip,
                        spv::Inst::new(
                            Opcode::OpDecorate,
                            [
                                Operand::id(var_id),
                                Operand::num(spec::decoration::Binding),
                                Operand::num(binding),
                            ],
                        ),
                    );
                    ip += 1;

                    // In OpenCL 1.2 an image is either read-only or
                    // write-only, never both.
                    if matches!(class, ArgClass::RoImage | ArgClass::WoImage) {
                        let deco = if class == ArgClass::RoImage {
                            spec::decoration::NonWritable
                        } else {
                            spec::decoration::NonReadable
                        };
                        p.insert_inst(
                            ip,
                            spv::Inst::new(
                                Opcode::OpDecorate,
                                [Operand::id(var_id), Operand::num(deco)],
                            ),
                        );
                        ip += 1;
                    }

                    if module.global(gv).addr_space == AddrSpace::Constant {
                        p.insert_inst(
                            ip,
                            spv::Inst::new(
                                Opcode::OpDecorate,
                                [
                                    Operand::id(var_id),
                                    Operand::num(spec::decoration::NonWritable),
                                ],
                            ),
                        );
                        ip += 1;
                    }
                }
                binding += 1;
            }
        }
    }

    // OpFunction itself.
    let (ret_type, attrs, nparams) = {
        let fdef = module.func(func);
        (fdef.ret_type, fdef.attrs, fdef.params.len() as u32)
    };
    let ret_id = p.lookup_type(&module.cx, ret_type)?;

    let mut control = spec::function_control::None;
    if attrs.always_inline {
        control |= spec::function_control::Inline;
    }
    if attrs.no_inline {
        control |= spec::function_control::DontInline;
    }
    if attrs.read_only {
        control |= spec::function_control::Pure;
    }
    if attrs.read_none {
        control |= spec::function_control::Const;
    }

    let fn_ty = {
        let params: Vec<Type> = module.func(func).params.iter().map(|pm| pm.ty).collect();
        if is_kernel {
            module.cx.t_fn(ret_type, [])
        } else {
            let orig = module.cx.t_fn(ret_type, params);
            match p.global_const_func_params.get(&orig) {
                Some(&(rewritten, _)) => rewritten,
                None => orig,
            }
        }
    };
    let fn_ty_id = p.lookup_type(&module.cx, fn_ty)?;

    let func_id = p.reserve_id();
    if is_kernel {
        p.entry_points.push((func, func_id));
    }
    p.func_map.insert(func, func_id);
    if p.opts.show_ids {
        log::debug!("Function {} is {}", module.func(func).name, func_id);
    }
    p.insts.push(spv::Inst::with_result(
        Opcode::OpFunction,
        func_id,
        [Operand::id(ret_id), Operand::num(control), Operand::id(fn_ty_id)],
    ));

    // Kernel entry points take no parameters; everything else declares its
    // parameters (with constant-pointer ones moved to private space).
    if !is_kernel {
        let orig_fn_ty = {
            let params: Vec<Type> = module.func(func).params.iter().map(|pm| pm.ty).collect();
            module.cx.t_fn(ret_type, params)
        };
        for i in 0..nparams {
            let param_ty = module.func(func).params[i as usize].ty;
            let mut param_ty_id = p.lookup_type(&module.cx, param_ty)?;
            if let Some((_, pointee)) = module.cx.as_pointer(param_ty) {
                if let Some(&(_, index)) = p.global_const_func_params.get(&orig_fn_ty) {
                    if i == index {
                        let private_ptr =
                            module.cx.t_ptr(AddrSpace::ModuleScopePrivate, pointee);
                        param_ty_id = p.lookup_type(&module.cx, private_ptr)?;
                        p.global_const_args.insert((func, i));
                    }
                }
            }
            let id = p.reserve_id();
            p.arg_ids.insert((func, i), id);
            p.insts.push(spv::Inst::with_result(
                Opcode::OpFunctionParameter,
                id,
                [Operand::id(param_ty_id)],
            ));
        }
    }
    Ok(())
}

/// Kernel-entry prologue instructions: load sampler/image handles, chase into
/// the wrapper struct for POD values, and resolve pointer-to-local arguments
/// to element 0 of their Workgroup arrays.
pub(crate) fn insts_for_args(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
) -> Result<()> {
    let nparams = module.func(func).params.len() as u32;
    for i in 0..nparams {
        if !arg_has_use(module, func, i) {
            continue;
        }
        let arg_ty = module.func(func).params[i as usize].ty;
        let class = classify(&module.cx, arg_ty)?;

        match class {
            ArgClass::LocalPtr => {
                // Point at the first element of the Workgroup array; every
                // downstream use of the argument resolves to this pointer.
                let info = &p.local_arg_info[&(func, i)];
                let (variable_id, first_elem) = (info.variable_id, info.first_elem_ptr_id);
                p.arg_ids.insert((func, i), first_elem);
                let zero_ty = module.cx.t_i32();
                let zero =
                    p.known_const_id(&module.cx, &ir::ConstDef { ty: zero_ty, kind: ir::ConstKind::Int(0) })?;
                let res_ty = p.lookup_type(&module.cx, arg_ty)?;
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpAccessChain,
                    first_elem,
                    [Operand::id(res_ty), Operand::id(variable_id), Operand::id(zero)],
                ));
            }
            ArgClass::Sampler | ArgClass::RoImage | ArgClass::WoImage => {
                // Handles are loaded from their UniformConstant variables.
                let gv = p.arg_gv[&(func, i)];
                let handle_ty = module.global(gv).value_type;
                let ty_id = p.lookup_type(&module.cx, handle_ty)?;
                let ptr_id = p.arg_ids[&(func, i)];
                let id = p.reserve_id();
                p.arg_ids.insert((func, i), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpLoad,
                    id,
                    [Operand::id(ty_id), Operand::id(ptr_id)],
                ));
            }
            ArgClass::Buffer(_) => {
                if !arg_has_only_gep_use(module, func, i) {
                    // Step through the wrapper struct and runtime array once;
                    // geps fold these indices in themselves.
                    let res_ty = p.lookup_type(&module.cx, arg_ty)?;
                    let base = p.arg_ids[&(func, i)];
                    let zero = p.i32_zero_id()?;
                    let id = p.reserve_id();
                    p.arg_ids.insert((func, i), id);
                    p.insts.push(spv::Inst::with_result(
                        Opcode::OpAccessChain,
                        id,
                        [
                            Operand::id(res_ty),
                            Operand::id(base),
                            Operand::id(zero),
                            Operand::id(zero),
                        ],
                    ));
                }
            }
            ArgClass::Pod => {
                let space = if p.opts.pod_args_in_uniform_buffer {
                    AddrSpace::Uniform
                } else {
                    AddrSpace::Global
                };
                let ptr_ty = module.cx.t_ptr(space, arg_ty);
                let ptr_ty_id = p.lookup_type(&module.cx, ptr_ty)?;
                let base = p.arg_ids[&(func, i)];
                let zero = p.i32_zero_id()?;
                let chain = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpAccessChain,
                    chain,
                    [Operand::id(ptr_ty_id), Operand::id(base), Operand::id(zero)],
                ));
                let value_ty_id = p.lookup_type(&module.cx, arg_ty)?;
                let id = p.reserve_id();
                p.arg_ids.insert((func, i), id);
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpLoad,
                    id,
                    [Operand::id(value_ty_id), Operand::id(chain)],
                ));
            }
        }
    }
    Ok(())
}
