//! Type emission, in discovery order, with the target's aliasing rules:
//! constant and global pointers conflate to one id, `i8` rides on the 32-bit
//! int, `<4 x i8>` rides on `i32`, and kernel-argument buffer pointers grow a
//! runtime-array/Block-struct wrapping.

use super::Producer;
use crate::ir::{self, layout, AddrSpace, Type, TypeKind};
use crate::spv::{self, spec, Opcode, Operand};
use crate::{Error, Result};

pub(crate) fn generate(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    let ordered: Vec<Type> = p.types.iter().copied().collect();

    for ty in ordered {
        // Map the type to the id it is about to get; the aliasing cases
        // below overwrite this.
        p.type_map.insert(ty, p.next_id);

        match module.cx.type_kind(ty).clone() {
            TypeKind::Void => {
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(Opcode::OpTypeVoid, id, []));
            }
            TypeKind::Bool => {
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(Opcode::OpTypeBool, id, []));
            }
            TypeKind::Int { width } => emit_int(p, module, ty, width),
            TypeKind::Float { width } => {
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(
                    Opcode::OpTypeFloat,
                    id,
                    [Operand::num(width)],
                ));
            }
            TypeKind::Vector { elem, count } => emit_vector(p, module, ty, elem, count)?,
            TypeKind::Array { elem, count } => emit_array(p, module, ty, elem, count)?,
            TypeKind::Struct { fields } => emit_struct(p, module, ty, &fields)?,
            TypeKind::Opaque { name } => emit_opaque(p, module, &name)?,
            TypeKind::Pointer { space, pointee } => emit_pointer(p, module, ty, space, pointee)?,
            TypeKind::Function { ret, params } => {
                let ret_id = p.lookup_type(&module.cx, ret)?;
                let mut ops = vec![Operand::id(ret_id)];
                for param in params {
                    // Opaque handle parameters pass the handle itself.
                    let param = match module.cx.as_pointer(param) {
                        Some((_, pointee)) if module.cx.opaque_name(pointee).is_some() => pointee,
                        _ => param,
                    };
                    ops.push(Operand::id(p.lookup_type(&module.cx, param)?));
                }
                let id = p.reserve_id();
                p.insts.push(spv::Inst::with_result(Opcode::OpTypeFunction, id, ops));
            }
        }
    }

    // One OpTypeSampledImage per distinct image type used in a read.
    for i in 0..p.image_types.len() {
        let (&image_ty, _) = p.image_types.get_index(i).unwrap();
        let image_id = p.lookup_type(&module.cx, image_ty)?;
        let id = p.reserve_id();
        p.insts.push(spv::Inst::with_result(
            Opcode::OpTypeSampledImage,
            id,
            [Operand::id(image_id)],
        ));
        *p.image_types.get_index_mut(i).unwrap().1 = id;
    }

    // The spec-constant-sized Workgroup arrays for pointer-to-local
    // arguments, on their pre-reserved ids.
    for (func, index) in p.local_args.clone() {
        let info = &p.local_arg_info[&(func, index)];
        let (size_id, array_id, ptr_id, elem_type) =
            (info.array_size_id, info.array_type_id, info.ptr_array_type_id, info.elem_type);
        let i32t = module.cx.t_i32();
        let i32_id = p.lookup_type(&module.cx, i32t)?;
        // Default length 1; the real length arrives via specialization.
        p.insts.push(spv::Inst::with_result(
            Opcode::OpSpecConstant,
            size_id,
            [Operand::id(i32_id), Operand::num(1)],
        ));
        let elem_id = p.lookup_type(&module.cx, elem_type)?;
        p.insts.push(spv::Inst::with_result(
            Opcode::OpTypeArray,
            array_id,
            [Operand::id(elem_id), Operand::id(size_id)],
        ));
        p.insts.push(spv::Inst::with_result(
            Opcode::OpTypePointer,
            ptr_id,
            [Operand::num(spec::storage_class::Workgroup), Operand::id(array_id)],
        ));
    }
    Ok(())
}

/// `i8` and `i32` share one unsigned 32-bit type id: whichever is emitted
/// first wins, the other aliases to it.
fn emit_int(p: &mut Producer<'_>, module: &mut ir::Module, ty: Type, width: u32) {
    let mut emit_width = width;
    let alias_to = match width {
        8 => 32,
        32 => 8,
        _ => 0,
    };
    if alias_to != 0 {
        let other = module.cx.t_int(alias_to);
        if let Some(&existing) = p.type_map.get(&other) {
            p.type_map.insert(ty, existing);
            return;
        }
        // Go ahead and make it, but also map the other width to it.
        p.type_map.insert(other, p.next_id);
        if width == 8 {
            emit_width = 32;
        }
    }
    let id = p.reserve_id();
    p.insts.push(spv::Inst::with_result(
        Opcode::OpTypeInt,
        id,
        [Operand::num(emit_width), Operand::num(0)],
    ));
}

fn emit_vector(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    ty: Type,
    elem: Type,
    count: u32,
) -> Result<()> {
    if matches!(*module.cx.type_kind(elem), TypeKind::Int { width: 8 }) {
        if count == 4 {
            // <4 x i8> is an i32 in disguise.
            let elem_id = p.lookup_type(&module.cx, elem)?;
            p.type_map.insert(ty, elem_id);
            return Ok(());
        }
        return Err(Error::WideByteVector(count));
    }
    let elem_id = p.lookup_type(&module.cx, elem)?;
    let id = p.reserve_id();
    p.insts.push(spv::Inst::with_result(
        Opcode::OpTypeVector,
        id,
        [Operand::id(elem_id), Operand::num(count)],
    ));
    Ok(())
}

fn emit_array(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    ty: Type,
    elem: Type,
    count: u32,
) -> Result<()> {
    // The length operand is a constant instruction of its own.
    let i32t = module.cx.t_i32();
    let i32_id = p.lookup_type(&module.cx, i32t)?;
    let length_const = module.cx.c_int(i32t, u64::from(count));
    let length_id = p.reserve_id();
    p.allocated_consts.insert(length_const, length_id);
    p.const_map.insert(length_const, length_id);
    p.insts.push(spv::Inst::with_result(
        Opcode::OpConstant,
        length_id,
        [Operand::id(i32_id), Operand::num(count)],
    ));

    p.types_needing_array_stride.insert(ty);

    let elem_id = p.lookup_type(&module.cx, elem)?;
    p.type_map.insert(ty, p.next_id);
    let id = p.reserve_id();
    p.insts.push(spv::Inst::with_result(
        Opcode::OpTypeArray,
        id,
        [Operand::id(elem_id), Operand::id(length_id)],
    ));
    Ok(())
}

fn emit_struct(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    ty: Type,
    fields: &[Type],
) -> Result<()> {
    let mut ops = Vec::with_capacity(fields.len());
    for &field in fields {
        let mut field_id = p.lookup_type(&module.cx, field)?;
        // A kernel-argument pointer member refers to the runtime array, not
        // the pointer.
        if module.cx.as_pointer(field).is_some() {
            if let Some(&runtime_id) = p.runtime_array_ids.get(&field) {
                field_id = runtime_id;
            }
        }
        ops.push(Operand::id(field_id));
    }
    let struct_id = p.reserve_id();
    p.insts.push(spv::Inst::with_result(Opcode::OpTypeStruct, struct_id, ops));

    let mut ip = p.deco_insert_point();
    let (offsets, _) = layout::struct_layout_of(&module.cx, fields);
    for (index, &offset) in offsets.iter().enumerate() {
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpMemberDecorate,
                [
                    Operand::id(struct_id),
                    Operand::num(index as u32),
                    Operand::num(spec::decoration::Offset),
                    Operand::num(offset),
                ],
            ),
        );
        ip += 1;
    }

    // Wrapper structs for kernel arguments form the shader interface and
    // need the Block decoration.
    let is_arg_wrapper = p.arg_gv.values().any(|&gv| module.global(gv).value_type == ty);
    if is_arg_wrapper {
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [Operand::id(struct_id), Operand::num(spec::decoration::Block)],
            ),
        );
    }
    Ok(())
}

fn emit_opaque(p: &mut Producer<'_>, module: &mut ir::Module, name: &str) -> Result<()> {
    match name {
        "opencl.sampler_t" => {
            let id = p.reserve_id();
            p.insts.push(spv::Inst::with_result(Opcode::OpTypeSampler, id, []));
        }
        "opencl.image2d_ro_t" | "opencl.image2d_wo_t" | "opencl.image3d_ro_t"
        | "opencl.image3d_wo_t" => {
            let f32t = module.cx.t_f32();
            let sampled_ty = p.lookup_type(&module.cx, f32t)?;
            let dim = if name.starts_with("opencl.image3d") {
                spec::dim::Dim3D
            } else {
                spec::dim::Dim2D
            };
            // Sampled=1: used with a sampler. Sampled=2: storage image.
            let sampled = if name.ends_with("_wo_t") { 2 } else { 1 };
            let id = p.reserve_id();
            p.insts.push(spv::Inst::with_result(
                Opcode::OpTypeImage,
                id,
                [
                    Operand::id(sampled_ty),
                    Operand::num(dim),
                    Operand::num(0), // depth
                    Operand::num(0), // arrayed
                    Operand::num(0), // multisampled
                    Operand::num(sampled),
                    Operand::num(spec::image_format::Unknown),
                ],
            ));
        }
        _ => {
            // Other opaque types have no contents to describe.
            let id = p.reserve_id();
            p.insts.push(spv::Inst::with_result(Opcode::OpTypeStruct, id, []));
        }
    }
    Ok(())
}

fn emit_pointer(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    ty: Type,
    space: AddrSpace,
    pointee: Type,
) -> Result<()> {
    // Constant and global pointers are the same type on the target; the
    // first one emitted owns the id.
    let mut use_existing = false;
    let mut eff_space = space;
    if space == AddrSpace::Constant {
        eff_space = AddrSpace::Global;
        let twin = module.cx.t_ptr(AddrSpace::Global, pointee);
        if let Some(&id) = p.type_map.get(&twin) {
            p.type_map.insert(ty, id);
            return Ok(());
        }
    } else if space == AddrSpace::Global {
        let twin = module.cx.t_ptr(AddrSpace::Constant, pointee);
        if let Some(&id) = p.type_map.get(&twin) {
            p.type_map.insert(ty, id);
            use_existing = true;
        }
    }

    // Kernel pointer arguments additionally need a runtime array over the
    // pointee; the plain pointer is only materialized when something other
    // than a folding gep uses the argument.
    let mut is_runtime_array = false;
    let mut has_arg_user = false;
    for (&(func, index), _) in p.arg_gv.iter() {
        let arg_ty = module.func(func).params[index as usize].ty;
        if arg_ty != ty {
            continue;
        }
        if eff_space != AddrSpace::UniformConstant {
            is_runtime_array = true;
        }
        if super::args::arg_has_nongep_or_sameptr_use(module, func, index, ty) {
            has_arg_user = true;
        }
    }

    if (!is_runtime_array || has_arg_user) && !use_existing {
        let pointee_id = p.lookup_type(&module.cx, pointee)?;
        let id = p.reserve_id();
        p.insts.push(spv::Inst::with_result(
            Opcode::OpTypePointer,
            id,
            [Operand::num(Producer::storage_class(eff_space)), Operand::id(pointee_id)],
        ));
    }

    if is_runtime_array {
        let pointee_id = p.lookup_type(&module.cx, pointee)?;
        let id = p.reserve_id();
        p.runtime_array_ids.insert(ty, id);
        p.insts.push(spv::Inst::with_result(
            Opcode::OpTypeRuntimeArray,
            id,
            [Operand::id(pointee_id)],
        ));

        let stride = layout::byte_size(&module.cx, pointee);
        let ip = p.deco_insert_point();
        p.insert_inst(
            ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [
                    Operand::id(id),
                    Operand::num(spec::decoration::ArrayStride),
                    Operand::num(stride),
                ],
            ),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;

    #[test]
    fn i8_aliases_to_i32() {
        let opts = Options::default();
        let mut module = ir::Module::new();
        let i32t = module.cx.t_i32();
        let i8t = module.cx.t_i8();
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, i32t);
        p.find_type(&mut module.cx, i8t);
        generate(&mut p, &mut module).unwrap();
        assert_eq!(p.type_map[&i32t], p.type_map[&i8t]);
        // Exactly one OpTypeInt, 32-bit unsigned.
        let ints: Vec<_> =
            p.insts.iter().filter(|i| i.opcode == Opcode::OpTypeInt).collect();
        assert_eq!(ints.len(), 1);
        assert_eq!(ints[0].operands[0], Operand::num(32));
    }

    #[test]
    fn four_i8_vector_aliases_to_i32() {
        let opts = Options::default();
        let mut module = ir::Module::new();
        let i8t = module.cx.t_i8();
        let v4i8 = module.cx.t_vec(i8t, 4);
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, v4i8);
        generate(&mut p, &mut module).unwrap();
        assert_eq!(p.type_map[&v4i8], p.type_map[&i8t]);
        assert!(!p.insts.iter().any(|i| i.opcode == Opcode::OpTypeVector));
    }

    #[test]
    fn wide_i8_vectors_are_rejected() {
        let opts = Options::default();
        let mut module = ir::Module::new();
        let i8t = module.cx.t_i8();
        let v8i8 = module.cx.t_vec(i8t, 8);
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, v8i8);
        assert_eq!(generate(&mut p, &mut module), Err(Error::WideByteVector(8)));
    }

    #[test]
    fn constant_and_global_pointers_share_an_id() {
        let opts = Options::default();
        let mut module = ir::Module::new();
        let f32t = module.cx.t_f32();
        let pc = module.cx.t_ptr(AddrSpace::Constant, f32t);
        let pg = module.cx.t_ptr(AddrSpace::Global, f32t);
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, pc);
        p.find_type(&mut module.cx, pg);
        generate(&mut p, &mut module).unwrap();
        assert_eq!(p.type_map[&pc], p.type_map[&pg]);
        let ptrs: Vec<_> =
            p.insts.iter().filter(|i| i.opcode == Opcode::OpTypePointer).collect();
        assert_eq!(ptrs.len(), 1);
        assert_eq!(ptrs[0].operands[0], Operand::num(spec::storage_class::StorageBuffer));
    }

    #[test]
    fn arrays_emit_their_length_first() {
        let opts = Options::default();
        let mut module = ir::Module::new();
        let f32t = module.cx.t_f32();
        let arr = module.cx.t_array(f32t, 16);
        let mut p = super::super::Producer::new(&opts);
        p.find_type(&mut module.cx, arr);
        generate(&mut p, &mut module).unwrap();
        let opcodes: Vec<Opcode> = p.insts.iter().map(|i| i.opcode).collect();
        let const_pos = opcodes.iter().position(|&o| o == Opcode::OpConstant).unwrap();
        let arr_pos = opcodes.iter().position(|&o| o == Opcode::OpTypeArray).unwrap();
        assert!(const_pos < arr_pos);
        assert!(p.types_needing_array_stride.contains(&arr));
    }
}
