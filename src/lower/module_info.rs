//! The module prefix, inserted once everything else is in place:
//! capabilities, extensions, the memory model, one entry point per kernel,
//! execution modes for fixed workgroup sizes, the source declaration, and the
//! SpecId decorations for the default workgroup-size spec constants.

use super::{builtins, Producer};
use crate::ir::{self, InstKind, TypeKind};
use crate::spv::{self, spec, Opcode, Operand};
use crate::Result;

pub(crate) fn generate(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    let mut ip = 0usize;
    let insert = |p: &mut Producer<'_>, ip: &mut usize, inst: spv::Inst| {
        p.insert_inst(*ip, inst);
        *ip += 1;
    };

    insert(
        p,
        &mut ip,
        spv::Inst::new(Opcode::OpCapability, [Operand::num(spec::capability::Shader)]),
    );

    // Capabilities implied by the discovered types.
    for ty in p.types.clone() {
        let cap = match module.cx.type_kind(ty) {
            TypeKind::Int { width: 16 } => Some(spec::capability::Int16),
            TypeKind::Int { width: 64 } => Some(spec::capability::Int64),
            TypeKind::Float { width: 16 } => Some(spec::capability::Float16),
            TypeKind::Float { width: 64 } => Some(spec::capability::Float64),
            TypeKind::Opaque { name }
                if name == "opencl.image2d_wo_t" || name == "opencl.image3d_wo_t" =>
            {
                Some(spec::capability::StorageImageWriteWithoutFormat)
            }
            _ => None,
        };
        if let Some(cap) = cap {
            insert(p, &mut ip, spv::Inst::new(Opcode::OpCapability, [Operand::num(cap)]));
        }
    }

    let has_image_query = module.funcs.iter().any(|f| {
        f.insts.iter().any(|def| {
            matches!(&def.kind, InstKind::Call { callee, .. }
                if builtins::IMAGE_QUERY_FNS.contains(&callee.as_str()))
        })
    });
    if has_image_query {
        insert(
            p,
            &mut ip,
            spv::Inst::new(Opcode::OpCapability, [Operand::num(spec::capability::ImageQuery)]),
        );
    }

    // StorageBuffer is used for every buffer resource, so variable pointers
    // (and their storage class) are declared whether or not a PtrAccessChain
    // was actually emitted.
    if p.uses_variable_pointers {
        log::trace!("module indexes storage-buffer pointers dynamically");
    }
    insert(
        p,
        &mut ip,
        spv::Inst::new(
            Opcode::OpCapability,
            [Operand::num(spec::capability::VariablePointers)],
        ),
    );
    for extension in [spec::EXT_STORAGE_BUFFER_STORAGE_CLASS, spec::EXT_VARIABLE_POINTERS] {
        insert(
            p,
            &mut ip,
            spv::Inst::new(Opcode::OpExtension, [Operand::str(extension)]),
        );
    }

    // The import (if any) was emitted first and sits right here; step over it.
    if p.ext_inst_import_id.is_some() {
        ip += 1;
    }

    insert(
        p,
        &mut ip,
        spv::Inst::new(
            Opcode::OpMemoryModel,
            [
                Operand::num(spec::addressing_model::Logical),
                Operand::num(spec::memory_model::GLSL450),
            ],
        ),
    );

    for (func, func_id) in p.entry_points.clone() {
        let mut ops = vec![
            Operand::num(spec::execution_model::GLCompute),
            Operand::id(func_id),
            Operand::str(module.func(func).name.clone()),
        ];
        for &gv in &p.interfaces {
            ops.push(Operand::id(p.global_map[&gv]));
        }
        insert(p, &mut ip, spv::Inst::new(Opcode::OpEntryPoint, ops));
    }

    for (func, func_id) in p.entry_points.clone() {
        let Some([x, y, z]) = module.func(func).reqd_work_group_size else { continue };
        if !p.builtin_dim_ids.is_empty() {
            return Err(crate::Error::MismatchedWorkgroupSize);
        }
        insert(
            p,
            &mut ip,
            spv::Inst::new(
                Opcode::OpExecutionMode,
                [
                    Operand::id(func_id),
                    Operand::num(spec::execution_mode::LocalSize),
                    Operand::num(x),
                    Operand::num(y),
                    Operand::num(z),
                ],
            ),
        );
    }

    insert(
        p,
        &mut ip,
        spv::Inst::new(
            Opcode::OpSource,
            [Operand::num(spec::source_language::OpenCL_C), Operand::num(120)],
        ),
    );

    // The default workgroup-size dimensions specialize under ids 0, 1, 2.
    let dim_ids = p.builtin_dim_ids.clone();
    for (spec_id, dim_id) in dim_ids.into_iter().enumerate() {
        insert(
            p,
            &mut ip,
            spv::Inst::new(
                Opcode::OpDecorate,
                [
                    Operand::id(dim_id),
                    Operand::num(spec::decoration::SpecId),
                    Operand::num(spec_id as u32),
                ],
            ),
        );
    }

    Ok(())
}
