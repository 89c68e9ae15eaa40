//! The discovery walker: two symmetric passes over the module (kernels
//! first, then everything else) that intern every type and constant the
//! lowering will later look up, synthesize the kernel-argument resource
//! variables, rewrite module-scope `__constant` data, and decide whether the
//! GLSL.std.450 import is needed.
//!
//! Discovery order is emission order, so everything here is deliberately
//! sequential and deterministic.

use super::{builtins, GvarsForType, Producer};
use crate::ir::visit::{InnerVisit, Visitor};
use crate::ir::{
    self, AddrSpace, BinOp, CastOp, Const, ConstKind, Func, GlobalVar, InstDef, InstKind, Type,
    TypeKind, Value,
};
use crate::spv::{self, spec, Opcode, Operand};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub(crate) fn run(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    gather_module_info(p, module)?;

    // If we are using a sampler map, pin down the sampler type.
    if !p.opts.sampler_map.is_empty() {
        let sampler_struct = module.cx.t_opaque("opencl.sampler_t");
        let sampler_ty = module.cx.t_ptr(AddrSpace::UniformConstant, sampler_struct);
        p.sampler_ty = Some(sampler_ty);
        p.find_type(&mut module.cx, sampler_ty);
    }

    // Collect information from module-scope variables (including the
    // argument resource variables synthesized above).
    for g in 0..module.global_vars.len() {
        let gv = GlobalVar(g as u32);
        // `__spirv_*` variables only carry an initializer to keep earlier
        // passes from discarding them; it is not real data.
        if module.global(gv).name.starts_with("__spirv_") {
            module.global_mut(gv).initializer = None;
        }
        if p.dead_globals.contains(&gv) {
            continue;
        }
        let (value_type, addr_space, init) = {
            let def = module.global(gv);
            (def.value_type, def.addr_space, def.initializer)
        };
        let ptr_ty = module.cx.t_ptr(addr_space, value_type);
        p.find_type(&mut module.cx, ptr_ty);
        if let Some(init) = init {
            if !matches!(module.cx.const_def(init).kind, ConstKind::Undef) {
                p.find_constant(&mut module.cx, init);
            }
        }
        if addr_space == AddrSpace::Input && !p.interfaces.contains(&gv) {
            p.interfaces.push(gv);
        }
    }

    // Types of pointer-to-local arguments and their element types.
    for (func, index) in p.local_args.clone() {
        let arg_ty = module.func(func).params[index as usize].ty;
        p.find_type(&mut module.cx, arg_ty);
        let (_, pointee) = module.cx.as_pointer(arg_ty).expect("local arg must be a pointer");
        p.find_type(&mut module.cx, pointee);
    }

    if find_ext_inst(p, module) {
        let id = p.reserve_id();
        p.insts.push(spv::Inst::with_result(
            Opcode::OpExtInstImport,
            id,
            [Operand::str(spec::EXT_INST_GLSL_STD_450)],
        ));
        p.ext_inst_import_id = Some(id);
    }
    Ok(())
}

impl Producer<'_> {
    /// Interns `ty` and everything it depends on, in dependency-first order.
    ///
    /// Constant- and global-space pointers to opaque handle types are not
    /// materialized themselves; the handle type and its UniformConstant
    /// pointer stand in for them.
    pub(crate) fn find_type(&mut self, cx: &mut ir::Context, ty: Type) {
        if self.types.contains(&ty) {
            return;
        }

        if let Some((space, pointee)) = cx.as_pointer(ty) {
            if matches!(space, AddrSpace::Constant | AddrSpace::Global)
                && cx.opaque_name(pointee).is_some()
            {
                self.find_type(cx, pointee);
                let actual_ptr = cx.t_ptr(AddrSpace::UniformConstant, pointee);
                self.find_type(cx, actual_ptr);
                return;
            }
        }

        // Array types take their length as an i32 constant operand.
        if matches!(cx.type_kind(ty), TypeKind::Array { .. }) {
            let i32t = cx.t_i32();
            self.find_type(cx, i32t);
        }

        let subtypes: SmallVec<[Type; 4]> = match cx.type_kind(ty) {
            &TypeKind::Vector { elem, .. } | &TypeKind::Array { elem, .. } => {
                [elem].into_iter().collect()
            }
            TypeKind::Struct { fields } => fields.clone(),
            &TypeKind::Pointer { pointee, .. } => [pointee].into_iter().collect(),
            TypeKind::Function { ret, params } => {
                [*ret].into_iter().chain(params.iter().copied()).collect()
            }
            _ => SmallVec::new(),
        };
        for sub in subtypes {
            self.find_type(cx, sub);
        }

        self.types.insert(ty);
    }

    /// Interns `ct`, elements first — except `<4 x i8>` composites, which are
    /// inserted ahead of their elements since they fold to a single word.
    pub(crate) fn find_constant(&mut self, cx: &mut ir::Context, ct: Const) {
        if self.constants.contains(&ct) {
            return;
        }
        let def = cx.const_def(ct).clone();
        if cx.is_4xi8(def.ty) {
            self.constants.insert(ct);
        }
        if let ConstKind::Composite(elems) = &def.kind {
            for &elem in elems {
                self.find_constant(cx, elem);
            }
        }
        self.constants.insert(ct);
    }
}

/// One arm of the select a boolean-widening cast turns into.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) enum SelectArm {
    Zero,
    One,
    AllOnes,
}

/// The integer constant of `ty`'s shape for a widening-select arm. A scalar
/// zero is the ordinary literal 0 (shared with every other use of 0); a
/// vector zero is a null composite.
pub(crate) fn widening_int_const(cx: &mut ir::Context, ty: Type, arm: SelectArm) -> Const {
    fn scalar(cx: &mut ir::Context, ty: Type, arm: SelectArm) -> Const {
        let width = match *cx.type_kind(ty) {
            TypeKind::Int { width } => width,
            _ => 32,
        };
        let v = match arm {
            SelectArm::Zero => 0,
            SelectArm::One => 1,
            SelectArm::AllOnes => u64::MAX >> (64 - width),
        };
        cx.c_int(ty, v)
    }
    match *cx.type_kind(ty) {
        TypeKind::Vector { elem, .. } => {
            if arm == SelectArm::Zero {
                return cx.c_null(ty);
            }
            let lane = scalar(cx, elem, arm);
            cx.c_splat(ty, lane)
        }
        _ => scalar(cx, ty, arm),
    }
}

/// All value operands of an instruction, in operand order (masks and literal
/// indices are not values).
pub(crate) fn operand_values(def: &InstDef) -> SmallVec<[Value; 4]> {
    #[derive(Default)]
    struct CollectValues(SmallVec<[Value; 4]>);
    impl Visitor for CollectValues {
        fn visit_value_use(&mut self, v: &Value) {
            self.0.push(*v);
        }
    }
    let mut c = CollectValues::default();
    def.kind.inner_visit_with(&mut c);
    c.0
}

fn global_is_used(module: &ir::Module, gv: GlobalVar) -> bool {
    module.funcs.iter().any(|f| {
        f.insts
            .iter()
            .any(|def| operand_values(def).contains(&Value::Global(gv)))
    })
}

/// Handles module-scope `__constant` variables: dead ones are dropped; live
/// ones either move to module-scope-private storage (default) or stay put for
/// the storage-buffer rendition (size-capped).
fn collect_module_constants(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    let mut live = Vec::new();
    for g in 0..module.global_vars.len() {
        let gv = GlobalVar(g as u32);
        if module.global(gv).addr_space != AddrSpace::Constant {
            continue;
        }
        if global_is_used(module, gv) {
            live.push(gv);
        } else {
            p.dead_globals.insert(gv);
        }
    }

    if p.opts.module_constants_in_storage_buffer {
        // For now, only a single storage buffer is supported.
        if live.len() > 1 {
            return Err(Error::UnsupportedConstant(
                "more than one module-scope __constant variable".to_owned(),
            ));
        }
        if let Some(&gv) = live.first() {
            let used = u64::from(ir::layout::byte_size(&module.cx, module.global(gv).value_type));
            const MAX_CONSTANT_SIZE: u64 = 65536;
            if used > MAX_CONSTANT_SIZE {
                return Err(Error::ConstantDataTooLarge { used, limit: MAX_CONSTANT_SIZE });
            }
        }
    } else {
        for gv in live {
            module.global_mut(gv).addr_space = AddrSpace::ModuleScopePrivate;
            let value_type = module.global(gv).value_type;
            module.cx.t_ptr(AddrSpace::ModuleScopePrivate, value_type);
            record_const_func_users(p, module, gv);
        }
    }
    Ok(())
}

/// Remembers which called function types take the constant global (or a gep
/// into it) as an argument, so their signatures can be rewritten to the
/// private address space. Only the last matching argument index is recorded.
fn record_const_func_users(p: &mut Producer<'_>, module: &mut ir::Module, gv: GlobalVar) {
    let mut recorded: Vec<(String, u32)> = Vec::new();
    for func in module.funcs() {
        let fdef = module.func(func);
        for def in &fdef.insts {
            let InstKind::Call { callee, args } = &def.kind else { continue };
            let mut index = None;
            for (i, &arg) in args.iter().enumerate() {
                let is_gv_use = match arg {
                    Value::Global(g) => g == gv,
                    Value::Inst(inst) => matches!(
                        fdef.inst(inst).kind,
                        InstKind::Gep { base: Value::Global(g), .. } if g == gv
                    ),
                    _ => false,
                };
                if is_gv_use {
                    index = Some(i as u32);
                }
            }
            if let Some(index) = index {
                recorded.push((callee.clone(), index));
            }
        }
    }
    for (callee, index) in recorded {
        let Some(callee_func) = module.func_by_name(&callee) else { continue };
        let (ret, params): (Type, SmallVec<[Type; 4]>) = {
            let fdef = module.func(callee_func);
            (fdef.ret_type, fdef.params.iter().map(|pm| pm.ty).collect())
        };
        let fn_ty = module.cx.t_fn(ret, params);
        p.global_const_func_params.insert(fn_ty, (fn_ty, index));
    }
}

fn gather_module_info(p: &mut Producer<'_>, module: &mut ir::Module) -> Result<()> {
    collect_module_constants(p, module)?;

    let has_wg_builtin =
        module.global_vars.iter().any(|g| g.name == "__spirv_WorkgroupSize");
    let has_image_types = ["opencl.image2d_ro_t", "opencl.image2d_wo_t", "opencl.image3d_ro_t",
        "opencl.image3d_wo_t"]
    .iter()
    .any(|&n| module.has_opaque_type(n));

    let mut gvars_for_type = GvarsForType::default();
    // Wrapper-struct reuse across arguments of equal underlying type.
    let mut arg_ty_map: FxHashMap<Type, Type> = FxHashMap::default();

    let nfuncs = module.funcs.len();

    // Kernels first.
    for f in 0..nfuncs {
        let func = Func(f as u32);
        if module.func(func).blocks.is_empty() || !module.func(func).is_kernel {
            continue;
        }
        scan_insts_for_synthetics(p, module, func, true);
        if has_image_types {
            // The sampled type of every image is float.
            let f32t = module.cx.t_f32();
            p.find_type(&mut module.cx, f32t);
        }
        if let Some(dims) = module.func(func).reqd_work_group_size {
            // These become the workgroup-size constant only when the builtin
            // is actually referenced.
            if has_wg_builtin {
                for d in dims {
                    let c = module.cx.c_i32(d);
                    p.find_constant(&mut module.cx, c);
                }
            }
        }
        super::args::synthesize_kernel_arg_resources(
            p,
            module,
            func,
            &mut gvars_for_type,
            &mut arg_ty_map,
        )?;
        find_type_per_func(p, module, func);
        find_constant_per_func(p, module, func);
    }

    // Then everything else.
    for f in 0..nfuncs {
        let func = Func(f as u32);
        if module.func(func).blocks.is_empty() || module.func(func).is_kernel {
            continue;
        }
        scan_insts_for_synthetics(p, module, func, false);
        if has_image_types {
            let f32t = module.cx.t_f32();
            p.find_type(&mut module.cx, f32t);
        }
        find_type_per_func(p, module, func);
        find_constant_per_func(p, module, func);
    }
    Ok(())
}

/// Registers the constants instructions will need beyond their own operands:
/// the select pair for boolean-widening casts, the LOD literal for image
/// reads, and the `<2 x i32>` intermediate for image-size queries.
fn scan_insts_for_synthetics(
    p: &mut Producer<'_>,
    module: &mut ir::Module,
    func: Func,
    kernel_pass: bool,
) {
    for ii in 0..module.func(func).insts.len() {
        let def = module.func(func).insts[ii].clone();
        match &def.kind {
            InstKind::Cast { op: op @ (CastOp::ZExt | CastOp::SExt | CastOp::UiToFp), value } => {
                let src_ty = module.value_type(func, *value);
                if !module.cx.is_bool_or_bool_vector(src_ty) {
                    continue;
                }
                // The cast becomes an OpSelect, which needs its two arms.
                match op {
                    CastOp::ZExt => {
                        let zero = widening_int_const(&mut module.cx, def.ty, SelectArm::Zero);
                        p.find_constant(&mut module.cx, zero);
                        let one = widening_int_const(&mut module.cx, def.ty, SelectArm::One);
                        p.find_constant(&mut module.cx, one);
                    }
                    CastOp::SExt => {
                        let zero = widening_int_const(&mut module.cx, def.ty, SelectArm::Zero);
                        p.find_constant(&mut module.cx, zero);
                        let ones =
                            widening_int_const(&mut module.cx, def.ty, SelectArm::AllOnes);
                        p.find_constant(&mut module.cx, ones);
                    }
                    _ => {
                        let zero = module.cx.c_f32(0.0);
                        p.find_constant(&mut module.cx, zero);
                        let one = module.cx.c_f32(1.0);
                        p.find_constant(&mut module.cx, one);
                    }
                }
            }
            InstKind::Call { callee, args } => {
                if callee == builtins::READ_IMAGE_2D || callee == builtins::READ_IMAGE_3D {
                    let image_ptr_ty = module.value_type(func, args[0]);
                    if let Some((_, image_ty)) = module.cx.as_pointer(image_ptr_ty) {
                        p.image_types.entry(image_ty).or_insert(0);
                    }
                    let lod = module.cx.c_f32(0.0);
                    p.find_constant(&mut module.cx, lod);
                }
                if kernel_pass && builtins::IMAGE_QUERY_FNS.contains(&callee.as_str()) {
                    // The query produces a <2 x i32> before the component is
                    // extracted.
                    let i32t = module.cx.t_i32();
                    let v2i32 = module.cx.t_vec(i32t, 2);
                    p.find_type(&mut module.cx, v2i32);
                }
            }
            _ => {}
        }
    }
}

fn find_type_per_func(p: &mut Producer<'_>, module: &mut ir::Module, func: Func) {
    let (is_kernel, ret_type, param_tys): (bool, Type, SmallVec<[Type; 4]>) = {
        let fdef = module.func(func);
        (fdef.is_kernel, fdef.ret_type, fdef.params.iter().map(|pm| pm.ty).collect())
    };

    if is_kernel {
        // Kernel entry points take no parameters on the target side.
        let fn_ty = module.cx.t_fn(ret_type, []);
        p.find_type(&mut module.cx, fn_ty);
    } else {
        let fn_ty = module.cx.t_fn(ret_type, param_tys.iter().copied());
        if let Some(&(_, index)) = p.global_const_func_params.get(&fn_ty) {
            let mut new_params = param_tys;
            if let Some((_, pointee)) = module.cx.as_pointer(new_params[index as usize]) {
                new_params[index as usize] =
                    module.cx.t_ptr(AddrSpace::ModuleScopePrivate, pointee);
            }
            let new_fn_ty = module.cx.t_fn(ret_type, new_params);
            p.global_const_func_params.insert(fn_ty, (new_fn_ty, index));
            p.find_type(&mut module.cx, new_fn_ty);
        } else {
            p.find_type(&mut module.cx, fn_ty);
        }
    }

    for ii in 0..module.func(func).insts.len() {
        let def = module.func(func).insts[ii].clone();

        if let InstKind::ShuffleVector { a, b, .. } = &def.kind {
            for v in [*a, *b] {
                let ty = module.value_type(func, v);
                p.find_type(&mut module.cx, ty);
            }
            p.find_type(&mut module.cx, def.ty);
            continue;
        }

        let values = operand_values(&def);

        // Constant operands always contribute their type.
        for &v in &values {
            if let Value::Const(ct) = v {
                let ty = module.cx.const_def(ct).ty;
                p.find_type(&mut module.cx, ty);
            }
        }

        let is_call = matches!(def.kind, InstKind::Call { .. });
        if !is_call {
            for &v in &values {
                let ty = module.value_type(func, v);
                p.find_type(&mut module.cx, ty);
            }
        }

        // This call is replaced outright, so its type never materializes.
        if matches!(&def.kind, InstKind::Call { callee, .. } if callee == builtins::SAMPLER_INIT_FN)
        {
            continue;
        }

        if let InstKind::Gep { base, .. } = &def.kind {
            let base_ty = module.value_type(func, *base);
            if matches!(module.cx.as_pointer(base_ty), Some((AddrSpace::ModuleScopePrivate, _))) {
                // The gep inherits the rewritten address space of the
                // constant global it indexes.
                if let Some((_, pointee)) = module.cx.as_pointer(def.ty) {
                    let private_ptr = module.cx.t_ptr(AddrSpace::ModuleScopePrivate, pointee);
                    p.find_type(&mut module.cx, private_ptr);
                }
                continue;
            }
        }

        p.find_type(&mut module.cx, def.ty);
    }
}

fn find_constant_per_func(p: &mut Producer<'_>, module: &mut ir::Module, func: Func) {
    for ii in 0..module.func(func).insts.len() {
        let def = module.func(func).insts[ii].clone();

        match &def.kind {
            InstKind::Call { callee, .. } if callee == builtins::SAMPLER_INIT_FN => continue,
            // The element-count operand of an alloca never reaches the output.
            InstKind::Alloca { .. } => continue,
            InstKind::ShuffleVector { a, b, .. } => {
                for v in [*a, *b] {
                    if let Value::Const(ct) = v {
                        p.find_constant(&mut module.cx, ct);
                    }
                }
                continue;
            }
            InstKind::InsertElement { vector, value, index } => {
                let comp_ty = module.value_type(func, *vector);
                if module.cx.is_4xi8(comp_ty) {
                    for v in [*vector, *value] {
                        if let Value::Const(ct) = v {
                            p.find_constant(&mut module.cx, ct);
                        }
                    }
                    let mask = module.cx.c_i32(0xFF);
                    p.find_constant(&mut module.cx, mask);
                    if let Value::Const(ct) = index {
                        if let ConstKind::Int(i) = module.cx.const_def(*ct).kind {
                            let shift = module.cx.c_i32((i as u32) * 8);
                            p.find_constant(&mut module.cx, shift);
                        }
                    }
                } else {
                    // The insertion index lowers to a literal.
                    for v in [*vector, *value] {
                        if let Value::Const(ct) = v {
                            p.find_constant(&mut module.cx, ct);
                        }
                    }
                }
                continue;
            }
            InstKind::ExtractElement { vector, index } => {
                let comp_ty = module.value_type(func, *vector);
                if module.cx.is_4xi8(comp_ty) {
                    if let Value::Const(ct) = vector {
                        p.find_constant(&mut module.cx, *ct);
                    }
                    let mask = module.cx.c_i32(0xFF);
                    p.find_constant(&mut module.cx, mask);
                    match index {
                        Value::Const(ct)
                            if matches!(module.cx.const_def(*ct).kind, ConstKind::Int(_)) =>
                        {
                            if let ConstKind::Int(i) = module.cx.const_def(*ct).kind {
                                let shift = module.cx.c_i32((i as u32) * 8);
                                p.find_constant(&mut module.cx, shift);
                            }
                        }
                        _ => {
                            // A runtime index is scaled by 8 bits at runtime.
                            let eight = module.cx.c_i32(8);
                            p.find_constant(&mut module.cx, eight);
                        }
                    }
                } else if let Value::Const(ct) = vector {
                    p.find_constant(&mut module.cx, *ct);
                }
                continue;
            }
            InstKind::Binary { op: BinOp::Xor, lhs, rhs }
                if matches!(module.cx.type_kind(def.ty), TypeKind::Bool) =>
            {
                // `xor i1 %x, true` becomes OpLogicalNot; the true constant
                // itself is never materialized.
                let mut found_true = false;
                for v in [*lhs, *rhs] {
                    if let Value::Const(ct) = v {
                        let is_false =
                            matches!(module.cx.const_def(ct).kind, ConstKind::Bool(false));
                        if is_false || found_true {
                            p.find_constant(&mut module.cx, ct);
                        } else {
                            found_true = true;
                        }
                    }
                }
                continue;
            }
            InstKind::Cast { op: CastOp::Trunc, .. }
                if matches!(module.cx.type_kind(def.ty), TypeKind::Int { width: 8 }) =>
            {
                // Truncation to i8 keeps the low byte via a mask.
                let mask = module.cx.c_i32(0xFF);
                p.find_constant(&mut module.cx, mask);
            }
            InstKind::AtomicRmw { .. } => {
                let sc = module.cx.c_i32(spec::scope::Device);
                p.find_constant(&mut module.cx, sc);
                let sem = module.cx.c_i32(
                    spec::memory_semantics::UniformMemory
                        | spec::memory_semantics::SequentiallyConsistent,
                );
                p.find_constant(&mut module.cx, sem);
            }
            _ => {}
        }

        for v in operand_values(&def) {
            if let Value::Const(ct) = v {
                p.find_constant(&mut module.cx, ct);
            }
        }
    }
}

/// Scans for calls implemented via GLSL.std.450, registering the follow-up
/// constants for the indirect ones. Returns whether an import is needed.
fn find_ext_inst(p: &mut Producer<'_>, module: &mut ir::Module) -> bool {
    let mut has_ext_inst = false;
    for f in 0..module.funcs.len() {
        let func = Func(f as u32);
        for ii in 0..module.func(func).insts.len() {
            let def = module.func(func).insts[ii].clone();
            let InstKind::Call { callee, .. } = &def.kind else { continue };

            let direct = builtins::ext_inst(callee);
            let indirect = builtins::indirect_ext_inst(callee);
            has_ext_inst |= direct.is_some() || indirect.is_some();

            let Some(indirect) = indirect else { continue };
            // Register the constant the follow-up instruction consumes,
            // splatted when the call produces a vector.
            let scalar = if indirect == spec::glsl::FindUMsb {
                module.cx.c_i32(31)
            } else {
                module.cx.c_f32(builtins::ONE_OVER_PI as f32)
            };
            let scalar_ty = module.cx.const_def(scalar).ty;
            p.find_type(&mut module.cx, scalar_ty);
            p.find_constant(&mut module.cx, scalar);
            if matches!(module.cx.type_kind(def.ty), TypeKind::Vector { .. }) {
                let splat = module.cx.c_splat(def.ty, scalar);
                p.find_constant(&mut module.cx, splat);
                p.find_type(&mut module.cx, def.ty);
            }
        }
    }
    has_ext_inst
}
