//! The lowering pass: IR in, SPIR-V module plus descriptor map out.
//!
//! [`produce`] drives the phases in their required order:
//!
//! 1. discovery (interns every type/constant the output will reference,
//!    synthesizes kernel-argument resource variables, imports GLSL.std.450)
//! 2. type emission, constant emission
//! 3. module-scope variables (literal samplers, globals, workgroup arrays)
//! 4. per-function code
//! 5. deferred fixup (branches, phis, calls, structured merges)
//! 6. deferred decorations (ArrayStride, SpecId)
//! 7. the module prefix (capabilities … execution modes)
//! 8. serialization with the bound patched into the header
//!
//! All tables live on [`Producer`]; each phase mutates them in place. Nothing
//! is ever removed from a table, and iteration over the ordered ones
//! (`types`, `constants`, …) fixes id assignment, which is what makes the
//! output byte-for-byte reproducible.

mod args;
mod builtins;
mod consts;
mod decor;
mod discover;
mod fixup;
mod globals;
mod inst;
mod module_info;
mod types;

use crate::descmap::DescriptorMap;
use crate::ir::{self, AddrSpace, Block, Const, Func, GlobalVar, Type, Value};
use crate::spv::{self, spec, Id, Opcode};
use crate::{Error, FxIndexMap, FxIndexSet, Options, OutputFormat, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

/// Everything the pass hands back to the driver.
#[derive(Debug)]
pub struct Output {
    /// The module, rendered per [`Options::output`] (binary words, assembly
    /// text, or a C initializer list — text modes are UTF-8 bytes).
    pub shader: Vec<u8>,
    /// The descriptor-map sidecar, one record per line.
    pub descriptor_map: String,
}

/// Runs the whole lowering pass over `module`.
///
/// The module is taken mutably: discovery rewrites `__constant` globals into
/// module-scope-private storage and appends the synthesized kernel-argument
/// resource variables.
pub fn produce(module: &mut ir::Module, opts: &Options) -> Result<Output> {
    let mut p = Producer::new(opts);

    p.allocate_arg_spec_ids(module);
    discover::run(&mut p, module)?;
    types::generate(&mut p, module)?;
    consts::generate(&mut p, module)?;
    globals::generate_samplers(&mut p, module)?;
    for gv in 0..module.global_vars.len() {
        globals::generate_global_var(&mut p, module, GlobalVar(gv as u32))?;
    }
    globals::generate_workgroup_vars(&mut p);

    for f in 0..module.funcs.len() {
        let func = Func(f as u32);
        // A function without a body is a declaration (a builtin); nothing to
        // generate for it.
        if module.func(func).blocks.is_empty() {
            continue;
        }
        args::func_prologue(&mut p, module, func)?;
        inst::func_body(&mut p, module, func)?;
        p.insts.push(spv::Inst::new(Opcode::OpFunctionEnd, []));
    }

    fixup::run(&mut p, module)?;
    decor::run(&mut p, module)?;
    module_info::generate(&mut p, module)?;

    let bound = p.next_id;
    let shader = match opts.output {
        OutputFormat::Binary => spv::write::write_binary(&p.insts, bound),
        OutputFormat::Assembly => spv::asm::write_assembly(&p.insts, bound).into_bytes(),
        OutputFormat::CInitList => {
            spv::write::c_initializer_list(&spv::write::write_binary(&p.insts, bound))
                .into_bytes()
        }
    };
    Ok(Output { shader, descriptor_map: p.dmap.finish() })
}

/// Ids and types reserved for one pointer-to-local kernel argument.
pub(crate) struct LocalArgInfo {
    /// The Workgroup-class array variable.
    pub variable_id: Id,
    pub elem_type: Type,
    /// The array length, an `OpSpecConstant`.
    pub array_size_id: Id,
    pub array_type_id: Id,
    pub ptr_array_type_id: Id,
    /// The `OpAccessChain` to element 0, emitted at kernel entry.
    pub first_elem_ptr_id: Id,
    pub spec_id: i32,
}

/// A lowering postponed until every label/function id exists.
pub(crate) struct DeferredInst {
    pub func: Func,
    pub block: Block,
    pub inst: ir::Inst,
    /// Index of the instruction the result must be inserted after.
    pub insert_after: usize,
    /// The result id reserved at defer time, if the form produces a value.
    pub reserved: Option<Id>,
    /// The follow-up result id for indirectly-implemented extended
    /// instructions (`clz`, the `*pi` trig family).
    pub indirect: Option<Id>,
}

pub(crate) struct Producer<'a> {
    pub opts: &'a Options,
    pub next_id: Id,
    pub insts: Vec<spv::Inst>,
    pub dmap: DescriptorMap,

    /// Types in discovery order; position fixes emission order.
    pub types: FxIndexSet<Type>,
    pub type_map: FxHashMap<Type, Id>,
    /// Image types used by sampled reads → their `OpTypeSampledImage` id.
    pub image_types: FxIndexMap<Type, Id>,
    /// Constants in discovery order.
    pub constants: FxIndexSet<Const>,
    pub const_map: FxHashMap<Const, Id>,
    /// Constants already emitted out-of-band (array lengths).
    pub allocated_consts: FxHashMap<Const, Id>,

    pub inst_map: FxHashMap<(Func, ir::Inst), Id>,
    pub arg_ids: FxHashMap<(Func, u32), Id>,
    pub global_map: FxHashMap<GlobalVar, Id>,
    pub block_map: FxHashMap<(Func, Block), Id>,
    pub func_map: FxHashMap<Func, Id>,

    /// Kernel argument → its module-scope resource variable, in creation order.
    pub arg_gv: FxIndexMap<(Func, u32), GlobalVar>,
    /// Kernel argument → the resource variable's id (stable even after the
    /// argument's own id is rebound to a load or access chain).
    pub arg_gv_ids: FxHashMap<(Func, u32), Id>,
    /// Resource variables whose binding decorations are already emitted.
    pub gvar_with_binding: FxHashSet<GlobalVar>,
    /// Pointer-to-local arguments in discovery order.
    pub local_args: Vec<(Func, u32)>,
    pub local_arg_info: FxHashMap<(Func, u32), LocalArgInfo>,
    pub arg_spec_ids: FxHashMap<(Func, u32), i32>,
    pub next_descriptor_set: u32,

    pub entry_points: Vec<(Func, Id)>,
    /// Input-class globals; every entry point lists all of them.
    pub interfaces: Vec<GlobalVar>,
    pub ext_inst_import_id: Option<Id>,
    /// Spec-constant ids for the default workgroup-size dimensions.
    pub builtin_dim_ids: Vec<Id>,
    pub uses_variable_pointers: bool,
    /// `ptr(UniformConstant, opencl.sampler_t)`, when a sampler map exists.
    pub sampler_ty: Option<Type>,
    /// Sampler mask literal → its variable id.
    pub sampler_ids: FxIndexMap<u32, Id>,
    /// Function type → (rewritten function type, constant-pointer param index).
    pub global_const_func_params: FxHashMap<Type, (Type, u32)>,
    /// Non-kernel parameters rewritten into module-scope-private space.
    pub global_const_args: FxHashSet<(Func, u32)>,
    pub types_needing_array_stride: FxIndexSet<Type>,
    /// Kernel-argument pointer type → its `OpTypeRuntimeArray` id.
    pub runtime_array_ids: FxHashMap<Type, Id>,
    /// `__constant` globals dropped for having no uses.
    pub dead_globals: FxHashSet<GlobalVar>,
    pub workgroup_size_value_id: Option<Id>,
    pub workgroup_size_var_id: Option<Id>,
    pub constant_i32_zero_id: Option<Id>,

    pub deferred: Vec<DeferredInst>,
}

impl<'a> Producer<'a> {
    fn new(opts: &'a Options) -> Self {
        Self {
            opts,
            next_id: 1,
            insts: Vec::new(),
            dmap: DescriptorMap::new(),
            types: FxIndexSet::default(),
            type_map: FxHashMap::default(),
            image_types: FxIndexMap::default(),
            constants: FxIndexSet::default(),
            const_map: FxHashMap::default(),
            allocated_consts: FxHashMap::default(),
            inst_map: FxHashMap::default(),
            arg_ids: FxHashMap::default(),
            global_map: FxHashMap::default(),
            block_map: FxHashMap::default(),
            func_map: FxHashMap::default(),
            arg_gv: FxIndexMap::default(),
            arg_gv_ids: FxHashMap::default(),
            gvar_with_binding: FxHashSet::default(),
            local_args: Vec::new(),
            local_arg_info: FxHashMap::default(),
            arg_spec_ids: FxHashMap::default(),
            next_descriptor_set: 0,
            entry_points: Vec::new(),
            interfaces: Vec::new(),
            ext_inst_import_id: None,
            builtin_dim_ids: Vec::new(),
            uses_variable_pointers: false,
            sampler_ty: None,
            sampler_ids: FxIndexMap::default(),
            global_const_func_params: FxHashMap::default(),
            global_const_args: FxHashSet::default(),
            types_needing_array_stride: FxIndexSet::default(),
            runtime_array_ids: FxHashMap::default(),
            dead_globals: FxHashSet::default(),
            workgroup_size_value_id: None,
            workgroup_size_var_id: None,
            constant_i32_zero_id: None,
            deferred: Vec::new(),
        }
    }

    /// Returns the next result id and advances the allocator.
    pub fn reserve_id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Inserts mid-list, keeping the recorded positions of deferred
    /// instructions pointing at the same instructions they did before.
    pub fn insert_inst(&mut self, index: usize, inst: spv::Inst) {
        self.insts.insert(index, inst);
        for d in &mut self.deferred {
            if d.insert_after >= index {
                d.insert_after += 1;
            }
        }
    }

    /// Spec ids 0–2 belong to the workgroup-size dimensions; every
    /// pointer-to-local kernel argument takes the next one, in kernel and
    /// argument order.
    fn allocate_arg_spec_ids(&mut self, module: &ir::Module) {
        let mut next = 3;
        for func in module.funcs() {
            if !module.func(func).is_kernel {
                continue;
            }
            for (i, param) in module.func(func).params.iter().enumerate() {
                if matches!(
                    module.cx.as_pointer(param.ty),
                    Some((AddrSpace::Local, _))
                ) {
                    self.arg_spec_ids.insert((func, i as u32), next);
                    next += 1;
                }
            }
        }
    }

    /// The SPIR-V id of an IR type; fails fatally if discovery never
    /// registered it. Pointers to opaque handle types resolve to the handle
    /// type itself, except in UniformConstant space.
    pub fn lookup_type(&self, cx: &ir::Context, ty: Type) -> Result<Id> {
        let mut ty = ty;
        if let Some((space, pointee)) = cx.as_pointer(ty) {
            if space != AddrSpace::UniformConstant && cx.opaque_name(pointee).is_some() {
                ty = pointee;
            }
        }
        self.type_map
            .get(&ty)
            .copied()
            .ok_or_else(|| Error::UnknownType(cx.type_to_string(ty)))
    }

    pub fn const_id(&self, cx: &ir::Context, ct: Const) -> Result<Id> {
        self.const_map
            .get(&ct)
            .copied()
            .ok_or_else(|| Error::UnknownValue(cx.const_to_string(ct)))
    }

    /// The id of an interned constant looked up by shape, without interning.
    pub fn known_const_id(&self, cx: &ir::Context, def: &ir::ConstDef) -> Result<Id> {
        let ct = cx
            .get_const(def)
            .ok_or_else(|| Error::UnknownValue(format!("{def:?}")))?;
        self.const_id(cx, ct)
    }

    pub fn value_id(&self, module: &ir::Module, func: Func, v: Value) -> Result<Id> {
        let missing = || Error::UnknownValue(format!("{v:?}"));
        match v {
            Value::Const(ct) => self.const_id(&module.cx, ct),
            Value::Inst(inst) => self.inst_map.get(&(func, inst)).copied().ok_or_else(missing),
            Value::Arg { func: f, index } => {
                self.arg_ids.get(&(f, index)).copied().ok_or_else(missing)
            }
            Value::Global(gv) => self.global_map.get(&gv).copied().ok_or_else(missing),
        }
    }

    /// The id of the scalar `i32 0` constant, re-referenced by the access
    /// chains over wrapped kernel arguments.
    pub fn i32_zero_id(&self) -> Result<Id> {
        self.constant_i32_zero_id
            .ok_or_else(|| Error::UnknownValue("i32 0".to_owned()))
    }

    /// Insertion index for decorations: just before the first instruction
    /// that is neither a decoration nor the extended-instruction import.
    pub fn deco_insert_point(&self) -> usize {
        self.insts
            .iter()
            .position(|inst| {
                !inst.opcode.is_decoration() && inst.opcode != Opcode::OpExtInstImport
            })
            .unwrap_or(self.insts.len())
    }

    pub fn storage_class(space: AddrSpace) -> u32 {
        match space {
            AddrSpace::Private => spec::storage_class::Function,
            AddrSpace::Global | AddrSpace::Constant => spec::storage_class::StorageBuffer,
            AddrSpace::Input => spec::storage_class::Input,
            AddrSpace::Local => spec::storage_class::Workgroup,
            AddrSpace::UniformConstant => spec::storage_class::UniformConstant,
            AddrSpace::Uniform => spec::storage_class::Uniform,
            AddrSpace::ModuleScopePrivate => spec::storage_class::Private,
        }
    }

    /// The builtin role of a module-scope variable, keyed by its name.
    pub fn builtin_for_name(name: &str) -> Option<u32> {
        match name {
            "__spirv_GlobalInvocationId" => Some(spec::builtin::GlobalInvocationId),
            "__spirv_LocalInvocationId" => Some(spec::builtin::LocalInvocationId),
            "__spirv_WorkgroupSize" => Some(spec::builtin::WorkgroupSize),
            "__spirv_NumWorkgroups" => Some(spec::builtin::NumWorkgroups),
            "__spirv_WorkgroupId" => Some(spec::builtin::WorkgroupId),
            _ => None,
        }
    }
}

/// The reuse table for kernel-argument resource variables: per wrapper type,
/// the `(kernel ordinal, binding, variable ordinal)` tuples of existing
/// variables. `BTreeSet` fixes the scan order independent of insertion
/// history, which keeps reuse deterministic.
pub(crate) type GvarsForType = FxHashMap<Type, BTreeSet<(u32, u32, u32)>>;
