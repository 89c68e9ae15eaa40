//! Boundary behaviors and option toggles, checked per feature.

mod common;

use common::{count_ops, produce_asm, produce_words};
use smallvec::smallvec;
use spvgen::ir::{
    AddrSpace, AtomicOp, BinOp, Block, CmpPred, Func, FunctionDef, GlobalVarDef, InstKind, Module,
    Value,
};
use spvgen::{produce, Error, Options, OutputFormat};

/// A kernel taking `global int* p` with the given name; handy scaffolding.
fn pointer_kernel(m: &mut Module, name: &str, func: Func) -> (FunctionDef, Block) {
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);
    let _ = func;
    let mut f = FunctionDef::new(name, true, void);
    f.add_param("p", p_i32);
    let entry = f.add_block("entry");
    (f, entry)
}

fn store_zero_body(m: &mut Module, f: &mut FunctionDef, entry: Block, func: Func) {
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);
    let zero = m.cx.c_i32(0);
    let gep = f.push(
        entry,
        p_i32,
        InstKind::Gep {
            base: Value::Arg { func, index: 0 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    f.push(entry, void, InstKind::Store { ptr: Value::Inst(gep), value: Value::Const(zero) });
    f.push(entry, void, InstKind::Return { value: None });
}

#[test]
fn no_extended_calls_no_import() {
    let mut m = Module::new();
    let func = Func(0);
    let (mut f, entry) = pointer_kernel(&mut m, "k", func);
    store_zero_body(&mut m, &mut f, entry, func);
    m.add_func(f);
    let (asm, _) = produce_asm(&mut m, Options::default());
    assert!(!asm.contains("OpExtInstImport"));
}

/// A module global named `__spirv_WorkgroupSize` plus a kernel without
/// `reqd_work_group_size`: the three dimensions become spec constants.
#[test]
fn workgroup_size_without_reqd_uses_spec_constants() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let v3i = m.cx.t_vec(i32t, 3);
    let gv = m.add_global(GlobalVarDef {
        name: "__spirv_WorkgroupSize".to_owned(),
        value_type: v3i,
        addr_space: AddrSpace::ModuleScopePrivate,
        initializer: None,
    });

    let mut f = FunctionDef::new("k", true, void);
    let entry = f.add_block("entry");
    let load = f.push(entry, v3i, InstKind::Load { ptr: Value::Global(gv) });
    let _ = load;
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let (asm, _) = produce_asm(&mut m, Options::default());
    assert_eq!(count_ops(&asm, "OpSpecConstant"), 3);
    assert_eq!(count_ops(&asm, "OpSpecConstantComposite"), 1);
    for spec_id in 0..3 {
        assert!(asm.contains(&format!("SpecId {spec_id}")));
    }
    assert!(asm.contains("BuiltIn WorkgroupSize"));
    // The load of the fake variable is rewritten to a bitwise-and of the
    // value with itself.
    assert_eq!(count_ops(&asm, "OpLoad"), 0);
    assert_eq!(count_ops(&asm, "OpBitwiseAnd"), 1);
}

#[test]
fn hack_initializers_stores_workgroup_size_at_entry() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let v3i = m.cx.t_vec(i32t, 3);
    let gv = m.add_global(GlobalVarDef {
        name: "__spirv_WorkgroupSize".to_owned(),
        value_type: v3i,
        addr_space: AddrSpace::ModuleScopePrivate,
        initializer: None,
    });
    let mut f = FunctionDef::new("k", true, void);
    let entry = f.add_block("entry");
    f.push(entry, v3i, InstKind::Load { ptr: Value::Global(gv) });
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let opts = Options { hack_initializers: true, ..Options::default() };
    let (asm, _) = produce_asm(&mut m, opts);
    assert_eq!(count_ops(&asm, "OpStore"), 1);
}

fn constant_data_module(elems: u32) -> Module {
    let mut m = Module::new();
    let i8t = m.cx.t_i8();
    let arr = m.cx.t_array(i8t, elems);
    let null = m.cx.c_null(arr);
    let gv = m.add_global(GlobalVarDef {
        name: "data".to_owned(),
        value_type: arr,
        addr_space: AddrSpace::Constant,
        initializer: Some(null),
    });

    let void = m.cx.t_void();
    let i8p = m.cx.t_ptr(AddrSpace::Constant, i8t);
    let zero = m.cx.c_i32(0);
    let mut f = FunctionDef::new("k", true, void);
    let entry = f.add_block("entry");
    let gep = f.push(
        entry,
        i8p,
        InstKind::Gep {
            base: Value::Global(gv),
            indices: smallvec![Value::Const(zero), Value::Const(zero)],
        },
    );
    let _ = gep;
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);
    m
}

#[test]
fn oversized_constant_data_is_rejected_in_storage_buffer_mode() {
    let opts =
        Options { module_constants_in_storage_buffer: true, ..Options::default() };
    let err = produce(&mut constant_data_module(65537), &opts).unwrap_err();
    assert_eq!(err, Error::ConstantDataTooLarge { used: 65537, limit: 65536 });

    // At the cap it still fits.
    assert!(produce(&mut constant_data_module(65536), &opts).is_ok());
}

#[test]
fn constant_data_is_rewritten_to_private_by_default() {
    let (asm, dmap) = produce_asm(&mut constant_data_module(65537), Options::default());
    // The data variable lands in Private storage with its initializer.
    assert!(asm.contains("OpVariable %") && asm.contains(" Private"));
    assert!(!dmap.contains("hexbytes"));
}

#[test]
fn constant_data_in_storage_buffer_mode_emits_hexbytes() {
    let mut m = Module::new();
    let i32t = m.cx.t_i32();
    let arr = m.cx.t_array(i32t, 2);
    let a = m.cx.c_i32(0x11223344);
    let b = m.cx.c_i32(0x55667788);
    let init = m.cx.c_composite(arr, [a, b]);
    let gv = m.add_global(GlobalVarDef {
        name: "data".to_owned(),
        value_type: arr,
        addr_space: AddrSpace::Constant,
        initializer: Some(init),
    });

    let void = m.cx.t_void();
    let p_c = m.cx.t_ptr(AddrSpace::Constant, i32t);
    let zero = m.cx.c_i32(0);
    let mut f = FunctionDef::new("k", true, void);
    let entry = f.add_block("entry");
    f.push(
        entry,
        p_c,
        InstKind::Gep {
            base: Value::Global(gv),
            indices: smallvec![Value::Const(zero), Value::Const(zero)],
        },
    );
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let opts =
        Options { module_constants_in_storage_buffer: true, ..Options::default() };
    let (_, dmap) = produce_asm(&mut m, opts);
    assert!(dmap.contains("constant,descriptorSet,0,binding,0,kind,buffer,hexbytes,4433221188776655"));
}

#[test]
fn pod_args_in_uniform_buffer_changes_kind_and_class() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);
    let zero = m.cx.c_i32(0);
    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("x", i32t);
    f.add_param("y", p_i32);
    let entry = f.add_block("entry");
    let gep = f.push(
        entry,
        p_i32,
        InstKind::Gep {
            base: Value::Arg { func, index: 1 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    f.push(
        entry,
        void,
        InstKind::Store { ptr: Value::Inst(gep), value: Value::Arg { func, index: 0 } },
    );
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let opts = Options { pod_args_in_uniform_buffer: true, ..Options::default() };
    let (asm, dmap) = produce_asm(&mut m, opts);
    assert!(dmap.contains("argKind,pod_ubo"));
    assert!(asm.contains("OpTypePointer Uniform "));
    assert!(asm.contains("OpVariable %") && asm.contains(" Uniform"));
}

#[test]
fn kernels_share_one_descriptor_set_and_variables_by_default() {
    let mut m = Module::new();
    for (i, name) in ["ka", "kb"].iter().enumerate() {
        let func = Func(i as u32);
        let (mut f, entry) = pointer_kernel(&mut m, name, func);
        store_zero_body(&mut m, &mut f, entry, func);
        m.add_func(f);
    }
    let (asm, dmap) = produce_asm(&mut m, Options::default());
    // Same binding and set on both records, one shared variable.
    assert!(dmap.contains("kernel,ka,arg,p,argOrdinal,0,descriptorSet,0,binding,0"));
    assert!(dmap.contains("kernel,kb,arg,p,argOrdinal,0,descriptorSet,0,binding,0"));
    let storage_vars =
        asm.lines().filter(|l| l.contains("OpVariable") && l.contains("StorageBuffer")).count();
    assert_eq!(storage_vars, 1);
}

#[test]
fn distinct_descriptor_sets_split_kernels() {
    let mut m = Module::new();
    for (i, name) in ["ka", "kb"].iter().enumerate() {
        let func = Func(i as u32);
        let (mut f, entry) = pointer_kernel(&mut m, name, func);
        store_zero_body(&mut m, &mut f, entry, func);
        m.add_func(f);
    }
    let opts =
        Options { distinct_kernel_descriptor_sets: true, ..Options::default() };
    let (asm, dmap) = produce_asm(&mut m, opts);
    assert!(dmap.contains("kernel,ka,arg,p,argOrdinal,0,descriptorSet,0,binding,0"));
    assert!(dmap.contains("kernel,kb,arg,p,argOrdinal,0,descriptorSet,1,binding,0"));
    let storage_vars =
        asm.lines().filter(|l| l.contains("OpVariable") && l.contains("StorageBuffer")).count();
    assert_eq!(storage_vars, 2);
    assert!(asm.contains("DescriptorSet 1"));
}

#[test]
fn loops_get_loop_merge_and_selections_get_selection_merge() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let boolean = m.cx.t_bool();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);
    let zero = m.cx.c_i32(0);
    let ten = m.cx.c_i32(10);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("p", p_i32);
    let entry = f.add_block("entry");
    let header = f.add_block("header");
    let body = f.add_block("body");
    let exit = f.add_block("exit");

    f.push(entry, void, InstKind::Branch { target: header });

    let phi = f.push(
        header,
        i32t,
        InstKind::Phi {
            incoming: smallvec![(Value::Const(zero), entry)],
        },
    );
    let cmp = f.push(
        header,
        boolean,
        InstKind::Cmp { pred: CmpPred::ISlt, lhs: Value::Inst(phi), rhs: Value::Const(ten) },
    );
    f.push(
        header,
        void,
        InstKind::CondBranch { cond: Value::Inst(cmp), if_true: body, if_false: exit },
    );

    let gep = f.push(
        body,
        p_i32,
        InstKind::Gep {
            base: Value::Arg { func, index: 0 },
            indices: smallvec![Value::Inst(phi)],
        },
    );
    f.push(body, void, InstKind::Store { ptr: Value::Inst(gep), value: Value::Inst(phi) });
    f.push(body, void, InstKind::Branch { target: header });

    f.push(exit, void, InstKind::Return { value: None });

    // Wire the loop-carried value through the back edge.
    if let InstKind::Phi { incoming } = &mut f.insts[phi.0 as usize].kind {
        incoming.push((Value::Const(ten), body));
    }
    m.add_func(f);

    let (asm, _) = produce_asm(&mut m, Options::default());
    assert_eq!(count_ops(&asm, "OpLoopMerge"), 1);
    assert_eq!(count_ops(&asm, "OpPhi"), 1);

    // OpLoopMerge must immediately precede the conditional branch.
    let lines: Vec<&str> = asm.lines().collect();
    let merge_at = lines.iter().position(|l| l.contains("OpLoopMerge")).unwrap();
    assert!(lines[merge_at + 1].contains("OpBranchConditional"));
    // The phi sits right after its block's label.
    let phi_at = lines.iter().position(|l| l.contains("OpPhi")).unwrap();
    assert!(lines[phi_at - 1].contains("OpLabel"));
}

#[test]
fn rejoining_conditionals_get_selection_merge() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let boolean = m.cx.t_bool();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);
    let zero = m.cx.c_i32(0);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("p", p_i32);
    let entry = f.add_block("entry");
    let then = f.add_block("then");
    let join = f.add_block("join");

    let gep = f.push(
        entry,
        p_i32,
        InstKind::Gep {
            base: Value::Arg { func, index: 0 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    let load = f.push(entry, i32t, InstKind::Load { ptr: Value::Inst(gep) });
    let cmp = f.push(
        entry,
        boolean,
        InstKind::Cmp { pred: CmpPred::IEq, lhs: Value::Inst(load), rhs: Value::Const(zero) },
    );
    f.push(
        entry,
        void,
        InstKind::CondBranch { cond: Value::Inst(cmp), if_true: then, if_false: join },
    );
    f.push(then, void, InstKind::Store { ptr: Value::Inst(gep), value: Value::Const(zero) });
    f.push(then, void, InstKind::Branch { target: join });
    f.push(join, void, InstKind::Return { value: None });
    m.add_func(f);

    let (asm, _) = produce_asm(&mut m, Options::default());
    assert_eq!(count_ops(&asm, "OpSelectionMerge"), 1);
    let lines: Vec<&str> = asm.lines().collect();
    let merge_at = lines.iter().position(|l| l.contains("OpSelectionMerge")).unwrap();
    assert!(lines[merge_at + 1].contains("OpBranchConditional"));
    // The merge target is the false successor.
    let merge_line = lines[merge_at];
    let cond_line = lines[merge_at + 1];
    let false_target = cond_line.split_whitespace().last().unwrap();
    assert!(merge_line.contains(false_target));
}

#[test]
fn literal_samplers_require_and_use_the_sampler_map() {
    fn sampler_module() -> (Module, Func) {
        let mut m = Module::new();
        let void = m.cx.t_void();
        let smp_struct = m.cx.t_opaque("opencl.sampler_t");
        let p_smp = m.cx.t_ptr(AddrSpace::UniformConstant, smp_struct);
        let i32t = m.cx.t_i32();
        let literal = m.cx.c_i32(18);
        let _ = i32t;
        let mut f = FunctionDef::new("k", true, void);
        let entry = f.add_block("entry");
        f.push(
            entry,
            p_smp,
            InstKind::Call {
                callee: "__translate_sampler_initializer".to_owned(),
                args: smallvec![Value::Const(literal)],
            },
        );
        f.push(entry, void, InstKind::Return { value: None });
        let func = m.add_func(f);
        (m, func)
    }

    // Without a sampler map: fatal.
    let (mut m, _) = sampler_module();
    let err = produce(&mut m, &Options::default()).unwrap_err();
    assert_eq!(err, Error::MissingSamplerMap);

    // With one: a UniformConstant variable in its own set, loaded at the
    // call site, and a sampler record in the map.
    let (mut m, _) = sampler_module();
    let opts = Options {
        sampler_map: vec![(18, "CLK_NORMALIZED_COORDS_FALSE|CLK_ADDRESS_CLAMP".to_owned())],
        ..Options::default()
    };
    let (asm, dmap) = produce_asm(&mut m, opts);
    assert!(asm.contains("OpTypeSampler"));
    assert!(asm.contains("OpVariable %") && asm.contains("UniformConstant"));
    assert_eq!(count_ops(&asm, "OpLoad"), 1);
    assert!(dmap.contains(
        "sampler,18,samplerExpr,\"CLK_NORMALIZED_COORDS_FALSE|CLK_ADDRESS_CLAMP\",\
         descriptorSet,0,binding,0"
    ));
}

#[test]
fn atomics_use_device_scope_and_seqcst_semantics() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);
    let zero = m.cx.c_i32(0);
    let one = m.cx.c_i32(1);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("p", p_i32);
    let entry = f.add_block("entry");
    let gep = f.push(
        entry,
        p_i32,
        InstKind::Gep {
            base: Value::Arg { func, index: 0 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    f.push(
        entry,
        i32t,
        InstKind::AtomicRmw { op: AtomicOp::Add, ptr: Value::Inst(gep), value: Value::Const(one) },
    );
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let (asm, _) = produce_asm(&mut m, Options::default());
    assert_eq!(count_ops(&asm, "OpAtomicIAdd"), 1);
    // Scope Device = 1, semantics UniformMemory|SequentiallyConsistent = 80.
    assert!(asm.contains("OpConstant %1 1"));
    assert!(asm.contains("OpConstant %1 80"));
}

#[test]
fn four_by_i8_extract_lowers_to_shift_and_mask() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i8t = m.cx.t_i8();
    let i32t = m.cx.t_i32();
    let v4i8 = m.cx.t_vec(i8t, 4);
    let p_v4 = m.cx.t_ptr(AddrSpace::Global, v4i8);
    let zero = m.cx.c_i32(0);
    let two = m.cx.c_i32(2);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("p", p_v4);
    f.add_param("q", m.cx.t_ptr(AddrSpace::Global, i32t));
    let entry = f.add_block("entry");
    let gep_p = f.push(
        entry,
        p_v4,
        InstKind::Gep {
            base: Value::Arg { func, index: 0 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    let vec = f.push(entry, v4i8, InstKind::Load { ptr: Value::Inst(gep_p) });
    let elem = f.push(
        entry,
        i8t,
        InstKind::ExtractElement { vector: Value::Inst(vec), index: Value::Const(two) },
    );
    let q_ty = m.cx.t_ptr(AddrSpace::Global, i32t);
    let gep_q = f.push(
        entry,
        q_ty,
        InstKind::Gep {
            base: Value::Arg { func, index: 1 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    let widened = f.push(
        entry,
        i32t,
        InstKind::Cast { op: spvgen::ir::CastOp::ZExt, value: Value::Inst(elem) },
    );
    f.push(entry, void, InstKind::Store { ptr: Value::Inst(gep_q), value: Value::Inst(widened) });
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let (asm, _) = produce_asm(&mut m, Options::default());
    // No vector type materializes for <4 x i8>.
    assert_eq!(count_ops(&asm, "OpTypeVector"), 0);
    assert_eq!(count_ops(&asm, "OpShiftRightLogical"), 1);
    assert!(asm.contains("OpConstant %1 255"));
    assert!(asm.contains("OpConstant %1 16"), "element 2 shifts by 16 bits");
    assert!(count_ops(&asm, "OpBitwiseAnd") >= 1);
}

#[test]
fn four_by_i8_insert_lowers_to_mask_and_or() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i8t = m.cx.t_i8();
    let v4i8 = m.cx.t_vec(i8t, 4);
    let p_v4 = m.cx.t_ptr(AddrSpace::Global, v4i8);
    let zero = m.cx.c_i32(0);
    let one = m.cx.c_i32(1);
    let byte = m.cx.c_int(i8t, 0x7F);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("p", p_v4);
    let entry = f.add_block("entry");
    let gep = f.push(
        entry,
        p_v4,
        InstKind::Gep {
            base: Value::Arg { func, index: 0 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    let vec = f.push(entry, v4i8, InstKind::Load { ptr: Value::Inst(gep) });
    let updated = f.push(
        entry,
        v4i8,
        InstKind::InsertElement {
            vector: Value::Inst(vec),
            value: Value::Const(byte),
            index: Value::Const(one),
        },
    );
    f.push(entry, void, InstKind::Store { ptr: Value::Inst(gep), value: Value::Inst(updated) });
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let (asm, _) = produce_asm(&mut m, Options::default());
    // mask-shift, invert, clear, value-shift, or: the six-step insert minus
    // the shared shift amount constant.
    assert_eq!(count_ops(&asm, "OpShiftLeftLogical"), 2);
    assert_eq!(count_ops(&asm, "OpNot"), 1);
    assert_eq!(count_ops(&asm, "OpBitwiseAnd"), 1);
    assert_eq!(count_ops(&asm, "OpBitwiseOr"), 1);
    assert!(asm.contains("OpConstant %1 8"), "element 1 shifts by 8 bits");
    assert!(!asm.contains("OpTypeVector"));
}

#[test]
fn c_init_list_output_wraps_the_binary() {
    let mut m = Module::new();
    let func = Func(0);
    let (mut f, entry) = pointer_kernel(&mut m, "k", func);
    store_zero_body(&mut m, &mut f, entry, func);
    m.add_func(f);
    let opts = Options { output: OutputFormat::CInitList, ..Options::default() };
    let out = produce(&mut m, &opts).unwrap();
    let text = String::from_utf8(out.shader).unwrap();
    assert!(text.starts_with("{119734787,\n65536,\n"));
    assert!(text.trim_end().ends_with('}'));
}

#[test]
fn output_is_reproducible_and_modes_agree_on_the_bound() {
    let build = || {
        let mut m = Module::new();
        let func = Func(0);
        let (mut f, entry) = pointer_kernel(&mut m, "k", func);
        store_zero_body(&mut m, &mut f, entry, func);
        m.add_func(f);
        m
    };

    let words = produce_words(&mut build(), Options::default());
    let again = produce_words(&mut build(), Options::default());
    assert_eq!(words, again, "two runs over the same module must agree byte for byte");

    let (asm, _) = produce_asm(&mut build(), Options::default());
    assert!(asm.contains(&format!("; Bound: {}", words[3])));
}

#[test]
fn unsupported_instructions_are_rejected() {
    for (kind, name) in [
        (InstKind::Switch, "switch"),
        (InstKind::IndirectBranch, "indirect branch"),
        (InstKind::AtomicCmpXchg, "atomic cmpxchg"),
        (InstKind::Fence, "fence"),
    ] {
        let mut m = Module::new();
        let void = m.cx.t_void();
        let mut f = FunctionDef::new("k", true, void);
        let entry = f.add_block("entry");
        f.push(entry, void, kind);
        f.push(entry, void, InstKind::Return { value: None });
        m.add_func(f);
        let err = produce(&mut m, &Options::default()).unwrap_err();
        assert_eq!(err, Error::UnsupportedInst(name));
    }
}

#[test]
fn pointer_equality_is_rejected() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let boolean = m.cx.t_bool();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("p", p_i32);
    f.add_param("q", p_i32);
    let entry = f.add_block("entry");
    f.push(
        entry,
        boolean,
        InstKind::Cmp {
            pred: CmpPred::IEq,
            lhs: Value::Arg { func, index: 0 },
            rhs: Value::Arg { func, index: 1 },
        },
    );
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let err = produce(&mut m, &Options::default()).unwrap_err();
    assert_eq!(err, Error::PointerEquality { function: "k".to_owned() });
}

#[test]
fn barriers_and_popcount_lower_directly() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);
    let zero = m.cx.c_i32(0);
    let two = m.cx.c_i32(2);
    let sem = m.cx.c_i32(0x110);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("p", p_i32);
    let entry = f.add_block("entry");
    f.push(
        entry,
        void,
        InstKind::Call {
            callee: "__spirv_control_barrier".to_owned(),
            args: smallvec![Value::Const(two), Value::Const(two), Value::Const(sem)],
        },
    );
    let gep = f.push(
        entry,
        p_i32,
        InstKind::Gep {
            base: Value::Arg { func, index: 0 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    let load = f.push(entry, i32t, InstKind::Load { ptr: Value::Inst(gep) });
    let pop = f.push(
        entry,
        i32t,
        InstKind::Call {
            callee: "_Z8popcountj".to_owned(),
            args: smallvec![Value::Inst(load)],
        },
    );
    f.push(entry, void, InstKind::Store { ptr: Value::Inst(gep), value: Value::Inst(pop) });
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let (asm, _) = produce_asm(&mut m, Options::default());
    assert_eq!(count_ops(&asm, "OpControlBarrier"), 1);
    assert_eq!(count_ops(&asm, "OpBitCount"), 1);
    // popcount needs no extended import.
    assert!(!asm.contains("OpExtInstImport"));
}

#[test]
fn kernel_arg_map_metadata_drives_descriptor_records() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let p_local = m.cx.t_ptr(AddrSpace::Local, i32t);
    let p_glob = m.cx.t_ptr(AddrSpace::Global, i32t);
    let zero = m.cx.c_i32(0);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("l", p_local);
    f.add_param("out", p_glob);
    f.arg_map = Some(vec![
        spvgen::ir::ArgMapEntry {
            name: "l".to_owned(),
            old_index: 0,
            new_index: 0,
            offset: 0,
            arg_kind: "local".to_owned(),
            spec_id: 3,
        },
        spvgen::ir::ArgMapEntry {
            name: "out".to_owned(),
            old_index: 1,
            new_index: 1,
            offset: 0,
            arg_kind: "buffer".to_owned(),
            spec_id: 0,
        },
    ]);
    let entry = f.add_block("entry");
    let gep = f.push(
        entry,
        p_glob,
        InstKind::Gep {
            base: Value::Arg { func, index: 1 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    f.push(entry, void, InstKind::Store { ptr: Value::Inst(gep), value: Value::Const(zero) });
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let (_, dmap) = produce_asm(&mut m, Options::default());
    let lines: Vec<&str> = dmap.lines().collect();
    assert_eq!(
        lines,
        vec![
            "kernel,k,arg,l,argOrdinal,0,argKind,local,arrayElemSize,4,arrayNumElemSpecId,3",
            // binding = new_index minus the preceding pointer-to-local count.
            "kernel,k,arg,out,argOrdinal,1,descriptorSet,0,binding,0,offset,0,argKind,buffer",
        ]
    );
}

#[test]
fn i1_logic_lowers_to_logical_ops() {
    let mut m = Module::new();
    let void = m.cx.t_void();
    let i32t = m.cx.t_i32();
    let boolean = m.cx.t_bool();
    let p_i32 = m.cx.t_ptr(AddrSpace::Global, i32t);
    let zero = m.cx.c_i32(0);
    let t = m.cx.c_bool(true);

    let func = Func(0);
    let mut f = FunctionDef::new("k", true, void);
    f.add_param("p", p_i32);
    let entry = f.add_block("entry");
    let gep = f.push(
        entry,
        p_i32,
        InstKind::Gep {
            base: Value::Arg { func, index: 0 },
            indices: smallvec![Value::Const(zero)],
        },
    );
    let load = f.push(entry, i32t, InstKind::Load { ptr: Value::Inst(gep) });
    let cmp = f.push(
        entry,
        boolean,
        InstKind::Cmp { pred: CmpPred::IEq, lhs: Value::Inst(load), rhs: Value::Const(zero) },
    );
    let not = f.push(
        entry,
        boolean,
        InstKind::Binary { op: BinOp::Xor, lhs: Value::Inst(cmp), rhs: Value::Const(t) },
    );
    let both = f.push(
        entry,
        boolean,
        InstKind::Binary { op: BinOp::And, lhs: Value::Inst(cmp), rhs: Value::Inst(not) },
    );
    let sel = f.push(
        entry,
        i32t,
        InstKind::Select {
            cond: Value::Inst(both),
            if_true: Value::Const(zero),
            if_false: Value::Const(zero),
        },
    );
    f.push(entry, void, InstKind::Store { ptr: Value::Inst(gep), value: Value::Inst(sel) });
    f.push(entry, void, InstKind::Return { value: None });
    m.add_func(f);

    let (asm, _) = produce_asm(&mut m, Options::default());
    // xor-with-true folds to a logical not; the true constant never appears.
    assert_eq!(count_ops(&asm, "OpLogicalNot"), 1);
    assert_eq!(count_ops(&asm, "OpLogicalAnd"), 1);
    assert!(!asm.contains("OpConstantTrue"));
    assert!(!asm.contains("OpBitwiseXor"));
}
