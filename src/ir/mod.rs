//! The input IR consumed by the lowering pass.
//!
//! This is the interface to the rest of the compiler flow, kept deliberately
//! thin: a typed SSA module with structural interning for types and constants,
//! and exactly the instruction forms the lowering observes. Earlier passes
//! (inlining, structurization, address-space rewrites) are assumed to have
//! run; nothing here verifies them beyond what lowering itself checks.
//!
//! Types and constants are interned in a [`Context`] by structural identity,
//! giving them stable `u32` handles ([`Type`], [`Const`]). Insertion order is
//! preserved, which the lowering relies on for byte-reproducible output.

pub mod dom;
pub mod layout;
pub mod visit;

use crate::FxIndexSet;
use smallvec::SmallVec;

/// Interned handle for a [`TypeKind`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Type(u32);

/// Interned handle for a [`ConstDef`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Const(u32);

/// Handle for a function in a [`Module`] (index into `Module::funcs`).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Func(pub u32);

/// Handle for a module-scope variable (index into `Module::global_vars`).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct GlobalVar(pub u32);

/// Handle for a basic block within its function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Block(pub u32);

/// Handle for an instruction within its function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Inst(pub u32);

/// OpenCL-side address spaces, numbered the way the source language model
/// numbers them. The lowering maps these onto SPIR-V storage classes.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AddrSpace {
    Private,
    Global,
    Constant,
    Local,
    UniformConstant,
    Uniform,
    Input,
    /// Module-scope private storage, used for inlined `__constant` data.
    ModuleScopePrivate,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeKind {
    Void,
    Bool,
    Int { width: u32 },
    Float { width: u32 },
    Vector { elem: Type, count: u32 },
    Array { elem: Type, count: u32 },
    Struct { fields: SmallVec<[Type; 4]> },
    /// An opaque named struct (`opencl.sampler_t`, `opencl.image2d_ro_t`, …).
    Opaque { name: String },
    Pointer { space: AddrSpace, pointee: Type },
    Function { ret: Type, params: SmallVec<[Type; 4]> },
}

/// Definition for a [`Const`]: a typed immediate.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ConstDef {
    pub ty: Type,
    pub kind: ConstKind,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConstKind {
    Bool(bool),
    /// Zero-extended to 64 bits regardless of the type's width.
    Int(u64),
    /// The IEEE bit pattern, zero-extended to 64 bits.
    Float(u64),
    Null,
    Undef,
    Composite(SmallVec<[Const; 4]>),
}

/// Interner for types and constants. Handles are assigned in first-interning
/// order and never move.
#[derive(Default)]
pub struct Context {
    types: FxIndexSet<TypeKind>,
    consts: FxIndexSet<ConstDef>,
}

impl Context {
    pub fn intern_type(&mut self, kind: TypeKind) -> Type {
        let (index, _) = self.types.insert_full(kind);
        Type(index as u32)
    }

    /// Lookup without interning; `None` if the type was never interned.
    pub fn get_type(&self, kind: &TypeKind) -> Option<Type> {
        self.types.get_index_of(kind).map(|i| Type(i as u32))
    }

    pub fn type_kind(&self, ty: Type) -> &TypeKind {
        self.types.get_index(ty.0 as usize).unwrap()
    }

    pub fn intern_const(&mut self, def: ConstDef) -> Const {
        let (index, _) = self.consts.insert_full(def);
        Const(index as u32)
    }

    /// Lookup without interning; `None` if the constant was never interned.
    pub fn get_const(&self, def: &ConstDef) -> Option<Const> {
        self.consts.get_index_of(def).map(|i| Const(i as u32))
    }

    pub fn const_def(&self, ct: Const) -> &ConstDef {
        self.consts.get_index(ct.0 as usize).unwrap()
    }

    // Shorthands for the types the lowering reaches for constantly.

    pub fn t_void(&mut self) -> Type {
        self.intern_type(TypeKind::Void)
    }
    pub fn t_bool(&mut self) -> Type {
        self.intern_type(TypeKind::Bool)
    }
    pub fn t_int(&mut self, width: u32) -> Type {
        self.intern_type(TypeKind::Int { width })
    }
    pub fn t_i8(&mut self) -> Type {
        self.t_int(8)
    }
    pub fn t_i32(&mut self) -> Type {
        self.t_int(32)
    }
    pub fn t_f32(&mut self) -> Type {
        self.intern_type(TypeKind::Float { width: 32 })
    }
    pub fn t_vec(&mut self, elem: Type, count: u32) -> Type {
        self.intern_type(TypeKind::Vector { elem, count })
    }
    pub fn t_array(&mut self, elem: Type, count: u32) -> Type {
        self.intern_type(TypeKind::Array { elem, count })
    }
    pub fn t_struct(&mut self, fields: impl IntoIterator<Item = Type>) -> Type {
        self.intern_type(TypeKind::Struct { fields: fields.into_iter().collect() })
    }
    pub fn t_opaque(&mut self, name: &str) -> Type {
        self.intern_type(TypeKind::Opaque { name: name.to_owned() })
    }
    pub fn t_ptr(&mut self, space: AddrSpace, pointee: Type) -> Type {
        self.intern_type(TypeKind::Pointer { space, pointee })
    }
    pub fn t_fn(&mut self, ret: Type, params: impl IntoIterator<Item = Type>) -> Type {
        self.intern_type(TypeKind::Function { ret, params: params.into_iter().collect() })
    }

    pub fn c_bool(&mut self, v: bool) -> Const {
        let ty = self.t_bool();
        self.intern_const(ConstDef { ty, kind: ConstKind::Bool(v) })
    }
    pub fn c_int(&mut self, ty: Type, v: u64) -> Const {
        self.intern_const(ConstDef { ty, kind: ConstKind::Int(v) })
    }
    pub fn c_i32(&mut self, v: u32) -> Const {
        let ty = self.t_i32();
        self.c_int(ty, u64::from(v))
    }
    pub fn c_f32(&mut self, v: f32) -> Const {
        let ty = self.t_f32();
        self.intern_const(ConstDef { ty, kind: ConstKind::Float(u64::from(v.to_bits())) })
    }
    pub fn c_null(&mut self, ty: Type) -> Const {
        self.intern_const(ConstDef { ty, kind: ConstKind::Null })
    }
    pub fn c_undef(&mut self, ty: Type) -> Const {
        self.intern_const(ConstDef { ty, kind: ConstKind::Undef })
    }
    pub fn c_composite(&mut self, ty: Type, elems: impl IntoIterator<Item = Const>) -> Const {
        self.intern_const(ConstDef { ty, kind: ConstKind::Composite(elems.into_iter().collect()) })
    }
    /// A vector constant with every lane equal to `elem`.
    pub fn c_splat(&mut self, vec_ty: Type, elem: Const) -> Const {
        let count = match *self.type_kind(vec_ty) {
            TypeKind::Vector { count, .. } => count,
            _ => panic!("c_splat on non-vector type"),
        };
        self.c_composite(vec_ty, std::iter::repeat(elem).take(count as usize))
    }

    // Structural queries.

    /// `true` for `bool` and `<N x bool>`.
    pub fn is_bool_or_bool_vector(&self, ty: Type) -> bool {
        match *self.type_kind(ty) {
            TypeKind::Bool => true,
            TypeKind::Vector { elem, .. } => matches!(self.type_kind(elem), TypeKind::Bool),
            _ => false,
        }
    }

    /// `true` exactly for `<4 x i8>`.
    pub fn is_4xi8(&self, ty: Type) -> bool {
        match *self.type_kind(ty) {
            TypeKind::Vector { elem, count: 4 } => {
                matches!(*self.type_kind(elem), TypeKind::Int { width: 8 })
            }
            _ => false,
        }
    }

    pub fn as_pointer(&self, ty: Type) -> Option<(AddrSpace, Type)> {
        match *self.type_kind(ty) {
            TypeKind::Pointer { space, pointee } => Some((space, pointee)),
            _ => None,
        }
    }

    pub fn opaque_name(&self, ty: Type) -> Option<&str> {
        match self.type_kind(ty) {
            TypeKind::Opaque { name } => Some(name),
            _ => None,
        }
    }

    /// Renders a type for diagnostics (`i32`, `<4 x i8>`, `float addrspace(global)*`).
    pub fn type_to_string(&self, ty: Type) -> String {
        match self.type_kind(ty) {
            TypeKind::Void => "void".to_owned(),
            TypeKind::Bool => "i1".to_owned(),
            TypeKind::Int { width } => format!("i{width}"),
            TypeKind::Float { width } => match width {
                16 => "half".to_owned(),
                32 => "float".to_owned(),
                64 => "double".to_owned(),
                w => format!("f{w}"),
            },
            &TypeKind::Vector { elem, count } => {
                format!("<{count} x {}>", self.type_to_string(elem))
            }
            &TypeKind::Array { elem, count } => {
                format!("[{count} x {}]", self.type_to_string(elem))
            }
            TypeKind::Struct { fields } => {
                let inner: Vec<String> = fields.iter().map(|&f| self.type_to_string(f)).collect();
                format!("{{ {} }}", inner.join(", "))
            }
            TypeKind::Opaque { name } => format!("%{name}"),
            &TypeKind::Pointer { space, pointee } => {
                format!("{} addrspace({space:?})*", self.type_to_string(pointee))
            }
            TypeKind::Function { ret, params } => {
                let inner: Vec<String> = params.iter().map(|&p| self.type_to_string(p)).collect();
                format!("{} ({})", self.type_to_string(*ret), inner.join(", "))
            }
        }
    }

    /// Renders a constant for diagnostics.
    pub fn const_to_string(&self, ct: Const) -> String {
        let def = self.const_def(ct);
        let ty = self.type_to_string(def.ty);
        match &def.kind {
            ConstKind::Bool(v) => format!("{ty} {v}"),
            ConstKind::Int(v) => format!("{ty} {v}"),
            ConstKind::Float(bits) => format!("{ty} {}", f32::from_bits(*bits as u32)),
            ConstKind::Null => format!("{ty} zeroinitializer"),
            ConstKind::Undef => format!("{ty} undef"),
            ConstKind::Composite(elems) => {
                let inner: Vec<String> =
                    elems.iter().map(|&e| self.const_to_string(e)).collect();
                format!("{ty} [{}]", inner.join(", "))
            }
        }
    }
}

/// A use of a value, the common currency of instruction operands.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Value {
    Const(Const),
    /// The output of an instruction in the same function.
    Inst(Inst),
    /// A function parameter.
    Arg { func: Func, index: u32 },
    /// The address of a module-scope variable.
    Global(GlobalVar),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
    FpTrunc,
    FpExt,
    Bitcast,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    FAdd,
    Sub,
    FSub,
    Mul,
    FMul,
    UDiv,
    SDiv,
    FDiv,
    URem,
    SRem,
    FRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
}

/// The 22 comparison predicate kinds (integer, float-ordered, float-unordered).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CmpPred {
    IEq,
    INe,
    IUgt,
    IUge,
    IUlt,
    IUle,
    ISgt,
    ISge,
    ISlt,
    ISle,
    FOeq,
    FOgt,
    FOge,
    FOlt,
    FOle,
    FOne,
    FUeq,
    FUgt,
    FUge,
    FUlt,
    FUle,
    FUne,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AtomicOp {
    Add,
    Sub,
    Xchg,
    SMin,
    SMax,
    UMin,
    UMax,
    And,
    Or,
    Xor,
}

#[derive(Clone, Debug)]
pub enum InstKind {
    Cast { op: CastOp, value: Value },
    Binary { op: BinOp, lhs: Value, rhs: Value },
    Cmp { pred: CmpPred, lhs: Value, rhs: Value },
    Gep { base: Value, indices: SmallVec<[Value; 4]> },
    Load { ptr: Value },
    Store { ptr: Value, value: Value },
    Alloca { allocated: Type },
    ExtractElement { vector: Value, index: Value },
    InsertElement { vector: Value, value: Value, index: Value },
    /// `mask` lanes are indices into the concatenation of `a` and `b`;
    /// `None` is an undefined lane.
    ShuffleVector { a: Value, b: Value, mask: SmallVec<[Option<u32>; 4]> },
    ExtractValue { agg: Value, indices: SmallVec<[u32; 2]> },
    InsertValue { agg: Value, value: Value, indices: SmallVec<[u32; 2]> },
    Select { cond: Value, if_true: Value, if_false: Value },
    Phi { incoming: SmallVec<[(Value, Block); 2]> },
    Branch { target: Block },
    CondBranch { cond: Value, if_true: Block, if_false: Block },
    Return { value: Option<Value> },
    AtomicRmw { op: AtomicOp, ptr: Value, value: Value },
    /// A direct call; `callee` is the mangled symbol name. Builtins are
    /// recognized by name, everything else must resolve to a module function.
    Call { callee: String, args: SmallVec<[Value; 4]> },

    // Forms the target has no lowering for; kept so the producer can reject
    // them with a description instead of the IR builder panicking.
    Switch,
    IndirectBranch,
    AtomicCmpXchg,
    Fence,
}

/// Definition for an [`Inst`]: its form plus its result type.
///
/// `ty` is the void type for instructions that produce no value.
#[derive(Clone, Debug)]
pub struct InstDef {
    pub kind: InstKind,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub struct BlockDef {
    pub name: String,
    pub insts: Vec<Inst>,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// Function attributes that map onto SPIR-V function-control bits.
#[derive(Copy, Clone, Default, Debug)]
pub struct FuncAttrs {
    pub always_inline: bool,
    pub no_inline: bool,
    pub read_only: bool,
    pub read_none: bool,
}

/// One record of the optional `kernel_arg_map` metadata: how an original
/// kernel argument was renamed/reordered by earlier passes.
#[derive(Clone, Debug)]
pub struct ArgMapEntry {
    pub name: String,
    pub old_index: u32,
    pub new_index: u32,
    pub offset: u32,
    pub arg_kind: String,
    /// Positive for pointer-to-local arguments; 0 otherwise.
    pub spec_id: i32,
}

#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub is_kernel: bool,
    pub ret_type: Type,
    pub params: Vec<Param>,
    /// Entry block first. Blocks only ever grow.
    pub blocks: Vec<BlockDef>,
    /// Arena indexed by [`Inst`].
    pub insts: Vec<InstDef>,
    /// The `reqd_work_group_size` attribute, if the kernel fixed one.
    pub reqd_work_group_size: Option<[u32; 3]>,
    /// The `kernel_arg_map` metadata, if earlier passes attached it.
    pub arg_map: Option<Vec<ArgMapEntry>>,
    pub attrs: FuncAttrs,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, is_kernel: bool, ret_type: Type) -> Self {
        Self {
            name: name.into(),
            is_kernel,
            ret_type,
            params: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            reqd_work_group_size: None,
            arg_map: None,
            attrs: FuncAttrs::default(),
        }
    }

    pub fn add_param(&mut self, name: impl Into<String>, ty: Type) -> u32 {
        self.params.push(Param { name: name.into(), ty });
        (self.params.len() - 1) as u32
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> Block {
        self.blocks.push(BlockDef { name: name.into(), insts: Vec::new() });
        Block((self.blocks.len() - 1) as u32)
    }

    /// Appends an instruction to `block` and returns its handle.
    pub fn push(&mut self, block: Block, ty: Type, kind: InstKind) -> Inst {
        let inst = Inst(self.insts.len() as u32);
        self.insts.push(InstDef { kind, ty });
        self.blocks[block.0 as usize].insts.push(inst);
        inst
    }

    pub fn inst(&self, inst: Inst) -> &InstDef {
        &self.insts[inst.0 as usize]
    }

    pub fn block(&self, block: Block) -> &BlockDef {
        &self.blocks[block.0 as usize]
    }

    pub fn entry(&self) -> Block {
        Block(0)
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.blocks.len() as u32).map(Block)
    }

    /// The terminator is by convention the last instruction of a block.
    pub fn terminator(&self, block: Block) -> Option<Inst> {
        self.block(block).insts.last().copied()
    }

    pub fn successors(&self, block: Block) -> SmallVec<[Block; 2]> {
        match self.terminator(block).map(|t| &self.inst(t).kind) {
            Some(&InstKind::Branch { target }) => [target].into_iter().collect(),
            Some(&InstKind::CondBranch { if_true, if_false, .. }) => {
                [if_true, if_false].into_iter().collect()
            }
            _ => SmallVec::new(),
        }
    }
}

#[derive(Default)]
pub struct Module {
    pub cx: Context,
    pub global_vars: Vec<GlobalVarDef>,
    pub funcs: Vec<FunctionDef>,
}

#[derive(Clone, Debug)]
pub struct GlobalVarDef {
    pub name: String,
    /// The value type; the variable itself is a pointer to this in `addr_space`.
    pub value_type: Type,
    pub addr_space: AddrSpace,
    pub initializer: Option<Const>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, def: GlobalVarDef) -> GlobalVar {
        // A use of the variable is a use of its address; keep the pointer
        // type interned so `value_type` can derive it.
        self.cx.t_ptr(def.addr_space, def.value_type);
        self.global_vars.push(def);
        GlobalVar((self.global_vars.len() - 1) as u32)
    }

    pub fn add_func(&mut self, def: FunctionDef) -> Func {
        self.funcs.push(def);
        Func((self.funcs.len() - 1) as u32)
    }

    pub fn global(&self, gv: GlobalVar) -> &GlobalVarDef {
        &self.global_vars[gv.0 as usize]
    }

    pub fn global_mut(&mut self, gv: GlobalVar) -> &mut GlobalVarDef {
        &mut self.global_vars[gv.0 as usize]
    }

    pub fn func(&self, func: Func) -> &FunctionDef {
        &self.funcs[func.0 as usize]
    }

    pub fn func_mut(&mut self, func: Func) -> &mut FunctionDef {
        &mut self.funcs[func.0 as usize]
    }

    pub fn globals(&self) -> impl Iterator<Item = GlobalVar> + '_ {
        (0..self.global_vars.len() as u32).map(GlobalVar)
    }

    pub fn funcs(&self) -> impl Iterator<Item = Func> + '_ {
        (0..self.funcs.len() as u32).map(Func)
    }

    pub fn func_by_name(&self, name: &str) -> Option<Func> {
        self.funcs.iter().position(|f| f.name == name).map(|i| Func(i as u32))
    }

    /// Does any opaque type with this exact name appear in the context?
    pub fn has_opaque_type(&self, name: &str) -> bool {
        self.cx.types.iter().any(|k| matches!(k, TypeKind::Opaque { name: n } if n == name))
    }

    /// The type of a value, as the lowering sees it.
    pub fn value_type(&self, func: Func, v: Value) -> Type {
        match v {
            Value::Const(ct) => self.cx.const_def(ct).ty,
            Value::Inst(inst) => self.func(func).inst(inst).ty,
            Value::Arg { func: f, index } => self.func(f).params[index as usize].ty,
            Value::Global(gv) => {
                let def = self.global(gv);
                // A use of a global is a use of its address; the pointer type
                // is derived, not stored, so it must already be interned.
                self.cx
                    .get_type(&TypeKind::Pointer {
                        space: def.addr_space,
                        pointee: def.value_type,
                    })
                    .expect("global's pointer type was never interned")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural_and_ordered() {
        let mut cx = Context::default();
        let a = cx.t_i32();
        let b = cx.t_int(32);
        assert_eq!(a, b);
        let v = cx.t_vec(a, 4);
        assert_ne!(a, v);
        // Handles reflect first-interning order.
        assert!(a < v);
        let z1 = cx.c_i32(0);
        let z2 = cx.c_int(a, 0);
        assert_eq!(z1, z2);
    }

    #[test]
    fn is_4xi8_only_matches_exactly() {
        let mut cx = Context::default();
        let i8t = cx.t_i8();
        let i32t = cx.t_i32();
        let v4i8 = cx.t_vec(i8t, 4);
        let v2i8 = cx.t_vec(i8t, 2);
        let v4i32 = cx.t_vec(i32t, 4);
        assert!(cx.is_4xi8(v4i8));
        assert!(!cx.is_4xi8(v2i8));
        assert!(!cx.is_4xi8(v4i32));
        assert!(!cx.is_4xi8(i32t));
    }

    #[test]
    fn successors_follow_terminators() {
        let mut m = Module::new();
        let void = m.cx.t_void();
        let boolean = m.cx.t_bool();
        let t = m.cx.c_bool(true);
        let mut f = FunctionDef::new("f", false, void);
        let entry = f.add_block("entry");
        let then = f.add_block("then");
        let done = f.add_block("done");
        f.push(
            entry,
            void,
            InstKind::CondBranch { cond: Value::Const(t), if_true: then, if_false: done },
        );
        f.push(then, void, InstKind::Branch { target: done });
        f.push(done, void, InstKind::Return { value: None });
        let _ = boolean;
        assert_eq!(f.successors(entry).as_slice(), &[then, done]);
        assert_eq!(f.successors(then).as_slice(), &[done]);
        assert!(f.successors(done).is_empty());
    }
}
