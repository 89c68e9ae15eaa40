//! Immutable IR traversal.
//!
//! [`Visitor`] hooks fire on the leaves the lowering cares about (type uses,
//! constant uses, value uses, instructions); [`InnerVisit`] walks one level of
//! a node's interior. The discovery walker implements [`Visitor`] to intern
//! everything the output will need, overriding only the hooks it treats
//! specially.

use super::{
    Block, BlockDef, Const, Func, FunctionDef, GlobalVarDef, Inst, InstDef, InstKind, Type, Value,
};

pub trait Visitor: Sized {
    // Leaves (noop default behavior).
    fn visit_type_use(&mut self, _ty: Type) {}
    fn visit_const_use(&mut self, _ct: Const) {}

    // Non-leaves (defaulting to calling `.inner_visit_with(self)`).
    fn visit_value_use(&mut self, v: &Value) {
        v.inner_visit_with(self);
    }
    fn visit_inst(&mut self, _func: Func, _inst: Inst, def: &InstDef) {
        def.inner_visit_with(self);
    }
    fn visit_block(&mut self, func: Func, funcdef: &FunctionDef, _block: Block, def: &BlockDef) {
        for &inst in &def.insts {
            self.visit_inst(func, inst, funcdef.inst(inst));
        }
    }
    fn visit_function(&mut self, func: Func, def: &FunctionDef) {
        def.inner_visit_with_at(func, self);
    }
    fn visit_global_var(&mut self, def: &GlobalVarDef) {
        def.inner_visit_with(self);
    }
}

/// One level of a deep visit: an `impl InnerVisit for X` calls the relevant
/// [`Visitor`] method for each of `X`'s fields.
pub trait InnerVisit {
    fn inner_visit_with(&self, visitor: &mut impl Visitor);
}

impl InnerVisit for Value {
    fn inner_visit_with(&self, visitor: &mut impl Visitor) {
        match *self {
            Value::Const(ct) => visitor.visit_const_use(ct),
            Value::Inst(_) | Value::Arg { .. } | Value::Global(_) => {}
        }
    }
}

impl InnerVisit for InstDef {
    fn inner_visit_with(&self, visitor: &mut impl Visitor) {
        let Self { kind, ty } = self;

        kind.inner_visit_with(visitor);
        visitor.visit_type_use(*ty);
    }
}

impl InnerVisit for InstKind {
    fn inner_visit_with(&self, visitor: &mut impl Visitor) {
        match self {
            InstKind::Cast { op: _, value } => visitor.visit_value_use(value),
            InstKind::Binary { op: _, lhs, rhs } | InstKind::Cmp { pred: _, lhs, rhs } => {
                visitor.visit_value_use(lhs);
                visitor.visit_value_use(rhs);
            }
            InstKind::Gep { base, indices } => {
                visitor.visit_value_use(base);
                for idx in indices {
                    visitor.visit_value_use(idx);
                }
            }
            InstKind::Load { ptr } => visitor.visit_value_use(ptr),
            InstKind::Store { ptr, value } => {
                visitor.visit_value_use(ptr);
                visitor.visit_value_use(value);
            }
            InstKind::Alloca { allocated } => visitor.visit_type_use(*allocated),
            InstKind::ExtractElement { vector, index } => {
                visitor.visit_value_use(vector);
                visitor.visit_value_use(index);
            }
            InstKind::InsertElement { vector, value, index } => {
                visitor.visit_value_use(vector);
                visitor.visit_value_use(value);
                visitor.visit_value_use(index);
            }
            InstKind::ShuffleVector { a, b, mask: _ } => {
                visitor.visit_value_use(a);
                visitor.visit_value_use(b);
            }
            InstKind::ExtractValue { agg, indices: _ } => visitor.visit_value_use(agg),
            InstKind::InsertValue { agg, value, indices: _ } => {
                visitor.visit_value_use(agg);
                visitor.visit_value_use(value);
            }
            InstKind::Select { cond, if_true, if_false } => {
                visitor.visit_value_use(cond);
                visitor.visit_value_use(if_true);
                visitor.visit_value_use(if_false);
            }
            InstKind::Phi { incoming } => {
                for (v, _pred) in incoming {
                    visitor.visit_value_use(v);
                }
            }
            InstKind::Branch { target: _ } => {}
            InstKind::CondBranch { cond, if_true: _, if_false: _ } => {
                visitor.visit_value_use(cond);
            }
            InstKind::Return { value } => {
                if let Some(v) = value {
                    visitor.visit_value_use(v);
                }
            }
            InstKind::AtomicRmw { op: _, ptr, value } => {
                visitor.visit_value_use(ptr);
                visitor.visit_value_use(value);
            }
            InstKind::Call { callee: _, args } => {
                for arg in args {
                    visitor.visit_value_use(arg);
                }
            }
            InstKind::Switch
            | InstKind::IndirectBranch
            | InstKind::AtomicCmpXchg
            | InstKind::Fence => {}
        }
    }
}

impl InnerVisit for GlobalVarDef {
    fn inner_visit_with(&self, visitor: &mut impl Visitor) {
        let Self { name: _, value_type, addr_space: _, initializer } = self;

        visitor.visit_type_use(*value_type);
        if let Some(init) = *initializer {
            visitor.visit_const_use(init);
        }
    }
}

// `FunctionDef` carries its own handle space, so the deep walk needs the
// function's handle alongside it; hence a named method instead of `InnerVisit`.
impl FunctionDef {
    pub fn inner_visit_with_at(&self, func: Func, visitor: &mut impl Visitor) {
        for param in &self.params {
            visitor.visit_type_use(param.ty);
        }
        visitor.visit_type_use(self.ret_type);
        for block in self.blocks() {
            visitor.visit_block(func, self, block, self.block(block));
        }
    }
}
