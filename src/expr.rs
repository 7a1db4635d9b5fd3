//! The expression half of the IR: `Expr` is a cheap-to-clone handle onto an
//! immutable, hash-consed `InnerExpr`. Every node caches a 64-bit digest at
//! construction time so that `Hash` never has to walk the tree; `PartialEq`/
//! `Eq` still compare structurally, which is what the cached mutator and the
//! simplifier's identity tables rely on for correctness.

use std::sync::Arc;

use crate::name::Symbol;
use crate::types::Type;

// Node-tag constants combined with children digests via `fxhash::hash64`,
// the same trick the hash-consing layer this is grounded on uses to keep
// otherwise-identical-looking nodes (e.g. `Add` vs `Sub` of the same
// operands) from colliding.
const INT_IMM_TAG: u64 = 1;
const FLOAT_IMM_TAG: u64 = 2;
const VARIABLE_TAG: u64 = 3;
const CAST_TAG: u64 = 4;
const NOT_TAG: u64 = 5;
const SIGN_FILL_TAG: u64 = 6;
const SELECT_TAG: u64 = 7;
const LOAD_TAG: u64 = 8;
const RAMP_TAG: u64 = 9;
const BROADCAST_TAG: u64 = 10;
const CALL_TAG: u64 = 11;
const LET_TAG: u64 = 12;
const CLAMP_TAG: u64 = 13;
const INFINITY_TAG: u64 = 14;
const SOLVE_TAG: u64 = 15;
const TARGET_VAR_TAG: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Min,
    Max,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClampKind {
    None,
    Replicate,
    Wrap,
    Reflect,
    Reflect101,
    Tile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    Halide,
    Extern,
    Intrinsic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Pos,
    Neg,
}

/// A reference-counted handle onto an immutable expression node. Cloning is
/// a refcount bump; structural equality and hashing are defined on the
/// pointee, not the pointer, so two separately constructed but identical
/// subtrees compare and hash equal (invariant 4 in the data model).
#[derive(Clone)]
pub struct Expr(Arc<InnerExpr>);

#[derive(Debug, Clone, PartialEq)]
pub struct ExprCache {
    digest: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InnerExpr {
    IntImm {
        cache: ExprCache,
        ty: Type,
        value: i64,
    },
    FloatImm {
        cache: ExprCache,
        ty: Type,
        value: f64,
    },
    Variable {
        cache: ExprCache,
        ty: Type,
        name: Symbol,
        param: Option<Symbol>,
        reduction_domain: Option<Symbol>,
    },
    Cast {
        cache: ExprCache,
        to_type: Type,
        value: Expr,
    },
    Not {
        cache: ExprCache,
        value: Expr,
    },
    SignFill {
        cache: ExprCache,
        ty: Type,
        sign: Sign,
    },
    Bin {
        cache: ExprCache,
        op: BinOp,
        ty: Type,
        a: Expr,
        b: Expr,
    },
    Cmp {
        cache: ExprCache,
        op: CmpOp,
        a: Expr,
        b: Expr,
    },
    Logical {
        cache: ExprCache,
        op: LogicalOp,
        a: Expr,
        b: Expr,
    },
    Select {
        cache: ExprCache,
        cond: Expr,
        true_value: Expr,
        false_value: Expr,
    },
    Load {
        cache: ExprCache,
        ty: Type,
        name: Symbol,
        index: Expr,
        image: Option<Symbol>,
        param: Option<Symbol>,
    },
    Ramp {
        cache: ExprCache,
        base: Expr,
        stride: Expr,
        lanes: u16,
    },
    Broadcast {
        cache: ExprCache,
        value: Expr,
        lanes: u16,
    },
    Call {
        cache: ExprCache,
        ty: Type,
        name: Symbol,
        args: Vec<Expr>,
        call_type: CallType,
        func: Option<Symbol>,
        image: Option<Symbol>,
        param: Option<Symbol>,
    },
    Let {
        cache: ExprCache,
        name: Symbol,
        value: Expr,
        body: Expr,
    },
    Clamp {
        cache: ExprCache,
        kind: ClampKind,
        a: Expr,
        min: Expr,
        max: Expr,
        p1: Option<Expr>,
    },
    Infinity {
        cache: ExprCache,
        sign: Sign,
        count: u32,
    },
    Solve {
        cache: ExprCache,
        var: Symbol,
        body: Expr,
    },
    TargetVar {
        cache: ExprCache,
        name: Symbol,
        body: Expr,
    },
}

impl Expr {
    pub fn inner(&self) -> &InnerExpr {
        &self.0
    }

    fn digest(&self) -> u64 {
        self.0.cache().digest
    }

    /// The declared type of the node, per the "every expression carries its
    /// Type" rule in the data model. `Select`/comparisons/`Let`/`Solve`/
    /// `TargetVar` forward the type of their value-bearing child; `Not` is
    /// always bool.
    pub fn ty(&self) -> Type {
        match self.inner() {
            InnerExpr::IntImm { ty, .. } => *ty,
            InnerExpr::FloatImm { ty, .. } => *ty,
            InnerExpr::Variable { ty, .. } => *ty,
            InnerExpr::Cast { to_type, .. } => *to_type,
            InnerExpr::Not { .. } => Type::bool_(),
            InnerExpr::SignFill { ty, .. } => *ty,
            InnerExpr::Bin { ty, .. } => *ty,
            InnerExpr::Cmp { a, .. } => Type::bool_().with_lanes(a.ty().lanes),
            InnerExpr::Logical { a, .. } => a.ty(),
            InnerExpr::Select { true_value, .. } => true_value.ty(),
            InnerExpr::Load { ty, .. } => *ty,
            InnerExpr::Ramp { base, lanes, .. } => base.ty().with_lanes(*lanes),
            InnerExpr::Broadcast { value, lanes } => value.ty().with_lanes(*lanes),
            InnerExpr::Call { ty, .. } => *ty,
            InnerExpr::Let { body, .. } => body.ty(),
            InnerExpr::Clamp { a, .. } => a.ty(),
            InnerExpr::Infinity { .. } => Type::int(64),
            InnerExpr::Solve { body, .. } => body.ty(),
            InnerExpr::TargetVar { body, .. } => body.ty(),
        }
    }

    pub fn children(&self) -> Vec<Expr> {
        match self.inner() {
            InnerExpr::IntImm { .. }
            | InnerExpr::FloatImm { .. }
            | InnerExpr::Variable { .. }
            | InnerExpr::SignFill { .. }
            | InnerExpr::Infinity { .. } => vec![],
            InnerExpr::Cast { value, .. } => vec![value.clone()],
            InnerExpr::Not { value, .. } => vec![value.clone()],
            InnerExpr::Bin { a, b, .. } => vec![a.clone(), b.clone()],
            InnerExpr::Cmp { a, b, .. } => vec![a.clone(), b.clone()],
            InnerExpr::Logical { a, b, .. } => vec![a.clone(), b.clone()],
            InnerExpr::Select {
                cond,
                true_value,
                false_value,
                ..
            } => vec![cond.clone(), true_value.clone(), false_value.clone()],
            InnerExpr::Load { index, .. } => vec![index.clone()],
            InnerExpr::Ramp { base, stride, .. } => vec![base.clone(), stride.clone()],
            InnerExpr::Broadcast { value, .. } => vec![value.clone()],
            InnerExpr::Call { args, .. } => args.clone(),
            InnerExpr::Let { value, body, .. } => vec![value.clone(), body.clone()],
            InnerExpr::Clamp {
                a, min, max, p1, ..
            } => {
                let mut v = vec![a.clone(), min.clone(), max.clone()];
                if let Some(p1) = p1 {
                    v.push(p1.clone());
                }
                v
            }
            InnerExpr::Solve { body, .. } => vec![body.clone()],
            InnerExpr::TargetVar { body, .. } => vec![body.clone()],
        }
    }
}

impl InnerExpr {
    fn cache(&self) -> &ExprCache {
        match self {
            InnerExpr::IntImm { cache, .. }
            | InnerExpr::FloatImm { cache, .. }
            | InnerExpr::Variable { cache, .. }
            | InnerExpr::Cast { cache, .. }
            | InnerExpr::Not { cache, .. }
            | InnerExpr::SignFill { cache, .. }
            | InnerExpr::Bin { cache, .. }
            | InnerExpr::Cmp { cache, .. }
            | InnerExpr::Logical { cache, .. }
            | InnerExpr::Select { cache, .. }
            | InnerExpr::Load { cache, .. }
            | InnerExpr::Ramp { cache, .. }
            | InnerExpr::Broadcast { cache, .. }
            | InnerExpr::Call { cache, .. }
            | InnerExpr::Let { cache, .. }
            | InnerExpr::Clamp { cache, .. }
            | InnerExpr::Infinity { cache, .. }
            | InnerExpr::Solve { cache, .. }
            | InnerExpr::TargetVar { cache, .. } => cache,
        }
    }
}

impl std::ops::Deref for Expr {
    type Target = InnerExpr;
    fn deref(&self) -> &InnerExpr {
        &self.0
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Expr) -> bool {
        self.digest() == other.digest() && self.0 == other.0
    }
}

impl Eq for Expr {}

impl std::hash::Hash for Expr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest().hash(state);
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        crate::pretty::write_expr(f, self)
    }
}

fn h(tag: u64, parts: &[u64]) -> u64 {
    let mut acc = tag;
    for p in parts {
        acc = fxhash::hash64(&(acc, *p));
    }
    acc
}

pub fn mk_int_imm(ty: Type, value: i64) -> Expr {
    let digest = h(INT_IMM_TAG, &[fxhash::hash64(&ty.kind), ty.bits as u64, value as u64]);
    Expr(Arc::new(InnerExpr::IntImm {
        cache: ExprCache { digest },
        ty,
        value,
    }))
}

pub fn mk_float_imm(ty: Type, value: f64) -> Expr {
    let digest = h(FLOAT_IMM_TAG, &[ty.bits as u64, value.to_bits()]);
    Expr(Arc::new(InnerExpr::FloatImm {
        cache: ExprCache { digest },
        ty,
        value,
    }))
}

pub fn mk_variable(ty: Type, name: Symbol) -> Expr {
    mk_variable_full(ty, name, None, None)
}

pub fn mk_variable_full(
    ty: Type,
    name: Symbol,
    param: Option<Symbol>,
    reduction_domain: Option<Symbol>,
) -> Expr {
    let digest = h(VARIABLE_TAG, &[fxhash::hash64(name.as_str())]);
    Expr(Arc::new(InnerExpr::Variable {
        cache: ExprCache { digest },
        ty,
        name,
        param,
        reduction_domain,
    }))
}

pub fn mk_cast(to_type: Type, value: Expr) -> Expr {
    let digest = h(CAST_TAG, &[fxhash::hash64(&to_type.kind), to_type.bits as u64, value.digest()]);
    Expr(Arc::new(InnerExpr::Cast {
        cache: ExprCache { digest },
        to_type,
        value,
    }))
}

pub fn mk_not(value: Expr) -> Expr {
    let digest = h(NOT_TAG, &[value.digest()]);
    Expr(Arc::new(InnerExpr::Not {
        cache: ExprCache { digest },
        value,
    }))
}

pub fn mk_sign_fill(ty: Type, sign: Sign) -> Expr {
    let digest = h(SIGN_FILL_TAG, &[ty.bits as u64, sign as u64]);
    Expr(Arc::new(InnerExpr::SignFill {
        cache: ExprCache { digest },
        ty,
        sign,
    }))
}

pub fn mk_bin(op: BinOp, ty: Type, a: Expr, b: Expr) -> Expr {
    let digest = h(op as u64 + 100, &[a.digest(), b.digest()]);
    Expr(Arc::new(InnerExpr::Bin {
        cache: ExprCache { digest },
        op,
        ty,
        a,
        b,
    }))
}

pub fn mk_cmp(op: CmpOp, a: Expr, b: Expr) -> Expr {
    let digest = h(op as u64 + 200, &[a.digest(), b.digest()]);
    Expr(Arc::new(InnerExpr::Cmp {
        cache: ExprCache { digest },
        op,
        a,
        b,
    }))
}

pub fn mk_logical(op: LogicalOp, a: Expr, b: Expr) -> Expr {
    let digest = h(op as u64 + 300, &[a.digest(), b.digest()]);
    Expr(Arc::new(InnerExpr::Logical {
        cache: ExprCache { digest },
        op,
        a,
        b,
    }))
}

pub fn mk_select(cond: Expr, true_value: Expr, false_value: Expr) -> Expr {
    let digest = h(
        SELECT_TAG,
        &[cond.digest(), true_value.digest(), false_value.digest()],
    );
    Expr(Arc::new(InnerExpr::Select {
        cache: ExprCache { digest },
        cond,
        true_value,
        false_value,
    }))
}

pub fn mk_load(ty: Type, name: Symbol, index: Expr, image: Option<Symbol>, param: Option<Symbol>) -> Expr {
    let digest = h(LOAD_TAG, &[fxhash::hash64(name.as_str()), index.digest()]);
    Expr(Arc::new(InnerExpr::Load {
        cache: ExprCache { digest },
        ty,
        name,
        index,
        image,
        param,
    }))
}

pub fn mk_ramp(base: Expr, stride: Expr, lanes: u16) -> Expr {
    let digest = h(RAMP_TAG, &[base.digest(), stride.digest(), lanes as u64]);
    Expr(Arc::new(InnerExpr::Ramp {
        cache: ExprCache { digest },
        base,
        stride,
        lanes,
    }))
}

pub fn mk_broadcast(value: Expr, lanes: u16) -> Expr {
    let digest = h(BROADCAST_TAG, &[value.digest(), lanes as u64]);
    Expr(Arc::new(InnerExpr::Broadcast {
        cache: ExprCache { digest },
        value,
        lanes,
    }))
}

pub fn mk_call(
    ty: Type,
    name: Symbol,
    args: Vec<Expr>,
    call_type: CallType,
    func: Option<Symbol>,
    image: Option<Symbol>,
    param: Option<Symbol>,
) -> Expr {
    let mut parts = vec![fxhash::hash64(name.as_str()), call_type as u64];
    parts.extend(args.iter().map(|a| a.digest()));
    let digest = h(CALL_TAG, &parts);
    Expr(Arc::new(InnerExpr::Call {
        cache: ExprCache { digest },
        ty,
        name,
        args,
        call_type,
        func,
        image,
        param,
    }))
}

pub fn mk_let(name: Symbol, value: Expr, body: Expr) -> Expr {
    let digest = h(LET_TAG, &[fxhash::hash64(name.as_str()), value.digest(), body.digest()]);
    Expr(Arc::new(InnerExpr::Let {
        cache: ExprCache { digest },
        name,
        value,
        body,
    }))
}

pub fn mk_clamp(kind: ClampKind, a: Expr, min: Expr, max: Expr, p1: Option<Expr>) -> Expr {
    let mut parts = vec![kind as u64, a.digest(), min.digest(), max.digest()];
    if let Some(p1) = &p1 {
        parts.push(p1.digest());
    }
    let digest = h(CLAMP_TAG, &parts);
    Expr(Arc::new(InnerExpr::Clamp {
        cache: ExprCache { digest },
        kind,
        a,
        min,
        max,
        p1,
    }))
}

pub fn mk_infinity(sign: Sign, count: u32) -> Expr {
    let digest = h(INFINITY_TAG, &[sign as u64, count as u64]);
    Expr(Arc::new(InnerExpr::Infinity {
        cache: ExprCache { digest },
        sign,
        count,
    }))
}

pub fn mk_solve(var: Symbol, body: Expr) -> Expr {
    let digest = h(SOLVE_TAG, &[fxhash::hash64(var.as_str()), body.digest()]);
    Expr(Arc::new(InnerExpr::Solve {
        cache: ExprCache { digest },
        var,
        body,
    }))
}

pub fn mk_target_var(name: Symbol, body: Expr) -> Expr {
    let digest = h(TARGET_VAR_TAG, &[fxhash::hash64(name.as_str()), body.digest()]);
    Expr(Arc::new(InnerExpr::TargetVar {
        cache: ExprCache { digest },
        name,
        body,
    }))
}

/// Collects every free variable name referenced in `e`, respecting `Let`
/// and `Solve`/`TargetVar` binding forms. Used to check invariant 3
/// (well-scopedness) and by the scheduler's region analysis.
pub fn free_vars(e: &Expr) -> hashbrown::HashSet<Symbol> {
    let mut out = hashbrown::HashSet::new();
    free_vars_into(e, &mut out);
    out
}

fn free_vars_into(e: &Expr, out: &mut hashbrown::HashSet<Symbol>) {
    match e.inner() {
        InnerExpr::Variable { name, .. } => {
            out.insert(name.clone());
        }
        InnerExpr::Let { name, value, body, .. } => {
            let mut body_vars = hashbrown::HashSet::new();
            free_vars_into(body, &mut body_vars);
            body_vars.remove(name);
            out.extend(body_vars);
            free_vars_into(value, out);
        }
        InnerExpr::Solve { var: name, body, .. } | InnerExpr::TargetVar { name, body, .. } => {
            let mut body_vars = hashbrown::HashSet::new();
            free_vars_into(body, &mut body_vars);
            body_vars.remove(name);
            out.extend(body_vars);
        }
        _ => {
            for c in e.children() {
                free_vars_into(&c, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn structurally_equal_exprs_hash_equal() {
        let a = mk_bin(BinOp::Add, Type::int(32), mk_int_imm(Type::int(32), 1), mk_int_imm(Type::int(32), 2));
        let b = mk_bin(BinOp::Add, Type::int(32), mk_int_imm(Type::int(32), 1), mk_int_imm(Type::int(32), 2));
        assert_eq!(a, b);
        let mut ha = fxhash::FxHasher::default();
        let mut hb = fxhash::FxHasher::default();
        std::hash::Hash::hash(&a, &mut ha);
        std::hash::Hash::hash(&b, &mut hb);
        assert_eq!(std::hash::Hasher::finish(&ha), std::hash::Hasher::finish(&hb));
    }

    #[test]
    fn different_operators_do_not_collide() {
        let ty = Type::int(32);
        let a = mk_int_imm(ty, 1);
        let b = mk_int_imm(ty, 2);
        let add = mk_bin(BinOp::Add, ty, a.clone(), b.clone());
        let sub = mk_bin(BinOp::Sub, ty, a, b);
        assert_ne!(add, sub);
    }

    #[test]
    fn free_vars_respects_let_binding() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let y = Symbol::new("y");
        let body = mk_bin(BinOp::Add, ty, mk_variable(ty, x.clone()), mk_variable(ty, y.clone()));
        let let_expr = mk_let(x.clone(), mk_int_imm(ty, 0), body);
        let fv = free_vars(&let_expr);
        assert!(!fv.contains(&x));
        assert!(fv.contains(&y));
    }

    #[test]
    fn type_of_comparison_is_bool_with_matching_lanes() {
        let ty = Type::int(32).with_lanes(4);
        let a = mk_variable(ty, Symbol::new("a"));
        let b = mk_variable(ty, Symbol::new("b"));
        let cmp = mk_cmp(CmpOp::Lt, a, b);
        assert!(cmp.ty().is_bool());
        assert_eq!(cmp.ty().lanes, 4);
    }
}
