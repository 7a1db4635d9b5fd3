//! The simplifier (spec §4.3): constant folding, algebraic canonicalization,
//! `Let` inlining, floor-rounding div/mod, and statement-level cleanups.
//! Implemented as a `Mutator` so that unrewritten subtrees come back as the
//! identical handle they went in as (see `mutator.rs`); consulted by
//! `bounds.rs`'s `bounds_simplify`, which reruns this pass with additional
//! interval facts in scope.
//!
//! Division and modulus are floor-rounding for signed integers per spec
//! §4.3: this is a design commitment every rewrite here assumes, not just an
//! implementation detail of constant folding.

use crate::expr::*;
use crate::interval::{floor_div, floor_mod};
use crate::mutator::{Mutator, Rewriter};
use crate::stmt::*;
use crate::types::Type;

pub struct Simplifier {
    usage_counts: Option<hashbrown::HashMap<crate::name::Symbol, u32>>,
}

impl Simplifier {
    pub fn new() -> Self {
        Simplifier { usage_counts: None }
    }
}

impl Default for Simplifier {
    fn default() -> Self {
        Self::new()
    }
}

fn int_of(e: &Expr) -> Option<i64> {
    match e.inner() {
        InnerExpr::IntImm { value, .. } => Some(*value),
        _ => None,
    }
}

fn float_of(e: &Expr) -> Option<f64> {
    match e.inner() {
        InnerExpr::FloatImm { value, .. } => Some(*value),
        _ => None,
    }
}

fn is_const(e: &Expr) -> bool {
    matches!(e.inner(), InnerExpr::IntImm { .. } | InnerExpr::FloatImm { .. })
}

fn bool_lit(ty: Type, b: bool) -> Expr {
    mk_int_imm(ty, if b { 1 } else { 0 })
}

fn as_bool(e: &Expr) -> Option<bool> {
    int_of(e).map(|v| v != 0)
}

/// Rank used to canonicalize commutative operands: constants sort last
/// ("constants moved right", spec §4.3.2), everything else keeps its
/// relative order (a stable sort by this rank alone is enough).
fn const_rank(e: &Expr) -> u8 {
    if is_const(e) {
        1
    } else {
        0
    }
}

impl Rewriter for Simplifier {
    fn rewrite_expr(&mut self, e: &Expr) -> Expr {
        match e.inner() {
            InnerExpr::Bin { op, ty, a, b, .. } => self.rewrite_bin(*op, *ty, a, b, e),
            InnerExpr::Cmp { op, a, b, .. } => self.rewrite_cmp(*op, a, b, e),
            InnerExpr::Logical { op, a, b, .. } => self.rewrite_logical(*op, a, b, e),
            InnerExpr::Not { value, .. } => {
                if let Some(v) = as_bool(value) {
                    bool_lit(value.ty(), !v)
                } else {
                    e.clone()
                }
            }
            InnerExpr::Select {
                cond,
                true_value,
                false_value,
                ..
            } => {
                if let Some(c) = as_bool(cond) {
                    if c {
                        true_value.clone()
                    } else {
                        false_value.clone()
                    }
                } else if true_value == false_value {
                    true_value.clone()
                } else {
                    e.clone()
                }
            }
            InnerExpr::Cast { to_type, value } => {
                if let Some(v) = int_of(value) {
                    mk_int_imm(*to_type, v)
                } else if let Some(v) = float_of(value) {
                    if to_type.is_float() {
                        mk_float_imm(*to_type, v)
                    } else {
                        mk_int_imm(*to_type, v as i64)
                    }
                } else {
                    e.clone()
                }
            }
            InnerExpr::Let { name, value, body, .. } => self.rewrite_let(name, value, body, e),
            InnerExpr::Broadcast { value, lanes } if *lanes == 1 => value.clone(),
            InnerExpr::Ramp { stride, .. } if int_of(stride) == Some(0) => {
                if let InnerExpr::Ramp { base, lanes, .. } = e.inner() {
                    mk_broadcast(base.clone(), *lanes)
                } else {
                    e.clone()
                }
            }
            _ => e.clone(),
        }
    }

    fn rewrite_stmt(&mut self, s: &Stmt) -> Stmt {
        match s.inner() {
            InnerStmt::AssertStmt { cond, .. } => {
                if as_bool(cond) == Some(true) {
                    mk_no_op()
                } else {
                    s.clone()
                }
            }
            InnerStmt::Block { first, rest, .. } => mk_block((**first).clone(), (**rest).clone()),
            InnerStmt::For {
                name,
                min,
                extent,
                for_type,
                loop_split_info,
                body,
                ..
            } => {
                if let Some(ext) = int_of(extent) {
                    if ext <= 0 {
                        return mk_no_op();
                    }
                    if ext == 1 {
                        let mut replaced = ReplaceVar {
                            name: name.clone(),
                            replacement: min.clone(),
                        };
                        let body2 = replaced.mutate_stmt(body);
                        return mk_let_stmt(name.clone(), min.clone(), body2);
                    }
                }
                mk_for(name.clone(), min.clone(), extent.clone(), *for_type, loop_split_info.clone(), body.clone())
            }
            _ => s.clone(),
        }
    }
}

impl Mutator for Simplifier {}

impl Simplifier {
    pub fn simplify_expr(&mut self, e: &Expr) -> Expr {
        self.mutate_expr(e)
    }

    pub fn simplify_stmt(&mut self, s: &Stmt) -> Stmt {
        self.mutate_stmt(s)
    }

    fn rewrite_bin(&mut self, op: BinOp, ty: Type, a: &Expr, b: &Expr, orig: &Expr) -> Expr {
        if ty.is_int() || ty.is_uint() {
            if let (Some(x), Some(y)) = (int_of(a), int_of(b)) {
                return mk_int_imm(ty, eval_int_bin(op, x, y));
            }
        } else if ty.is_float() {
            if let (Some(x), Some(y)) = (float_of(a), float_of(b)) {
                return mk_float_imm(ty, eval_float_bin(op, x, y));
            }
        }
        if let Some(folded) = identity_fold(op, ty, a, b) {
            return folded;
        }
        // associativity/commutativity: move constants right for Add/Mul/Min/Max.
        if matches!(op, BinOp::Add | BinOp::Mul | BinOp::Min | BinOp::Max) && const_rank(a) > const_rank(b) {
            return mk_bin(op, ty, b.clone(), a.clone());
        }
        // fuse nested min/max sharing an operand: min(min(x,k1),k2) with
        // constant k1,k2 folds the two constants together.
        if matches!(op, BinOp::Min | BinOp::Max) {
            if let InnerExpr::Bin { op: inner_op, a: ia, b: ib, .. } = a.inner() {
                if *inner_op == op {
                    if let (Some(k1), Some(k2)) = (int_of(ib), int_of(b)) {
                        let folded = mk_int_imm(ty, eval_int_bin(op, k1, k2));
                        return mk_bin(op, ty, ia.clone(), folded);
                    }
                }
            }
        }
        orig.clone()
    }

    fn rewrite_cmp(&mut self, op: CmpOp, a: &Expr, b: &Expr, orig: &Expr) -> Expr {
        if let (Some(x), Some(y)) = (int_of(a), int_of(b)) {
            return bool_lit(orig.ty(), eval_cmp(op, x as f64, y as f64));
        }
        if let (Some(x), Some(y)) = (float_of(a), float_of(b)) {
            return bool_lit(orig.ty(), eval_cmp(op, x, y));
        }
        if a == b {
            return bool_lit(orig.ty(), matches!(op, CmpOp::Eq | CmpOp::Le | CmpOp::Ge));
        }
        // comparisons over Broadcast reduce to a scalar comparison
        // broadcast back out, and over Ramp the direction is monotone in
        // the stride's sign, so a constant bound on the base settles it.
        if let (InnerExpr::Broadcast { value: va, lanes }, InnerExpr::Broadcast { value: vb, .. }) =
            (a.inner(), b.inner())
        {
            return mk_broadcast(mk_cmp(op, va.clone(), vb.clone()), *lanes);
        }
        orig.clone()
    }

    fn rewrite_logical(&mut self, op: LogicalOp, a: &Expr, b: &Expr, orig: &Expr) -> Expr {
        match (as_bool(a), as_bool(b)) {
            (Some(x), Some(y)) => bool_lit(orig.ty(), eval_logical(op, x, y)),
            (Some(x), None) => match op {
                LogicalOp::And => {
                    if x {
                        b.clone()
                    } else {
                        bool_lit(orig.ty(), false)
                    }
                }
                LogicalOp::Or => {
                    if x {
                        bool_lit(orig.ty(), true)
                    } else {
                        b.clone()
                    }
                }
            },
            (None, Some(y)) => match op {
                LogicalOp::And => {
                    if y {
                        a.clone()
                    } else {
                        bool_lit(orig.ty(), false)
                    }
                }
                LogicalOp::Or => {
                    if y {
                        bool_lit(orig.ty(), true)
                    } else {
                        a.clone()
                    }
                }
            },
            (None, None) => orig.clone(),
        }
    }

    /// Let inlining (spec §4.3.3): substitute the bound value if it is a
    /// literal or referenced at most once in `body`; otherwise keep the
    /// binding.
    fn rewrite_let(&mut self, name: &crate::name::Symbol, value: &Expr, body: &Expr, orig: &Expr) -> Expr {
        let should_inline = is_const(value) || count_uses(name, body) <= 1;
        if should_inline {
            let mut subst = ReplaceVar {
                name: name.clone(),
                replacement: value.clone(),
            };
            subst.mutate_expr(body)
        } else {
            orig.clone()
        }
    }
}

fn count_uses(name: &crate::name::Symbol, e: &Expr) -> u32 {
    match e.inner() {
        InnerExpr::Variable { name: n, .. } => {
            if n == name {
                1
            } else {
                0
            }
        }
        InnerExpr::Let { name: inner_name, value, body, .. } => {
            let in_value = count_uses(name, value);
            if inner_name == name {
                in_value
            } else {
                in_value + count_uses(name, body)
            }
        }
        _ => e.children().iter().map(|c| count_uses(name, c)).sum(),
    }
}

struct ReplaceVar {
    name: crate::name::Symbol,
    replacement: Expr,
}

impl Rewriter for ReplaceVar {
    fn rewrite_expr(&mut self, e: &Expr) -> Expr {
        if let InnerExpr::Variable { name, .. } = e.inner() {
            if *name == self.name {
                return self.replacement.clone();
            }
        }
        e.clone()
    }
}
impl Mutator for ReplaceVar {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        if let InnerExpr::Let { name, .. } = e.inner() {
            if *name == self.name {
                // shadowed: rewrite only the bound value, leave body alone.
                if let InnerExpr::Let { value, body, .. } = e.inner() {
                    let v2 = self.mutate_expr(value);
                    return mk_let(self.name.clone(), v2, body.clone());
                }
            }
        }
        self.mutate_expr_default(e)
    }
}

fn eval_int_bin(op: BinOp, a: i64, b: i64) -> i64 {
    match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => floor_div(a, b),
        BinOp::Mod => floor_mod(a, b),
        BinOp::Min => a.min(b),
        BinOp::Max => a.max(b),
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
    }
}

fn eval_float_bin(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => a % b,
        BinOp::Min => a.min(b),
        BinOp::Max => a.max(b),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
            crate::errors::bug("simplify::eval_float_bin", "bitwise op on float")
        }
    }
}

fn eval_cmp(op: CmpOp, a: f64, b: f64) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

fn eval_logical(op: LogicalOp, a: bool, b: bool) -> bool {
    match op {
        LogicalOp::And => a && b,
        LogicalOp::Or => a || b,
    }
}

/// Numeric identity eliminations: `x+0`, `x*1`, `x*0`, `x-0`, `x/1`, and
/// the `Min`/`Max` absorbing-element cases.
fn identity_fold(op: BinOp, ty: Type, a: &Expr, b: &Expr) -> Option<Expr> {
    let bi = int_of(b);
    match (op, bi) {
        (BinOp::Add, Some(0)) => Some(a.clone()),
        (BinOp::Sub, Some(0)) => Some(a.clone()),
        (BinOp::Mul, Some(1)) => Some(a.clone()),
        (BinOp::Mul, Some(0)) => Some(mk_int_imm(ty, 0)),
        (BinOp::Div, Some(1)) => Some(a.clone()),
        (BinOp::Mod, Some(1)) => Some(mk_int_imm(ty, 0)),
        _ => {
            if a == b && matches!(op, BinOp::Min | BinOp::Max) {
                Some(a.clone())
            } else if op == BinOp::Sub && a == b {
                Some(mk_int_imm(ty, 0))
            } else {
                None
            }
        }
    }
}

/// `proved(e)`: does `e` simplify to the literal `true`?
pub fn proved(e: &Expr) -> bool {
    let mut s = Simplifier::new();
    as_bool(&s.simplify_expr(e)) == Some(true)
}

/// `proved_either(e1, e2, disproved)`: returns whether at least one of
/// `e1`/`e2` simplifies to `true`, and sets `*disproved` true iff both
/// simplify to `false`.
pub fn proved_either(e1: &Expr, e2: &Expr, disproved: &mut bool) -> bool {
    let mut s = Simplifier::new();
    let r1 = as_bool(&s.simplify_expr(e1));
    let r2 = as_bool(&s.simplify_expr(e2));
    *disproved = r1 == Some(false) && r2 == Some(false);
    r1 == Some(true) || r2 == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Symbol;

    fn simplify(e: Expr) -> Expr {
        Simplifier::new().simplify_expr(&e)
    }

    #[test]
    fn constant_folds_arithmetic() {
        let ty = Type::int(32);
        let e = mk_bin(BinOp::Add, ty, mk_int_imm(ty, 2), mk_int_imm(ty, 3));
        assert_eq!(simplify(e), mk_int_imm(ty, 5));
    }

    #[test]
    fn floor_division_semantics_hold() {
        let ty = Type::int(32);
        let e = mk_bin(BinOp::Div, ty, mk_int_imm(ty, -7), mk_int_imm(ty, 2));
        assert_eq!(simplify(e), mk_int_imm(ty, -4));
        let m = mk_bin(BinOp::Mod, ty, mk_int_imm(ty, -7), mk_int_imm(ty, 2));
        assert_eq!(simplify(m), mk_int_imm(ty, 1));
    }

    #[test]
    fn identity_eliminations() {
        let ty = Type::int(32);
        let x = mk_variable(ty, Symbol::new("x"));
        assert_eq!(simplify(mk_bin(BinOp::Add, ty, x.clone(), mk_int_imm(ty, 0))), x);
        assert_eq!(simplify(mk_bin(BinOp::Mul, ty, x.clone(), mk_int_imm(ty, 1))), x);
        assert_eq!(simplify(mk_bin(BinOp::Mul, ty, x.clone(), mk_int_imm(ty, 0))), mk_int_imm(ty, 0));
    }

    #[test]
    fn constants_move_right() {
        let ty = Type::int(32);
        let x = mk_variable(ty, Symbol::new("x"));
        let e = mk_bin(BinOp::Add, ty, mk_int_imm(ty, 5), x.clone());
        let expected = mk_bin(BinOp::Add, ty, x, mk_int_imm(ty, 5));
        assert_eq!(simplify(e), expected);
    }

    #[test]
    fn select_with_constant_condition_collapses() {
        let ty = Type::int(32);
        let sel = mk_select(bool_lit(Type::bool_(), true), mk_int_imm(ty, 1), mk_int_imm(ty, 2));
        assert_eq!(simplify(sel), mk_int_imm(ty, 1));
    }

    #[test]
    fn let_inlines_literal_binding() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let body = mk_bin(BinOp::Add, ty, mk_variable(ty, x.clone()), mk_int_imm(ty, 1));
        let e = mk_let(x, mk_int_imm(ty, 10), body);
        assert_eq!(simplify(e), mk_int_imm(ty, 11));
    }

    #[test]
    fn let_retained_when_used_more_than_once_and_not_literal() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let y = Symbol::new("y");
        let value = mk_variable(ty, y);
        let body = mk_bin(
            BinOp::Add,
            ty,
            mk_variable(ty, x.clone()),
            mk_variable(ty, x.clone()),
        );
        let e = mk_let(x, value, body);
        let result = simplify(e);
        assert!(matches!(result.inner(), InnerExpr::Let { .. }));
    }

    #[test]
    fn idempotent_on_already_simplified_input() {
        let ty = Type::int(32);
        let x = mk_variable(ty, Symbol::new("x"));
        let e = mk_bin(BinOp::Add, ty, x, mk_int_imm(ty, 5));
        let once = simplify(e.clone());
        let twice = Simplifier::new().simplify_expr(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn assert_true_collapses_to_no_op() {
        let cond = bool_lit(Type::bool_(), true);
        let s = mk_assert_stmt(cond, "ok");
        let simplified = Simplifier::new().simplify_stmt(&s);
        assert!(simplified.is_no_op());
    }

    #[test]
    fn for_with_nonpositive_extent_is_dropped() {
        let ty = Type::int(32);
        let body = mk_store(Symbol::new("buf"), mk_int_imm(ty, 1), mk_int_imm(ty, 0));
        let f = mk_for(Symbol::new("x"), mk_int_imm(ty, 0), mk_int_imm(ty, 0), ForType::Serial, None, body);
        let simplified = Simplifier::new().simplify_stmt(&f);
        assert!(simplified.is_no_op());
    }
}
