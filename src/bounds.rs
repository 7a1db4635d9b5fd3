//! Bounds and interval analysis (spec §4.4): `interval_of_expr_in_scope`,
//! the `regions_touched`/`region_called`/`region_provided` family, and
//! `bounds_simplify`, a second simplifier pass driven by interval facts.
//! Grounded on `examples/original_source/src/IntervalAnalysis.h` /
//! `BoundsSimplify.h` for the shape of the two passes; implemented on top
//! of this crate's own `Visitor`/`CachedMutator` substrate rather than
//! Halide's C++ one.

use hashbrown::HashMap;

use crate::domain::DomInterval;
use crate::expr::*;
use crate::interval::{self, Bound, InfInterval};
use crate::mutator::{Mutator, Rewriter};
use crate::name::Symbol;
use crate::simplify::Simplifier;
use crate::stmt::*;
use crate::types::Type;
use crate::visitor::Visitor;

/// The interval facts in scope when evaluating an expression: a mapping
/// from free variable name to its known `DomInterval`.
#[derive(Debug, Clone, Default)]
pub struct Scope(pub HashMap<Symbol, DomInterval>);

impl Scope {
    pub fn new() -> Self {
        Scope(HashMap::new())
    }

    pub fn bind(&self, name: Symbol, interval: DomInterval) -> Scope {
        let mut next = self.clone();
        next.0.insert(name, interval);
        next
    }

    pub fn get(&self, name: &Symbol) -> Option<DomInterval> {
        self.0.get(name).copied()
    }
}

fn single(v: i64) -> DomInterval {
    DomInterval::single(v)
}

/// Walks `expr` and returns the tightest `InfInterval` (via `DomInterval`,
/// to carry the `exact` bit) derivable from the intervals bound to its free
/// variables in `scope`. Loads of image buffers contribute `(T.min, T.max)`
/// unless a parameter constraint narrows them -- this crate has no
/// parameter-constraint table in scope, so `Load` always uses the type
/// range.
pub fn interval_of_expr_in_scope(expr: &Expr, scope: &Scope) -> DomInterval {
    match expr.inner() {
        InnerExpr::IntImm { value, .. } => single(*value),
        InnerExpr::FloatImm { .. } => DomInterval::everything(),
        InnerExpr::Variable { name, .. } => scope.get(name).unwrap_or_else(DomInterval::everything),
        InnerExpr::Cast { .. } => DomInterval::everything(),
        InnerExpr::Not { .. } => DomInterval::new(InfInterval::new(Bound::Finite(0), Bound::Finite(1)), true),
        InnerExpr::SignFill { .. } => DomInterval::everything(),
        InnerExpr::Bin { op, a, b, .. } => interval_of_bin(*op, a, b, scope),
        InnerExpr::Cmp { .. } => DomInterval::new(InfInterval::new(Bound::Finite(0), Bound::Finite(1)), false),
        InnerExpr::Logical { .. } => DomInterval::new(InfInterval::new(Bound::Finite(0), Bound::Finite(1)), false),
        InnerExpr::Select { true_value, false_value, .. } => {
            let t = interval_of_expr_in_scope(true_value, scope);
            let f = interval_of_expr_in_scope(false_value, scope);
            crate::domain::union(t, f)
        }
        InnerExpr::Load { ty, .. } => match (ty.min_value(), ty.max_value()) {
            (Some(lo), Some(hi)) => DomInterval::new(
                InfInterval::new(Bound::Finite(lo as i64), Bound::Finite(hi as i64)),
                false,
            ),
            _ => DomInterval::everything(),
        },
        InnerExpr::Ramp { base, stride, lanes } => {
            let b = interval_of_expr_in_scope(base, scope);
            if let Some(k) = as_const_i64(stride) {
                crate::domain::union(b, b + crate::domain::mul_scalar(single(1), k * (*lanes as i64 - 1)))
            } else {
                DomInterval::everything()
            }
        }
        InnerExpr::Broadcast { value, .. } => interval_of_expr_in_scope(value, scope),
        InnerExpr::Call { ty, .. } => match (ty.min_value(), ty.max_value()) {
            (Some(lo), Some(hi)) => DomInterval::new(
                InfInterval::new(Bound::Finite(lo as i64), Bound::Finite(hi as i64)),
                false,
            ),
            _ => DomInterval::everything(),
        },
        InnerExpr::Let { name, value, body, .. } => {
            let v = interval_of_expr_in_scope(value, scope);
            interval_of_expr_in_scope(body, &scope.bind(name.clone(), v))
        }
        InnerExpr::Clamp { min, max, .. } => {
            let lo = interval_of_expr_in_scope(min, scope);
            let hi = interval_of_expr_in_scope(max, scope);
            DomInterval::new(InfInterval::new(lo.bounds.min, hi.bounds.max), lo.exact && hi.exact)
        }
        InnerExpr::Infinity { sign, .. } => match sign {
            Sign::Pos => DomInterval::new(InfInterval::new(Bound::PosInf, Bound::PosInf), true),
            Sign::Neg => DomInterval::new(InfInterval::new(Bound::NegInf, Bound::NegInf), true),
        },
        InnerExpr::Solve { body, .. } | InnerExpr::TargetVar { body, .. } => {
            interval_of_expr_in_scope(body, scope)
        }
    }
}

fn as_const_i64(e: &Expr) -> Option<i64> {
    match e.inner() {
        InnerExpr::IntImm { value, .. } => Some(*value),
        _ => None,
    }
}

fn interval_of_bin(op: BinOp, a: &Expr, b: &Expr, scope: &Scope) -> DomInterval {
    let ia = interval_of_expr_in_scope(a, scope);
    let ib = interval_of_expr_in_scope(b, scope);
    match op {
        BinOp::Add => ia + ib,
        BinOp::Sub => ia - ib,
        BinOp::Min => crate::domain::min(ia, ib),
        BinOp::Max => crate::domain::max(ia, ib),
        BinOp::Mod => crate::domain::modulus(ia, ib),
        BinOp::Mul => {
            if let Some(k) = as_const_i64(b) {
                crate::domain::mul_scalar(ia, k)
            } else if let Some(k) = as_const_i64(a) {
                crate::domain::mul_scalar(ib, k)
            } else {
                DomInterval::everything()
            }
        }
        BinOp::Div => {
            if let Some(k) = as_const_i64(b) {
                if k != 0 {
                    crate::domain::div_scalar(ia, k)
                } else {
                    DomInterval::everything()
                }
            } else {
                DomInterval::everything()
            }
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => DomInterval::everything(),
    }
}

/// Per-dimension index-interval union of every reference to `name` inside
/// `stmt`. `is_write` selects `Store`/`Provide` (→ `region_provided`) vs.
/// `Load`/`Call` (→ `region_called`); `regions_touched` is the union of
/// both.
struct RegionCollector<'a> {
    name: &'a Symbol,
    is_write: Option<bool>,
    scope: Scope,
    indices: Vec<Vec<Expr>>,
}

impl<'a> Visitor for RegionCollector<'a> {
    fn visit_expr(&mut self, e: &Expr) {
        match e.inner() {
            InnerExpr::Load { name, index, .. } if name == self.name && self.is_write != Some(true) => {
                self.indices.push(vec![index.clone()]);
            }
            InnerExpr::Call { name, args, .. } if name == self.name && self.is_write != Some(true) => {
                self.indices.push(args.clone());
            }
            _ => {}
        }
        self.visit_expr_children(e);
    }

    fn visit_stmt(&mut self, s: &Stmt) {
        match s.inner() {
            InnerStmt::Store { name, index, .. } if name == self.name && self.is_write != Some(false) => {
                self.indices.push(vec![index.clone()]);
            }
            InnerStmt::Provide { name, args, .. } if name == self.name && self.is_write != Some(false) => {
                self.indices.push(args.clone());
            }
            _ => {}
        }
        self.visit_stmt_children(s);
    }
}

fn regions(stmt: &Stmt, name: &Symbol, is_write: Option<bool>, scope: &Scope) -> Vec<DomInterval> {
    let mut collector = RegionCollector {
        name,
        is_write,
        scope: scope.clone(),
        indices: Vec::new(),
    };
    collector.visit_stmt(stmt);
    if collector.indices.is_empty() {
        return vec![];
    }
    let ndims = collector.indices[0].len();
    let mut out = vec![DomInterval::new(InfInterval::new(Bound::PosInf, Bound::NegInf), true); ndims];
    for site in &collector.indices {
        for (dim, idx) in site.iter().enumerate() {
            let i = interval_of_expr_in_scope(idx, scope);
            out[dim] = crate::domain::union(out[dim], i);
        }
    }
    out
}

pub fn regions_touched(stmt: &Stmt, name: &Symbol, scope: &Scope) -> Vec<DomInterval> {
    regions(stmt, name, None, scope)
}

pub fn region_called(stmt: &Stmt, name: &Symbol, scope: &Scope) -> Vec<DomInterval> {
    regions(stmt, name, Some(false), scope)
}

pub fn region_provided(stmt: &Stmt, name: &Symbol, scope: &Scope) -> Vec<DomInterval> {
    regions(stmt, name, Some(true), scope)
}

/// A simplifier pass that additionally consults interval facts in scope to
/// discharge `min`/`max`/`Select`/`Clamp` nodes a bound provably satisfies
/// (spec §4.4). Idempotent with `Simplifier::simplify_expr`; must be rerun
/// after any pass that introduces new bounds.
pub struct BoundsSimplifier {
    scope: Scope,
    base: Simplifier,
}

impl BoundsSimplifier {
    pub fn new(scope: Scope) -> Self {
        BoundsSimplifier {
            scope,
            base: Simplifier::new(),
        }
    }

    pub fn simplify_expr(&mut self, e: &Expr) -> Expr {
        self.mutate_expr(e)
    }

    pub fn simplify_stmt(&mut self, s: &Stmt) -> Stmt {
        self.mutate_stmt(s)
    }

    fn discharge_bin(&self, e: &Expr) -> Expr {
        if let InnerExpr::Bin { op, a, b, .. } = e.inner() {
            let ia = interval_of_expr_in_scope(a, &self.scope);
            let ib = interval_of_expr_in_scope(b, &self.scope);
            match op {
                BinOp::Min => {
                    if ia.bounds.max <= ib.bounds.min {
                        return a.clone();
                    }
                    if ib.bounds.max <= ia.bounds.min {
                        return b.clone();
                    }
                }
                BinOp::Max => {
                    if ia.bounds.min >= ib.bounds.max {
                        return a.clone();
                    }
                    if ib.bounds.min >= ia.bounds.max {
                        return b.clone();
                    }
                }
                _ => {}
            }
        }
        e.clone()
    }
}

impl Rewriter for BoundsSimplifier {
    fn rewrite_expr(&mut self, e: &Expr) -> Expr {
        let discharged = self.discharge_bin(e);
        self.base.rewrite_expr(&discharged)
    }

    fn rewrite_stmt(&mut self, s: &Stmt) -> Stmt {
        self.base.rewrite_stmt(s)
    }
}

impl Mutator for BoundsSimplifier {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_of_add_is_sum_of_operand_intervals() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let scope = Scope::new().bind(x.clone(), single(3));
        let e = mk_bin(BinOp::Add, ty, mk_variable(ty, x), mk_int_imm(ty, 4));
        let i = interval_of_expr_in_scope(&e, &scope);
        assert_eq!(i.bounds, InfInterval::new(Bound::Finite(7), Bound::Finite(7)));
    }

    #[test]
    fn region_called_collects_read_indices() {
        let ty = Type::int(32);
        let g = Symbol::new("g");
        let x = Symbol::new("x");
        let load = mk_load(ty, g.clone(), mk_variable(ty, x.clone()), None, None);
        let store = mk_store(Symbol::new("out"), load, mk_variable(ty, x.clone()));
        let for_stmt = mk_for(x.clone(), mk_int_imm(ty, 0), mk_int_imm(ty, 10), ForType::Serial, None, store);
        let scope = Scope::new().bind(x, DomInterval::new(InfInterval::new(Bound::Finite(0), Bound::Finite(9)), true));
        let region = region_called(&for_stmt, &g, &scope);
        assert_eq!(region.len(), 1);
        assert_eq!(region[0].bounds, InfInterval::new(Bound::Finite(0), Bound::Finite(9)));
    }

    #[test]
    fn bounds_simplify_discharges_provably_satisfied_min() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let scope = Scope::new().bind(x.clone(), DomInterval::new(InfInterval::new(Bound::Finite(0), Bound::Finite(5)), true));
        let e = mk_bin(BinOp::Min, ty, mk_variable(ty, x.clone()), mk_int_imm(ty, 100));
        let mut bs = BoundsSimplifier::new(scope);
        assert_eq!(bs.simplify_expr(&e), mk_variable(ty, x));
    }
}
