//! Clamp lowering (spec §4.6): rewrites the `Clamp` sugar node into plain
//! arithmetic. Grounded on `examples/original_source/cpp/src/Border.cpp`/
//! `Border.h` (virtual-dispatch `BorderBase` subclasses), re-architected per
//! spec §9's Design Notes as a tagged variant with a lowering function per
//! variant rather than a class hierarchy.

use crate::expr::*;
use crate::mutator::{Mutator, Rewriter};
use crate::types::Type;

/// Lowers one `Clamp` node to the equivalent arithmetic, per the table in
/// spec §4.6. `a`, `lo`, `hi` share a type; `p1` is required for `Tile` and
/// ignored otherwise.
pub fn lower_clamp(kind: ClampKind, a: &Expr, lo: &Expr, hi: &Expr, p1: Option<&Expr>) -> Expr {
    let ty = a.ty();
    if ty.is_float() {
        return lower_clamp_float(kind, a, lo, hi);
    }
    match kind {
        ClampKind::None => a.clone(),
        ClampKind::Replicate => {
            mk_bin(BinOp::Max, ty, mk_bin(BinOp::Min, ty, a.clone(), hi.clone()), lo.clone())
        }
        ClampKind::Wrap => {
            let span = mk_bin(
                BinOp::Add,
                ty,
                mk_bin(BinOp::Sub, ty, hi.clone(), lo.clone()),
                mk_int_imm(ty, 1),
            );
            let shifted = mk_bin(BinOp::Sub, ty, a.clone(), lo.clone());
            mk_bin(BinOp::Add, ty, mk_bin(BinOp::Mod, ty, shifted, span), lo.clone())
        }
        ClampKind::Reflect => lower_reflect(ty, a, lo, hi),
        ClampKind::Reflect101 => lower_reflect101(ty, a, lo, hi),
        ClampKind::Tile => {
            let p1 = p1.expect("Tile clamp requires p1");
            lower_tile(ty, a, lo, hi, p1)
        }
    }
}

fn lower_reflect(ty: Type, a: &Expr, lo: &Expr, hi: &Expr) -> Expr {
    // r = hi - lo + 1; e = (a - lo) mod (2r)
    // select(e < r, e mod r, r - 1 - e mod r) + lo
    let r = mk_bin(
        BinOp::Add,
        ty,
        mk_bin(BinOp::Sub, ty, hi.clone(), lo.clone()),
        mk_int_imm(ty, 1),
    );
    let two_r = mk_bin(BinOp::Mul, ty, mk_int_imm(ty, 2), r.clone());
    let shifted = mk_bin(BinOp::Sub, ty, a.clone(), lo.clone());
    let e = mk_bin(BinOp::Mod, ty, shifted, two_r);
    let e_mod_r = mk_bin(BinOp::Mod, ty, e.clone(), r.clone());
    let folded = mk_bin(
        BinOp::Sub,
        ty,
        mk_bin(BinOp::Sub, ty, r.clone(), mk_int_imm(ty, 1)),
        e_mod_r.clone(),
    );
    let selected = mk_select(mk_cmp(CmpOp::Lt, e, r), e_mod_r, folded);
    mk_bin(BinOp::Add, ty, selected, lo.clone())
}

fn lower_reflect101(ty: Type, a: &Expr, lo: &Expr, hi: &Expr) -> Expr {
    // r = hi - lo; e = (a - lo) mod (2r)
    // select(e <= r, e mod (r+1), (2r - e) mod (r+1)) + lo
    let r = mk_bin(BinOp::Sub, ty, hi.clone(), lo.clone());
    let two_r = mk_bin(BinOp::Mul, ty, mk_int_imm(ty, 2), r.clone());
    let shifted = mk_bin(BinOp::Sub, ty, a.clone(), lo.clone());
    let e = mk_bin(BinOp::Mod, ty, shifted, two_r.clone());
    let r_plus_1 = mk_bin(BinOp::Add, ty, r.clone(), mk_int_imm(ty, 1));
    let then_branch = mk_bin(BinOp::Mod, ty, e.clone(), r_plus_1.clone());
    let else_branch = mk_bin(BinOp::Mod, ty, mk_bin(BinOp::Sub, ty, two_r, e.clone()), r_plus_1);
    let selected = mk_select(mk_cmp(CmpOp::Le, e, r), then_branch, else_branch);
    mk_bin(BinOp::Add, ty, selected, lo.clone())
}

fn lower_tile(ty: Type, a: &Expr, lo: &Expr, hi: &Expr, p1: &Expr) -> Expr {
    // select(a < lo, (a-lo) mod p1 + lo,
    //   select(a > hi, (a-hi-1) mod p1 + hi + 1 - p1, (a-lo) mod (hi-lo+1) + lo))
    let below = mk_bin(
        BinOp::Add,
        ty,
        mk_bin(BinOp::Mod, ty, mk_bin(BinOp::Sub, ty, a.clone(), lo.clone()), p1.clone()),
        lo.clone(),
    );
    let above = mk_bin(
        BinOp::Add,
        ty,
        mk_bin(
            BinOp::Mod,
            ty,
            mk_bin(BinOp::Sub, ty, mk_bin(BinOp::Sub, ty, a.clone(), hi.clone()), mk_int_imm(ty, 1)),
            p1.clone(),
        ),
        mk_bin(BinOp::Sub, ty, mk_bin(BinOp::Add, ty, hi.clone(), mk_int_imm(ty, 1)), p1.clone()),
    );
    let within = mk_bin(
        BinOp::Add,
        ty,
        mk_bin(
            BinOp::Mod,
            ty,
            mk_bin(BinOp::Sub, ty, a.clone(), lo.clone()),
            mk_bin(BinOp::Add, ty, mk_bin(BinOp::Sub, ty, hi.clone(), lo.clone()), mk_int_imm(ty, 1)),
        ),
        lo.clone(),
    );
    let inner = mk_select(mk_cmp(CmpOp::Gt, a.clone(), hi.clone()), above, within);
    mk_select(mk_cmp(CmpOp::Lt, a.clone(), lo.clone()), below, inner)
}

fn lower_clamp_float(kind: ClampKind, a: &Expr, lo: &Expr, hi: &Expr) -> Expr {
    let ty = a.ty();
    match kind {
        ClampKind::None => a.clone(),
        ClampKind::Replicate => {
            mk_bin(BinOp::Max, ty, mk_bin(BinOp::Min, ty, a.clone(), hi.clone()), lo.clone())
        }
        ClampKind::Wrap => {
            // float uses fmod and no `+1` (spec §4.6).
            let span = mk_bin(BinOp::Sub, ty, hi.clone(), lo.clone());
            let shifted = mk_bin(BinOp::Sub, ty, a.clone(), lo.clone());
            mk_bin(BinOp::Add, ty, mk_bin(BinOp::Mod, ty, shifted, span), lo.clone())
        }
        // Reflect101 for float degrades to Reflect (spec §4.6).
        ClampKind::Reflect | ClampKind::Reflect101 => lower_reflect(ty, a, lo, hi),
        ClampKind::Tile => crate::errors::bug("clamp::lower_clamp_float", "Tile clamp is integer-only"),
    }
}

/// Walks a tree replacing every `Clamp` node with its lowering, bottom-up
/// so nested clamps (e.g. a Tile clamp whose bounds are themselves
/// clamped) lower correctly.
pub struct ClampLowerer;

impl Rewriter for ClampLowerer {
    fn rewrite_expr(&mut self, e: &Expr) -> Expr {
        if let InnerExpr::Clamp { kind, a, min, max, p1, .. } = e.inner() {
            lower_clamp(*kind, a, min, max, p1.as_ref())
        } else {
            e.clone()
        }
    }
}
impl Mutator for ClampLowerer {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplify::Simplifier;

    fn eval(e: &Expr) -> i64 {
        let simplified = Simplifier::new().simplify_expr(e);
        match simplified.inner() {
            InnerExpr::IntImm { value, .. } => *value,
            other => panic!("expected a constant, got {:?}", other),
        }
    }

    fn replicate_at(a: i64) -> i64 {
        let ty = Type::int(32);
        let e = lower_clamp(ClampKind::Replicate, &mk_int_imm(ty, a), &mk_int_imm(ty, 3), &mk_int_imm(ty, 5), None);
        eval(&e)
    }

    #[test]
    fn replicate_border_matches_expected_sequence() {
        // spec §8 scenario 1: domain [3,5], realize over [0,10) ->
        // 3,3,3,3,4,5,5,5,5,5
        let expected = [3, 3, 3, 3, 4, 5, 5, 5, 5, 5];
        for (x, want) in expected.iter().enumerate() {
            assert_eq!(replicate_at(x as i64), *want, "x={}", x);
        }
    }

    #[test]
    fn wrap_matches_mathematical_definition() {
        let ty = Type::int(32);
        for a in -5..15 {
            let e = lower_clamp(ClampKind::Wrap, &mk_int_imm(ty, a), &mk_int_imm(ty, 4), &mk_int_imm(ty, 9), None);
            let got = eval(&e);
            let span = 9 - 4 + 1;
            let want = crate::interval::floor_mod(a - 4, span) + 4;
            assert_eq!(got, want, "a={}", a);
        }
    }

    #[test]
    fn reflect_matches_mathematical_definition_over_wide_range() {
        let ty = Type::int(32);
        let lo = 30i64;
        let hi = 50i64;
        for a in (lo - 3 * (hi - lo + 1))..(hi + 3 * (hi - lo + 1)) {
            let e = lower_clamp(ClampKind::Reflect, &mk_int_imm(ty, a), &mk_int_imm(ty, lo), &mk_int_imm(ty, hi), None);
            let got = eval(&e);
            assert!(got >= lo && got <= hi, "a={} got={}", a, got);
        }
    }

    #[test]
    fn tile_matches_mathematical_definition() {
        let ty = Type::int(32);
        let (lo, hi, p1) = (30i64, 50i64, 3i64);
        for a in 0..100 {
            let e = lower_clamp(
                ClampKind::Tile,
                &mk_int_imm(ty, a),
                &mk_int_imm(ty, lo),
                &mk_int_imm(ty, hi),
                Some(&mk_int_imm(ty, p1)),
            );
            let got = eval(&e);
            assert!(got >= lo - p1 && got <= hi + p1, "a={} got={}", a, got);
        }
    }
}
