//! Index-set loop splitting (spec §4.8): partitions a serial `For` into
//! *before*/*main*/*after* fragments so that `bounds_simplify` can prove
//! away the clamp/select patterns that motivated the split, at least in
//! the `main` fragment. Grounded on `examples/original_source/src/
//! LoopPartition.h`, the canonical implementation per spec §9's Design
//! Notes (function-level sliding-window split logic is superseded by
//! this loop-level pass).

use crate::bounds::{BoundsSimplifier, Scope};
use crate::expr::{self, BinOp, Expr};
use crate::name::Symbol;
use crate::stmt::{self, ForType, InnerStmt, LoopFragment, LoopSplitInfo, Stmt};

/// Default inner-interval width used when the caller hasn't specified one
/// (spec §4.8: "a heuristic (default 5)").
pub const DEFAULT_SPLIT_WIDTH: i64 = 5;

/// Splits one serial loop into before/main/after fragments over
/// `[min, min+n)`, `[min+n, max(extent-2n, 0))`, `[…, extent)`. Returns
/// `None` if `for_type` isn't `Serial` (only serial loops benefit; a
/// parallel or vectorized loop has no sequential structure to exploit).
pub fn split_loop(name: &Symbol, min: &Expr, extent: &Expr, for_type: ForType, body: &Stmt, n: i64) -> Option<Stmt> {
    if for_type != ForType::Serial {
        return None;
    }
    let ty = min.ty();
    let n_e = expr::mk_int_imm(ty, n);
    let two_n_e = expr::mk_int_imm(ty, 2 * n);

    let before_extent = expr::mk_bin(BinOp::Min, ty, extent.clone(), n_e.clone());
    let before = mk_fragment(name, min, &before_extent, body, LoopFragment::Before);

    let main_min = expr::mk_bin(BinOp::Add, ty, min.clone(), n_e.clone());
    let main_extent = expr::mk_bin(
        BinOp::Max,
        ty,
        expr::mk_bin(BinOp::Sub, ty, extent.clone(), two_n_e),
        expr::mk_int_imm(ty, 0),
    );
    let main = mk_fragment(name, &main_min, &main_extent, body, LoopFragment::Main);

    let after_min = expr::mk_bin(BinOp::Add, ty, main_min.clone(), main_extent.clone());
    let after_extent = expr::mk_bin(BinOp::Sub, ty, expr::mk_bin(BinOp::Add, ty, min.clone(), extent.clone()), after_min.clone());
    let after = mk_fragment(name, &after_min, &after_extent, body, LoopFragment::After);

    Some(stmt::mk_block(before, stmt::mk_block(main, after)))
}

fn mk_fragment(name: &Symbol, min: &Expr, extent: &Expr, body: &Stmt, fragment: LoopFragment) -> Stmt {
    let simplified_extent = crate::simplify::Simplifier::new().simplify_expr(extent);
    stmt::mk_for(
        name.clone(),
        min.clone(),
        simplified_extent,
        ForType::Serial,
        Some(LoopSplitInfo { fragment }),
        body.clone(),
    )
}

/// Re-runs `bounds_simplify` on `body`, with the loop variable bound to
/// the fragment's own `[min, min+extent)` in scope, so comparisons the
/// split was meant to resolve (e.g. `x >= 0 && x < width`) collapse.
pub fn simplify_fragment(name: &Symbol, min: &Expr, extent: &Expr, body: &Stmt) -> Stmt {
    let empty = Scope::new();
    let min_interval = crate::bounds::interval_of_expr_in_scope(min, &empty);
    let last = expr::mk_bin(BinOp::Sub, min.ty(), expr::mk_bin(BinOp::Add, min.ty(), min.clone(), extent.clone()), expr::mk_int_imm(min.ty(), 1));
    let last_interval = crate::bounds::interval_of_expr_in_scope(&last, &empty);
    let fragment_interval = crate::domain::min(min_interval, last_interval);
    let fragment_interval = crate::domain::DomInterval::new(
        crate::interval::InfInterval::new(fragment_interval.bounds.min, crate::interval::max_interval(min_interval.bounds, last_interval.bounds).max),
        fragment_interval.exact,
    );
    let scope = Scope::new().bind(name.clone(), fragment_interval);
    let mut simplifier = BoundsSimplifier::new(scope);
    simplifier.simplify_stmt(body)
}

/// Checks whether `body` is still "effective": free of the clamp/select
/// patterns (any remaining `Select`/`Clamp` node) that motivated the
/// split (spec §4.8). If not effective, the caller should revert to the
/// unsplit loop.
pub fn is_effective(body: &Stmt) -> bool {
    struct HasSelectOrClamp(bool);
    impl crate::visitor::Visitor for HasSelectOrClamp {
        fn visit_expr(&mut self, e: &Expr) {
            match e.inner() {
                crate::expr::InnerExpr::Select { .. } | crate::expr::InnerExpr::Clamp { .. } => self.0 = true,
                _ => self.visit_expr_children(e),
            }
        }
    }
    let mut checker = HasSelectOrClamp(false);
    checker.visit_stmt(body);
    !checker.0
}

/// Applies loop splitting to every eligible `For` in `stmt`, reverting
/// splits that don't turn out to be effective on the `main` fragment.
pub fn apply_loop_splitting(stmt: &Stmt, width: i64) -> Stmt {
    match stmt.inner() {
        InnerStmt::For { name, min, extent, for_type, loop_split_info: None, body } if *for_type == ForType::Serial => {
            let recursed_body = apply_loop_splitting(body, width);
            if let Some(split) = split_loop(name, min, extent, *for_type, &recursed_body, width) {
                if let InnerStmt::Block { first: before, rest } = split.inner() {
                    if let InnerStmt::Block { first: main, rest: after } = rest.inner() {
                        let main_simplified = simplify_fragment_inside(main);
                        if is_effective(&main_simplified) {
                            return stmt::mk_block((**before).clone(), stmt::mk_block(main_simplified, (**after).clone()));
                        }
                    }
                }
            }
            stmt::mk_for(name.clone(), min.clone(), extent.clone(), *for_type, None, recursed_body)
        }
        _ => recurse_children(stmt, width),
    }
}

fn simplify_fragment_inside(for_stmt: &Stmt) -> Stmt {
    if let InnerStmt::For { name, min, extent, for_type, loop_split_info, body } = for_stmt.inner() {
        let simplified_body = simplify_fragment(name, min, extent, body);
        stmt::mk_for(name.clone(), min.clone(), extent.clone(), *for_type, loop_split_info.clone(), simplified_body)
    } else {
        for_stmt.clone()
    }
}

fn recurse_children(stmt: &Stmt, width: i64) -> Stmt {
    match stmt.inner() {
        InnerStmt::For { name, min, extent, for_type, loop_split_info, body } => stmt::mk_for(
            name.clone(),
            min.clone(),
            extent.clone(),
            *for_type,
            loop_split_info.clone(),
            apply_loop_splitting(body, width),
        ),
        InnerStmt::LetStmt { name, value, body } => stmt::mk_let_stmt(name.clone(), value.clone(), apply_loop_splitting(body, width)),
        InnerStmt::Allocate { name, ty, size, body } => stmt::mk_allocate(name.clone(), *ty, size.clone(), apply_loop_splitting(body, width)),
        InnerStmt::Realize { name, ty, bounds, body } => stmt::mk_realize(name.clone(), *ty, bounds.clone(), apply_loop_splitting(body, width)),
        InnerStmt::Pipeline { name, produce, update, consume } => stmt::mk_pipeline(
            name.clone(),
            apply_loop_splitting(produce, width),
            update.as_ref().map(|u| apply_loop_splitting(u, width)),
            apply_loop_splitting(consume, width),
        ),
        InnerStmt::Block { first, rest } => stmt::mk_block(apply_loop_splitting(first, width), apply_loop_splitting(rest, width)),
        InnerStmt::StmtTargetVar { name, body } => stmt::mk_stmt_target_var(name.clone(), apply_loop_splitting(body, width)),
        _ => stmt.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn split_produces_three_fragments_covering_original_range() {
        let ty = Type::int(32);
        let name = Symbol::new("x");
        let min = expr::mk_int_imm(ty, 0);
        let extent = expr::mk_int_imm(ty, 20);
        let body = stmt::mk_no_op();
        let split = split_loop(&name, &min, &extent, ForType::Serial, &body, 5).unwrap();
        let rendered = format!("{:?}", split);
        assert!(rendered.contains("for (serial, x in 0..5)"));
    }

    #[test]
    fn vectorized_loop_is_not_split() {
        let ty = Type::int(32);
        let name = Symbol::new("x");
        let min = expr::mk_int_imm(ty, 0);
        let extent = expr::mk_int_imm(ty, 20);
        let body = stmt::mk_no_op();
        assert!(split_loop(&name, &min, &extent, ForType::Vectorized, &body, 5).is_none());
    }

    #[test]
    fn is_effective_detects_remaining_select() {
        let ty = Type::int(32);
        let clean = stmt::mk_store(Symbol::new("buf"), expr::mk_int_imm(ty, 1), expr::mk_int_imm(ty, 0));
        assert!(is_effective(&clean));
        let cond = expr::mk_cmp(expr::CmpOp::Lt, expr::mk_int_imm(ty, 0), expr::mk_int_imm(ty, 1));
        let with_select = stmt::mk_store(
            Symbol::new("buf"),
            expr::mk_select(cond, expr::mk_int_imm(ty, 1), expr::mk_int_imm(ty, 2)),
            expr::mk_int_imm(ty, 0),
        );
        assert!(!is_effective(&with_select));
    }
}
