//! Sliding-window reuse (spec §4.7). New logic following spec.md's closed
//! form directly, since the teacher has nothing analogous; the structural
//! shape (a targeted `Realize`-bounds rewrite keyed on one enclosing `For`)
//! mirrors `loop_split.rs` and `scheduler.rs`'s producer-injection style of
//! finding a named `For` and rewriting what's nested under it.

use crate::expr::{self, BinOp, CmpOp, Expr};
use crate::name::Symbol;
use crate::stmt::{InnerStmt, Range, Stmt};
use crate::subst::substitute_expr_one;

/// The outcome of attempting sliding-window reuse on one producer's
/// bounds against an enclosing loop `loop_var`.
pub enum SlideResult {
    /// Exactly one dimension's `min` depends on `loop_var` (and no
    /// dimension's `extent` does): the new, trimmed bounds.
    Slid(Vec<Range>),
    /// Sliding wasn't applicable: either no dimension depends on the
    /// loop variable, more than one does, or an `extent` does.
    NotApplicable(&'static str),
}

/// Attempts to slide `bounds` (a producer's per-dimension `Realize`
/// bounds) along `loop_var`, whose current value is `loop_var` itself and
/// whose lower bound within the loop is `loop_min`.
pub fn try_slide(loop_var: &Symbol, loop_min: &Expr, bounds: &[Range]) -> SlideResult {
    let depends_on_loop = |e: &Expr| expr::free_vars(e).contains(loop_var);

    let mut dependent_dims: Vec<usize> = Vec::new();
    for (i, r) in bounds.iter().enumerate() {
        if depends_on_loop(&r.extent) {
            return SlideResult::NotApplicable("an extent depends on the loop variable");
        }
        if depends_on_loop(&r.min) {
            dependent_dims.push(i);
        }
    }

    match dependent_dims.as_slice() {
        [] => SlideResult::NotApplicable("no dimension's min depends on the loop variable"),
        [dim] => {
            let dim = *dim;
            let ty = bounds[dim].min.ty();
            let loop_var_e = expr::mk_variable(ty, loop_var.clone());
            let prev_loop_var = expr::mk_bin(BinOp::Sub, ty, loop_var_e.clone(), expr::mk_int_imm(ty, 1));

            let min_plus_extent = expr::mk_bin(BinOp::Add, ty, bounds[dim].min.clone(), bounds[dim].extent.clone());
            let shifted_min_plus_extent = substitute_expr_one(&min_plus_extent, loop_var, &prev_loop_var);

            let cond = expr::mk_cmp(CmpOp::Gt, loop_var_e.clone(), loop_min.clone());
            let new_min = expr::mk_select(cond.clone(), shifted_min_plus_extent.clone(), bounds[dim].min.clone());
            let new_extent = expr::mk_select(
                cond,
                expr::mk_bin(BinOp::Sub, ty, min_plus_extent, new_min.clone()),
                bounds[dim].extent.clone(),
            );

            let mut new_bounds = bounds.to_vec();
            new_bounds[dim] = Range { min: new_min, extent: new_extent };
            SlideResult::Slid(new_bounds)
        }
        _ => SlideResult::NotApplicable("more than one dimension's min depends on the loop variable"),
    }
}

/// Walks `stmt` looking for a `Realize` of `producer` nested directly
/// inside a serial `For(loop_var, ...)` (the `store_at` relationship
/// spec §4.7 requires) and applies [`try_slide`] to its bounds, replacing
/// them in place. Returns the rewritten statement; if sliding wasn't
/// applicable anywhere, returns `stmt` unchanged.
pub fn apply_sliding_window(stmt: &Stmt, producer: &Symbol) -> Stmt {
    recurse(stmt, producer)
}

fn slide_realize_in(body: &Stmt, producer: &Symbol, loop_var: &Symbol, loop_min: &Expr) -> Stmt {
    match body.inner() {
        InnerStmt::Realize { name, ty, bounds, body: realize_body } if name == producer => {
            match try_slide(loop_var, loop_min, bounds) {
                SlideResult::Slid(new_bounds) => {
                    crate::stmt::mk_realize(name.clone(), *ty, new_bounds, (**realize_body).clone())
                }
                SlideResult::NotApplicable(_) => body.clone(),
            }
        }
        _ => recurse(body, producer),
    }
}

fn recurse(stmt: &Stmt, producer: &Symbol) -> Stmt {
    match stmt.inner() {
        InnerStmt::For { name, min, extent, for_type, loop_split_info, body } => {
            let new_body = if *for_type == crate::stmt::ForType::Serial {
                slide_realize_in(&apply_sliding_window(body, producer), producer, name, min)
            } else {
                apply_sliding_window(body, producer)
            };
            crate::stmt::mk_for(name.clone(), min.clone(), extent.clone(), *for_type, loop_split_info.clone(), new_body)
        }
        InnerStmt::LetStmt { name, value, body } => crate::stmt::mk_let_stmt(name.clone(), value.clone(), apply_sliding_window(body, producer)),
        InnerStmt::Allocate { name, ty, size, body } => crate::stmt::mk_allocate(name.clone(), *ty, size.clone(), apply_sliding_window(body, producer)),
        InnerStmt::Realize { name, ty, bounds, body } => crate::stmt::mk_realize(name.clone(), *ty, bounds.clone(), apply_sliding_window(body, producer)),
        InnerStmt::Pipeline { name, produce, update, consume } => crate::stmt::mk_pipeline(
            name.clone(),
            apply_sliding_window(produce, producer),
            update.as_ref().map(|u| apply_sliding_window(u, producer)),
            apply_sliding_window(consume, producer),
        ),
        InnerStmt::Block { first, rest } => crate::stmt::mk_block(apply_sliding_window(first, producer), apply_sliding_window(rest, producer)),
        InnerStmt::StmtTargetVar { name, body } => crate::stmt::mk_stmt_target_var(name.clone(), apply_sliding_window(body, producer)),
        _ => stmt.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn slides_when_exactly_one_min_depends_on_loop() {
        let ty = Type::int(32);
        let y = Symbol::new("y");
        let bounds = vec![Range {
            min: expr::mk_variable(ty, y.clone()),
            extent: expr::mk_int_imm(ty, 3),
        }];
        match try_slide(&y, &expr::mk_int_imm(ty, 0), &bounds) {
            SlideResult::Slid(_) => {}
            SlideResult::NotApplicable(reason) => panic!("expected sliding, got: {}", reason),
        }
    }

    #[test]
    fn skips_when_extent_depends_on_loop() {
        let ty = Type::int(32);
        let y = Symbol::new("y");
        let bounds = vec![Range {
            min: expr::mk_int_imm(ty, 0),
            extent: expr::mk_variable(ty, y.clone()),
        }];
        match try_slide(&y, &expr::mk_int_imm(ty, 0), &bounds) {
            SlideResult::NotApplicable(_) => {}
            SlideResult::Slid(_) => panic!("expected sliding to be skipped"),
        }
    }

    #[test]
    fn skips_when_two_dims_depend_on_loop() {
        let ty = Type::int(32);
        let y = Symbol::new("y");
        let bounds = vec![
            Range { min: expr::mk_variable(ty, y.clone()), extent: expr::mk_int_imm(ty, 3) },
            Range { min: expr::mk_variable(ty, y.clone()), extent: expr::mk_int_imm(ty, 3) },
        ];
        match try_slide(&y, &expr::mk_int_imm(ty, 0), &bounds) {
            SlideResult::NotApplicable(_) => {}
            SlideResult::Slid(_) => panic!("expected sliding to be skipped"),
        }
    }
}
