//! The read-only traversal base (spec §4.1). A `Visitor` has one method per
//! node variant; the default implementation just recurses into children, so
//! an analysis only overrides the variants it actually cares about — the
//! same shape as the original `IRVisitor` base class this substrate
//! replaces (`examples/original_source/cpp/src/IRRewriter.h` declares the
//! sibling mutator base alongside it).

use crate::expr::{Expr, InnerExpr};
use crate::stmt::{InnerStmt, Stmt};

pub trait Visitor {
    fn visit_expr(&mut self, e: &Expr) {
        self.visit_expr_children(e);
    }

    fn visit_expr_children(&mut self, e: &Expr) {
        match e.inner() {
            InnerExpr::IntImm { .. }
            | InnerExpr::FloatImm { .. }
            | InnerExpr::Variable { .. }
            | InnerExpr::SignFill { .. }
            | InnerExpr::Infinity { .. } => {}
            InnerExpr::Cast { value, .. } | InnerExpr::Not { value, .. } => self.visit_expr(value),
            InnerExpr::Bin { a, b, .. } | InnerExpr::Cmp { a, b, .. } | InnerExpr::Logical { a, b, .. } => {
                self.visit_expr(a);
                self.visit_expr(b);
            }
            InnerExpr::Select {
                cond,
                true_value,
                false_value,
                ..
            } => {
                self.visit_expr(cond);
                self.visit_expr(true_value);
                self.visit_expr(false_value);
            }
            InnerExpr::Load { index, .. } => self.visit_expr(index),
            InnerExpr::Ramp { base, stride, .. } => {
                self.visit_expr(base);
                self.visit_expr(stride);
            }
            InnerExpr::Broadcast { value, .. } => self.visit_expr(value),
            InnerExpr::Call { args, .. } => {
                for a in args {
                    self.visit_expr(a);
                }
            }
            InnerExpr::Let { value, body, .. } => {
                self.visit_expr(value);
                self.visit_expr(body);
            }
            InnerExpr::Clamp { a, min, max, p1, .. } => {
                self.visit_expr(a);
                self.visit_expr(min);
                self.visit_expr(max);
                if let Some(p1) = p1 {
                    self.visit_expr(p1);
                }
            }
            InnerExpr::Solve { body, .. } | InnerExpr::TargetVar { body, .. } => self.visit_expr(body),
        }
    }

    fn visit_stmt(&mut self, s: &Stmt) {
        self.visit_stmt_children(s);
    }

    fn visit_stmt_children(&mut self, s: &Stmt) {
        for e in s.own_exprs() {
            self.visit_expr(&e);
        }
        match s.inner() {
            InnerStmt::LetStmt { body, .. } => self.visit_stmt(body),
            InnerStmt::AssertStmt { .. } | InnerStmt::PrintStmt { .. } | InnerStmt::NoOp { .. } => {}
            InnerStmt::For { body, .. } => self.visit_stmt(body),
            InnerStmt::Store { .. } | InnerStmt::Provide { .. } => {}
            InnerStmt::Allocate { body, .. } => self.visit_stmt(body),
            InnerStmt::Realize { body, .. } => self.visit_stmt(body),
            InnerStmt::Pipeline {
                produce,
                update,
                consume,
                ..
            } => {
                self.visit_stmt(produce);
                if let Some(u) = update {
                    self.visit_stmt(u);
                }
                self.visit_stmt(consume);
            }
            InnerStmt::Block { first, rest, .. } => {
                self.visit_stmt(first);
                self.visit_stmt(rest);
            }
            InnerStmt::StmtTargetVar { body, .. } => self.visit_stmt(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{mk_bin, mk_int_imm, mk_variable, BinOp};
    use crate::name::Symbol;
    use crate::types::Type;

    struct CountVars(usize);
    impl Visitor for CountVars {
        fn visit_expr(&mut self, e: &Expr) {
            if matches!(e.inner(), InnerExpr::Variable { .. }) {
                self.0 += 1;
            }
            self.visit_expr_children(e);
        }
    }

    #[test]
    fn default_visitor_recurses_into_every_child() {
        let ty = Type::int(32);
        let e = mk_bin(
            BinOp::Add,
            ty,
            mk_variable(ty, Symbol::new("x")),
            mk_bin(BinOp::Mul, ty, mk_variable(ty, Symbol::new("y")), mk_int_imm(ty, 2)),
        );
        let mut counter = CountVars(0);
        counter.visit_expr(&e);
        assert_eq!(counter.0, 2);
    }
}
