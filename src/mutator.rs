//! `Rewriter` and `Mutator` (spec §4.1). A `Rewriter` is a stateless policy
//! object — "what should this node become" — plugged into a `Mutator`,
//! which owns the recursion and the structural-sharing optimization: if
//! every rewritten child is pointer-identical to the original (`Arc::ptr_eq`
//! through each node's hash-consed handle), the mutator returns the
//! original node rather than building an equal-but-freshly-allocated copy.
//! This is what lets a pass like the simplifier touch only the part of a
//! million-node tree that actually changes.

use crate::expr::*;
use crate::stmt::*;

pub trait Rewriter {
    fn rewrite_expr(&mut self, e: &Expr) -> Expr {
        e.clone()
    }

    fn rewrite_stmt(&mut self, s: &Stmt) -> Stmt {
        s.clone()
    }
}

fn same_expr(a: &Expr, b: &Expr) -> bool {
    std::ptr::eq(a.inner() as *const InnerExpr, b.inner() as *const InnerExpr)
}

fn same_stmt(a: &Stmt, b: &Stmt) -> bool {
    std::ptr::eq(a.inner() as *const InnerStmt, b.inner() as *const InnerStmt)
}

/// Default per-variant recursive rewrite, shared by every `Mutator` impl
/// via `mutate_expr_default`/`mutate_stmt_default`. Concrete mutators call
/// these from their own `mutate_expr` after handling the variants they
/// override, so "falls through to the default" is always available the
/// way the original `IRMutator::visit` base-class methods are.
pub trait Mutator: Rewriter {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        self.mutate_expr_default(e)
    }

    fn mutate_expr_default(&mut self, e: &Expr) -> Expr {
        let rewritten = match e.inner() {
            InnerExpr::IntImm { .. }
            | InnerExpr::FloatImm { .. }
            | InnerExpr::Variable { .. }
            | InnerExpr::SignFill { .. }
            | InnerExpr::Infinity { .. } => return e.clone(),
            InnerExpr::Cast { to_type, value } => {
                let v2 = self.mutate_expr(value);
                if same_expr(&v2, value) {
                    return e.clone();
                }
                mk_cast(*to_type, v2)
            }
            InnerExpr::Not { value, .. } => {
                let v2 = self.mutate_expr(value);
                if same_expr(&v2, value) {
                    return e.clone();
                }
                mk_not(v2)
            }
            InnerExpr::Bin { op, ty, a, b, .. } => {
                let a2 = self.mutate_expr(a);
                let b2 = self.mutate_expr(b);
                if same_expr(&a2, a) && same_expr(&b2, b) {
                    return e.clone();
                }
                mk_bin(*op, *ty, a2, b2)
            }
            InnerExpr::Cmp { op, a, b, .. } => {
                let a2 = self.mutate_expr(a);
                let b2 = self.mutate_expr(b);
                if same_expr(&a2, a) && same_expr(&b2, b) {
                    return e.clone();
                }
                mk_cmp(*op, a2, b2)
            }
            InnerExpr::Logical { op, a, b, .. } => {
                let a2 = self.mutate_expr(a);
                let b2 = self.mutate_expr(b);
                if same_expr(&a2, a) && same_expr(&b2, b) {
                    return e.clone();
                }
                mk_logical(*op, a2, b2)
            }
            InnerExpr::Select {
                cond,
                true_value,
                false_value,
                ..
            } => {
                let c2 = self.mutate_expr(cond);
                let t2 = self.mutate_expr(true_value);
                let f2 = self.mutate_expr(false_value);
                if same_expr(&c2, cond) && same_expr(&t2, true_value) && same_expr(&f2, false_value) {
                    return e.clone();
                }
                mk_select(c2, t2, f2)
            }
            InnerExpr::Load {
                ty,
                name,
                index,
                image,
                param,
                ..
            } => {
                let i2 = self.mutate_expr(index);
                if same_expr(&i2, index) {
                    return e.clone();
                }
                mk_load(*ty, name.clone(), i2, image.clone(), param.clone())
            }
            InnerExpr::Ramp { base, stride, lanes, .. } => {
                let b2 = self.mutate_expr(base);
                let s2 = self.mutate_expr(stride);
                if same_expr(&b2, base) && same_expr(&s2, stride) {
                    return e.clone();
                }
                mk_ramp(b2, s2, *lanes)
            }
            InnerExpr::Broadcast { value, lanes, .. } => {
                let v2 = self.mutate_expr(value);
                if same_expr(&v2, value) {
                    return e.clone();
                }
                mk_broadcast(v2, *lanes)
            }
            InnerExpr::Call {
                ty,
                name,
                args,
                call_type,
                func,
                image,
                param,
                ..
            } => {
                let args2: Vec<Expr> = args.iter().map(|a| self.mutate_expr(a)).collect();
                if args2.iter().zip(args.iter()).all(|(a2, a)| same_expr(a2, a)) {
                    return e.clone();
                }
                mk_call(*ty, name.clone(), args2, *call_type, func.clone(), image.clone(), param.clone())
            }
            InnerExpr::Let { name, value, body, .. } => {
                let v2 = self.mutate_expr(value);
                let b2 = self.mutate_expr(body);
                if same_expr(&v2, value) && same_expr(&b2, body) {
                    return e.clone();
                }
                mk_let(name.clone(), v2, b2)
            }
            InnerExpr::Clamp { kind, a, min, max, p1, .. } => {
                let a2 = self.mutate_expr(a);
                let min2 = self.mutate_expr(min);
                let max2 = self.mutate_expr(max);
                let p1_2 = p1.as_ref().map(|p| self.mutate_expr(p));
                let unchanged = same_expr(&a2, a)
                    && same_expr(&min2, min)
                    && same_expr(&max2, max)
                    && match (&p1_2, p1) {
                        (Some(x), Some(y)) => same_expr(x, y),
                        (None, None) => true,
                        _ => false,
                    };
                if unchanged {
                    return e.clone();
                }
                mk_clamp(*kind, a2, min2, max2, p1_2)
            }
            InnerExpr::Solve { var, body, .. } => {
                let b2 = self.mutate_expr(body);
                if same_expr(&b2, body) {
                    return e.clone();
                }
                mk_solve(var.clone(), b2)
            }
            InnerExpr::TargetVar { name, body, .. } => {
                let b2 = self.mutate_expr(body);
                if same_expr(&b2, body) {
                    return e.clone();
                }
                mk_target_var(name.clone(), b2)
            }
        };
        self.rewrite_expr(&rewritten)
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        self.mutate_stmt_default(s)
    }

    fn mutate_stmt_default(&mut self, s: &Stmt) -> Stmt {
        let rewritten = match s.inner() {
            InnerStmt::NoOp { .. } => return s.clone(),
            InnerStmt::LetStmt { name, value, body, .. } => {
                let v2 = self.mutate_expr(value);
                let b2 = self.mutate_stmt(body);
                if same_expr(&v2, value) && same_stmt(&b2, body) {
                    return s.clone();
                }
                mk_let_stmt(name.clone(), v2, b2)
            }
            InnerStmt::AssertStmt { cond, message, .. } => {
                let c2 = self.mutate_expr(cond);
                if same_expr(&c2, cond) {
                    return s.clone();
                }
                mk_assert_stmt(c2, message.clone())
            }
            InnerStmt::PrintStmt { prefix, args, .. } => {
                let args2: Vec<Expr> = args.iter().map(|a| self.mutate_expr(a)).collect();
                if args2.iter().zip(args.iter()).all(|(a2, a)| same_expr(a2, a)) {
                    return s.clone();
                }
                mk_print_stmt(prefix.clone(), args2)
            }
            InnerStmt::For {
                name,
                min,
                extent,
                for_type,
                loop_split_info,
                body,
                ..
            } => {
                let min2 = self.mutate_expr(min);
                let extent2 = self.mutate_expr(extent);
                let body2 = self.mutate_stmt(body);
                if same_expr(&min2, min) && same_expr(&extent2, extent) && same_stmt(&body2, body) {
                    return s.clone();
                }
                mk_for(name.clone(), min2, extent2, *for_type, loop_split_info.clone(), body2)
            }
            InnerStmt::Store { name, value, index, .. } => {
                let v2 = self.mutate_expr(value);
                let i2 = self.mutate_expr(index);
                if same_expr(&v2, value) && same_expr(&i2, index) {
                    return s.clone();
                }
                mk_store(name.clone(), v2, i2)
            }
            InnerStmt::Provide { name, value, args, .. } => {
                let v2 = self.mutate_expr(value);
                let args2: Vec<Expr> = args.iter().map(|a| self.mutate_expr(a)).collect();
                if same_expr(&v2, value) && args2.iter().zip(args.iter()).all(|(a2, a)| same_expr(a2, a)) {
                    return s.clone();
                }
                mk_provide(name.clone(), v2, args2)
            }
            InnerStmt::Allocate { name, ty, size, body, .. } => {
                let size2 = self.mutate_expr(size);
                let body2 = self.mutate_stmt(body);
                if same_expr(&size2, size) && same_stmt(&body2, body) {
                    return s.clone();
                }
                mk_allocate(name.clone(), *ty, size2, body2)
            }
            InnerStmt::Realize {
                name, ty, bounds, body, ..
            } => {
                let bounds2: Vec<Range> = bounds
                    .iter()
                    .map(|r| Range {
                        min: self.mutate_expr(&r.min),
                        extent: self.mutate_expr(&r.extent),
                    })
                    .collect();
                let body2 = self.mutate_stmt(body);
                if bounds2 == *bounds && same_stmt(&body2, body) {
                    return s.clone();
                }
                mk_realize(name.clone(), *ty, bounds2, body2)
            }
            InnerStmt::Pipeline {
                name,
                produce,
                update,
                consume,
                ..
            } => {
                let p2 = self.mutate_stmt(produce);
                let u2 = update.as_ref().map(|u| self.mutate_stmt(u));
                let c2 = self.mutate_stmt(consume);
                let unchanged = same_stmt(&p2, produce)
                    && same_stmt(&c2, consume)
                    && match (&u2, update) {
                        (Some(x), Some(y)) => same_stmt(x, y),
                        (None, None) => true,
                        _ => false,
                    };
                if unchanged {
                    return s.clone();
                }
                mk_pipeline(name.clone(), p2, u2, c2)
            }
            InnerStmt::Block { first, rest, .. } => {
                let f2 = self.mutate_stmt(first);
                let r2 = self.mutate_stmt(rest);
                if same_stmt(&f2, first) && same_stmt(&r2, rest) {
                    return s.clone();
                }
                mk_block(f2, r2)
            }
            InnerStmt::StmtTargetVar { name, body, .. } => {
                let b2 = self.mutate_stmt(body);
                if same_stmt(&b2, body) {
                    return s.clone();
                }
                mk_stmt_target_var(name.clone(), b2)
            }
        };
        self.rewrite_stmt(&rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{mk_bin, mk_int_imm, mk_variable, BinOp};
    use crate::name::Symbol;
    use crate::types::Type;

    struct ZeroOutVars;
    impl Rewriter for ZeroOutVars {
        fn rewrite_expr(&mut self, e: &Expr) -> Expr {
            if let InnerExpr::Variable { ty, .. } = e.inner() {
                mk_int_imm(*ty, 0)
            } else {
                e.clone()
            }
        }
    }
    impl Mutator for ZeroOutVars {}

    #[test]
    fn no_op_mutation_returns_identical_handle() {
        struct Identity;
        impl Rewriter for Identity {}
        impl Mutator for Identity {}

        let ty = Type::int(32);
        let e = mk_bin(BinOp::Add, ty, mk_variable(ty, Symbol::new("x")), mk_int_imm(ty, 1));
        let mut m = Identity;
        let e2 = m.mutate_expr(&e);
        assert!(same_expr(&e, &e2));
    }

    #[test]
    fn rewrite_replaces_only_matching_subtrees() {
        let ty = Type::int(32);
        let e = mk_bin(BinOp::Add, ty, mk_variable(ty, Symbol::new("x")), mk_int_imm(ty, 1));
        let mut m = ZeroOutVars;
        let e2 = m.mutate_expr(&e);
        let expected = mk_bin(BinOp::Add, ty, mk_int_imm(ty, 0), mk_int_imm(ty, 1));
        assert_eq!(e2, expected);
    }
}
