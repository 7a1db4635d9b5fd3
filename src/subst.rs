//! Plain variable substitution over `Expr`/`Stmt`, used by the scheduler's
//! split-variable rewriting and inline parameter binding (spec §4.5 steps
//! 3-4: "substitute `old -> outer*factor + inner + old.min`", "parameters
//! bound by `substitute`, not `Let`, to preserve peephole structure").
//! Grounded on the `Mutator`/`Rewriter` split in `mutator.rs`: substitution
//! is just a `Rewriter` that replaces `Variable` nodes found in a map,
//! respecting shadowing by any enclosing binder that rebinds the same name.

use hashbrown::HashMap;

use crate::expr::{Expr, InnerExpr};
use crate::mutator::{Mutator, Rewriter};
use crate::name::Symbol;
use crate::stmt::{InnerStmt, Stmt};

/// Substitutes every free occurrence of a name in `map` with its
/// replacement expression, everywhere in `e`.
pub fn substitute_expr(e: &Expr, map: &HashMap<Symbol, Expr>) -> Expr {
    let mut s = Subst { map };
    s.mutate_expr(e)
}

/// Substitutes every free occurrence of a name in `map` with its
/// replacement expression, everywhere in `s` (in both embedded
/// expressions and nested statements).
pub fn substitute_stmt(s: &Stmt, map: &HashMap<Symbol, Expr>) -> Stmt {
    let mut sub = Subst { map };
    sub.mutate_stmt(s)
}

/// Single-name convenience wrapper over [`substitute_expr`].
pub fn substitute_expr_one(e: &Expr, name: &Symbol, replacement: &Expr) -> Expr {
    let mut map = HashMap::new();
    map.insert(name.clone(), replacement.clone());
    substitute_expr(e, &map)
}

/// Single-name convenience wrapper over [`substitute_stmt`].
pub fn substitute_stmt_one(s: &Stmt, name: &Symbol, replacement: &Expr) -> Stmt {
    let mut map = HashMap::new();
    map.insert(name.clone(), replacement.clone());
    substitute_stmt(s, &map)
}

struct Subst<'a> {
    map: &'a HashMap<Symbol, Expr>,
}

impl<'a> Rewriter for Subst<'a> {
    fn rewrite_expr(&mut self, e: &Expr) -> Expr {
        if let InnerExpr::Variable { name, .. } = e.inner() {
            if let Some(replacement) = self.map.get(name) {
                return replacement.clone();
            }
        }
        e.clone()
    }
}

impl<'a> Mutator for Subst<'a> {
    fn mutate_expr(&mut self, e: &Expr) -> Expr {
        // A `Let`/`Solve`/`TargetVar` that rebinds a substituted name
        // shadows it in its body: only rewrite the value (and any other
        // children), never descend into a body where the name is no
        // longer free.
        match e.inner() {
            InnerExpr::Let { name, value, body, .. } if self.map.contains_key(name) => {
                let new_value = self.mutate_expr(value);
                crate::expr::mk_let(name.clone(), new_value, body.clone())
            }
            InnerExpr::Solve { var, body, .. } if self.map.contains_key(var) => {
                let _ = body;
                e.clone()
            }
            InnerExpr::TargetVar { name, body, .. } if self.map.contains_key(name) => {
                let _ = body;
                e.clone()
            }
            _ => self.mutate_expr_default(e),
        }
    }

    fn mutate_stmt(&mut self, s: &Stmt) -> Stmt {
        match s.inner() {
            InnerStmt::For { name, .. } if self.map.contains_key(name) => {
                // The loop variable shadows the substitution inside its own
                // body, but `min`/`extent` are evaluated in the outer scope
                // and must still be substituted.
                if let InnerStmt::For { name, min, extent, for_type, loop_split_info, body, .. } = s.inner() {
                    crate::stmt::mk_for(
                        name.clone(),
                        self.mutate_expr(min),
                        self.mutate_expr(extent),
                        *for_type,
                        loop_split_info.clone(),
                        body.clone(),
                    )
                } else {
                    unreachable!()
                }
            }
            InnerStmt::LetStmt { name, .. } if self.map.contains_key(name) => {
                if let InnerStmt::LetStmt { name, value, body, .. } = s.inner() {
                    crate::stmt::mk_let_stmt(name.clone(), self.mutate_expr(value), body.clone())
                } else {
                    unreachable!()
                }
            }
            _ => self.mutate_stmt_default(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{mk_bin, mk_int_imm, mk_let, mk_variable, BinOp};
    use crate::types::Type;

    #[test]
    fn substitutes_free_variable() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let e = mk_bin(BinOp::Add, ty, mk_variable(ty, x.clone()), mk_int_imm(ty, 1));
        let got = substitute_expr_one(&e, &x, &mk_int_imm(ty, 41));
        assert_eq!(crate::simplify::Simplifier::new().simplify_expr(&got), mk_int_imm(ty, 42));
    }

    #[test]
    fn respects_let_shadowing() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let inner = mk_let(x.clone(), mk_int_imm(ty, 0), mk_variable(ty, x.clone()));
        let got = substitute_expr_one(&inner, &x, &mk_int_imm(ty, 99));
        // the body's `x` refers to the inner let, not the substitution
        assert_eq!(crate::simplify::Simplifier::new().simplify_expr(&got), mk_int_imm(ty, 0));
    }
}
