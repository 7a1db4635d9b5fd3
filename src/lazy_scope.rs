//! The `LazyScope` mixin (spec §4.2): identifies the current binding
//! context with an integer id, computed lazily as contexts are entered, so
//! that passes needing variable bindings don't allocate a record per
//! traversal step. Grounded on the teacher's `OffsetCache`
//! (`examples/ammkrn-nanoda/src/expr.rs`, `Vec<HashMap<Expr,Expr>>` used by
//! `abstract_core`/`instantiate_core`) for the push/pop-scoped memoization
//! shape; variable lookup here is by `Symbol` rather than de Bruijn offset,
//! since this IR's `Variable` nodes carry names, not indices.

use hashbrown::HashMap;

use crate::errors::unbalanced_scope;
use crate::expr::Expr;
use crate::name::Symbol;

pub type ContextId = u64;

pub const ROOT_CONTEXT: ContextId = 0;

/// A scope-introducing node, keyed alongside the context it was entered
/// from so that re-entering the identical `(context, node)` pair reuses the
/// same child context id (and, by extension, the same cached mutation
/// results in `CachedMutator`).
#[derive(Clone, PartialEq, Eq, Hash)]
enum ScopeKey {
    Expr(ContextId, Expr),
    Stmt(ContextId, crate::stmt::Stmt),
}

pub struct LazyScope {
    next_context: ContextId,
    context_map: HashMap<ScopeKey, ContextId>,
    context_stack: Vec<ContextId>,
    bindings: HashMap<Symbol, Vec<(ContextId, Expr)>>,
}

impl LazyScope {
    pub fn new() -> Self {
        LazyScope {
            next_context: ROOT_CONTEXT + 1,
            context_map: HashMap::new(),
            context_stack: vec![ROOT_CONTEXT],
            bindings: HashMap::new(),
        }
    }

    pub fn current(&self) -> ContextId {
        *self.context_stack.last().expect("context stack must never be empty")
    }

    fn child_context(&mut self, key: ScopeKey) -> ContextId {
        if let Some(&id) = self.context_map.get(&key) {
            return id;
        }
        let id = self.next_context;
        self.next_context += 1;
        self.context_map.insert(key, id);
        id
    }

    /// Enters the scope introduced by `name := value` (a `Let`/`LetStmt`)
    /// or `name` ranging over a `For`. Binds `name` to `value` for the
    /// duration of the scope; callers must match every `push_expr_scope`/
    /// `push_for_scope` with a `pop_context`.
    pub fn push_expr_scope(&mut self, node: &Expr, name: Symbol, value: Expr) -> ContextId {
        let parent = self.current();
        let id = self.child_context(ScopeKey::Expr(parent, node.clone()));
        self.context_stack.push(id);
        self.bindings.entry(name).or_default().push((id, value));
        id
    }

    pub fn push_stmt_scope(&mut self, node: &crate::stmt::Stmt, name: Symbol, value: Expr) -> ContextId {
        let parent = self.current();
        let id = self.child_context(ScopeKey::Stmt(parent, node.clone()));
        self.context_stack.push(id);
        self.bindings.entry(name).or_default().push((id, value));
        id
    }

    /// Leaves the most recently entered scope that bound `name`. `name`
    /// must be the same symbol passed to the matching push call; an
    /// unbalanced call (popping a name that was never pushed, or popping
    /// more times than pushed) is an invariant violation, not a user error,
    /// so it aborts (spec §4.2's failure mode).
    pub fn pop_context(&mut self, name: &Symbol) {
        match self.bindings.get_mut(name) {
            Some(stack) if !stack.is_empty() => {
                stack.pop();
            }
            _ => unbalanced_scope("LazyScope::pop_context"),
        }
        if self.context_stack.len() <= 1 {
            unbalanced_scope("LazyScope::pop_context");
        }
        self.context_stack.pop();
    }

    /// The most recent binding for `name` visible at the current point in
    /// the traversal, or `None` if `name` is free at this point.
    pub fn lookup(&self, name: &Symbol) -> Option<&Expr> {
        self.bindings.get(name).and_then(|stack| stack.last()).map(|(_, e)| e)
    }
}

impl Default for LazyScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{mk_int_imm, mk_let};
    use crate::types::Type;

    #[test]
    fn push_pop_round_trips_and_shadows() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let node = mk_let(x.clone(), mk_int_imm(ty, 1), mk_int_imm(ty, 2));
        let mut scope = LazyScope::new();
        assert_eq!(scope.lookup(&x), None);
        scope.push_expr_scope(&node, x.clone(), mk_int_imm(ty, 1));
        assert_eq!(scope.lookup(&x), Some(&mk_int_imm(ty, 1)));
        scope.pop_context(&x);
        assert_eq!(scope.lookup(&x), None);
    }

    #[test]
    fn reentering_same_node_reuses_context_id() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let node = mk_let(x.clone(), mk_int_imm(ty, 1), mk_int_imm(ty, 2));
        let mut scope = LazyScope::new();
        let id1 = scope.push_expr_scope(&node, x.clone(), mk_int_imm(ty, 1));
        scope.pop_context(&x);
        let id2 = scope.push_expr_scope(&node, x.clone(), mk_int_imm(ty, 1));
        assert_eq!(id1, id2);
        scope.pop_context(&x);
    }
}
