//! The statement half of the IR, mirroring `expr.rs`'s hash-consing
//! discipline: `Stmt(Arc<InnerStmt>)`, a cached digest, structural equality.

use std::sync::Arc;

use crate::expr::Expr;
use crate::name::Symbol;
use crate::types::Type;

const LET_STMT_TAG: u64 = 1;
const ASSERT_STMT_TAG: u64 = 2;
const PRINT_STMT_TAG: u64 = 3;
const FOR_TAG: u64 = 4;
const STORE_TAG: u64 = 5;
const PROVIDE_TAG: u64 = 6;
const ALLOCATE_TAG: u64 = 7;
const REALIZE_TAG: u64 = 8;
const PIPELINE_TAG: u64 = 9;
const BLOCK_TAG: u64 = 10;
const STMT_TARGET_VAR_TAG: u64 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForType {
    Serial,
    Parallel,
    Vectorized,
    Unrolled,
}

/// Extra facts attached to a `For` once `loop_split.rs` has partitioned it;
/// `None` for a loop that has not (yet) been split. Carried on the node so
/// that `bounds_simplify` can exploit the sub-range fact inside each
/// fragment's body (spec §4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSplitInfo {
    pub fragment: LoopFragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopFragment {
    Before,
    Main,
    After,
}

/// A per-dimension `(min, extent)` pair, used by `Realize` and by
/// `Schedule.bounds`.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub min: Expr,
    pub extent: Expr,
}

#[derive(Clone)]
pub struct Stmt(Arc<InnerStmt>);

#[derive(Debug, Clone, PartialEq)]
pub struct StmtCache {
    digest: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InnerStmt {
    LetStmt {
        cache: StmtCache,
        name: Symbol,
        value: Expr,
        body: Stmt,
    },
    AssertStmt {
        cache: StmtCache,
        cond: Expr,
        message: String,
    },
    PrintStmt {
        cache: StmtCache,
        prefix: String,
        args: Vec<Expr>,
    },
    For {
        cache: StmtCache,
        name: Symbol,
        min: Expr,
        extent: Expr,
        for_type: ForType,
        loop_split_info: Option<LoopSplitInfo>,
        body: Stmt,
    },
    Store {
        cache: StmtCache,
        name: Symbol,
        value: Expr,
        index: Expr,
    },
    Provide {
        cache: StmtCache,
        name: Symbol,
        value: Expr,
        args: Vec<Expr>,
    },
    Allocate {
        cache: StmtCache,
        name: Symbol,
        ty: Type,
        size: Expr,
        body: Stmt,
    },
    Realize {
        cache: StmtCache,
        name: Symbol,
        ty: Type,
        bounds: Vec<Range>,
        body: Stmt,
    },
    Pipeline {
        cache: StmtCache,
        name: Symbol,
        produce: Box<Stmt>,
        update: Option<Box<Stmt>>,
        consume: Box<Stmt>,
    },
    Block {
        cache: StmtCache,
        first: Box<Stmt>,
        rest: Box<Stmt>,
    },
    /// The empty statement: `Block`'s right-recursive spine terminates here
    /// instead of using `Option<Stmt>` everywhere, matching the "always a
    /// Stmt" shape of the constructors below.
    NoOp {
        cache: StmtCache,
    },
    StmtTargetVar {
        cache: StmtCache,
        name: Symbol,
        body: Stmt,
    },
}

impl Stmt {
    pub fn inner(&self) -> &InnerStmt {
        &self.0
    }

    fn digest(&self) -> u64 {
        self.0.cache().digest
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self.inner(), InnerStmt::NoOp { .. })
    }

    pub fn children(&self) -> Vec<Stmt> {
        match self.inner() {
            InnerStmt::LetStmt { body, .. } => vec![body.clone()],
            InnerStmt::AssertStmt { .. } | InnerStmt::PrintStmt { .. } | InnerStmt::NoOp { .. } => vec![],
            InnerStmt::For { body, .. } => vec![body.clone()],
            InnerStmt::Store { .. } | InnerStmt::Provide { .. } => vec![],
            InnerStmt::Allocate { body, .. } => vec![body.clone()],
            InnerStmt::Realize { body, .. } => vec![body.clone()],
            InnerStmt::Pipeline {
                produce,
                update,
                consume,
                ..
            } => {
                let mut v = vec![(**produce).clone()];
                if let Some(u) = update {
                    v.push((**u).clone());
                }
                v.push((**consume).clone());
                v
            }
            InnerStmt::Block { first, rest, .. } => vec![(**first).clone(), (**rest).clone()],
            InnerStmt::StmtTargetVar { body, .. } => vec![body.clone()],
        }
    }

    /// Every `Expr` directly embedded in this node (not recursing into
    /// child `Stmt`s). Used by bounds analysis to find index/value
    /// expressions without walking the whole subtree twice.
    pub fn own_exprs(&self) -> Vec<Expr> {
        match self.inner() {
            InnerStmt::LetStmt { value, .. } => vec![value.clone()],
            InnerStmt::AssertStmt { cond, .. } => vec![cond.clone()],
            InnerStmt::PrintStmt { args, .. } => args.clone(),
            InnerStmt::For { min, extent, .. } => vec![min.clone(), extent.clone()],
            InnerStmt::Store { value, index, .. } => vec![value.clone(), index.clone()],
            InnerStmt::Provide { value, args, .. } => {
                let mut v = vec![value.clone()];
                v.extend(args.iter().cloned());
                v
            }
            InnerStmt::Allocate { size, .. } => vec![size.clone()],
            InnerStmt::Realize { bounds, .. } => bounds
                .iter()
                .flat_map(|r| vec![r.min.clone(), r.extent.clone()])
                .collect(),
            InnerStmt::Pipeline { .. } | InnerStmt::Block { .. } | InnerStmt::NoOp { .. } => vec![],
            InnerStmt::StmtTargetVar { .. } => vec![],
        }
    }
}

impl InnerStmt {
    fn cache(&self) -> &StmtCache {
        match self {
            InnerStmt::LetStmt { cache, .. }
            | InnerStmt::AssertStmt { cache, .. }
            | InnerStmt::PrintStmt { cache, .. }
            | InnerStmt::For { cache, .. }
            | InnerStmt::Store { cache, .. }
            | InnerStmt::Provide { cache, .. }
            | InnerStmt::Allocate { cache, .. }
            | InnerStmt::Realize { cache, .. }
            | InnerStmt::Pipeline { cache, .. }
            | InnerStmt::Block { cache, .. }
            | InnerStmt::NoOp { cache }
            | InnerStmt::StmtTargetVar { cache, .. } => cache,
        }
    }
}

impl std::ops::Deref for Stmt {
    type Target = InnerStmt;
    fn deref(&self) -> &InnerStmt {
        &self.0
    }
}

impl PartialEq for Stmt {
    fn eq(&self, other: &Stmt) -> bool {
        self.digest() == other.digest() && self.0 == other.0
    }
}

impl Eq for Stmt {}

impl std::hash::Hash for Stmt {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest().hash(state);
    }
}

impl std::fmt::Debug for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        crate::pretty::write_stmt(f, self)
    }
}

fn h(tag: u64, parts: &[u64]) -> u64 {
    let mut acc = tag;
    for p in parts {
        acc = fxhash::hash64(&(acc, *p));
    }
    acc
}

fn e(expr: &Expr) -> u64 {
    // `Expr`'s digest is private to `expr.rs`; hash through its `Hash` impl
    // instead of reaching into the struct.
    let mut hasher = fxhash::FxHasher::default();
    std::hash::Hash::hash(expr, &mut hasher);
    std::hash::Hasher::finish(&hasher)
}

fn s(stmt: &Stmt) -> u64 {
    stmt.digest()
}

pub fn mk_no_op() -> Stmt {
    Stmt(Arc::new(InnerStmt::NoOp {
        cache: StmtCache { digest: 0 },
    }))
}

pub fn mk_let_stmt(name: Symbol, value: Expr, body: Stmt) -> Stmt {
    let digest = h(LET_STMT_TAG, &[fxhash::hash64(name.as_str()), e(&value), s(&body)]);
    Stmt(Arc::new(InnerStmt::LetStmt {
        cache: StmtCache { digest },
        name,
        value,
        body,
    }))
}

pub fn mk_assert_stmt(cond: Expr, message: impl Into<String>) -> Stmt {
    let message = message.into();
    let digest = h(ASSERT_STMT_TAG, &[e(&cond), fxhash::hash64(&message)]);
    Stmt(Arc::new(InnerStmt::AssertStmt {
        cache: StmtCache { digest },
        cond,
        message,
    }))
}

pub fn mk_print_stmt(prefix: impl Into<String>, args: Vec<Expr>) -> Stmt {
    let prefix = prefix.into();
    let mut parts = vec![fxhash::hash64(&prefix)];
    parts.extend(args.iter().map(e));
    let digest = h(PRINT_STMT_TAG, &parts);
    Stmt(Arc::new(InnerStmt::PrintStmt {
        cache: StmtCache { digest },
        prefix,
        args,
    }))
}

pub fn mk_for(
    name: Symbol,
    min: Expr,
    extent: Expr,
    for_type: ForType,
    loop_split_info: Option<LoopSplitInfo>,
    body: Stmt,
) -> Stmt {
    let digest = h(
        FOR_TAG,
        &[
            fxhash::hash64(name.as_str()),
            e(&min),
            e(&extent),
            for_type as u64,
            s(&body),
        ],
    );
    Stmt(Arc::new(InnerStmt::For {
        cache: StmtCache { digest },
        name,
        min,
        extent,
        for_type,
        loop_split_info,
        body,
    }))
}

pub fn mk_store(name: Symbol, value: Expr, index: Expr) -> Stmt {
    let digest = h(STORE_TAG, &[fxhash::hash64(name.as_str()), e(&value), e(&index)]);
    Stmt(Arc::new(InnerStmt::Store {
        cache: StmtCache { digest },
        name,
        value,
        index,
    }))
}

pub fn mk_provide(name: Symbol, value: Expr, args: Vec<Expr>) -> Stmt {
    let mut parts = vec![fxhash::hash64(name.as_str()), e(&value)];
    parts.extend(args.iter().map(e));
    let digest = h(PROVIDE_TAG, &parts);
    Stmt(Arc::new(InnerStmt::Provide {
        cache: StmtCache { digest },
        name,
        value,
        args,
    }))
}

pub fn mk_allocate(name: Symbol, ty: Type, size: Expr, body: Stmt) -> Stmt {
    let digest = h(
        ALLOCATE_TAG,
        &[fxhash::hash64(name.as_str()), ty.bits as u64, e(&size), s(&body)],
    );
    Stmt(Arc::new(InnerStmt::Allocate {
        cache: StmtCache { digest },
        name,
        ty,
        size,
        body,
    }))
}

pub fn mk_realize(name: Symbol, ty: Type, bounds: Vec<Range>, body: Stmt) -> Stmt {
    let mut parts = vec![fxhash::hash64(name.as_str()), ty.bits as u64];
    for r in &bounds {
        parts.push(e(&r.min));
        parts.push(e(&r.extent));
    }
    parts.push(s(&body));
    let digest = h(REALIZE_TAG, &parts);
    Stmt(Arc::new(InnerStmt::Realize {
        cache: StmtCache { digest },
        name,
        ty,
        bounds,
        body,
    }))
}

pub fn mk_pipeline(name: Symbol, produce: Stmt, update: Option<Stmt>, consume: Stmt) -> Stmt {
    let mut parts = vec![fxhash::hash64(name.as_str()), s(&produce)];
    if let Some(u) = &update {
        parts.push(s(u));
    }
    parts.push(s(&consume));
    let digest = h(PIPELINE_TAG, &parts);
    Stmt(Arc::new(InnerStmt::Pipeline {
        cache: StmtCache { digest },
        name,
        produce: Box::new(produce),
        update: update.map(Box::new),
        consume: Box::new(consume),
    }))
}

/// Smart `Block` constructor: an empty-statement operand is dropped rather
/// than wrapped, so the simplifier's "collapse empty Block" rewrite (spec
/// §4.3.5) is a structural identity here, not a separate pass step.
pub fn mk_block(first: Stmt, rest: Stmt) -> Stmt {
    if first.is_no_op() {
        return rest;
    }
    if rest.is_no_op() {
        return first;
    }
    let digest = h(BLOCK_TAG, &[s(&first), s(&rest)]);
    Stmt(Arc::new(InnerStmt::Block {
        cache: StmtCache { digest },
        first: Box::new(first),
        rest: Box::new(rest),
    }))
}

pub fn mk_stmt_target_var(name: Symbol, body: Stmt) -> Stmt {
    let digest = h(STMT_TARGET_VAR_TAG, &[fxhash::hash64(name.as_str()), s(&body)]);
    Stmt(Arc::new(InnerStmt::StmtTargetVar {
        cache: StmtCache { digest },
        name,
        body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::mk_int_imm;
    use crate::types::Type;

    #[test]
    fn block_with_no_op_collapses() {
        let ty = Type::int(32);
        let store = mk_store(Symbol::new("buf"), mk_int_imm(ty, 1), mk_int_imm(ty, 0));
        let block = mk_block(mk_no_op(), store.clone());
        assert_eq!(block, store);
    }

    #[test]
    fn structurally_equal_stmts_are_eq() {
        let ty = Type::int(32);
        let a = mk_store(Symbol::new("buf"), mk_int_imm(ty, 1), mk_int_imm(ty, 0));
        let b = mk_store(Symbol::new("buf"), mk_int_imm(ty, 1), mk_int_imm(ty, 0));
        assert_eq!(a, b);
    }
}
