//! The middle end of an image-processing compiler: a hash-consed,
//! immutable `Expr`/`Stmt` IR; a visitor/mutator/cache traversal
//! substrate; algebraic simplification; interval-based bounds analysis;
//! scheduling (inlining, realization order, initial loop nest); and the
//! lowering passes a schedule needs before it reaches a backend (clamp
//! lowering, sliding-window reuse, loop splitting, storage
//! folding/flattening). `lower::lower_pipeline` drives the full pass
//! order; everything else is a building block it calls.

#![forbid(unsafe_code)]

pub mod types;
pub mod name;
pub mod errors;
pub mod expr;
pub mod stmt;
pub mod interval;
pub mod domain;
pub mod visitor;
pub mod mutator;
pub mod lazy_scope;
pub mod cached_mutator;
pub mod simplify;
pub mod bounds;
pub mod function;
pub mod scheduler;
pub mod clamp;
pub mod sliding_window;
pub mod loop_split;
pub mod storage;
pub mod subst;
pub mod pretty;
pub mod options;
pub mod log;
pub mod lower;
pub mod cli;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;
