//! Error handling for the lowering pipeline, following the three-way split
//! from the design: user errors are recoverable and carry a symbol plus
//! context; invariant violations are compiler bugs and abort immediately
//! (mirroring how a hand-rolled C++ `internal_assert` would behave); runtime
//! checks are represented as `AssertStmt` nodes in the IR itself and are
//! not modeled here at all -- they're data, not Rust errors.

use std::fmt::Debug;

use crate::name::Symbol;

pub type LowerResult<T> = Result<T, LowerError>;

/// Errors arising from a malformed *pipeline* as written by the caller --
/// bad schedules, type mismatches, missing bounds -- as opposed to bugs in
/// the lowering passes themselves. These are always recoverable: the
/// top-level entry point reports them and aborts compilation without
/// taking down the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error("function `{0}` has no schedule for dimension `{1}`: it is not in the dim list")]
    UnknownScheduleVar(Symbol, Symbol),

    #[error("type mismatch in `{context}`: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        context: &'static str,
        expected: crate::types::Type,
        got: crate::types::Type,
    },

    #[error("buffer parameter `{0}` bound with element size {1:?} but used as {2:?}")]
    BufferElementMismatch(Symbol, crate::types::Type, crate::types::Type),

    #[error("explicit bound for `{var}` promises extent {promised}, but the region required by callers needs at least {required}")]
    BoundTooSmall {
        var: Symbol,
        promised: i64,
        required: i64,
    },

    #[error("function `{0}` is referenced but was never defined")]
    UndefinedFunction(Symbol),

    #[error("variable `{0}` is free: it is not bound by an enclosing Let, For, Allocate, or the function's own parameter list")]
    UnboundVariable(Symbol),

    #[error("compute_level for `{0}` must not be strictly outside its store_level")]
    ComputeLevelOutsideStoreLevel(Symbol),
}

/// A mismatch or missing invariant discovered by the lowering machinery
/// itself (an unbalanced `push_context`/`pop_context`, a cache hit that
/// disagrees with a fresh recomputation, an unreachable IR shape). These
/// are compiler bugs, not user mistakes, so there is nothing sensible to
/// recover to: report the context and abort, the same way the reference
/// implementation's `internal_assert` does.
pub fn bug(where_: &'static str, msg: impl std::fmt::Display) -> ! {
    eprintln!("loopnest internal error in {}: {}\n", where_, msg);
    std::process::exit(101);
}

pub fn cache_mismatch<T: Debug>(where_: &'static str, cached: &T, recomputed: &T) -> ! {
    eprintln!(
        "loopnest internal error in {}: cache-check mode found a mismatch.\ncached     : {:?}\nrecomputed : {:?}\n",
        where_, cached, recomputed
    );
    std::process::exit(101);
}

pub fn unbalanced_scope(where_: &'static str) -> ! {
    bug(where_, "push_context/pop_context calls were unbalanced")
}

pub fn unreachable_variant<T: Debug>(where_: &'static str, got: &T) -> ! {
    bug(where_, format_args!("unexpected node variant: {:?}", got))
}
