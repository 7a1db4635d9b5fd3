//! `Function` and `Schedule` (spec §3.3): the user-level description the
//! scheduler consumes to build the initial loop nest. Grounded on the
//! teacher's `Declaration`/`Definition` pair
//! (`examples/ammkrn-nanoda/src/env.rs`) for the shape of "a name plus a
//! body plus auxiliary metadata fields," adapted to the field list spec.md
//! §3.3 specifies.

use crate::domain::Domain;
use crate::expr::Expr;
use crate::name::Symbol;
use crate::stmt::ForType;

/// Where a producer's computation, or its allocation, is nested: an
/// explicit loop level in some caller, the pipeline root, or fully inlined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopLevel {
    Root,
    Inline,
    /// `(function, variable)` — the loop over `variable` inside `function`.
    At(Symbol, Symbol),
}

impl LoopLevel {
    pub fn is_inline(&self) -> bool {
        matches!(self, LoopLevel::Inline)
    }

    /// A rough "depth" ordering used to check invariant 5 (`compute_level`
    /// not shallower than `store_level`): `Inline` is deepest, `Root` is
    /// shallowest, and two `At` levels naming the same function are
    /// compared by nothing more than identity here — real depth comes from
    /// the realization order's loop nest, checked in `scheduler.rs` once
    /// the nest exists.
    pub fn is_root(&self) -> bool {
        matches!(self, LoopLevel::Root)
    }
}

/// One entry in a `Schedule`'s dim list: a loop variable, its `for_type`,
/// and optional split metadata carried through lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct Dim {
    pub var: Symbol,
    pub for_type: ForType,
}

/// `(old, outer, inner, factor, is_rename)` — spec §3.3. A rename split has
/// `factor` unused; `old -> outer` is a pure substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub old: Symbol,
    pub outer: Symbol,
    pub inner: Symbol,
    pub factor: i64,
    pub is_rename: bool,
}

/// A caller-promised bound: "the caller only ever evaluates `var` within
/// `[min, min+extent)`" (spec §3.3).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPromise {
    pub var: Symbol,
    pub min: Expr,
    pub extent: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSplitSettings {
    pub auto_split: bool,
    pub split_borders: bool,
    pub auto_split_all: bool,
    pub split_borders_all: bool,
}

impl Default for LoopSplitSettings {
    fn default() -> Self {
        LoopSplitSettings {
            auto_split: false,
            split_borders: false,
            auto_split_all: false,
            split_borders_all: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    /// Innermost to outermost.
    pub dims: Vec<Dim>,
    pub splits: Vec<Split>,
    pub bounds: Vec<BoundPromise>,
    pub compute_level: LoopLevel,
    pub store_level: LoopLevel,
    /// Innermost to outermost storage dimension order; defaults to the
    /// function's argument order when empty.
    pub storage_dims: Vec<Symbol>,
    pub loop_split_settings: LoopSplitSettings,
}

impl Schedule {
    pub fn inline() -> Self {
        Schedule {
            dims: vec![],
            splits: vec![],
            bounds: vec![],
            compute_level: LoopLevel::Inline,
            store_level: LoopLevel::Inline,
            storage_dims: vec![],
            loop_split_settings: LoopSplitSettings::default(),
        }
    }

    pub fn root() -> Self {
        Schedule {
            dims: vec![],
            splits: vec![],
            bounds: vec![],
            compute_level: LoopLevel::Root,
            store_level: LoopLevel::Root,
            storage_dims: vec![],
            loop_split_settings: LoopSplitSettings::default(),
        }
    }

    /// Invariant 5: `compute_level` is not shallower than `store_level`. A
    /// function cannot be allocated somewhere that its own computation has
    /// already gone out of scope by the time it runs.
    pub fn compute_level_valid(&self) -> bool {
        match (&self.store_level, &self.compute_level) {
            (LoopLevel::Inline, _) => true,
            (_, LoopLevel::Inline) => false,
            (LoopLevel::Root, _) => true,
            (_, LoopLevel::Root) => false,
            (LoopLevel::At(sf, sv), LoopLevel::At(cf, cv)) => sf == cf && sv == cv || sf != cf,
        }
    }

    /// Propagates `_all` flags from a caller's schedule into a callee's,
    /// filling undefined non-`_all` fields with the `_all` counterpart
    /// (spec §4.5 step 1).
    pub fn propagate_from(&self, caller: &Schedule) -> Schedule {
        let mut next = self.clone();
        next.loop_split_settings.auto_split_all = caller.loop_split_settings.auto_split_all;
        next.loop_split_settings.split_borders_all = caller.loop_split_settings.split_borders_all;
        if !next.loop_split_settings.auto_split {
            next.loop_split_settings.auto_split = caller.loop_split_settings.auto_split_all;
        }
        if !next.loop_split_settings.split_borders {
            next.loop_split_settings.split_borders = caller.loop_split_settings.split_borders_all;
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Symbol,
    pub args: Vec<Symbol>,
    pub value: Expr,
    pub reduction_value: Option<Expr>,
    pub reduction_args: Vec<Expr>,
    pub reduction_domain: Option<Domain>,
    pub schedule: Schedule,
    pub reduction_schedule: Option<Schedule>,
    pub valid_domain: Domain,
    pub computable_domain: Domain,
    pub debug_file: Option<String>,
}

impl Function {
    pub fn is_reduction(&self) -> bool {
        self.reduction_value.is_some()
    }

    /// Invariant 6: Valid ⊆ Computable.
    pub fn domains_valid(&self) -> bool {
        self.valid_domain.is_subset_of(&self.computable_domain)
    }

    /// Every variable the pure value expression may reference without it
    /// being free: the function's own argument list.
    pub fn bound_names(&self) -> hashbrown::HashSet<Symbol> {
        self.args.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomInterval;
    use crate::expr::mk_int_imm;
    use crate::interval::{Bound, InfInterval};
    use crate::types::Type;

    fn fin(lo: i64, hi: i64) -> DomInterval {
        DomInterval::new(InfInterval::new(Bound::Finite(lo), Bound::Finite(hi)), true)
    }

    #[test]
    fn compute_level_must_not_be_shallower_than_store_level() {
        let mut s = Schedule::root();
        s.store_level = LoopLevel::At(Symbol::new("f"), Symbol::new("x"));
        s.compute_level = LoopLevel::Root;
        assert!(!s.compute_level_valid());
        s.compute_level = LoopLevel::At(Symbol::new("f"), Symbol::new("x"));
        assert!(s.compute_level_valid());
    }

    #[test]
    fn function_domain_invariant() {
        let f = Function {
            name: Symbol::new("f"),
            args: vec![Symbol::new("x")],
            value: mk_int_imm(Type::int(32), 0),
            reduction_value: None,
            reduction_args: vec![],
            reduction_domain: None,
            schedule: Schedule::root(),
            reduction_schedule: None,
            valid_domain: crate::domain::Domain::new(vec![fin(1, 8)]),
            computable_domain: crate::domain::Domain::new(vec![fin(0, 10)]),
            debug_file: None,
        };
        assert!(f.domains_valid());
    }
}
