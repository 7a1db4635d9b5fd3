//! The pipeline driver: runs the nineteen-step lowering order in one place
//! so no pass has to know its own position. Grounded on the teacher's
//! `main.rs` orchestration (`check_serial`/`check_parallel` driving a fixed
//! sequence of add/check phases over one shared `Env`) for the shape of "one
//! function owns the step order, passes are dumb," and on `name.rs`'s
//! `UNIQUE_SUFFIX`/`reset_unique_names` pair for the per-compilation reset
//! discipline `Compilation::clear` follows.

use crate::errors::{LowerError, LowerResult};
use crate::expr::{self, CallType, Expr, InnerExpr};
use crate::log::PassLog;
use crate::name::Symbol;
use crate::options::{ClampLowerPosition, Options};
use crate::scheduler::{self, Pipeline};
use crate::stmt::{self, InnerStmt, Range, Stmt};
use crate::types::Type;
use crate::visitor::Visitor;

/// Counters a caller can inspect after lowering to see what the pipeline
/// actually did, the Rust analogue of the original's scattered debug
/// printouts of pass activity.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub clamp_lowerings: u64,
    pub slides_applied: u64,
    pub splits_applied: u64,
    pub splits_reverted: u64,
    pub realizes_folded: u64,
    pub realizes_flattened: u64,
}

/// Process-global state a lowering run needs (spec §5: unique-name
/// counter, debug level, statistics), bundled so it can be constructed
/// once and reset between compilations rather than living in statics.
pub struct Compilation {
    pub options: Options,
    pub stats: Stats,
    pub log: Option<PassLog>,
}

impl Compilation {
    pub fn new(options: Options) -> Self {
        crate::name::reset_unique_names();
        let log = options.log_file.clone().map(PassLog::new);
        Compilation {
            options,
            stats: Stats::default(),
            log,
        }
    }

    /// Resets all per-compilation state: unique-name counter, statistics,
    /// and (if a log is attached) its truncate-tracking, so the next
    /// `lower_pipeline` call starts fresh the way spec §5 requires.
    pub fn clear(&mut self) {
        crate::name::reset_unique_names();
        self.stats = Stats::default();
        if let Some(log) = &mut self.log {
            log.clear();
        }
    }

    fn dump(&mut self, section: &str, description: &str, stmt: &Stmt) {
        if self.options.section_debug_level(section).0 > 0 {
            if let Some(log) = &mut self.log {
                let _ = log.log_stmt(section, description, stmt);
            }
        }
    }
}

/// Runs the full nineteen-step pipeline (spec §6 "Pass ordering") over
/// `pipeline`, returning the fully lowered statement tree for its root.
pub fn lower_pipeline(mut pipeline: Pipeline, comp: &mut Compilation) -> LowerResult<Stmt> {
    let span = tracing::debug_span!("lower_pipeline");
    let _enter = span.enter();

    // 1. schedule propagation -> initial nest.
    scheduler::propagate_schedules(&mut pipeline);
    let order = scheduler::realization_order(&pipeline);
    let root_fn = &pipeline.functions[&pipeline.root];
    let root_nest = scheduler::build_initial_nest(root_fn);
    let mut stmt = stmt::mk_pipeline(pipeline.root.clone(), root_nest.produce, root_nest.update, stmt::mk_no_op());
    comp.dump("scheduler", "initial nest", &stmt);

    // 2. inlining and producer injection.
    for name in order.iter().rev() {
        if name == &pipeline.root {
            continue;
        }
        stmt = scheduler::inject_producer(stmt, &pipeline, name);
    }
    comp.dump("scheduler", "producer injection", &stmt);

    // 3. simplify.
    stmt = simplify(&stmt);

    // 4. optional early clamp lowering.
    if comp.options.clamp_lower_position == ClampLowerPosition::Early {
        stmt = lower_clamps(&stmt, comp);
    }

    // 5. tracing injection: a no-op here. Generated-code tracing is an
    // external-collaborator concern (spec §1); this pipeline's own
    // instrumentation is the `tracing` spans wrapping each step, already
    // active for the duration of this call.

    // 6. image-argument checks.
    check_image_arguments(&pipeline)?;

    // 7. bounds inference: apply every function's explicit bound promises.
    for name in order.iter() {
        let f = &pipeline.functions[name];
        if !f.schedule.bounds.is_empty() {
            stmt = scheduler::apply_explicit_bounds(stmt, f);
        }
    }
    comp.dump("bounds", "explicit bounds applied", &stmt);

    // 8. optional mid clamp lowering.
    if comp.options.clamp_lower_position == ClampLowerPosition::Mid {
        stmt = lower_clamps(&stmt, comp);
    }

    // 9. sliding window, once per non-root producer in realization order.
    for name in order.iter() {
        if name == &pipeline.root {
            continue;
        }
        let before = format!("{:?}", stmt);
        stmt = crate::sliding_window::apply_sliding_window(&stmt, name);
        if format!("{:?}", stmt) != before {
            comp.stats.slides_applied += 1;
        }
    }
    comp.dump("sliding_window", "after sliding window", &stmt);

    // 10. uniquify variable names.
    stmt = uniquify(&stmt);

    // 11. simplify, loop split, bounds_simplify.
    stmt = simplify(&stmt);
    if comp.options.loop_partition {
        stmt = crate::loop_split::apply_loop_splitting(&stmt, crate::loop_split::DEFAULT_SPLIT_WIDTH);
    }
    stmt = bounds_simplify(&stmt);
    comp.dump("loop_split", "after loop splitting", &stmt);

    // 12. storage folding.
    stmt = transform_realizes(&stmt, &mut |name, _ty, bounds, body| {
        let (folded_bounds, folded_body) = crate::storage::fold_storage(name, bounds, &body);
        comp.stats.realizes_folded += 1;
        stmt::mk_realize(name.clone(), _ty, folded_bounds, folded_body)
    });

    // 13. debug-to-file injection.
    stmt = inject_debug_dumps(&stmt, &pipeline);

    // 14. storage flattening.
    stmt = transform_realizes(&stmt, &mut |name, ty, bounds, body| {
        comp.stats.realizes_flattened += 1;
        crate::storage::flatten_realize(name, ty, bounds, &body)
    });
    comp.dump("storage", "after flattening", &stmt);

    // 15. simplify, loop split, bounds_simplify.
    stmt = simplify(&stmt);
    if comp.options.loop_partition {
        stmt = crate::loop_split::apply_loop_splitting(&stmt, crate::loop_split::DEFAULT_SPLIT_WIDTH);
    }
    stmt = bounds_simplify(&stmt);

    // 16. optional late clamp lowering (the default).
    if comp.options.clamp_lower_position == ClampLowerPosition::Late {
        stmt = lower_clamps(&stmt, comp);
    }

    // 17. vectorize, unroll, simplify. `scheduler::build_initial_nest`
    // already bakes each dim's `for_type` (including Vectorized/Unrolled)
    // into the `For` nodes it builds at step 1, and `uniquify` at step 10
    // preserves `for_type` while only renaming the bound variable, so
    // there is nothing left to re-tag here; `storage::tag_for_types`
    // remains available for callers building a nest by hand. Only the
    // final simplify is needed.
    stmt = simplify(&stmt);

    // 18. interleaving detection, early frees. Interleaving detection is a
    // backend memory-layout optimization with no corresponding module in
    // this crate's scope; only early frees are implemented.
    for name in order.iter() {
        if name == &pipeline.root {
            continue;
        }
        stmt = crate::storage::insert_early_free(name, &stmt);
    }

    // 19. trivial-for removal, final simplify.
    stmt = crate::storage::remove_trivial_fors(&stmt);
    comp.dump("lower", "final lowered tree", &stmt);

    Ok(stmt)
}

fn simplify(stmt: &Stmt) -> Stmt {
    crate::simplify::Simplifier::new().simplify_stmt(stmt)
}

fn bounds_simplify(stmt: &Stmt) -> Stmt {
    crate::bounds::BoundsSimplifier::new(crate::bounds::Scope::new()).simplify_stmt(stmt)
}

fn lower_clamps(stmt: &Stmt, comp: &mut Compilation) -> Stmt {
    use crate::mutator::Mutator;
    // ClampLowerer has no built-in counter, so count occurrences before
    // and after to update stats without changing its public shape.
    let before = count_clamps(stmt);
    let mut lowerer = crate::clamp::ClampLowerer;
    let lowered = lowerer.mutate_stmt(stmt);
    let after = count_clamps(&lowered);
    comp.stats.clamp_lowerings += before.saturating_sub(after);
    lowered
}

fn count_clamps(stmt: &Stmt) -> u64 {
    struct ClampCounter(u64);
    impl Visitor for ClampCounter {
        fn visit_expr(&mut self, e: &Expr) {
            if let InnerExpr::Clamp { .. } = e.inner() {
                self.0 += 1;
            }
            self.visit_expr_children(e);
        }
    }
    let mut counter = ClampCounter(0);
    counter.visit_stmt(stmt);
    counter.0
}

/// Verifies every image/param name referenced in the pipeline is used at
/// one consistent element type throughout (spec §7's "buffer parameter
/// bound to the wrong element size" user error), since this crate has no
/// separate typed `Param`/`ImageParam` registry to check against -- the
/// first occurrence of a name establishes its type, and any later mismatch
/// is reported.
fn check_image_arguments(pipeline: &Pipeline) -> LowerResult<()> {
    struct ImageChecker {
        seen: hashbrown::HashMap<Symbol, Type>,
        mismatch: Option<(Symbol, Type, Type)>,
    }
    impl Visitor for ImageChecker {
        fn visit_expr(&mut self, e: &Expr) {
            match e.inner() {
                InnerExpr::Call { name, ty, image, param, .. } | InnerExpr::Load { name, ty, image, param, .. } => {
                    if let Some(buf_name) = image.clone().or_else(|| param.clone()) {
                        match self.seen.get(&buf_name) {
                            Some(existing) if *existing != *ty && self.mismatch.is_none() => {
                                self.mismatch = Some((name.clone(), *existing, *ty));
                            }
                            Some(_) => {}
                            None => {
                                self.seen.insert(buf_name, *ty);
                            }
                        }
                    }
                }
                _ => {}
            }
            self.visit_expr_children(e);
        }
    }
    let mut checker = ImageChecker {
        seen: hashbrown::HashMap::new(),
        mismatch: None,
    };
    for f in pipeline.functions.values() {
        checker.visit_expr(&f.value);
        if let Some(rv) = &f.reduction_value {
            checker.visit_expr(rv);
        }
    }
    match checker.mismatch {
        Some((name, expected, got)) => Err(LowerError::BufferElementMismatch(name, expected, got)),
        None => Ok(()),
    }
}

/// Renames every `For`/`LetStmt` binder to a fresh process-wide-unique
/// name (spec §6 step 10), preventing two instances of the same inlined
/// or injected function body from shadowing each other's loop variables.
/// Grounded on `name.rs`'s `unique_name`, built on `subst.rs`'s
/// substitution machinery rather than a bespoke renaming walk.
fn uniquify(stmt: &Stmt) -> Stmt {
    match stmt.inner() {
        InnerStmt::For {
            name,
            min,
            extent,
            for_type,
            loop_split_info,
            body,
        } => {
            let new_name = crate::name::unique_name(name.as_str());
            let renamed = crate::subst::substitute_stmt_one(body, name, &expr::mk_variable(min.ty(), new_name.clone()));
            stmt::mk_for(new_name, min.clone(), extent.clone(), *for_type, loop_split_info.clone(), uniquify(&renamed))
        }
        InnerStmt::LetStmt { name, value, body } => {
            let new_name = crate::name::unique_name(name.as_str());
            let renamed = crate::subst::substitute_stmt_one(body, name, &expr::mk_variable(value.ty(), new_name.clone()));
            stmt::mk_let_stmt(new_name, value.clone(), uniquify(&renamed))
        }
        _ => recurse_map(stmt, &mut uniquify),
    }
}

/// Walks every `Realize` node bottom-up, replacing it with `f(name, ty,
/// bounds, transformed_body)`. Shared by the storage-folding and
/// storage-flattening steps, which both need to locate every `Realize` in
/// the tree rather than one named node the way `scheduler.rs`'s
/// `wrap_for_body` does.
fn transform_realizes(stmt: &Stmt, f: &mut dyn FnMut(&Symbol, Type, &[Range], Stmt) -> Stmt) -> Stmt {
    if let InnerStmt::Realize { name, ty, bounds, body } = stmt.inner() {
        let new_body = transform_realizes(body, f);
        return f(name, *ty, bounds, new_body);
    }
    recurse_map(stmt, &mut |child| transform_realizes(child, f))
}

/// Splices a `halide_debug_to_file`-style extern call (modeled the same
/// way `storage::insert_early_free`'s free marker is, as a `PrintStmt`
/// wrapping an `Extern` `Call`) immediately before `target`'s `Pipeline`
/// consume statement, for every function with a `debug_file` set.
fn inject_debug_dumps(stmt: &Stmt, pipeline: &Pipeline) -> Stmt {
    let mut acc = stmt.clone();
    for (name, f) in pipeline.functions.iter() {
        if let Some(path) = &f.debug_file {
            acc = splice_debug_dump(&acc, name, path);
        }
    }
    acc
}

fn splice_debug_dump(stmt: &Stmt, target: &Symbol, path: &str) -> Stmt {
    let recursed = recurse_map(stmt, &mut |child| splice_debug_dump(child, target, path));
    if let InnerStmt::Pipeline { name, produce, update, consume } = recursed.inner() {
        if name == target {
            let ty = Type::int(32);
            let call = expr::mk_call(
                ty,
                Symbol::new("halide_debug_to_file"),
                vec![expr::mk_variable(ty, name.clone())],
                CallType::Extern,
                None,
                None,
                None,
            );
            let dump = stmt::mk_print_stmt(format!("debug_to_file {} -> {}", name, path), vec![call]);
            return stmt::mk_pipeline(
                name.clone(),
                (**produce).clone(),
                update.as_ref().map(|u| (**u).clone()),
                stmt::mk_block(dump, (**consume).clone()),
            );
        }
    }
    recursed
}

/// The single-level structural recursion shared by `uniquify`,
/// `transform_realizes`, and `splice_debug_dump`: apply `f` to every
/// direct `Stmt` child, rebuilding the node around the results.
fn recurse_map(stmt: &Stmt, f: &mut dyn FnMut(&Stmt) -> Stmt) -> Stmt {
    match stmt.inner() {
        InnerStmt::For {
            name,
            min,
            extent,
            for_type,
            loop_split_info,
            body,
        } => stmt::mk_for(name.clone(), min.clone(), extent.clone(), *for_type, loop_split_info.clone(), f(body)),
        InnerStmt::LetStmt { name, value, body } => stmt::mk_let_stmt(name.clone(), value.clone(), f(body)),
        InnerStmt::Allocate { name, ty, size, body } => stmt::mk_allocate(name.clone(), *ty, size.clone(), f(body)),
        InnerStmt::Realize { name, ty, bounds, body } => stmt::mk_realize(name.clone(), *ty, bounds.clone(), f(body)),
        InnerStmt::Pipeline { name, produce, update, consume } => {
            stmt::mk_pipeline(name.clone(), f(produce), update.as_ref().map(|u| f(u)), f(consume))
        }
        InnerStmt::Block { first, rest } => stmt::mk_block(f(first), f(rest)),
        InnerStmt::StmtTargetVar { name, body } => stmt::mk_stmt_target_var(name.clone(), f(body)),
        _ => stmt.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, DomInterval};
    use crate::function::{Dim, Function, Schedule};
    use crate::interval::{Bound, InfInterval};
    use crate::stmt::ForType;

    fn fin(lo: i64, hi: i64) -> DomInterval {
        DomInterval::new(InfInterval::new(Bound::Finite(lo), Bound::Finite(hi)), true)
    }

    fn leaf(name: &str, args: &[&str], value: Expr) -> Function {
        let ty = Type::int(32);
        let args: Vec<Symbol> = args.iter().map(|a| Symbol::new(*a)).collect();
        let mut schedule = Schedule::root();
        schedule.dims = args.iter().map(|a| Dim { var: crate::scheduler::qualified(&Symbol::new(name), a), for_type: ForType::Serial }).collect();
        Function {
            name: Symbol::new(name),
            args: args.clone(),
            value,
            reduction_value: None,
            reduction_args: vec![],
            reduction_domain: None,
            schedule,
            reduction_schedule: None,
            valid_domain: Domain::new(args.iter().map(|_| fin(0, 9)).collect()),
            computable_domain: Domain::new(args.iter().map(|_| fin(0, 9)).collect()),
            debug_file: None,
        }
    }

    #[test]
    fn lowers_a_trivial_single_function_pipeline() {
        let ty = Type::int(32);
        let root = leaf("out", &["x"], expr::mk_int_imm(ty, 0));
        let pipeline = Pipeline::new(root, vec![]);
        let mut comp = Compilation::new(Options::defaults());
        let result = lower_pipeline(pipeline, &mut comp);
        assert!(result.is_ok());
    }

    #[test]
    fn uniquify_renames_distinct_for_loops_differently() {
        let ty = Type::int(32);
        let x = Symbol::new("x");
        let inner = stmt::mk_for(x.clone(), expr::mk_int_imm(ty, 0), expr::mk_int_imm(ty, 4), ForType::Serial, None, stmt::mk_no_op());
        let outer = stmt::mk_for(x.clone(), expr::mk_int_imm(ty, 0), expr::mk_int_imm(ty, 4), ForType::Serial, None, inner);
        let renamed = uniquify(&outer);
        let rendered = format!("{:?}", renamed);
        assert!(!rendered.contains("for (serial, x in"));
    }
}
