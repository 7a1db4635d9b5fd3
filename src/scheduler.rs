//! Building the initial loop nest from a root `Function` (spec §4.5).
//! Grounded on `examples/ammkrn-nanoda/src/env.rs`'s `Env` (a central
//! name-keyed registry of declarations) for the callee-registry shape;
//! the realization-order topological sort and producer-injection strategy
//! follow `examples/original_source/src/Lower.cpp`.

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;

use crate::bounds::{region_provided, Scope};
use crate::domain::DomInterval;
use crate::errors;
use crate::expr::{self, CallType, Expr, InnerExpr};
use crate::function::{Function, LoopLevel, Split};
use crate::interval::Bound;
use crate::name::Symbol;
use crate::stmt::{self, ForType, InnerStmt, Range, Stmt};
use crate::subst::substitute_expr;
use crate::types::Type;
use crate::visitor::Visitor;

/// The set of `Function`s reachable from one root, keyed by name. Mirrors
/// the teacher's `Env`-as-registry pattern but is a plain owned map: the
/// scheduler only ever runs single-threaded over one compilation (spec §5).
pub struct Pipeline {
    pub functions: IndexMap<Symbol, Function>,
    pub root: Symbol,
}

impl Pipeline {
    pub fn new(root: Function, callees: Vec<Function>) -> Self {
        let mut functions = IndexMap::new();
        let root_name = root.name.clone();
        functions.insert(root_name.clone(), root);
        for f in callees {
            functions.insert(f.name.clone(), f);
        }
        Pipeline { functions, root: root_name }
    }

    fn get(&self, name: &Symbol) -> &Function {
        self.functions
            .get(name)
            .unwrap_or_else(|| errors::bug("scheduler::Pipeline::get", format_args!("undefined function `{}`", name)))
    }
}

/// Qualified loop-variable name for argument `arg` of function `f`, per
/// spec §4.5 step 3's "per-arg variables named `f.arg_i`".
pub fn qualified(f: &Symbol, arg: &Symbol) -> Symbol {
    Symbol::new(&format!("{}.{}", f.as_str(), arg.as_str()))
}

struct CallCollector {
    seen: HashSet<Symbol>,
    order: Vec<Symbol>,
}
impl Visitor for CallCollector {
    fn visit_expr(&mut self, e: &Expr) {
        if let InnerExpr::Call { name, call_type: CallType::Halide, .. } = e.inner() {
            if self.seen.insert(name.clone()) {
                self.order.push(name.clone());
            }
        }
        self.visit_expr_children(e);
    }
}

/// Every distinct Halide-call target directly referenced by `e`, in
/// first-encountered order.
fn call_targets(e: &Expr) -> Vec<Symbol> {
    let mut c = CallCollector { seen: HashSet::new(), order: vec![] };
    c.visit_expr(e);
    c.order
}

/// Step 1: schedule propagation. Depth-first from the root, copying `_all`
/// loop-split flags from caller to callee and filling undefined
/// non-`_all` fields, per `Schedule::propagate_from`.
pub fn propagate_schedules(pipeline: &mut Pipeline) {
    let mut visited = HashSet::new();
    let mut stack = vec![pipeline.root.clone()];
    visited.insert(pipeline.root.clone());
    while let Some(name) = stack.pop() {
        let caller_schedule = pipeline.get(&name).schedule.clone();
        let mut callees = call_targets(&pipeline.get(&name).value);
        if let Some(rv) = &pipeline.get(&name).reduction_value {
            callees.extend(call_targets(rv));
        }
        for callee in callees {
            if !pipeline.functions.contains_key(&callee) {
                errors::bug("scheduler::propagate_schedules", format_args!("call to undefined function `{}`", callee));
            }
            {
                let f = pipeline.functions.get_mut(&callee).unwrap();
                f.schedule = f.schedule.propagate_from(&caller_schedule);
            }
            if visited.insert(callee.clone()) {
                stack.push(callee);
            }
        }
    }
}

/// Step 2: realization order. Callees appear before callers; diamonds are
/// unioned (each name appears exactly once, at the position of its first
/// topological placement).
pub fn realization_order(pipeline: &Pipeline) -> Vec<Symbol> {
    let mut order = Vec::new();
    let mut done = HashSet::new();
    let mut visiting = HashSet::new();

    fn visit(
        pipeline: &Pipeline,
        name: &Symbol,
        done: &mut HashSet<Symbol>,
        visiting: &mut HashSet<Symbol>,
        order: &mut Vec<Symbol>,
    ) {
        if done.contains(name) {
            return;
        }
        if !visiting.insert(name.clone()) {
            errors::bug("scheduler::realization_order", format_args!("cyclic call graph through `{}`", name));
        }
        let f = pipeline.get(name);
        let mut callees = call_targets(&f.value);
        if let Some(rv) = &f.reduction_value {
            callees.extend(call_targets(rv));
        }
        for callee in callees {
            visit(pipeline, &callee, done, visiting, order);
        }
        visiting.remove(name);
        done.insert(name.clone());
        order.push(name.clone());
    }

    visit(pipeline, &pipeline.root, &mut done, &mut visiting, &mut order);
    order
}

fn dom_interval_range(di: DomInterval, ty: Type) -> Range {
    match (di.bounds.min, di.bounds.max) {
        (Bound::Finite(lo), Bound::Finite(hi)) => Range {
            min: expr::mk_int_imm(ty, lo),
            extent: expr::mk_int_imm(ty, hi - lo + 1),
        },
        _ => errors::bug("scheduler::dom_interval_range", "function realized over an unbounded dimension"),
    }
}

/// Step 3: the initial produce (and, for a reduction, update) statement
/// for one function, with its own dims/splits already applied. Returns
/// the produce/update body in terms of the qualified loop variables
/// (`f.arg_i`), not yet injected into any caller.
pub struct InitialNest {
    pub produce: Stmt,
    pub update: Option<Stmt>,
    /// Per-dimension `(min, extent)` the body is realized over, in
    /// argument order -- used by the caller to size the enclosing
    /// `Realize`/`Allocate`.
    pub bounds: Vec<Range>,
}

pub fn build_initial_nest(f: &Function) -> InitialNest {
    let ty = Type::int(32);
    let arg_vars: Vec<Symbol> = f.args.iter().map(|a| qualified(&f.name, a)).collect();

    let mut split_map: HashMap<Symbol, Expr> = HashMap::new();
    for split in &f.schedule.splits {
        let replacement = if split.is_rename {
            expr::mk_variable(ty, split.outer.clone())
        } else {
            // old -> outer*factor + inner + old.min; `old.min` is folded in
            // as the function's own valid-domain bound for that dimension
            // rather than carried as a fresh runtime variable, since the
            // split removes `old` from the dims list entirely.
            let old_min = f
                .args
                .iter()
                .position(|a| a == &split.old)
                .map(|i| match f.valid_domain.0[i].bounds.min {
                    Bound::Finite(lo) => expr::mk_int_imm(ty, lo),
                    _ => errors::bug("scheduler::build_initial_nest", "split dimension has unbounded min"),
                })
                .unwrap_or_else(|| errors::bug("scheduler::build_initial_nest", format_args!("split references unknown dim `{}`", split.old)));
            expr::mk_bin(
                expr::BinOp::Add,
                ty,
                expr::mk_bin(
                    expr::BinOp::Add,
                    ty,
                    expr::mk_bin(expr::BinOp::Mul, ty, expr::mk_variable(ty, split.outer.clone()), expr::mk_int_imm(ty, split.factor)),
                    expr::mk_variable(ty, split.inner.clone()),
                ),
                old_min,
            )
        };
        split_map.insert(qualified(&f.name, &split.old), replacement);
    }

    let produce = build_produce(f, &arg_vars, &split_map, &f.value, &f.args);
    let produce_with_splits = wrap_split_lets(produce, &f.schedule.splits, ty);
    let produce_nest = wrap_dims(produce_with_splits, f, ty);

    let update = f.reduction_value.as_ref().map(|rv| {
        let body = build_produce(f, &arg_vars, &split_map, rv, &f.args);
        let with_splits = wrap_split_lets(body, &f.reduction_schedule.as_ref().unwrap_or(&f.schedule).splits, ty);
        wrap_dims(with_splits, f, ty)
    });

    let bounds = f.valid_domain.0.iter().map(|di| dom_interval_range(*di, ty)).collect();

    InitialNest { produce: produce_nest, update, bounds }
}

fn build_produce(f: &Function, arg_vars: &[Symbol], split_map: &HashMap<Symbol, Expr>, value: &Expr, args: &[Symbol]) -> Stmt {
    let ty = Type::int(32);
    let index_args: Vec<Expr> = arg_vars
        .iter()
        .map(|v| substitute_expr(&expr::mk_variable(ty, v.clone()), split_map))
        .collect();
    let _ = args;
    stmt::mk_provide(f.name.clone(), substitute_expr(value, split_map), index_args)
}

fn wrap_split_lets(body: Stmt, splits: &[Split], ty: Type) -> Stmt {
    let mut acc = body;
    for split in splits.iter().rev() {
        if split.is_rename {
            continue;
        }
        acc = stmt::mk_let_stmt(
            split.inner.clone(),
            expr::mk_int_imm(ty, 0),
            stmt::mk_let_stmt(
                split.outer.clone(),
                expr::mk_int_imm(ty, 0),
                acc,
            ),
        );
    }
    acc
}

fn wrap_dims(body: Stmt, f: &Function, ty: Type) -> Stmt {
    let mut acc = body;
    for dim in &f.schedule.dims {
        let var = dim.var.clone();
        let (min, extent) = dim_bounds(f, &var, ty);
        acc = stmt::mk_for(var, min, extent, dim.for_type, None, acc);
    }
    acc
}

fn dim_bounds(f: &Function, var: &Symbol, ty: Type) -> (Expr, Expr) {
    if let Some(promise) = f.schedule.bounds.iter().find(|b| &b.var == var) {
        return (promise.min.clone(), promise.extent.clone());
    }
    for split in &f.schedule.splits {
        if &split.outer == var {
            return (expr::mk_int_imm(ty, 0), expr::mk_int_imm(ty, 1 << 30));
        }
        if &split.inner == var {
            return (expr::mk_int_imm(ty, 0), expr::mk_int_imm(ty, split.factor));
        }
    }
    if let Some(i) = f.args.iter().position(|a| &qualified(&f.name, a) == var) {
        let r = dom_interval_range(f.valid_domain.0[i], ty);
        return (r.min, r.extent);
    }
    errors::bug("scheduler::dim_bounds", format_args!("dim `{}` has no derivable bound", var))
}

/// Step 4: producer injection for one non-root callee, applied in reverse
/// realization order (deepest-dependency first).
pub fn inject_producer(root_stmt: Stmt, pipeline: &Pipeline, callee: &Symbol) -> Stmt {
    let f = pipeline.get(callee);
    if f.schedule.compute_level.is_inline() && !f.is_reduction() {
        return inline_callee(&root_stmt, f);
    }

    let nest = build_initial_nest(f);
    let compute_for = match &f.schedule.compute_level {
        LoopLevel::At(func, var) => qualified(func, var),
        LoopLevel::Root => return wrap_root_pipeline(root_stmt, f, nest),
        LoopLevel::Inline => errors::bug("scheduler::inject_producer", "reduction cannot be inlined"),
    };

    let (with_pipeline, found) = wrap_for_body(&root_stmt, &compute_for, &mut |body| {
        stmt::mk_pipeline(f.name.clone(), nest.produce.clone(), nest.update.clone(), body)
    });
    if !found {
        errors::bug("scheduler::inject_producer", format_args!("compute_level `{}` not found in realization", compute_for));
    }

    if f.schedule.store_level == f.schedule.compute_level {
        return with_pipeline;
    }
    let store_for = match &f.schedule.store_level {
        LoopLevel::At(func, var) => qualified(func, var),
        LoopLevel::Root => errors::bug("scheduler::inject_producer", "store_level Root but compute_level is not -- invariant 5 violated"),
        LoopLevel::Inline => errors::bug("scheduler::inject_producer", "store_level cannot be Inline when compute_level is not"),
    };
    let scope = Scope::new();
    let bounds_for_alloc = region_provided(&with_pipeline, &f.name, &scope);
    let bounds: Vec<Range> = if bounds_for_alloc.is_empty() {
        nest.bounds.clone()
    } else {
        bounds_for_alloc.into_iter().map(|di| dom_interval_range(di, Type::int(32))).collect()
    };
    let (with_realize, found) = wrap_for_body(&with_pipeline, &store_for, &mut |body| {
        stmt::mk_realize(f.name.clone(), f.value.ty(), bounds.clone(), body)
    });
    if !found {
        errors::bug("scheduler::inject_producer", format_args!("store_level `{}` not found in realization", store_for));
    }
    with_realize
}

fn wrap_root_pipeline(root_stmt: Stmt, f: &Function, nest: InitialNest) -> Stmt {
    let pipeline = stmt::mk_pipeline(f.name.clone(), nest.produce, nest.update, root_stmt);
    stmt::mk_realize(f.name.clone(), f.value.ty(), nest.bounds, pipeline)
}

fn inline_callee(root_stmt: &Stmt, f: &Function) -> Stmt {
    struct Inliner<'a> {
        f: &'a Function,
    }
    impl<'a> crate::mutator::Rewriter for Inliner<'a> {
        fn rewrite_expr(&mut self, e: &Expr) -> Expr {
            if let InnerExpr::Call { name, call_type: CallType::Halide, args, .. } = e.inner() {
                if name == &self.f.name {
                    let mut map = HashMap::new();
                    for (arg_name, arg_val) in self.f.args.iter().zip(args.iter()) {
                        map.insert(qualified(&self.f.name, arg_name), arg_val.clone());
                    }
                    return substitute_expr(&self.f.value, &map);
                }
            }
            e.clone()
        }
    }
    impl<'a> crate::mutator::Mutator for Inliner<'a> {}
    let mut inliner = Inliner { f };
    crate::mutator::Mutator::mutate_stmt(&mut inliner, root_stmt)
}

/// Step 5: explicit bounds guards. Wraps `body` in an `AssertStmt` checking
/// that the user's promised `[min, min+extent)` covers the inferred
/// `[min_var, min_var+extent_var)`, then rebinds those variables to the
/// promised values.
pub fn apply_explicit_bounds(body: Stmt, f: &Function) -> Stmt {
    let ty = Type::int(32);
    let mut acc = body;
    for promise in f.schedule.bounds.iter().rev() {
        let min_var = Symbol::new(&format!("{}.min", promise.var.as_str()));
        let extent_var = Symbol::new(&format!("{}.extent", promise.var.as_str()));
        let cond = expr::mk_logical(
            expr::LogicalOp::And,
            expr::mk_cmp(expr::CmpOp::Le, promise.min.clone(), expr::mk_variable(ty, min_var.clone())),
            expr::mk_cmp(
                expr::CmpOp::Ge,
                expr::mk_bin(expr::BinOp::Add, ty, promise.min.clone(), promise.extent.clone()),
                expr::mk_bin(expr::BinOp::Add, ty, expr::mk_variable(ty, min_var.clone()), expr::mk_variable(ty, extent_var.clone())),
            ),
        );
        let guarded = stmt::mk_block(
            stmt::mk_assert_stmt(cond, format!("explicit bound for `{}` does not cover the required region", promise.var)),
            acc,
        );
        acc = stmt::mk_let_stmt(
            min_var,
            promise.min.clone(),
            stmt::mk_let_stmt(extent_var, promise.extent.clone(), guarded),
        );
    }
    acc
}

/// Drives steps 1-5 end to end, producing the fully-injected statement
/// tree for `pipeline.root`.
pub fn lower_pipeline(mut pipeline: Pipeline) -> Stmt {
    propagate_schedules(&mut pipeline);
    let order = realization_order(&pipeline);
    let root_nest = build_initial_nest(pipeline.get(&pipeline.root.clone()));
    let mut stmt = stmt::mk_pipeline(pipeline.root.clone(), root_nest.produce.clone(), root_nest.update.clone(), stmt::mk_no_op());

    for name in order.iter().rev() {
        if name == &pipeline.root {
            continue;
        }
        stmt = inject_producer(stmt, &pipeline, name);
    }

    let root_schedule = pipeline.get(&pipeline.root.clone()).schedule.clone();
    let _ = root_schedule;
    apply_explicit_bounds(stmt, pipeline.get(&pipeline.root.clone()))
}

/// Finds the unique `For` named `target` and replaces its *body* with
/// `wrap(body)`, searching depth-first. Distinct from the generic
/// `Mutator` traversal: this is a find-first-and-splice operation, not a
/// blanket rewrite, so it is written as plain recursion over the
/// statement shapes that can contain a `For`.
fn wrap_for_body(stmt: &Stmt, target: &Symbol, wrap: &mut dyn FnMut(Stmt) -> Stmt) -> (Stmt, bool) {
    match stmt.inner() {
        InnerStmt::For { name, min, extent, for_type, loop_split_info, body } if name == target => {
            let wrapped = wrap(body.clone());
            (stmt::mk_for(name.clone(), min.clone(), extent.clone(), *for_type, loop_split_info.clone(), wrapped), true)
        }
        InnerStmt::For { name, min, extent, for_type, loop_split_info, body } => {
            let (new_body, found) = wrap_for_body(body, target, wrap);
            if found {
                (stmt::mk_for(name.clone(), min.clone(), extent.clone(), *for_type, loop_split_info.clone(), new_body), true)
            } else {
                (stmt.clone(), false)
            }
        }
        InnerStmt::LetStmt { name, value, body } => {
            let (new_body, found) = wrap_for_body(body, target, wrap);
            (if found { stmt::mk_let_stmt(name.clone(), value.clone(), new_body) } else { stmt.clone() }, found)
        }
        InnerStmt::Allocate { name, ty, size, body } => {
            let (new_body, found) = wrap_for_body(body, target, wrap);
            (if found { stmt::mk_allocate(name.clone(), *ty, size.clone(), new_body) } else { stmt.clone() }, found)
        }
        InnerStmt::Realize { name, ty, bounds, body } => {
            let (new_body, found) = wrap_for_body(body, target, wrap);
            (if found { stmt::mk_realize(name.clone(), *ty, bounds.clone(), new_body) } else { stmt.clone() }, found)
        }
        InnerStmt::Pipeline { name, produce, update, consume } => {
            let (new_consume, found_c) = wrap_for_body(consume, target, wrap);
            if found_c {
                return (stmt::mk_pipeline(name.clone(), (**produce).clone(), update.as_ref().map(|u| (**u).clone()), new_consume), true);
            }
            if let Some(u) = update {
                let (new_update, found_u) = wrap_for_body(u, target, wrap);
                if found_u {
                    return (
                        stmt::mk_pipeline(name.clone(), (**produce).clone(), Some(new_update), (**consume).clone()),
                        true,
                    );
                }
            }
            let (new_produce, found_p) = wrap_for_body(produce, target, wrap);
            if found_p {
                return (
                    stmt::mk_pipeline(name.clone(), new_produce, update.as_ref().map(|u| (**u).clone()), (**consume).clone()),
                    true,
                );
            }
            (stmt.clone(), false)
        }
        InnerStmt::Block { first, rest } => {
            let (new_first, found_f) = wrap_for_body(first, target, wrap);
            if found_f {
                return (stmt::mk_block(new_first, (**rest).clone()), true);
            }
            let (new_rest, found_r) = wrap_for_body(rest, target, wrap);
            (if found_r { stmt::mk_block((**first).clone(), new_rest) } else { stmt.clone() }, found_r)
        }
        InnerStmt::StmtTargetVar { name, body } => {
            let (new_body, found) = wrap_for_body(body, target, wrap);
            (if found { stmt::mk_stmt_target_var(name.clone(), new_body) } else { stmt.clone() }, found)
        }
        _ => (stmt.clone(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::function::Schedule;
    use crate::interval::InfInterval;

    fn fin(lo: i64, hi: i64) -> DomInterval {
        DomInterval::new(InfInterval::new(Bound::Finite(lo), Bound::Finite(hi)), true)
    }

    fn leaf(name: &str, args: &[&str], value: Expr) -> Function {
        let args: Vec<Symbol> = args.iter().map(|a| Symbol::new(a)).collect();
        let dom = Domain::new(args.iter().map(|_| fin(0, 9)).collect());
        Function {
            name: Symbol::new(name),
            args: args.clone(),
            value,
            reduction_value: None,
            reduction_args: vec![],
            reduction_domain: None,
            schedule: Schedule::root(),
            reduction_schedule: None,
            valid_domain: dom.clone(),
            computable_domain: dom,
            debug_file: None,
        }
    }

    #[test]
    fn realization_order_places_callee_before_caller() {
        let ty = Type::int(32);
        let g = leaf("g", &["x"], expr::mk_variable(ty, Symbol::new("g.x")));
        let call_g = expr::mk_call(ty, Symbol::new("g"), vec![expr::mk_variable(ty, Symbol::new("f.x"))], CallType::Halide, Some(Symbol::new("g")), None, None);
        let f = leaf("f", &["x"], call_g);
        let pipeline = Pipeline::new(f, vec![g]);
        let order = realization_order(&pipeline);
        let gi = order.iter().position(|n| n.as_str() == "g").unwrap();
        let fi = order.iter().position(|n| n.as_str() == "f").unwrap();
        assert!(gi < fi);
    }

    #[test]
    fn inline_producer_injection_substitutes_call() {
        let ty = Type::int(32);
        let mut g = leaf(
            "g",
            &["x"],
            expr::mk_bin(expr::BinOp::Add, ty, expr::mk_variable(ty, Symbol::new("g.x")), expr::mk_int_imm(ty, 1)),
        );
        g.schedule = Schedule::inline();
        let call_g = expr::mk_call(
            ty,
            Symbol::new("g"),
            vec![expr::mk_variable(ty, Symbol::new("f.x"))],
            CallType::Halide,
            Some(Symbol::new("g")),
            None,
            None,
        );
        let f = leaf("f", &["x"], call_g);
        let mut pipeline = Pipeline::new(f, vec![g]);
        propagate_schedules(&mut pipeline);
        let root_nest = build_initial_nest(pipeline.get(&Symbol::new("f")));
        let root_stmt = stmt::mk_pipeline(Symbol::new("f"), root_nest.produce, None, stmt::mk_no_op());
        let injected = inject_producer(root_stmt, &pipeline, &Symbol::new("g"));
        let rendered = format!("{:?}", injected);
        assert!(!rendered.contains("Halide::g"), "expected inlined call, got {}", rendered);
    }
}
