//! Thin binary entry point. There is no front-end parser in scope, so this
//! builds a small pipeline directly in Rust -- one producer reading an
//! input buffer through a replicated (clamp-to-edge) border, one consumer
//! summing two taps of it -- runs it through the full lowering pipeline,
//! and prints the result. Grounded on the teacher's `main.rs`
//! (`Opt::from_args` plus a print-on-`--debug` style), with the
//! Lean-specific add/check queues and `crossbeam_utils::thread::scope`
//! worker pool dropped: this crate's pipeline driver
//! (`lower::lower_pipeline`) is single-threaded by design, so there is no
//! parallel orchestration left to keep (see `DESIGN.md`).

use structopt::StructOpt;

use loopnest::cli::Opt;
use loopnest::domain::{DomInterval, Domain};
use loopnest::expr::{self, BinOp, CallType, ClampKind};
use loopnest::function::{Dim, Function, Schedule};
use loopnest::interval::{Bound, InfInterval};
use loopnest::lower::{self, Compilation};
use loopnest::name::Symbol;
use loopnest::options;
use loopnest::scheduler::Pipeline;
use loopnest::stmt::ForType;
use loopnest::types::Type;

fn bounded(lo: i64, hi: i64) -> DomInterval {
    DomInterval::new(InfInterval::new(Bound::Finite(lo), Bound::Finite(hi)), true)
}

/// `producer(x) = input[clamp(x, 0, 63)]`, computed at root (one realized
/// stage, not inlined, so the sliding-window and storage-folding passes
/// have something to do).
fn build_producer(ty: Type) -> Function {
    let x = Symbol::new("x");
    let clamped = expr::mk_clamp(
        ClampKind::Replicate,
        expr::mk_variable(ty, x.clone()),
        expr::mk_int_imm(ty, 0),
        expr::mk_int_imm(ty, 63),
        None,
    );
    let value = expr::mk_load(ty, Symbol::new("input"), clamped, Some(Symbol::new("input")), None);
    let dom = Domain::new(vec![bounded(0, 99)]);
    Function {
        name: Symbol::new("producer"),
        args: vec![x],
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

/// `consumer(x) = producer(x) + producer(x + 1)`, the pipeline's root.
fn build_consumer(ty: Type) -> Function {
    let x = Symbol::new("x");
    let call_here = expr::mk_call(ty, Symbol::new("producer"), vec![expr::mk_variable(ty, x.clone())], CallType::Halide, Some(Symbol::new("producer")), None, None);
    let call_next = expr::mk_call(
        ty,
        Symbol::new("producer"),
        vec![expr::mk_bin(BinOp::Add, ty, expr::mk_variable(ty, x.clone()), expr::mk_int_imm(ty, 1))],
        CallType::Halide,
        Some(Symbol::new("producer")),
        None,
        None,
    );
    let value = expr::mk_bin(BinOp::Add, ty, call_here, call_next);
    let name = Symbol::new("consumer");
    let mut schedule = Schedule::root();
    schedule.dims = vec![Dim { var: loopnest::scheduler::qualified(&name, &x), for_type: ForType::Serial }];
    let dom = Domain::new(vec![bounded(0, 98)]);
    Function {
        name,
        args: vec![x],
        value,
        reduction_value: None,
        reduction_args: vec![],
        reduction_domain: None,
        schedule,
        reduction_schedule: None,
        valid_domain: dom.clone(),
        computable_domain: dom,
        debug_file: None,
    }
}

fn main() {
    let opt = Opt::from_args();
    let compiler_options = opt.resolve_options();
    options::init_tracing(&compiler_options);

    if opt.debug {
        println!("resolved options: {:#?}", compiler_options);
    }

    let ty = Type::int(32);
    let consumer = build_consumer(ty);
    let producer = build_producer(ty);
    let pipeline = Pipeline::new(consumer, vec![producer]);

    let mut comp = Compilation::new(compiler_options);
    match lower::lower_pipeline(pipeline, &mut comp) {
        Ok(stmt) => {
            println!("{:?}", stmt);
            println!("\n-- stats --\n{:#?}", comp.stats);
        }
        Err(e) => {
            eprintln!("lowering failed: {}", e);
            std::process::exit(1);
        }
    }
}
