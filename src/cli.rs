//! Command-line entry point: a `structopt`-derived `Opt` that overrides
//! `options::Options` defaults (spec §6.3's env-vars-as-defaults,
//! CLI-flags-as-overrides layering), kept from the teacher's own choice of
//! `structopt` as the CLI crate. Grounded on `examples/ammkrn-nanoda/src/
//! cli.rs`'s `Opt` struct and flag naming, trimmed of the Lean-specific
//! source-file list and thread count in favor of the flags this compiler's
//! options actually need.

use structopt::StructOpt;

use crate::options::{ClampLowerPosition, Options};

#[derive(StructOpt, Debug)]
#[structopt(name = "loopnest", about = "Image-processing loop nest lowering pipeline", author = "loopnest contributors")]
pub struct Opt {
    /// Print the resolved options (env defaults plus CLI overrides) before
    /// lowering anything.
    #[structopt(short = "d", long = "debug")]
    pub debug: bool,

    /// Crate-wide debug verbosity; overrides `LOOPNEST_DEBUG`.
    #[structopt(long = "debug-level")]
    pub debug_level: Option<u8>,

    /// Disables `loop_split.rs`'s index-set splitting pass regardless of
    /// `LOOPNEST_LOOP_PARTITION`.
    #[structopt(long = "no-loop-partition")]
    pub no_loop_partition: bool,

    /// Disables `cached_mutator::CachedMutator` memoization; overrides
    /// `LOOPNEST_DISABLE_MUTATOR_CACHE`.
    #[structopt(long = "disable-mutator-cache")]
    pub disable_mutator_cache: bool,

    /// Re-verifies every `CachedMutator` hit against a fresh recomputation;
    /// overrides `LOOPNEST_MUTATOR_CACHE_VERIFY`.
    #[structopt(long = "mutator-cache-verify")]
    pub mutator_cache_verify: bool,

    /// Where clamp lowering runs: `early`, `mid`, or `late` (default
    /// `late`); overrides `LOOPNEST_CLAMP_LOWER_POSITION`.
    #[structopt(long = "clamp-lower-position")]
    pub clamp_lower_position: Option<ClampLowerPosition>,

    /// Base name for persisted per-pass dumps; overrides `LOOPNEST_LOG_FILE`.
    #[structopt(long = "log-file")]
    pub log_file: Option<String>,
}

impl Opt {
    /// Layers this `Opt`'s CLI flags over [`Options::from_env`] (env vars
    /// remain the defaults; an explicit flag always wins).
    pub fn resolve_options(&self) -> Options {
        let mut opts = Options::from_env();
        if let Some(level) = self.debug_level {
            opts.debug_level = crate::options::DebugLevel(level);
        }
        if self.no_loop_partition {
            opts.loop_partition = false;
        }
        if self.disable_mutator_cache {
            opts.disable_mutator_cache = true;
        }
        if self.mutator_cache_verify {
            opts.mutator_cache_verify = true;
        }
        if let Some(position) = self.clamp_lower_position {
            opts.clamp_lower_position = position;
        }
        if let Some(log_file) = &self.log_file {
            opts.log_file = Some(log_file.clone());
        }
        opts
    }
}
