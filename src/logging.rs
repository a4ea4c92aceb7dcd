//! Logging setup: a `tracing_subscriber::fmt` layer gated by
//! `RUST_LOG`, mirroring the `tracing`/`tracing-subscriber` pair already
//! declared in `Cargo.toml`'s dependency table.
//!
//! Grounded in `original_source/src/utils/logging_config.py`: `--verbose`
//! raises the console level from `WARN` to `DEBUG`, and a handful of noisy
//! transitive crates stay pinned to `WARN` regardless of the global level
//! so a run's own messages aren't drowned out by HTTP client chatter.

use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset and `--verbose` was
/// not passed.
const DEFAULT_FILTER: &str = "warn,enrich_rs=info";

/// Filter directive used when `--verbose` is passed and `RUST_LOG` is
/// unset: raises the crate's own level to `DEBUG` while keeping noisy
/// transitive HTTP crates at `WARN`.
const VERBOSE_FILTER: &str = "warn,enrich_rs=debug,reqwest=warn,h2=warn,hyper=warn";

/// Initializes the global `tracing` subscriber. Safe to call more than once;
/// later calls are no-ops (`tracing_subscriber::fmt().try_init()` fails
/// silently if a subscriber is already set).
pub fn init() {
    init_with_verbosity(false);
}

/// Like [`init`], but raises the default level to `DEBUG` when `verbose` is
/// `true`. `RUST_LOG`, when set, always takes precedence over both.
pub fn init_with_verbosity(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
