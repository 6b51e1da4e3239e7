//! Diagnostics for the `rlm` binary.
//!
//! Tracing goes to stderr so stdout carries only the answer (or the JSON
//! completion). `RUST_LOG` wins when set; otherwise `warn`, or the engine
//! crates at `info` with `--verbose`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "warn,rlm_engine=info,rlm_vm=info";

pub fn init(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
