//! Capability policy
//!
//! Rhai has no filesystem, network or process access of its own. Names a
//! model is likely to reach for are registered as stubs that raise
//! `CapabilityDenied`, `eval` is disabled and every `import` fails.

use crate::error::{into_rhai, Error};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult};

/// Functions that raise `CapabilityDenied` when called
pub const DENIED_FUNCTIONS: &[&str] = &[
    "open",
    "read_file",
    "write_file",
    "remove_file",
    "list_dir",
    "exec",
    "system",
    "shell",
    "http_get",
    "http_post",
    "fetch",
    "getenv",
    "input",
];

/// Language symbols removed from the parser
pub const DENIED_SYMBOLS: &[&str] = &["eval"];

type Denied = std::result::Result<Dynamic, Box<EvalAltResult>>;

fn deny(name: &str) -> Denied {
    Err(into_rhai(Error::capability_denied(name)))
}

pub(crate) fn restrict(engine: &mut Engine) {
    for symbol in DENIED_SYMBOLS {
        engine.disable_symbol(*symbol);
    }
    engine.set_module_resolver(DummyModuleResolver::new());

    for &name in DENIED_FUNCTIONS {
        engine.register_fn(name, move || deny(name));
        engine.register_fn(name, move |_: Dynamic| deny(name));
        engine.register_fn(name, move |_: Dynamic, _: Dynamic| deny(name));
        engine.register_fn(name, move |_: Dynamic, _: Dynamic, _: Dynamic| deny(name));
    }
}
