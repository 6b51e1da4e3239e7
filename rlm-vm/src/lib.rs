//! # RLM VM
//!
//! The sandbox a recursive language model session executes its code in.
//!
//! ## Core Concepts
//! - **Fragments**: Code blocks emitted by the model, written in Rhai and
//!   run on a worker thread with a fresh engine
//! - **Namespace**: Variables shared by every fragment of a session,
//!   seeded with the `context` under analysis
//! - **Capabilities**: Filesystem, network, process and `eval` access are
//!   denied; regex, JSON and chunking helpers are registered
//! - **Recursion**: `recursive_lm(query, context_subset)` suspends the
//!   fragment until the caller supplies the sub-query's answer

pub mod capabilities;
pub mod convert;
pub mod error;
pub mod execution;
mod helpers;
pub mod limits;
pub mod namespace;
pub mod output;
pub mod sandbox;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use execution::{Execution, ExecutionResult, ExecutionState, RecursionRequest};
pub use limits::Limits;
pub use namespace::Namespace;
pub use output::{render_error, Output};
pub use sandbox::{compile, DefaultRecursionHandler, RecursionHandler, Sandbox};

pub use rhai::{Dynamic, AST};
