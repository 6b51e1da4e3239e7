//! # Sandbox
//!
//! A session's execution environment: the persistent namespace, the
//! functions earlier fragments defined, and the limits every fragment runs
//! under. Each call to [`Sandbox::execute`] starts one fragment.

use crate::capabilities;
use crate::error::{self, Error, Result};
use crate::execution::{base_engine, Execution, ExecutionResult, RecursionRequest};
use crate::limits::Limits;
use crate::namespace::Namespace;
use crate::output::Output;
use rhai::{Dynamic, AST};

/// Answers `recursive_lm` calls for [`Sandbox::run`]
pub trait RecursionHandler {
    fn handle(&mut self, request: &RecursionRequest) -> Result<String>;
}

/// Refuses every sub-query, as a sandbox at maximum depth would
#[derive(Debug, Default)]
pub struct DefaultRecursionHandler;

impl RecursionHandler for DefaultRecursionHandler {
    fn handle(&mut self, _request: &RecursionRequest) -> Result<String> {
        Err(Error::recursion_depth_exceeded(1, 0).with_operation("sandbox::recursive_lm"))
    }
}

impl<F> RecursionHandler for F
where
    F: FnMut(&RecursionRequest) -> Result<String>,
{
    fn handle(&mut self, request: &RecursionRequest) -> Result<String> {
        self(request)
    }
}

/// Parse a fragment under the sandbox's symbol policy
pub fn compile(source: &str) -> Result<AST> {
    base_engine(&Limits::default())
        .compile(source)
        .map_err(|e| error::from_parse(&e, capabilities::DENIED_SYMBOLS))
}

#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    namespace: Namespace,
    library: AST,
    limits: Limits,
    fragments: usize,
}

impl Sandbox {
    /// A sandbox whose namespace holds `context`
    pub fn new(context: Dynamic) -> Self {
        Self {
            namespace: Namespace::with_context(context),
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn namespace_mut(&mut self) -> &mut Namespace {
        &mut self.namespace
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Number of fragments started so far
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Names of the functions fragments have defined
    pub fn functions(&self) -> Vec<String> {
        self.library.iter_functions().map(|f| f.name.to_string()).collect()
    }

    /// Start a fragment. Syntax errors complete on the first `next`.
    pub fn execute(&mut self, source: &str) -> Execution<'_> {
        self.fragments += 1;
        tracing::debug!(
            fragment = self.fragments,
            source_bytes = source.len(),
            "executing fragment"
        );
        Execution::start(&mut self.namespace, &mut self.library, source, self.limits.clone())
    }

    /// Execute a fragment to completion, answering sub-queries through
    /// `handler`
    pub async fn run(&mut self, source: &str, handler: &mut dyn RecursionHandler) -> Output {
        let mut execution = self.execute(source);
        loop {
            match execution.next().await {
                ExecutionResult::Complete(output) => return output,
                ExecutionResult::NeedsRecursion(request) => {
                    execution.provide_recursion_response(handler.handle(&request));
                }
            }
        }
    }
}
