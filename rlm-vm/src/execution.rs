//! # Fragment Execution
//!
//! A fragment runs to completion on a worker thread with its own Rhai
//! engine. `recursive_lm` cannot finish inside the sandbox, so the worker
//! sends a [`RecursionRequest`] back to the caller and blocks until
//! [`Execution::provide_recursion_response`] answers it. The time spent
//! blocked does not count against the fragment timeout.
//!
//! The session scope travels to the worker and comes back when the
//! fragment finishes. An [`Execution`] dropped before completion loses the
//! bindings made since the previous fragment.

use crate::capabilities;
use crate::convert;
use crate::error::{self, Error, Result};
use crate::helpers;
use crate::limits::{Limits, TIME_CHECK_INTERVAL};
use crate::namespace::Namespace;
use crate::output::{Capture, Output};
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Name whose assignment is reported in the output
pub const RESULT_VAR: &str = "result";

/// Names the recursion primitive is registered under
pub const RECURSION_FUNCTIONS: &[&str] = &["recursive_lm", "llm_query"];

/// Stack for fragment worker threads
const WORKER_STACK_BYTES: usize = 16 * 1024 * 1024;

/// A sub-query raised by `recursive_lm(query, context_subset)`
#[derive(Debug, Clone, PartialEq)]
pub struct RecursionRequest {
    pub query: String,
    /// JSON form of `context_subset`, `None` to reuse the session context
    pub context: Option<serde_json::Value>,
}

/// Result of driving an execution
#[derive(Debug)]
pub enum ExecutionResult {
    /// The fragment ran to the end or stopped on an uncaught error
    Complete(Output),
    /// Paused on a `recursive_lm` call
    NeedsRecursion(RecursionRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    /// Waiting for a recursion response
    Suspended,
    Finished,
}

type Reply = oneshot::Sender<Result<String>>;

enum Event {
    Recursion(RecursionRequest, Reply),
    Done(Box<Finished>),
}

struct Finished {
    scope: Scope<'static>,
    library: AST,
    output: Output,
}

struct Job {
    source: String,
    scope: Scope<'static>,
    library: AST,
    limits: Limits,
}

/// Wall-clock budget of one fragment, paused while a sub-query runs
struct Budget {
    started: Instant,
    limit: Duration,
    suspended_micros: AtomicU64,
}

impl Budget {
    fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
            suspended_micros: AtomicU64::new(0),
        }
    }

    fn suspend(&self, waited: Duration) {
        let micros = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.suspended_micros.fetch_add(micros, Ordering::Relaxed);
    }

    fn exceeded(&self) -> bool {
        let suspended = Duration::from_micros(self.suspended_micros.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(suspended) > self.limit
    }
}

/// Worker side of `recursive_lm`
struct Bridge {
    events: mpsc::UnboundedSender<Event>,
    budget: Arc<Budget>,
}

impl Bridge {
    fn call(&self, query: &str, subset: Option<Dynamic>) -> std::result::Result<String, Box<EvalAltResult>> {
        let context = match subset {
            Some(value) if !value.is_unit() => Some(convert::to_json(&value).map_err(error::into_rhai)?),
            _ => None,
        };
        let request = RecursionRequest {
            query: query.to_string(),
            context,
        };
        let (reply, answer) = oneshot::channel();
        if self.events.send(Event::Recursion(request, reply)).is_err() {
            return Err(error::into_rhai(Error::cancelled().with_operation("sandbox::recursive_lm")));
        }

        let waiting = Instant::now();
        let answer = answer.blocking_recv();
        self.budget.suspend(waiting.elapsed());
        match answer {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(err)) => Err(error::into_rhai(err)),
            Err(_) => Err(error::into_rhai(
                Error::cancelled().with_operation("sandbox::recursive_lm"),
            )),
        }
    }
}

/// Engine with limits, capability policy and helpers, without output or
/// recursion hooks
pub(crate) fn base_engine(limits: &Limits) -> Engine {
    let mut engine = Engine::new();
    limits.apply(&mut engine);
    capabilities::restrict(&mut engine);
    helpers::register(&mut engine);
    engine
}

fn fragment_engine(limits: &Limits, capture: &Arc<Mutex<Capture>>, bridge: Arc<Bridge>) -> Engine {
    let mut engine = base_engine(limits);

    let out = Arc::clone(capture);
    engine.on_print(move |text| {
        out.lock().unwrap_or_else(|e| e.into_inner()).line(text);
    });
    let out = Arc::clone(capture);
    engine.on_debug(move |text, _, _| {
        out.lock().unwrap_or_else(|e| e.into_inner()).line(text);
    });

    let budget = Arc::clone(&bridge.budget);
    engine.on_progress(move |operations| {
        if operations % TIME_CHECK_INTERVAL == 0 && budget.exceeded() {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    for &name in RECURSION_FUNCTIONS {
        let b = Arc::clone(&bridge);
        engine.register_fn(name, move |query: &str| b.call(query, None));
        let b = Arc::clone(&bridge);
        engine.register_fn(name, move |query: &str, subset: Dynamic| b.call(query, Some(subset)));
    }
    engine
}

fn run_job(job: Job, events: mpsc::UnboundedSender<Event>) {
    let Job {
        source,
        mut scope,
        library,
        limits,
    } = job;

    let capture = Arc::new(Mutex::new(Capture::new(limits.max_stdout_bytes)));
    let bridge = Arc::new(Bridge {
        events: events.clone(),
        budget: Arc::new(Budget::new(limits.timeout)),
    });
    let engine = fragment_engine(&limits, &capture, bridge);
    let result_before = scope.get(RESULT_VAR).map(convert::display);

    let (library, value) = match engine.compile(&source) {
        Ok(ast) => {
            let mut program = library.merge(&ast);
            let value = engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, &program)
                .map_err(|e| error::from_rhai(e, limits.timeout).with_operation("sandbox::execute"));
            program.clear_statements();
            (program, value)
        }
        Err(err) => (library, Err(error::from_parse(&err, capabilities::DENIED_SYMBOLS))),
    };
    let (stdout, stdout_truncated) = capture.lock().unwrap_or_else(|e| e.into_inner()).take();
    let result_after = scope.get(RESULT_VAR).map(convert::display);
    let (echo, error) = match value {
        Ok(value) if value.is_unit() => (None, None),
        Ok(value) => (Some(convert::display(&value)), None),
        Err(err) => (None, Some(err)),
    };

    let output = Output {
        stdout,
        stdout_truncated,
        echo,
        result: result_after.filter(|after| result_before.as_ref() != Some(after)),
        error,
    };
    let done = Finished {
        scope,
        library,
        output,
    };
    if events.send(Event::Done(Box::new(done))).is_err() {
        debug!("fragment finished after its execution was dropped");
    }
}

/// A fragment in flight. Drive it with [`Execution::next`].
pub struct Execution<'a> {
    namespace: &'a mut Namespace,
    library: &'a mut AST,
    events: Option<mpsc::UnboundedReceiver<Event>>,
    pending: Option<Reply>,
    failed: Option<Error>,
    state: ExecutionState,
}

impl<'a> Execution<'a> {
    pub(crate) fn start(
        namespace: &'a mut Namespace,
        library: &'a mut AST,
        source: &str,
        limits: Limits,
    ) -> Self {
        let job = Job {
            source: source.to_string(),
            scope: namespace.take_scope(),
            library: std::mem::take(library),
            limits,
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("rlm-fragment".to_string())
            .stack_size(WORKER_STACK_BYTES)
            .spawn(move || run_job(job, tx));

        let (events, failed) = match spawned {
            Ok(_) => (Some(rx), None),
            Err(e) => {
                warn!(error = %e, "failed to start fragment worker");
                let err = Error::from(e).with_operation("sandbox::execute");
                (None, Some(err))
            }
        };
        Self {
            namespace,
            library,
            events,
            pending: None,
            failed,
            state: ExecutionState::Running,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Run until the fragment completes or calls `recursive_lm`.
    ///
    /// A pending sub-query that was never answered is refused as
    /// cancelled before the fragment continues.
    pub async fn next(&mut self) -> ExecutionResult {
        self.pending = None;
        if let Some(err) = self.failed.take() {
            self.state = ExecutionState::Finished;
            return ExecutionResult::Complete(Output::failed(err));
        }
        let event = match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        };
        match event {
            Some(Event::Recursion(request, reply)) => {
                self.pending = Some(reply);
                self.state = ExecutionState::Suspended;
                ExecutionResult::NeedsRecursion(request)
            }
            Some(Event::Done(done)) => {
                let Finished {
                    scope,
                    library,
                    output,
                } = *done;
                self.namespace.restore_scope(scope);
                *self.library = library;
                self.events = None;
                self.state = ExecutionState::Finished;
                ExecutionResult::Complete(output)
            }
            None => {
                self.events = None;
                self.state = ExecutionState::Finished;
                ExecutionResult::Complete(Output::failed(
                    Error::unexpected("fragment worker stopped without a result")
                        .with_operation("sandbox::execute"),
                ))
            }
        }
    }

    /// Answer the pending `recursive_lm` call. An error is raised at the
    /// call site, where the fragment may catch it.
    pub fn provide_recursion_response(&mut self, response: Result<String>) {
        match self.pending.take() {
            Some(reply) => {
                if reply.send(response).is_err() {
                    debug!("fragment stopped before its recursion response arrived");
                }
                self.state = ExecutionState::Running;
            }
            None => warn!("recursion response provided with no pending call"),
        }
    }
}
