//! # Engine
//!
//! The orchestrator loop and the recursive dispatcher.
//!
//! Each iteration asks the model for a response, checks it for a
//! termination marker, executes its first code block in the session's
//! sandbox and reports the output back as a tool-result turn. A fragment
//! that calls `recursive_lm` suspends; the engine runs a child session to
//! completion and resumes the fragment with the child's answer.

use crate::config::EngineConfig;
use crate::context::Context;
use crate::prompt::NO_CODE_NUDGE;
use crate::protocol::{self, Detection};
use crate::provider::{ChatMessage, Generation, ModelClient};
use crate::result::{Completion, Termination};
use crate::retry;
use crate::session::{truncate_output, Session};
use rlm_error::{Error, Result};
use rlm_vm::{render_error, ExecutionResult, Output, RecursionRequest};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

type SessionFuture<'a> = Pin<Box<dyn Future<Output = Result<Completion>> + 'a>>;

/// Per-iteration events: `info` when verbose, `debug` otherwise
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

pub struct Engine<C> {
    client: C,
    config: Arc<EngineConfig>,
    cancel: CancellationToken,
}

impl<C: ModelClient> Engine<C> {
    /// Fails with `ConfigInvalid` when `config` does not validate
    pub fn new(client: C, config: EngineConfig) -> Result<Self> {
        config.validate().map_err(|e| e.with_operation("engine::new"))?;
        Ok(Self {
            client,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        })
    }

    /// Abort runs once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Answer `query` about `context`.
    ///
    /// Running out of iterations is a normal outcome. Only model failures,
    /// cancellation and configuration errors are returned as `Err`.
    pub async fn complete(&self, query: &str, context: impl Into<Context>) -> Result<Completion> {
        let completion = self
            .run_session(query.to_string(), Arc::new(context.into()), 0)
            .await
            .map_err(|e| e.with_operation("engine::complete"))?;

        info!(
            iterations = completion.iterations,
            total_calls = completion.total_calls,
            requests = completion.usage.requests,
            answered = completion.is_answered(),
            "completion finished"
        );
        Ok(completion)
    }

    fn run_session(&self, query: String, context: Arc<Context>, depth: usize) -> SessionFuture<'_> {
        Box::pin(async move {
            let config = Arc::clone(&self.config);
            let verbose = config.verbose;
            let model = config.model_for_depth(depth);
            let mut session = Session::new(query, context, depth, Arc::clone(&config));

            progress!(
                verbose,
                depth,
                model,
                context_kind = session.context.kind(),
                context_size = session.context.size(),
                "session started"
            );

            for iteration in 1..=config.max_iterations {
                session.iteration = iteration;

                let generation = self.generate(&session.transcript, model, depth, iteration).await?;
                session.usage.track(model, &generation.usage);
                let response = generation.content;
                session.transcript.push(ChatMessage::assistant(response.clone()));

                let mut notes = Vec::new();
                match protocol::detect(&response) {
                    Detection::Answer(answer) => {
                        progress!(verbose, depth, iteration, "session terminated with FINAL");
                        return Ok(session.finish(answer, Termination::Answer));
                    }
                    Detection::Variable(name) => {
                        match session.sandbox.namespace().resolve_final(&name) {
                            Ok(answer) => {
                                progress!(verbose, depth, iteration, variable = %name, "session terminated with FINAL_VAR");
                                return Ok(session.finish(answer, Termination::Variable { name }));
                            }
                            Err(err) => {
                                progress!(verbose, depth, iteration, variable = %name, "FINAL_VAR did not resolve");
                                notes.push(render_error(&err));
                            }
                        }
                    }
                    Detection::NotTerminated => {}
                }

                let blocks = protocol::code_blocks(&response);
                let Some(code) = blocks.first() else {
                    progress!(verbose, depth, iteration, "no code in response");
                    notes.push(NO_CODE_NUDGE.to_string());
                    session.transcript.push(ChatMessage::tool_result(notes.join("\n")));
                    continue;
                };
                if blocks.len() > 1 {
                    notes.push(format!(
                        "Note: {} code blocks found, only the first was executed.",
                        blocks.len()
                    ));
                }

                let output = self.execute_fragment(&mut session, code).await?;
                progress!(
                    verbose,
                    depth,
                    iteration,
                    code_chars = code.len(),
                    error = ?output.error.as_ref().map(|e| e.kind()),
                    "fragment executed"
                );

                let rendered = truncate_output(output.render(), config.max_output_chars);
                session.record(code, &output, rendered, &notes);
            }

            progress!(verbose, depth, max_iterations = config.max_iterations, "iteration limit reached");
            Ok(session.exhausted())
        })
    }

    /// One model request, raced against cancellation and retried per policy
    async fn generate(
        &self,
        transcript: &[ChatMessage],
        model: &str,
        depth: usize,
        iteration: usize,
    ) -> Result<Generation> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled().with_operation("engine::generate"));
        }
        progress!(self.config.verbose, depth, iteration, model, turns = transcript.len(), "calling model");

        let client = &self.client;
        let call = retry::with_retry(self.config.retry.as_ref(), move || {
            client.generate(transcript, model)
        });

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::cancelled().with_operation("engine::generate")),
            result = call => result.map_err(|e| {
                e.with_operation("engine::generate")
                    .with_context("depth", depth.to_string())
                    .with_context("iteration", iteration.to_string())
            }),
        }
    }

    /// Drive a fragment to completion, answering its sub-queries
    async fn execute_fragment(&self, session: &mut Session, code: &str) -> Result<Output> {
        let Session {
            sandbox,
            context,
            depth,
            total_calls,
            usage,
            ..
        } = session;

        let mut execution = sandbox.execute(code);
        loop {
            match execution.next().await {
                ExecutionResult::Complete(output) => return Ok(output),
                ExecutionResult::NeedsRecursion(request) => {
                    let reply = match self.dispatch(&request, context, *depth).await {
                        Ok(child) => {
                            *total_calls += child.total_calls;
                            usage.merge(&child.usage);
                            Ok(child.answer)
                        }
                        Err(err) if err.kind().is_recoverable() => Err(err),
                        Err(err) => return Err(err),
                    };
                    execution.provide_recursion_response(reply);
                }
            }
        }
    }

    /// Run a child session for `recursive_lm`
    async fn dispatch(
        &self,
        request: &RecursionRequest,
        parent_context: &Arc<Context>,
        depth: usize,
    ) -> Result<Completion> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled().with_operation("engine::dispatch"));
        }

        let child_depth = depth + 1;
        let max_depth = self.config.max_recursion_depth;
        if child_depth > max_depth {
            progress!(self.config.verbose, depth, max_depth, "recursive call refused");
            return Err(Error::recursion_depth_exceeded(child_depth, max_depth)
                .with_operation("engine::dispatch"));
        }

        let context = match &request.context {
            Some(subset) => Arc::new(Context::from(subset.clone())),
            None => Arc::clone(parent_context),
        };
        progress!(
            self.config.verbose,
            depth = child_depth,
            query = %request.query,
            context_size = context.size(),
            "dispatching recursive call"
        );

        self.run_session(request.query.clone(), context, child_depth).await
    }
}
