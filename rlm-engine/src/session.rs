//! # Session
//!
//! Everything one reasoning process owns: its transcript, its sandbox and
//! the counters that end up in its [`Completion`]. Recursive calls build a
//! fresh session, nothing is shared between them but the config.

use crate::config::EngineConfig;
use crate::context::Context;
use crate::prompt::{self, NO_ANSWER};
use crate::provider::{ChatMessage, UsageTracker};
use crate::result::{Completion, ExecutionRecord, Termination};
use rlm_vm::{Output, Sandbox};
use std::sync::Arc;

pub struct Session {
    pub(crate) query: String,
    /// Never reassigned, even when fragments rebind the name `context`
    pub(crate) context: Arc<Context>,
    pub(crate) depth: usize,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) transcript: Vec<ChatMessage>,
    pub(crate) sandbox: Sandbox,
    pub(crate) trace: Vec<ExecutionRecord>,
    pub(crate) iteration: usize,
    pub(crate) total_calls: usize,
    pub(crate) usage: UsageTracker,
    pub(crate) last_output: Option<String>,
}

impl Session {
    pub fn new(
        query: impl Into<String>,
        context: Arc<Context>,
        depth: usize,
        config: Arc<EngineConfig>,
    ) -> Self {
        let query = query.into();
        let remaining_depth = config.max_recursion_depth.saturating_sub(depth);
        let system = prompt::system_prompt(
            &context.metadata(config.preview_chars),
            config.max_iterations,
            remaining_depth,
        );
        let sandbox = Sandbox::new(context.to_dynamic()).with_limits(config.limits());

        Self {
            transcript: vec![ChatMessage::system(system), ChatMessage::user(query.clone())],
            query,
            context,
            depth,
            config,
            sandbox,
            trace: Vec::new(),
            iteration: 0,
            total_calls: 1,
            usage: UsageTracker::new(),
            last_output: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn model(&self) -> &str {
        self.config.model_for_depth(self.depth)
    }

    /// Append the tool-result turn and trace record for an executed fragment
    pub(crate) fn record(&mut self, code: &str, output: &Output, rendered: String, notes: &[String]) {
        if !output.is_empty() {
            self.last_output = Some(rendered.clone());
        }
        self.trace.push(ExecutionRecord {
            iteration: self.iteration,
            code: code.to_string(),
            output: rendered.clone(),
            error: output.error.as_ref().map(rlm_vm::render_error),
        });

        let mut turn = rendered;
        for note in notes {
            turn.push('\n');
            turn.push_str(note);
        }
        self.transcript.push(ChatMessage::tool_result(turn));
    }

    pub(crate) fn finish(self, answer: String, termination: Termination) -> Completion {
        Completion {
            answer,
            iterations: self.iteration,
            total_calls: self.total_calls,
            transcript: self.transcript,
            trace: self.trace,
            termination,
            usage: self.usage,
        }
    }

    pub(crate) fn exhausted(self) -> Completion {
        let last_output = self.last_output.clone();
        self.finish(NO_ANSWER.to_string(), Termination::IterationLimit { last_output })
    }
}

/// Cut `text` to `max_chars`, noting how much was dropped
pub fn truncate_output(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let mut kept: String = text.chars().take(max_chars).collect();
    kept.push_str(&format!("\n[truncated {} chars]", total - max_chars));
    kept
}
