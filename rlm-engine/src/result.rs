//! Result records of a completed session

use crate::provider::{ChatMessage, UsageTracker};
use serde::Serialize;

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// `FINAL(answer)`
    Answer,
    /// `FINAL_VAR(name)` resolved against the namespace
    Variable { name: String },
    /// Every iteration was used without a termination marker
    IterationLimit {
        /// Last fragment output that was not empty
        last_output: Option<String>,
    },
}

/// One executed fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    pub iteration: usize,
    pub code: String,
    /// Rendered output as it went into the transcript
    pub output: String,
    /// Rendered uncaught error, if the fragment failed
    pub error: Option<String>,
}

/// Outcome of `Engine::complete`
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub answer: String,
    pub iterations: usize,
    /// This session plus every recursive session below it
    pub total_calls: usize,
    pub transcript: Vec<ChatMessage>,
    pub trace: Vec<ExecutionRecord>,
    pub termination: Termination,
    pub usage: UsageTracker,
}

impl Completion {
    /// True when the model produced an answer
    pub fn is_answered(&self) -> bool {
        !matches!(self.termination, Termination::IterationLimit { .. })
    }

    /// Print the transcript, one message after another
    pub fn pretty_print(&self) {
        for message in &self.transcript {
            message.pretty_print();
        }
    }
}
