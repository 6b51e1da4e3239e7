//! Scripted client for tests and demos
//!
//! Replays canned responses (per model, falling back to a shared queue) or
//! asks a closure, and records every call it receives.

use super::*;
use rlm_error::Error;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

type Responder = dyn Fn(&[ChatMessage], &str) -> Result<String> + Send + Sync;

/// A call the client received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub transcript: Vec<ChatMessage>,
}

enum Script {
    Queues {
        by_model: HashMap<String, VecDeque<String>>,
        fallback: VecDeque<String>,
    },
    Responder(Box<Responder>),
}

/// Deterministic [`ModelClient`]
pub struct ScriptedClient {
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl std::fmt::Debug for ScriptedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedClient")
            .field("calls", &lock(&self.calls).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Rough token estimate so usage accounting has something to add up
fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

impl ScriptedClient {
    /// Responses served in order, whatever model is asked
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(Script::Queues {
                by_model: HashMap::new(),
                fallback: responses.into_iter().map(Into::into).collect(),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `responder(transcript, model)`
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage], &str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(Script::Responder(Box::new(responder))),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Responses reserved for `model`, served before the shared queue
    pub fn with_model_responses<I, S>(self, model: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut script = lock(&self.script);
            if let Script::Queues { by_model, .. } = &mut *script {
                by_model
                    .entry(model.into())
                    .or_default()
                    .extend(responses.into_iter().map(Into::into));
            }
        }
        self
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Canned responses not yet served
    pub fn remaining(&self) -> usize {
        match &*lock(&self.script) {
            Script::Queues { by_model, fallback } => {
                fallback.len() + by_model.values().map(VecDeque::len).sum::<usize>()
            }
            Script::Responder(_) => 0,
        }
    }

    fn next_response(&self, transcript: &[ChatMessage], model: &str) -> Result<String> {
        let mut script = lock(&self.script);
        match &mut *script {
            Script::Queues { by_model, fallback } => by_model
                .get_mut(model)
                .and_then(VecDeque::pop_front)
                .or_else(|| fallback.pop_front())
                .ok_or_else(|| {
                    Error::model_unavailable("scripted responses exhausted")
                        .permanent()
                        .with_operation("provider::scripted::generate")
                        .with_context("model", model)
                }),
            Script::Responder(responder) => responder(transcript, model),
        }
    }
}

impl ModelClient for ScriptedClient {
    async fn generate(&self, transcript: &[ChatMessage], model: &str) -> Result<Generation> {
        lock(&self.calls).push(RecordedCall {
            model: model.to_string(),
            transcript: transcript.to_vec(),
        });

        let content = self.next_response(transcript, model)?;
        let prompt_tokens = transcript.iter().map(|m| estimate_tokens(&m.content)).sum();
        let completion_tokens = estimate_tokens(&content);
        Ok(Generation {
            content,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}
