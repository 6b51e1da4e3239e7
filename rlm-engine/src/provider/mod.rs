//! # Model Client Interface
//!
//! A trait-based abstraction over the language model that writes a
//! session's code fragments.
//!
//! ## Design
//! - `ModelClient` defines the one call the engine makes: the whole
//!   transcript in, one completion out
//! - `OpenAIClient` speaks the OpenAI-compatible chat API (OpenRouter,
//!   OpenAI, vLLM, Ollama)
//! - `ScriptedClient` replays canned responses for tests and demos
//! - Usage tracking per model, folded across recursive sessions

pub mod openai;
pub mod scripted;

pub use openai::OpenAIClient;
pub use scripted::{RecordedCall, ScriptedClient};

use rlm_error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Core Types
// ============================================================================

/// A message in a session transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// The engine's report of an executed fragment
    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }

    /// Pretty print the message to stdout
    pub fn pretty_print(&self) {
        println!("{}", self);
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role_str = match self.role {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL",
        };
        writeln!(f, "[{}]", role_str)?;
        writeln!(f, "{}", self.content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// One completion returned by a model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub content: String,
    pub usage: Usage,
}

impl Generation {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// The model behind every session
///
/// Failures are `ModelUnavailable` (network, 5xx, auth, bad payload) or
/// `RateLimited` (429).
#[allow(async_fn_in_trait)]
pub trait ModelClient: Send + Sync {
    /// Complete `transcript` with `model`
    async fn generate(&self, transcript: &[ChatMessage], model: &str) -> Result<Generation>;
}

impl<T: ModelClient + ?Sized> ModelClient for &T {
    async fn generate(&self, transcript: &[ChatMessage], model: &str) -> Result<Generation> {
        (**self).generate(transcript, model).await
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Default sampling temperature for fragment generation
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Configuration for creating HTTP clients
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: String,
    pub headers: HashMap<String, String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenRouter,
    OpenAI,
    Local,
}

impl ProviderConfig {
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("HTTP-Referer".into(), "https://github.com/rlm-test".into());
        headers.insert("X-Title".into(), "RLM Test".into());

        Self {
            provider_type: ProviderType::OpenRouter,
            api_key: Some(api_key.into()),
            base_url: "https://openrouter.ai/api/v1".into(),
            headers,
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: 120,
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: Some(api_key.into()),
            base_url: "https://api.openai.com/v1".into(),
            headers: HashMap::new(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: 120,
        }
    }

    /// A local OpenAI-compatible server (vLLM, Ollama, llama.cpp)
    pub fn local(base_url: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Local,
            api_key: None,
            base_url: base_url.into(),
            headers: HashMap::new(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: 300,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Tracks token usage across model requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTracker {
    /// Raw model requests, one per iteration
    pub requests: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub by_model: BTreeMap<String, Usage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, model: &str, usage: &Usage) {
        self.requests += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;

        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.total_tokens += usage.total_tokens;
    }

    /// Fold a child session's usage into this one
    pub fn merge(&mut self, other: &UsageTracker) {
        self.requests += other.requests;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;

        for (model, usage) in &other.by_model {
            let entry = self.by_model.entry(model.clone()).or_default();
            entry.prompt_tokens += usage.prompt_tokens;
            entry.completion_tokens += usage.completion_tokens;
            entry.total_tokens += usage.total_tokens;
        }
    }

    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

// ============================================================================
// Tests
// ============================================================================
