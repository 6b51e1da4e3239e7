//! # RLM Engine
//!
//! Answers a query about an arbitrarily large context without ever putting
//! the context in the model's prompt.
//!
//! ## Core Concepts
//! - **Session**: One reasoning process with its own transcript and
//!   sandbox. The context lives in the sandbox as `context`
//! - **Iteration**: The model writes a code fragment, the engine executes
//!   it and reports the output back
//! - **Recursion**: Fragments call `recursive_lm(query, context_subset)`
//!   to run a child session on part of the context
//! - **Termination**: `FINAL(answer)` or `FINAL_VAR(name)` ends a session
//!
//! ## Example
//! ```no_run
//! use rlm_engine::{Engine, EngineConfig, OpenAIClient, ProviderConfig};
//!
//! # async fn run() -> rlm_error::Result<()> {
//! let client = OpenAIClient::new(ProviderConfig::openrouter("sk-or-..."))?;
//! let engine = Engine::new(client, EngineConfig::default())?;
//! let completion = engine.complete("How many ERROR lines?", "INFO ok\nERROR disk").await?;
//! println!("{}", completion.answer);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod prompt;
pub mod protocol;
pub mod provider;
pub mod result;
pub mod retry;
pub mod session;

pub use config::EngineConfig;
pub use context::{Context, ContextMetadata};
pub use engine::Engine;
pub use protocol::{code_blocks, detect, Detection};
pub use provider::{
    ChatMessage, Generation, ModelClient, OpenAIClient, ProviderConfig, ProviderType, Role,
    ScriptedClient, Usage, UsageTracker,
};
pub use result::{Completion, ExecutionRecord, Termination};
pub use retry::RetryConfig;
pub use session::Session;

pub use rlm_error::{Error, ErrorKind, ErrorStatus, Result};
pub use tokio_util::sync::CancellationToken;
