//! # Engine Configuration
//!
//! One immutable value shared by every session of a run, root and
//! recursive alike.

use crate::retry::RetryConfig;
use rlm_error::{Error, ErrorKind, Result};
use rlm_vm::Limits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ROOT_MODEL: &str = "openai/gpt-4o";
pub const DEFAULT_RECURSIVE_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1;
pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 4000;
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Smallest useful tool-result budget
pub const MIN_OUTPUT_CHARS: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model for the session at depth 0
    pub root_model: String,
    /// Model for every session spawned by `recursive_lm`
    pub recursive_model: String,
    pub max_iterations: usize,
    pub max_recursion_depth: usize,
    /// Emit per-iteration events at `info` instead of `debug`
    pub verbose: bool,
    /// Wall-clock budget per fragment, in seconds
    #[serde(with = "duration_secs")]
    pub fragment_timeout: Duration,
    /// Tool-result turns longer than this are truncated
    pub max_output_chars: usize,
    /// Context preview length in the system prompt
    pub preview_chars: usize,
    pub retry: Option<RetryConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_model: DEFAULT_ROOT_MODEL.to_string(),
            recursive_model: DEFAULT_RECURSIVE_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            verbose: false,
            fragment_timeout: DEFAULT_FRAGMENT_TIMEOUT,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            retry: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("config::load")
                .with_context("path", path.display().to_string())
        })?;
        serde_json::from_str(&text).map_err(|e| {
            Error::new(ErrorKind::SerializationFailed, format!("invalid config file: {}", e))
                .with_operation("config::load")
                .with_context("path", path.display().to_string())
                .set_source(e)
        })
    }

    pub fn with_root_model(mut self, model: impl Into<String>) -> Self {
        self.root_model = model.into();
        self
    }

    pub fn with_recursive_model(mut self, model: impl Into<String>) -> Self {
        self.recursive_model = model.into();
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::config_invalid("max_iterations", "max_iterations must be at least 1"));
        }
        if self.root_model.trim().is_empty() {
            return Err(Error::config_invalid("root_model", "root_model must not be empty"));
        }
        if self.recursive_model.trim().is_empty() {
            return Err(Error::config_invalid("recursive_model", "recursive_model must not be empty"));
        }
        if self.max_output_chars < MIN_OUTPUT_CHARS {
            return Err(Error::config_invalid(
                "max_output_chars",
                format!("max_output_chars must be at least {}", MIN_OUTPUT_CHARS),
            ));
        }
        if self.fragment_timeout.is_zero() {
            return Err(Error::config_invalid("fragment_timeout", "fragment_timeout must be positive"));
        }
        Ok(())
    }

    /// Root model at depth 0, recursive model below
    pub fn model_for_depth(&self, depth: usize) -> &str {
        if depth == 0 {
            &self.root_model
        } else {
            &self.recursive_model
        }
    }

    /// Sandbox limits for every fragment
    pub fn limits(&self) -> Limits {
        Limits::default().with_timeout(self.fragment_timeout)
    }
}

/// Serde helper: `Duration` as fractional seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
