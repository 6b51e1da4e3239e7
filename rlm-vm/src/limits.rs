//! Resource bounds for a single fragment

use rhai::Engine;
use std::time::Duration;

/// Default wall-clock budget per fragment
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default script function call depth
pub const DEFAULT_MAX_CALL_LEVELS: usize = 64;

/// Default operation budget, 0 for none
pub const DEFAULT_MAX_OPERATIONS: u64 = 0;

/// Default cap on captured stdout, in bytes
pub const DEFAULT_MAX_STDOUT: usize = 1024 * 1024;

/// Largest string a fragment may build, in bytes
pub const MAX_STRING_SIZE: usize = 64 * 1024 * 1024;

/// Largest array or object map a fragment may build
pub const MAX_COLLECTION_SIZE: usize = 10_000_000;

/// Operations between wall-clock checks
pub const TIME_CHECK_INTERVAL: u64 = 256;

/// Per-fragment execution limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Wall-clock budget, excluding time suspended in recursive calls
    pub timeout: Duration,
    pub max_call_levels: usize,
    pub max_operations: u64,
    pub max_stdout_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_call_levels: DEFAULT_MAX_CALL_LEVELS,
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_stdout_bytes: DEFAULT_MAX_STDOUT,
        }
    }
}

impl Limits {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_call_levels(mut self, levels: usize) -> Self {
        self.max_call_levels = levels;
        self
    }

    pub fn with_max_operations(mut self, operations: u64) -> Self {
        self.max_operations = operations;
        self
    }

    pub fn with_max_stdout_bytes(mut self, bytes: usize) -> Self {
        self.max_stdout_bytes = bytes;
        self
    }

    pub(crate) fn apply(&self, engine: &mut Engine) {
        engine.set_max_call_levels(self.max_call_levels);
        engine.set_max_operations(self.max_operations);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_COLLECTION_SIZE);
        engine.set_max_map_size(MAX_COLLECTION_SIZE);
    }
}
