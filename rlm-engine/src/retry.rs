//! Automatic retry with exponential backoff and jitter.
//!
//! Retries model calls whose error is retryable (`RateLimited`, temporary
//! `ModelUnavailable`). Permanent failures such as a 401 or a malformed
//! payload fail immediately.

use crate::config::duration_secs;
use rlm_error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to shorten delays by a deterministic jitter factor.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);

        if self.jitter {
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Run `call`, retrying retryable errors as `config` allows.
///
/// Without a config the first error is returned as-is. With one, the error
/// that ends the loop is marked persistent.
pub async fn with_retry<T, F, Fut>(config: Option<&RetryConfig>, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(config) = config else {
        return call().await;
    };

    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient model error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err.persist()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlm_error::{Error, ErrorKind, ErrorStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(retries: u32) -> RetryConfig {
        RetryConfig::with_retries(retries).with_initial_delay(Duration::from_millis(1))
    }

    #[test]
    fn default_config_no_retries() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn jitter_reduces_delay() {
        let jittered = RetryConfig::with_retries(3);
        let plain = RetryConfig {
            jitter: false,
            ..jittered.clone()
        };
        assert!(jittered.delay_for_attempt(2) < plain.delay_for_attempt(2));
    }

    #[test]
    fn serde_uses_seconds() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_retries": 2, "initial_delay": 0.25}"#).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(8));
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let out = with_retry(Some(&fast(3)), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::rate_limited("HTTP 429"))
            } else {
                Ok("done")
            }
        })
        .await
        .unwrap();
        assert_eq!(out, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_and_persists() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let err = with_retry(Some(&fast(2)), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::model_unavailable("HTTP 503"))
        })
        .await
        .unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(err.status(), ErrorStatus::Persistent);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn permanent_errors_fail_fast() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let err = with_retry(Some(&fast(5)), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::model_unavailable("HTTP 401").permanent())
        })
        .await
        .unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn no_config_means_one_attempt() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let err = with_retry(None, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::rate_limited("HTTP 429"))
        })
        .await
        .unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(err.is_retryable());
    }
}
