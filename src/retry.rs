//! Bounded sleep-and-retry for rate-limited provider calls.
//!
//! A generation or grading call that comes back with a quota/429 signal is
//! retried once after the delay the provider advised (or a fixed default).
//! Anything else propagates immediately.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::warn;

use crate::Result;

/// Default wait when the provider gives no hint.
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 12.5;

/// Extra slack added on top of the advised delay.
const ADVISED_DELAY_PADDING_SECS: f64 = 0.5;

static RETRY_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Please retry in ([0-9.]+)s").expect("retry hint regex is valid")
});

/// Parse `Please retry in 3.2s` style hints from a provider error message.
pub fn advised_delay(message: &str) -> Option<Duration> {
    let secs: f64 = RETRY_HINT
        .captures(message)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs + ADVISED_DELAY_PADDING_SECS).ok()
}

/// How rate-limited calls are retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub default_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            default_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }
}

/// Run `call`, retrying after a sleep when it fails with a rate-limit error.
pub async fn with_rate_limit_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(crate::Error::RateLimited {
                message,
                retry_after,
            }) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = retry_after.unwrap_or(policy.default_delay);
                warn!(
                    call = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, retrying: {}",
                    message
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
