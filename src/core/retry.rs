//! Retry-with-backoff and timeout decorators for fallible network operations.
//!
//! [`with_retry`] re-runs an operation whose failure was classified as
//! retryable (throttling, HTTP 429/5xx, transport resets), waiting an
//! exponentially growing, optionally jittered delay between attempts.
//! [`with_timeout`] races an operation against a hard deadline; on expiry
//! the operation future is dropped, which tears down any duplex connection
//! it owns.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::speech::{SpeechError, SpeechResult};

/// Configuration for retry behavior around a speech exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Enable retries. When false, every operation gets exactly one attempt.
    /// Default: true
    pub enabled: bool,

    /// Total attempt budget (first attempt included).
    /// Default: 3
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds).
    /// Default: 200ms
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay (milliseconds).
    /// Default: 30000ms
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    /// Default: 2.0
    pub backoff_multiplier: f32,

    /// Whether to add jitter to the delay to prevent thundering herd.
    /// Default: true
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with retries disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Delay for a given (1-based) attempt number: `initial * multiplier^(attempt-1)`
    /// capped at `max_delay_ms`, with up to ±25% jitter when enabled.
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.initial_delay_ms as f64;
        let multiplier = self.backoff_multiplier as f64;

        let delay = base * multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = delay.min(self.max_delay_ms as f64);

        if self.jitter {
            let jitter_range = delay * 0.25;
            (delay + rand_jitter(jitter_range)).max(0.0) as u64
        } else {
            delay as u64
        }
    }

    /// Whether another attempt is allowed after `completed` attempts.
    pub fn should_retry(&self, completed: u32) -> bool {
        self.enabled && completed < self.max_attempts
    }
}

/// Generate a pseudo-random jitter value using a simple LCG.
/// This avoids pulling in the rand crate for a simple use case.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = ((seed.wrapping_mul(1103515245).wrapping_add(12345)) % (1 << 31)) as f64;
    let normalized = random / (1u64 << 31) as f64;
    (normalized - 0.5) * 2.0 * range
}

/// Run `op`, retrying retryable failures with exponential backoff.
///
/// Non-retryable errors (configuration, protocol, timeout, access) are
/// propagated unchanged after the first failure. The classification lives
/// on [`SpeechError::is_retryable`].
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> SpeechResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SpeechResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && config.should_retry(attempt) => {
                let delay = config.calculate_delay(attempt);
                warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay,
                    error = %err,
                    "retryable speech operation failure, backing off"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Race `fut` against a deadline.
///
/// On expiry the future is dropped and [`SpeechError::Timeout`] is
/// returned. Because a speech exchange owns its duplex connection for the
/// lifetime of the future, timing out also closes the connection. Timeouts
/// are never classified retryable; the caller decides whether to re-run the
/// whole operation.
pub async fn with_timeout<T, Fut>(deadline: Duration, fut: Fut) -> SpeechResult<T>
where
    Fut: Future<Output = SpeechResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(SpeechError::Timeout(deadline.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter(initial_delay_ms: u64, max_attempts: u32) -> RetryConfig {
        RetryConfig {
            enabled: true,
            max_attempts,
            initial_delay_ms,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_calculate_delay_no_jitter() {
        let config = no_jitter(1000, 5);
        assert_eq!(config.calculate_delay(1), 1000);
        assert_eq!(config.calculate_delay(2), 2000);
        assert_eq!(config.calculate_delay(3), 4000);
        assert_eq!(config.calculate_delay(6), 30_000);
    }

    #[test]
    fn test_calculate_delay_with_jitter() {
        let config = RetryConfig {
            initial_delay_ms: 1000,
            jitter: true,
            ..Default::default()
        };
        let delay = config.calculate_delay(1);
        assert!((750..=1250).contains(&delay), "delay {delay} outside 750-1250");
    }

    #[test]
    fn test_should_retry_budget() {
        let config = no_jitter(100, 3);
        assert!(config.should_retry(1));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));
        assert!(!RetryConfig::disabled().should_retry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = no_jitter(50, 3);

        let start = tokio::time::Instant::now();
        let counter = attempts.clone();
        let result = with_retry(&config, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(SpeechError::Transport("throttling: rate exceeded".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Two backoff sleeps: 50ms then 100ms.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_non_retryable_attempts_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = no_jitter(50, 3);

        let counter = attempts.clone();
        let result: SpeechResult<()> = with_retry(&config, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SpeechError::Configuration("missing region".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(SpeechError::Configuration(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = no_jitter(10, 3);

        let counter = attempts.clone();
        let result: SpeechResult<()> = with_retry(&config, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SpeechError::Transport("HTTP 503 service unavailable".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(SpeechError::Transport(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expiry() {
        let result: SpeechResult<()> = with_timeout(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SpeechError::Timeout(100))));
    }

    #[tokio::test]
    async fn test_timeout_passthrough() {
        let result = with_timeout(Duration::from_secs(5), async { Ok(42u32) }).await;
        assert_eq!(result.unwrap(), 42);

        // Timeouts are not retried by the retry wrapper.
        assert!(!SpeechError::Timeout(100).is_retryable());
    }
}
