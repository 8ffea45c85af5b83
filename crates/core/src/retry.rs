//! Error classification and exponential-backoff retry.
//!
//! Remote extraction calls fail in recognizably different ways: a saturated
//! target answers with rate-limit errors, a flaky network drops connections,
//! and a bad credential will never succeed no matter how often we try.
//! [`classify`] sorts an error message into an [`ErrorClass`], and
//! [`with_retry`] re-runs a task with clamped exponential backoff until it
//! succeeds, exhausts its budget, or hits a permanent error.
//!
//! Classification is substring matching over the error message. It is a
//! replaceable heuristic, not a contract: callers must only depend on the
//! resulting [`ErrorClass`], never on which substring produced it.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::CoreError;

/// Minimum wait after a rate-limit error, regardless of computed backoff.
pub const RATE_LIMIT_FLOOR: Duration = Duration::from_secs(5);

/// Up to this fraction of the computed delay is added as random jitter.
const JITTER_FRACTION: f64 = 0.25;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Failure category of a task error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Unrecognized failure, assumed recoverable.
    Transient,
    /// Validation/auth/not-found failure that retrying cannot fix.
    Permanent,
    /// The remote side asked us to slow down.
    RateLimit,
    /// The call exceeded a deadline.
    Timeout,
    /// Connectivity-level failure (DNS, refused, reset).
    Network,
}

impl ErrorClass {
    /// Stable lowercase name, used in logs and session breadcrumbs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Network => "network",
        }
    }
}

/// Classify an error message into an [`ErrorClass`].
///
/// Matching is case-insensitive. The rate-limit check runs first so that
/// messages like "connection rejected: too many requests" land in
/// [`ErrorClass::RateLimit`] rather than [`ErrorClass::Network`].
pub fn classify(message: &str) -> ErrorClass {
    let msg = message.to_lowercase();

    const RATE_LIMIT: &[&str] = &["rate limit", "too many requests", "429"];
    const TIMEOUT: &[&str] = &["timeout", "timed out", "deadline exceeded"];
    const NETWORK: &[&str] = &[
        "network",
        "connection refused",
        "connection reset",
        "connection closed",
        "dns",
        "socket",
        "unreachable",
    ];
    const PERMANENT: &[&str] = &[
        "unauthorized",
        "forbidden",
        "not found",
        "invalid",
        "validation",
        "bad request",
        "401",
        "403",
        "404",
    ];

    let contains_any = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

    if contains_any(RATE_LIMIT) {
        ErrorClass::RateLimit
    } else if contains_any(TIMEOUT) {
        ErrorClass::Timeout
    } else if contains_any(NETWORK) {
        ErrorClass::Network
    } else if contains_any(PERMANENT) {
        ErrorClass::Permanent
    } else {
        ErrorClass::Transient
    }
}

/// A failed task attempt, carrying the message and its classification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
    pub class: ErrorClass,
}

impl TaskError {
    /// Build an error, classifying it from the message.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let class = classify(&message);
        Self { message, class }
    }

    /// Build an error with an explicit class, bypassing classification.
    pub fn with_class(message: impl Into<String>, class: ErrorClass) -> Self {
        Self {
            message: message.into(),
            class,
        }
    }

    /// Everything except [`ErrorClass::Permanent`] is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.class != ErrorClass::Permanent
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Tunable parameters for the retry strategy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (total attempts = this + 1).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryPreset::Standard.config()
    }
}

/// Named retry profiles, chosen per task criticality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPreset {
    /// Few quick retries, for cheap or latency-sensitive calls.
    Fast,
    /// The default profile.
    Standard,
    /// Long waits for slow targets that usually recover.
    Patient,
    /// Many attempts with a gentler growth curve.
    Aggressive,
}

impl RetryPreset {
    pub fn config(self) -> RetryConfig {
        match self {
            RetryPreset::Fast => RetryConfig {
                max_retries: 2,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                multiplier: 2.0,
            },
            RetryPreset::Standard => RetryConfig {
                max_retries: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
            },
            RetryPreset::Patient => RetryConfig {
                max_retries: 5,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(120),
                multiplier: 2.0,
            },
            RetryPreset::Aggressive => RetryConfig {
                max_retries: 8,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
                multiplier: 1.5,
            },
        }
    }
}

impl FromStr for RetryPreset {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(RetryPreset::Fast),
            "standard" => Ok(RetryPreset::Standard),
            "patient" => Ok(RetryPreset::Patient),
            "aggressive" => Ok(RetryPreset::Aggressive),
            other => Err(CoreError::Validation(format!(
                "Unknown retry preset: \"{other}\""
            ))),
        }
    }
}

/// Deterministic backoff for a 1-based retry attempt number.
///
/// `base * multiplier^(attempt-1)`, clamped to [`RetryConfig::max_delay`].
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.multiplier.powi(attempt.saturating_sub(1) as i32);
    let ms = (config.base_delay.as_millis() as f64 * exp) as u64;
    Duration::from_millis(ms).min(config.max_delay)
}

/// Backoff plus jitter, with the rate-limit floor applied.
fn retry_delay(config: &RetryConfig, attempt: u32, class: ErrorClass) -> Duration {
    use rand::Rng;

    let base = backoff_delay(config, attempt);
    let delay = base.mul_f64(1.0 + rand::rng().random_range(0.0..JITTER_FRACTION));
    if class == ErrorClass::RateLimit {
        delay.max(RATE_LIMIT_FLOOR)
    } else {
        delay
    }
}

// ---------------------------------------------------------------------------
// with_retry
// ---------------------------------------------------------------------------

/// Outcome of a retried task. Never an Err at the call site: the caller
/// inspects `result`, `attempts`, and `total_duration`.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, TaskError>,
    /// Number of attempts actually made (1-based).
    pub attempts: u32,
    /// Wall-clock time across all attempts and waits.
    pub total_duration: Duration,
}

impl<T> RetryOutcome<T> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run `task` up to `max_retries + 1` times with backoff between failures.
///
/// `task` receives the 1-based attempt number. `on_retry` runs after each
/// retryable failure and before the backoff sleep; use it to persist a
/// breadcrumb of the failed attempt. A [`ErrorClass::Permanent`] failure
/// stops immediately.
pub async fn with_retry<T, F, Fut, H, HFut>(
    config: &RetryConfig,
    mut task: F,
    mut on_retry: H,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
    H: FnMut(u32, TaskError) -> HFut,
    HFut: Future<Output = ()>,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match task(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    total_duration: started.elapsed(),
                };
            }
            Err(e) => {
                if !e.is_retryable() || attempt > config.max_retries {
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                        total_duration: started.elapsed(),
                    };
                }

                let delay = retry_delay(config, attempt, e.class);
                tracing::debug!(
                    attempt,
                    class = e.class.as_str(),
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Task attempt failed, backing off",
                );

                on_retry(attempt, e).await;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- classify -------------------------------------------------------------

    #[test]
    fn classify_rate_limit() {
        assert_eq!(classify("429 Too Many Requests"), ErrorClass::RateLimit);
        assert_eq!(classify("rate limit exceeded"), ErrorClass::RateLimit);
    }

    #[test]
    fn classify_timeout() {
        assert_eq!(classify("navigation timed out"), ErrorClass::Timeout);
        assert_eq!(classify("deadline exceeded"), ErrorClass::Timeout);
    }

    #[test]
    fn classify_network() {
        assert_eq!(classify("connection refused"), ErrorClass::Network);
        assert_eq!(classify("DNS lookup failed"), ErrorClass::Network);
    }

    #[test]
    fn classify_permanent() {
        assert_eq!(classify("401 Unauthorized"), ErrorClass::Permanent);
        assert_eq!(classify("invalid selector"), ErrorClass::Permanent);
        assert_eq!(classify("page not found"), ErrorClass::Permanent);
    }

    #[test]
    fn classify_unknown_is_transient() {
        assert_eq!(classify("something odd happened"), ErrorClass::Transient);
    }

    #[test]
    fn rate_limit_wins_over_network() {
        assert_eq!(
            classify("connection rejected: too many requests"),
            ErrorClass::RateLimit
        );
    }

    #[test]
    fn permanent_is_not_retryable() {
        assert!(!TaskError::new("403 Forbidden").is_retryable());
        assert!(TaskError::new("connection reset").is_retryable());
    }

    // -- backoff_delay --------------------------------------------------------

    #[test]
    fn backoff_doubles_per_attempt() {
        let config = RetryPreset::Standard.config();
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_clamps_at_max() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        };
        assert_eq!(backoff_delay(&config, 6), Duration::from_secs(8));
    }

    #[test]
    fn rate_limit_floor_applies() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        };
        let d = retry_delay(&config, 1, ErrorClass::RateLimit);
        assert!(d >= RATE_LIMIT_FLOOR);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let config = RetryPreset::Standard.config();
        for attempt in 1..=3 {
            let base = backoff_delay(&config, attempt);
            let d = retry_delay(&config, attempt, ErrorClass::Transient);
            assert!(d >= base);
            assert!(d <= base.mul_f64(1.0 + JITTER_FRACTION));
        }
    }

    // -- presets --------------------------------------------------------------

    #[test]
    fn preset_from_str_round_trip() {
        assert_eq!(
            "patient".parse::<RetryPreset>().unwrap(),
            RetryPreset::Patient
        );
        assert!("frantic".parse::<RetryPreset>().is_err());
    }

    // -- with_retry -----------------------------------------------------------

    fn quick_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn permanent_error_attempts_exactly_once() {
        let config = quick_config(5);
        let outcome: RetryOutcome<()> = with_retry(
            &config,
            |_| async { Err(TaskError::new("401 Unauthorized")) },
            |_, _| async {},
        )
        .await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn transient_twice_then_success() {
        let config = quick_config(5);
        let outcome = with_retry(
            &config,
            |attempt| async move {
                if attempt <= 2 {
                    Err(TaskError::new("connection reset"))
                } else {
                    Ok(attempt)
                }
            },
            |_, _| async {},
        )
        .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        // Must have slept at least the two deterministic backoff delays.
        let floor = backoff_delay(&config, 1) + backoff_delay(&config, 2);
        assert!(outcome.total_duration >= floor);
    }

    #[tokio::test]
    async fn retries_exhausted_returns_last_error() {
        let config = quick_config(2);
        let outcome: RetryOutcome<()> = with_retry(
            &config,
            |attempt| async move { Err(TaskError::new(format!("flaky network ({attempt})"))) },
            |_, _| async {},
        )
        .await;

        assert!(!outcome.succeeded());
        // max_retries + 1 total attempts.
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap_err().class, ErrorClass::Network);
    }

    #[tokio::test]
    async fn on_retry_fires_before_each_wait() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let config = quick_config(5);
        let hooks = Arc::new(AtomicU32::new(0));
        let hooks_in_task = Arc::clone(&hooks);

        let outcome = with_retry(
            &config,
            |attempt| async move {
                if attempt <= 2 {
                    Err(TaskError::new("connection reset"))
                } else {
                    Ok(())
                }
            },
            move |_, _| {
                let hooks = Arc::clone(&hooks_in_task);
                async move {
                    hooks.fetch_add(1, Ordering::SeqCst);
                }
            },
        )
        .await;

        assert!(outcome.succeeded());
        // One hook invocation per backoff wait.
        assert_eq!(hooks.load(Ordering::SeqCst), 2);
    }
}
