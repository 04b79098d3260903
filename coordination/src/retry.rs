//! Retry policy for transient backend failures.
//!
//! Exponential backoff with additive random jitter:
//!
//! ```text
//! delay(n) = min(base * multiplier^(n-1), max) + U(0, jitter * that)
//! ```
//!
//! where `n` is the 1-indexed retry number. A server `Retry-After` hint
//! raises the computed delay but never beyond `max_delay_ms`.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call (0 = no retries).
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff multiplier (2.0 doubles each time).
    pub multiplier: f64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter as a fraction of the computed delay (0.0 disables jitter).
    pub jitter: f64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Deterministic backoff for the given retry number (1-indexed), without jitter.
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        if retry == 0 {
            return 0;
        }
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(retry as i32 - 1);
        if !delay.is_finite() {
            return self.max_delay_ms;
        }
        (delay as u64).min(self.max_delay_ms)
    }

    /// Full delay for a retry: backoff, raised to `retry_after` if larger, plus jitter.
    pub fn delay<R: Rng + ?Sized>(
        &self,
        retry: u32,
        retry_after: Option<Duration>,
        rng: &mut R,
    ) -> Duration {
        let mut ms = self.backoff_ms(retry);
        if let Some(hint) = retry_after {
            ms = ms.max(hint.as_millis() as u64).min(self.max_delay_ms);
        }
        let spread = (ms as f64 * self.jitter.clamp(0.0, 1.0)) as u64;
        if spread > 0 {
            ms += rng.gen_range(0..=spread);
        }
        Duration::from_millis(ms)
    }

    /// Whether another retry is allowed after `retries_done` retries.
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Total number of calls this policy permits.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    /// Default: 5 retries, 1s base, 2x multiplier, 30s cap, 25% jitter.
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter: 0.25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = no_jitter();
        assert_eq!(policy.backoff_ms(0), 0);
        assert_eq!(policy.backoff_ms(1), 1_000);
        assert_eq!(policy.backoff_ms(2), 2_000);
        assert_eq!(policy.backoff_ms(3), 4_000);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            base_delay_ms: 1_000,
            multiplier: 3.0,
            max_delay_ms: 5_000,
            ..no_jitter()
        };
        assert_eq!(policy.backoff_ms(2), 3_000);
        assert_eq!(policy.backoff_ms(3), 5_000);
        assert_eq!(policy.backoff_ms(40), 5_000);
    }

    #[test]
    fn test_jitter_stays_within_fraction() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let d = policy.delay(2, None, &mut rng).as_millis() as u64;
            assert!((2_000..=3_000).contains(&d), "delay {d} out of range");
        }
    }

    #[test]
    fn test_retry_after_raises_but_is_capped() {
        let policy = no_jitter();
        let mut rng = StdRng::seed_from_u64(1);
        let d = policy.delay(1, Some(Duration::from_secs(10)), &mut rng);
        assert_eq!(d, Duration::from_secs(10));
        let d = policy.delay(1, Some(Duration::from_secs(600)), &mut rng);
        assert_eq!(d, Duration::from_millis(policy.max_delay_ms));
        let d = policy.delay(3, Some(Duration::from_millis(10)), &mut rng);
        assert_eq!(d, Duration::from_millis(4_000));
    }

    #[test]
    fn test_should_retry_bound() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert_eq!(policy.max_attempts(), 3);
        assert!(!RetryPolicy::none().should_retry(0));
    }

    #[test]
    fn test_policy_from_partial_toml() {
        let policy: RetryPolicy = toml::from_str("max_retries = 3\nbase_delay_ms = 250").unwrap();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_ms, 250);
        assert_eq!(policy.max_delay_ms, 30_000);
    }
}
