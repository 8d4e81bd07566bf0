//! # Backoff policy for recovery restarts.
//!
//! [`BackoffPolicy`] controls how the delay before a recovery restart grows with
//! the retry count. It is parameterized by:
//! - [`BackoffPolicy::step`] the base delay;
//! - [`BackoffPolicy::growth`] linear (`step × n`) or exponential (`step × factor^(n-1)`);
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The base delay is derived purely from the retry number, then jitter is applied.
//! Jitter output never feeds back into later calculations.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use depvisor::BackoffPolicy;
//!
//! let backoff = BackoffPolicy::linear(Duration::from_millis(10));
//!
//! assert_eq!(backoff.next(1), Duration::from_millis(10));
//! assert_eq!(backoff.next(2), Duration::from_millis(20));
//! assert_eq!(backoff.next(3), Duration::from_millis(30));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::jitter::JitterPolicy;

/// Growth curve of the base delay.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Growth {
    /// `step × n`
    Linear,
    /// `step × factor^(n-1)`
    Exponential {
        /// Multiplicative growth factor (`>= 1.0` recommended).
        factor: f64,
    },
}

/// Recovery backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Base delay (delay of the first retry).
    pub step: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Growth curve.
    pub growth: Growth,
    /// Jitter policy to prevent thundering herd.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Linear growth with `step = 1s`, `max = 60s`, no jitter.
    fn default() -> Self {
        Self::linear(Duration::from_secs(1))
    }
}

impl BackoffPolicy {
    /// Linear policy with the given step, `max = 60s`, no jitter.
    pub fn linear(step: Duration) -> Self {
        Self {
            step,
            max: Duration::from_secs(60),
            growth: Growth::Linear,
            jitter: JitterPolicy::None,
        }
    }

    /// Exponential policy with the given first delay and factor, `max = 60s`, no jitter.
    pub fn exponential(first: Duration, factor: f64) -> Self {
        Self {
            step: first,
            max: Duration::from_secs(60),
            growth: Growth::Exponential { factor },
            jitter: JitterPolicy::None,
        }
    }

    /// Returns the policy with another cap.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Returns the policy with another jitter.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay before retry number `retry` (1-based; `0` is treated as `1`).
    pub fn next(&self, retry: u32) -> Duration {
        let n = retry.max(1);
        let step_secs = self.step.as_secs_f64();
        let unclamped_secs = match self.growth {
            Growth::Linear => step_secs * f64::from(n),
            Growth::Exponential { factor } => {
                let exp = (n - 1).min(i32::MAX as u32) as i32;
                step_secs * factor.powi(exp)
            }
        };

        let base = if !unclamped_secs.is_finite()
            || unclamped_secs < 0.0
            || unclamped_secs > self.max.as_secs_f64()
        {
            self.max
        } else {
            Duration::from_secs_f64(unclamped_secs)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.step.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_grows_by_step() {
        let policy = BackoffPolicy::linear(Duration::from_millis(10));
        let delays: Vec<_> = (1..=4).map(|n| policy.next(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
                Duration::from_millis(40),
            ]
        );
    }

    #[test]
    fn test_retry_zero_behaves_like_first() {
        let policy = BackoffPolicy::linear(Duration::from_millis(10));
        assert_eq!(policy.next(0), policy.next(1));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), 2.0);
        assert_eq!(policy.next(1), Duration::from_millis(100));
        assert_eq!(policy.next(2), Duration::from_millis(200));
        assert_eq!(policy.next(4), Duration::from_millis(800));
    }

    #[test]
    fn test_clamped_to_max() {
        let policy =
            BackoffPolicy::linear(Duration::from_millis(400)).with_max(Duration::from_secs(1));
        assert_eq!(policy.next(2), Duration::from_millis(800));
        assert_eq!(policy.next(3), Duration::from_secs(1));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_overflow_clamps_to_max() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), 2.0)
            .with_max(Duration::from_secs(10));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_linear_is_non_decreasing() {
        let policy =
            BackoffPolicy::linear(Duration::from_millis(7)).with_max(Duration::from_millis(50));
        let mut prev = Duration::ZERO;
        for n in 1..20 {
            let d = policy.next(n);
            assert!(d >= prev, "retry {n}: {d:?} < {prev:?}");
            prev = d;
        }
    }

    #[test]
    fn test_equal_jitter_stays_within_half_and_base() {
        let policy = BackoffPolicy::linear(Duration::from_millis(100)).with_jitter(JitterPolicy::Equal);
        for n in 1..10 {
            let base = Duration::from_millis(100 * u64::from(n));
            let d = policy.next(n);
            assert!(d >= base / 2 && d <= base, "retry {n}: {d:?}");
        }
    }

    #[test]
    fn test_decorrelated_respects_floor_and_cap() {
        let policy = BackoffPolicy::linear(Duration::from_millis(100))
            .with_max(Duration::from_secs(2))
            .with_jitter(JitterPolicy::Decorrelated);
        for _ in 0..50 {
            let d = policy.next(5);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_secs(2));
        }
    }
}
