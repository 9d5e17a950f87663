//! Retry / backoff policy for plugin attempts.
//!
//! Exponential backoff with a multiplier and a randomization factor, named
//! `InitialInterval`, `Multiplier`, `RandomizationFactor`, `MaxInterval`,
//! `MaxAttempts`. Jitter is deterministic rather than drawn from a random
//! source, so the policy has no external randomness dependency and replays
//! identically in tests; a caller wanting true randomness can wrap
//! [`Policy::delay_for`]'s output.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A plugin's declared retry/backoff policy.
///
/// `RandomizationFactor` of `0.0` disables jitter; `1.0` allows the delay to
/// swing across the full `[0, 2x]` band around the unjittered value (capped
/// at `MaxInterval`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl Policy {
    /// A policy with no backoff growth and no jitter — useful in tests.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_interval: delay,
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_interval: delay,
            max_attempts: None,
        }
    }

    /// The delay to sleep before the given retry attempt (0-indexed: the
    /// delay before the *first* retry, i.e. before attempt index 1).
    ///
    /// Deterministic jitter (±`randomization_factor/2` of the unjittered
    /// delay, alternating by attempt parity) stands in for the commonly
    /// random jitter of an exponential-backoff policy, so this function has
    /// no hidden dependency on a random source and is reproducible in tests.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_interval.as_millis() as f64;
        let max_ms = self.max_interval.as_millis() as f64;
        let grown = base_ms * self.multiplier.max(0.0).powi(attempt as i32);
        let capped = grown.min(max_ms).max(0.0);

        let jittered = if self.randomization_factor > 0.0 {
            let swing = capped * self.randomization_factor.clamp(0.0, 1.0) / 2.0;
            if attempt % 2 == 0 {
                (capped + swing).min(max_ms)
            } else {
                (capped - swing).max(0.0)
            }
        } else {
            capped
        };

        Duration::from_millis(jittered.round() as u64)
    }

    /// Whether another attempt is permitted after `attempts_so_far` have
    /// already been made.
    pub fn allows_attempt(&self, attempts_so_far: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_so_far < max,
            None => true,
        }
    }
}
