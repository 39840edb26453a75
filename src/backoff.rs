//! Jittered exponential backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Lower bound of the jitter factor (-20%).
pub const MIN_JITTER: f64 = 0.8;
/// Upper bound of the jitter factor (+20%).
pub const MAX_JITTER: f64 = 1.2;

/// Source of the multiplicative jitter applied to each nominal delay.
///
/// Implementations should return a factor in `[MIN_JITTER, MAX_JITTER]`;
/// anything outside is clamped by [`Backoff`], and a non-finite factor is
/// treated as `1.0`.
pub trait Jitter: Send + Sync + fmt::Debug {
    fn factor(&self) -> f64;
}

/// Uniform jitter drawn from the thread-local generator on every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn factor(&self) -> f64 {
        rand::rng().random_range(MIN_JITTER..=MAX_JITTER)
    }
}

/// Always returns the same factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn factor(&self) -> f64 {
        self.0
    }
}

/// Computes the delay before a retried attempt.
#[derive(Clone, Debug)]
pub struct Backoff {
    cap: Duration,
    jitter: Arc<dyn Jitter>,
}

impl Backoff {
    pub fn new(cap: Duration, jitter: Arc<dyn Jitter>) -> Self {
        Self { cap, jitter }
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Returns `base × 2^attempt`, scaled by jitter and clamped to the cap.
    ///
    /// Never sleeps. Once the nominal delay can only land above the cap, the
    /// cap is returned without finishing the exponent.
    pub fn delay(&self, attempt: usize, base: Duration) -> Duration {
        let raw = self.jitter.factor();
        let factor = if raw.is_finite() {
            raw.clamp(MIN_JITTER, MAX_JITTER)
        } else {
            1.0
        };

        let nominal = u32::try_from(attempt)
            .ok()
            .and_then(|exp| 1u32.checked_shl(exp))
            .and_then(|multiplier| base.checked_mul(multiplier));
        let Some(nominal) = nominal else {
            return self.cap;
        };

        if nominal.as_secs_f64() * factor >= self.cap.as_secs_f64() {
            return self.cap;
        }
        nominal.mul_f64(factor)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Arc::new(RandomJitter))
    }
}
