use rand::distr::{Distribution, Uniform};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::ScrapeResult;

/// Retry-with-backoff shared by browser launch, navigation, detail extraction
/// and image downloads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay added as random jitter (0.0 disables it).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt following `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32, multiplier: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_delay.saturating_mul(1u32 << exponent);
        exponential
            .min(self.max_delay)
            .saturating_mul(multiplier.max(1))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = uniform(0.0, delay.as_secs_f64() * self.jitter);
        delay + Duration::from_secs_f64(extra)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> ScrapeResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ScrapeResult<T>>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.jittered(self.delay_for(attempt, e.backoff_multiplier()));
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(operation = label, attempt, error = %e, "Giving up");
                    return Err(e);
                }
            }
        }
    }
}

/// Sample uniformly from `[lo, hi)`, falling back to `lo` for an empty range.
pub(crate) fn uniform(lo: f64, hi: f64) -> f64 {
    if lo.is_nan() || hi.is_nan() || hi <= lo {
        return lo.max(0.0);
    }
    match Uniform::new(lo, hi) {
        Ok(dist) => {
            let mut rng = rand::rng();
            dist.sample(&mut rng)
        }
        Err(_) => lo,
    }
}

/// Random pause between requests to stay under the target's rate defenses.
pub async fn random_pause(min_secs: f64, max_secs: f64) {
    let secs = uniform(min_secs.max(0.0), max_secs.max(0.0));
    if secs > 0.0 {
        debug!("Random delay: {:.2} seconds", secs);
        sleep(Duration::from_secs_f64(secs)).await;
    }
}
