use std::time::Duration;

pub fn exponential_jitter_backoff(
    base: Duration,
    attempt: u32,
    max: Duration,
    jitter_frac: f32,
) -> Duration {
    let capped_attempt = attempt.min(8);
    let factor = 1u32.checked_shl(capped_attempt).unwrap_or(1 << 8);
    let raw = base.saturating_mul(factor);
    let capped = raw.min(max);
    let nanos = capped.as_nanos() as i128;
    let jitter = ((nanos as f64) * (jitter_frac.clamp(0.0, 1.0) as f64)).round() as i128;
    let delta = if jitter > 0 {
        fastrand::i128(-jitter..=jitter)
    } else {
        0
    };
    let result = (nanos + delta).clamp(0, u64::MAX as i128);
    Duration::from_nanos(result as u64)
}

/// Bounded retry budget for a single page request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub jitter_frac: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_millis(500),
            max: Duration::from_millis(60_000),
            jitter_frac: 0.2,
        }
    }
}

impl RetryPolicy {
    /// `failures` counts completed failed attempts, starting at 1.
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts.max(1)
    }

    pub fn delay(&self, failures: u32) -> Duration {
        exponential_jitter_backoff(
            self.base,
            failures.saturating_sub(1),
            self.max,
            self.jitter_frac,
        )
    }
}
