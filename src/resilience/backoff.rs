//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Calculate the delay to wait after a failed `attempt` (1-based).
///
/// `initial_ms × multiplier^(attempt − 1)`, capped at `max_ms`.
pub fn calculate_backoff(attempt: u32, initial_ms: u64, multiplier: f64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let delay_ms = initial_ms as f64 * multiplier.powi(exponent);
    let capped_delay = if delay_ms.is_finite() {
        delay_ms.min(max_ms as f64) as u64
    } else {
        max_ms
    };

    Duration::from_millis(capped_delay)
}

/// Add up to `ratio × delay` of random jitter.
pub fn apply_jitter(delay: Duration, ratio: f64) -> Duration {
    let jitter_range = (delay.as_millis() as f64 * ratio) as u64;
    if jitter_range == 0 {
        return delay;
    }

    let jitter = rand::thread_rng().gen_range(0..jitter_range);
    delay + Duration::from_millis(jitter)
}
