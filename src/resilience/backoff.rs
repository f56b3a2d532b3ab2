//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped at `max`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponential_base = 2u64.saturating_pow(attempt);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    Duration::from_millis(delay_ms.min(max_ms))
}

/// [`calculate_backoff`] plus up to 10% random jitter.
pub fn calculate_backoff_with_jitter(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let capped_delay = calculate_backoff(attempt, base_ms, max_ms).as_millis() as u64;

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::from_millis(100));
        assert_eq!(calculate_backoff(1, 100, 2000), Duration::from_millis(200));
        assert_eq!(calculate_backoff(3, 100, 2000), Duration::from_millis(800));
        assert_eq!(calculate_backoff(10, 100, 1000), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(calculate_backoff(200, u64::MAX / 2, 5000), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_bounded() {
        for _ in 0..100 {
            let d = calculate_backoff_with_jitter(2, 100, 2000).as_millis();
            assert!((400..440).contains(&d));
        }
    }
}
