use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_millis(30_000);

/// Exponential backoff: `min(base * 2^retry_count, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base: DEFAULT_BACKOFF_BASE,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following the `retry_count`-th failure.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// A job whose retry count has been incremented to `retry_count` is
    /// retried while it stays within `max_retries`.
    pub fn should_retry(retry_count: u32, max_retries: u32) -> bool {
        retry_count <= max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(30_000));
    }

    #[test]
    fn test_zero_base_never_waits() {
        let policy = RetryPolicy {
            base: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn test_should_retry_boundary() {
        assert!(RetryPolicy::should_retry(1, 3));
        assert!(RetryPolicy::should_retry(3, 3));
        assert!(!RetryPolicy::should_retry(4, 3));
        assert!(!RetryPolicy::should_retry(1, 0));
    }
}
