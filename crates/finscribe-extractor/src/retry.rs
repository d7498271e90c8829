//! Retry policy with exponential backoff

use std::time::Duration;

/// How often, and how patiently, a failed batch call is repeated.
///
/// The first attempt is always made; `max_retries` further attempts follow on
/// transient failure. The delay before retry `n` (1-based) is
/// `initial_delay * 2^(n-1)`.
///
/// # Examples
///
/// ```
/// use finscribe_extractor::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(2));
/// assert_eq!(policy.max_attempts(), 4);
/// assert_eq!(policy.delay_before_retry(1), Duration::from_secs(2));
/// assert_eq!(policy.delay_before_retry(3), Duration::from_secs(8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// Total number of calls a batch may receive
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::new(5, Duration::from_millis(250));
        let delays: Vec<_> = (1..=4).map(|n| policy.delay_before_retry(n)).collect();
        assert_eq!(
            delays,
            [250, 500, 1000, 2000].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_large_retry_numbers_saturate() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), u32::MAX);
        assert!(policy.delay_before_retry(200) >= policy.delay_before_retry(31));
    }
}
