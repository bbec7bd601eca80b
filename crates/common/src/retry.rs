use std::time::Duration;

/// Configuration for bounded retry loops with exponential backoff
///
/// Default values are optimized for low-latency pipelines:
/// - 20 attempts with 100µs base delay
/// - Exponential backoff capped at 2ms
/// - Total worst-case wait: ~7ms
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts before the operation gives up
    pub max_attempts: u32,
    /// Initial delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap (backoff won't exceed this)
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_delay: Duration::from_micros(100),
            max_delay: Duration::from_millis(2),
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt using exponential backoff
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Retry a fallible operation with exponential backoff, logging each miss.
///
/// Used for coarse resource-connection retries (attach to a shared region,
/// open a semaphore); the hot ring paths use [`RetryConfig`] directly.
pub fn retry_with_backoff<F, T, E>(
    mut f: F,
    max_retries: u32,
    base_delay_ms: u64,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    for attempt in 0..max_retries {
        match f() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt < max_retries - 1 {
                    let delay_ms = base_delay_ms * 2_u64.pow(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                        operation_name,
                        attempt + 1,
                        max_retries,
                        e,
                        delay_ms
                    );
                    std::thread::sleep(Duration::from_millis(delay_ms));
                } else {
                    tracing::error!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        max_retries,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 20);
        assert_eq!(config.base_delay, Duration::from_micros(100));
        assert_eq!(config.max_delay, Duration::from_millis(2));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_micros(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_micros(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_micros(800));
        // 100µs * 2^5 = 3200µs, but capped at 2000µs
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(2));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(2));
        // Large attempt counts must not overflow the multiplier
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(2));
    }

    #[test]
    fn retry_returns_first_success() {
        let mut calls = 0;
        let result: Result<u32, String> = retry_with_backoff(
            || {
                calls += 1;
                if calls < 3 { Err("not yet".to_string()) } else { Ok(7) }
            },
            5,
            0,
            "test op",
        );
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<u32, String> = retry_with_backoff(
            || {
                calls += 1;
                Err("always".to_string())
            },
            4,
            0,
            "test op",
        );
        assert!(result.is_err());
        assert_eq!(calls, 4);
    }
}
