use std::time::Duration;

use crate::config::Config;

/// Bounded exponential backoff for email jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.email_job_attempts.max(1),
            base_delay: Duration::from_millis(config.email_job_backoff_ms),
        }
    }

    /// Delay before the next attempt after `attempt` (1-indexed) failed: `base * 2^(attempt - 1)`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5000),
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = policy();
        assert_eq!(policy.next_delay(1), Duration::from_secs(5));
        assert_eq!(policy.next_delay(2), Duration::from_secs(10));
        assert_eq!(policy.next_delay(3), Duration::from_secs(20));
        assert_eq!(policy.next_delay(0), Duration::from_secs(5));
    }

    #[test]
    fn backoff_saturates() {
        assert_eq!(policy().next_delay(40), Duration::from_millis(5000 * 65_536));
    }

    #[test]
    fn at_least_one_attempt() {
        let mut config = Config::with_defaults("postgres://localhost/laptops", "redis://127.0.0.1/", "secret");
        config.email_job_attempts = 0;
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }

    #[test]
    fn config_defaults() {
        let config = Config::with_defaults("postgres://localhost/laptops", "redis://127.0.0.1/", "secret");
        assert_eq!(RetryPolicy::from_config(&config), policy());
    }
}
