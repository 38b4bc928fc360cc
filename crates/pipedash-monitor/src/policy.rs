//! Reconnect policy for live channels

use pipedash_core::Settings;
use std::time::Duration;

/// Linear backoff with a hard attempt cap: attempt `n` (1-based) waits
/// `base * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.reconnect_base(), settings.stream.max_reconnect_attempts)
    }

    /// Delay before attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt)
    }

    /// Whether another attempt is allowed after `made` attempts
    pub fn allows(&self, made: u32) -> bool {
        made < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_with_attempt() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(6));
    }

    #[test]
    fn test_attempt_cap() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));

        let never = ReconnectPolicy::new(Duration::from_millis(10), 0);
        assert!(!never.allows(0));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.stream.reconnect_base_ms = 250;
        settings.stream.max_reconnect_attempts = 5;
        let policy = ReconnectPolicy::from_settings(&settings);
        assert_eq!(policy.delay_for(4), Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 5);
    }
}
