use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Implementations are pure: the controller owns the attempt counter and
/// asks the strategy for a delay, so the same strategy can be shared
/// across sessions and tested without timers.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay to wait before retry number `attempt` (0-indexed)
    fn delay(&self, attempt: u32) -> Duration;

    /// Maximum number of automatic retries after an unexpected close
    fn max_attempts(&self) -> u32;

    /// Check if we should continue reconnecting
    ///
    /// # Arguments
    /// * `attempt` - Number of retries already scheduled since the last open
    fn should_reconnect(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Get the delay before the next reconnection attempt
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.should_reconnect(attempt) {
            Some(self.delay(attempt))
        } else {
            None
        }
    }
}

/// Exponential backoff reconnection strategy
///
/// Delays between reconnection attempts grow exponentially:
/// base * 2^attempt, capped at ceiling
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    ceiling: Duration,
    max_attempts: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `base` - The delay before the first retry
    /// * `ceiling` - The maximum delay between retries
    /// * `max_attempts` - Retries allowed before giving up
    pub fn new(base: Duration, ceiling: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            ceiling,
            max_attempts,
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(30_000), 5)
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let ceiling_ms = self.ceiling.as_millis() as u64;
        // 2^attempt overflows past 63; anything that large is above the ceiling anyway
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor).min(ceiling_ms))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Never reconnect strategy
///
/// The first unexpected close is terminal
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }

    fn max_attempts(&self) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_product_policy() {
        let strategy = ExponentialBackoff::default();
        assert_eq!(strategy.base(), Duration::from_secs(1));
        assert_eq!(strategy.ceiling(), Duration::from_secs(30));
        assert_eq!(strategy.max_attempts(), 5);
    }

    #[test]
    fn test_huge_attempt_saturates_at_ceiling() {
        let strategy = ExponentialBackoff::new(
            Duration::from_millis(1000),
            Duration::from_millis(30_000),
            u32::MAX,
        );
        assert_eq!(strategy.delay(64), Duration::from_millis(30_000));
        assert_eq!(strategy.delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_never_reconnect() {
        assert!(!NeverReconnect.should_reconnect(0));
        assert!(NeverReconnect.next_delay(0).is_none());
    }
}
