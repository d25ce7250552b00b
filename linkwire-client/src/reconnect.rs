//! Reconnection strategies
//!
//! When the socket drops, the supervisor asks its strategy two things: is
//! reconnection enabled at all, and how long to wait before the next dial.
//!
//! # Built-in Strategies
//!
//! - **ExponentialBackoff**: doubling delays with a cap, optional jitter
//! - **FixedDelay**: constant delay between attempts
//! - **Immediate**: re-dial straight away, forever
//! - **NoReconnect**: reconnection disabled; the caller reconnects manually
//!
//! # Examples
//!
//! ```rust
//! use linkwire_client::ExponentialBackoff;
//! use std::time::Duration;
//!
//! // 250ms doubling to 30s, at most 10 attempts, with jitter
//! let default = ExponentialBackoff::default();
//!
//! // 1s doubling to 60s, unlimited attempts
//! let patient = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
//! ```

use std::time::Duration;

/// Policy deciding whether and when to re-dial a dropped connection
///
/// `attempt` counts consecutive failed dials since the last successful
/// open, starting at 0. `reset()` is called every time a socket opens.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before the next dial, or `None` to give up
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Forget accumulated state after a successful open
    fn reset(&mut self);

    /// False if this strategy never reconnects
    ///
    /// A disabled policy turns `reconnect_if_needed` into a no-op.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Exponential backoff with an optional attempt limit and jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
    jitter: bool,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            max_attempts: None,
            jitter: false,
            current_attempt: 0,
        }
    }

    /// Give up after this many consecutive failed dials
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Add up to 25% random jitter to every delay
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(30))
            .with_max_attempts(10)
            .with_jitter()
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        self.current_attempt = attempt;

        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }

        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay = min_ms.saturating_mul(factor).min(max_ms);

        if self.jitter && delay >= 4 {
            use rand::Rng;
            let jitter_ms = rand::thread_rng().gen_range(0..=(delay / 4));
            return Some(Duration::from_millis(delay + jitter_ms));
        }

        Some(Duration::from_millis(delay))
    }

    fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Constant delay between dials
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Create a new fixed delay strategy
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after this many consecutive failed dials
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }

    fn reset(&mut self) {}
}

/// Re-dial immediately after every drop, without limit
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl ReconnectionStrategy for Immediate {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        Some(Duration::ZERO)
    }

    fn reset(&mut self) {}
}

/// Reconnection disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnect;

impl ReconnectionStrategy for NoReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }

    fn reset(&mut self) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(200)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_exponential_backoff_caps_at_max_delay() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(strategy.next_delay(10), Some(Duration::from_secs(1)));
        // large exponents must not overflow
        assert_eq!(strategy.next_delay(200), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_exponential_backoff_max_attempts() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
                .with_max_attempts(3);

        assert!(strategy.next_delay(0).is_some());
        assert!(strategy.next_delay(1).is_some());
        assert!(strategy.next_delay(2).is_some());
        assert!(strategy.next_delay(3).is_none());
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10));

        strategy.next_delay(5);
        assert_eq!(strategy.current_attempt, 5);

        strategy.reset();
        assert_eq!(strategy.current_attempt, 0);
    }

    #[test]
    fn test_exponential_backoff_jitter_bounds() {
        let mut strategy =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10))
                .with_jitter();

        for _ in 0..20 {
            let delay = strategy.next_delay(0).unwrap();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_fixed_delay() {
        let mut strategy = FixedDelay::new(Duration::from_secs(1)).with_max_attempts(3);

        assert_eq!(strategy.next_delay(0), Some(Duration::from_secs(1)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_secs(1)));
        assert!(strategy.next_delay(3).is_none());
    }

    #[test]
    fn test_immediate_never_gives_up() {
        let mut strategy = Immediate;
        assert_eq!(strategy.next_delay(0), Some(Duration::ZERO));
        assert_eq!(strategy.next_delay(u32::MAX), Some(Duration::ZERO));
        assert!(strategy.is_enabled());
    }

    #[test]
    fn test_no_reconnect_is_disabled() {
        let mut strategy = NoReconnect;
        assert!(!strategy.is_enabled());
        assert!(strategy.next_delay(0).is_none());
    }
}
