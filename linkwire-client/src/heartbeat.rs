//! Heartbeat supervision
//!
//! One countdown per connection:
//!
//! ```text
//! start() -> Scheduled(now + interval) --elapsed--> send ping
//!         -> AwaitingPong(now + pong_timeout) --pong--> Scheduled(...)
//!                                             --elapsed--> failure
//! ```
//!
//! A failure stops the heartbeat. It only restarts on the next successful
//! open, never by itself.

use std::future::pending;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// What the heartbeat wants the supervisor to do when its deadline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatDue {
    /// Time to send the next ping
    Ping,
    /// The last ping was never acknowledged
    PongOverdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Scheduled(Instant),
    AwaitingPong(Instant),
}

pub(crate) struct Heartbeat {
    interval: Duration,
    pong_timeout: Duration,
    phase: Phase,
}

impl Heartbeat {
    pub(crate) fn new(interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            interval,
            pong_timeout,
            phase: Phase::Idle,
        }
    }

    /// Arm the first ping of a fresh connection
    pub(crate) fn start(&mut self) {
        self.phase = Phase::Scheduled(Instant::now() + self.interval);
    }

    pub(crate) fn stop(&mut self) {
        self.phase = Phase::Idle;
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Record that a ping went out
    pub(crate) fn ping_sent(&mut self) {
        self.phase = Phase::AwaitingPong(Instant::now() + self.pong_timeout);
    }

    /// Record a pong; reschedules only if a ping was outstanding
    pub(crate) fn acknowledged(&mut self) -> bool {
        match self.phase {
            Phase::AwaitingPong(_) => {
                self.phase = Phase::Scheduled(Instant::now() + self.interval);
                true
            }
            _ => false,
        }
    }

    /// Resolves when the current deadline passes; pends forever while idle
    ///
    /// Cancel-safe: dropping the future leaves the phase untouched.
    pub(crate) async fn due(&self) -> HeartbeatDue {
        match self.phase {
            Phase::Idle => pending().await,
            Phase::Scheduled(at) => {
                sleep_until(at).await;
                HeartbeatDue::Ping
            }
            Phase::AwaitingPong(at) => {
                sleep_until(at).await;
                HeartbeatDue::PongOverdue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(10);
    const PONG_TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn test_first_ping_after_interval() {
        let mut heartbeat = Heartbeat::new(INTERVAL, PONG_TIMEOUT);
        heartbeat.start();
        let started = Instant::now();

        let early = tokio::time::timeout(INTERVAL - Duration::from_millis(5), heartbeat.due()).await;
        assert!(early.is_err());

        assert_eq!(heartbeat.due().await, HeartbeatDue::Ping);
        assert!(started.elapsed() >= INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_reschedules_next_ping() {
        let mut heartbeat = Heartbeat::new(INTERVAL, PONG_TIMEOUT);
        heartbeat.start();
        heartbeat.due().await;
        heartbeat.ping_sent();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(heartbeat.acknowledged());

        let acked_at = Instant::now();
        assert_eq!(heartbeat.due().await, HeartbeatDue::Ping);
        assert!(acked_at.elapsed() >= INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pong_is_overdue() {
        let mut heartbeat = Heartbeat::new(INTERVAL, PONG_TIMEOUT);
        heartbeat.start();
        heartbeat.ping_sent();

        let sent_at = Instant::now();
        assert_eq!(heartbeat.due().await, HeartbeatDue::PongOverdue);
        assert!(sent_at.elapsed() >= PONG_TIMEOUT);
        assert!(sent_at.elapsed() < INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_heartbeat_never_fires() {
        let mut heartbeat = Heartbeat::new(INTERVAL, PONG_TIMEOUT);
        heartbeat.start();
        heartbeat.stop();
        assert!(!heartbeat.is_running());

        let fired = tokio::time::timeout(INTERVAL * 3, heartbeat.due()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn test_unsolicited_pong_is_ignored() {
        let mut heartbeat = Heartbeat::new(INTERVAL, PONG_TIMEOUT);
        assert!(!heartbeat.acknowledged());
        assert!(!heartbeat.is_running());
    }
}
