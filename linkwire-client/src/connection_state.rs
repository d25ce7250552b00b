//! Connection state tracking
//!
//! The supervisor is the only writer of the connection state. Everyone else
//! holds a [`StateWatch`] and reads or awaits it.
//!
//! # State Transitions
//!
//! ```text
//! Disconnected --connect--> Connecting --open--> Open
//!      ^                        |                 |
//!      |<------ dial error -----+                 |-- socket error --> Disconnected
//!      |                                          |
//!      +------------ close ack <--- Closing <-- close()
//! ```
//!
//! From `Disconnected` the supervisor re-enters `Connecting` on its own when
//! the reconnection policy allows it.

use linkwire_core::{Error, Result};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket
    Disconnected,
    /// Dial in flight
    Connecting,
    /// Socket open, traffic flows
    Open,
    /// Close frame sent, waiting for the peer
    Closing,
}

impl ConnectionState {
    /// True if frames can be written right now
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Numeric code used by the connection state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closing => 3,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Write side, owned by the supervisor
pub(crate) struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> (Self, StateWatch) {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        (Self { tx }, StateWatch { rx })
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Store a new state; returns the previous one
    pub(crate) fn set(&self, state: ConnectionState) -> ConnectionState {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
        }
        previous
    }
}

/// Read side of the connection state
#[derive(Clone)]
pub struct StateWatch {
    rx: watch::Receiver<ConnectionState>,
}

impl StateWatch {
    /// Current state
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    /// Wait until the state equals `target`
    ///
    /// # Errors
    ///
    /// `Error::Timeout` if `within` elapses first, `Error::Internal` if the
    /// supervisor has stopped.
    pub async fn wait_for(&self, target: ConnectionState, within: Duration) -> Result<()> {
        let mut rx = self.rx.clone();
        let wait = rx.wait_for(|state| *state == target);

        let outcome = match tokio::time::timeout(within, wait).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::Internal("supervisor stopped".to_string())),
            Err(_) => Err(Error::Timeout),
        };
        outcome
    }

    /// Receiver that yields every state change
    pub fn changes(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_transitions_are_observed() {
        let (cell, watch) = StateCell::new();
        assert_eq!(watch.current(), ConnectionState::Disconnected);

        assert_eq!(cell.set(ConnectionState::Connecting), ConnectionState::Disconnected);
        assert_eq!(watch.current(), ConnectionState::Connecting);

        cell.set(ConnectionState::Open);
        assert!(watch.current().is_open());
        assert_eq!(cell.get(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_wait_for_resolves_on_transition() {
        let (cell, watch) = StateCell::new();

        let waiter = tokio::spawn({
            let watch = watch.clone();
            async move {
                watch
                    .wait_for(ConnectionState::Open, Duration::from_secs(1))
                    .await
            }
        });

        cell.set(ConnectionState::Connecting);
        cell.set(ConnectionState::Open);

        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let (_cell, watch) = StateCell::new();
        let result = watch
            .wait_for(ConnectionState::Open, Duration::from_millis(20))
            .await;
        assert_eq!(result, Err(Error::Timeout));
    }

    #[test]
    fn test_gauge_codes() {
        assert_eq!(ConnectionState::Disconnected.as_gauge(), 0);
        assert_eq!(ConnectionState::Open.as_gauge(), 2);
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
