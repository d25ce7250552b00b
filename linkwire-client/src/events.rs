//! Transport lifecycle events

use linkwire_core::{Endpoint, Error};

/// Lifecycle notification published on the event broadcast channel
///
/// Subscribers that lag behind lose the oldest events; the supervisor never
/// waits for them.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A socket opened against `endpoint`
    Connected { endpoint: Endpoint },
    /// The socket went away (peer close, read error, heartbeat failure or
    /// a user close)
    Disconnected,
    /// A failure not owned by any single request: dial errors, socket
    /// errors, exhausted reconnection, unclaimed server errors
    Error(Error),
}

impl TransportEvent {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Disconnected => "disconnected",
            Self::Error(_) => "error",
        }
    }
}
