//! Error types for linkwire
//!
//! One enum covers every failure the transport can surface. The variants
//! fall into a few families:
//!
//! - **Local errors**: `Encode`, `Configuration`. Raised before any I/O and
//!   returned straight to the caller.
//! - **Frame errors**: `Decode`. An inbound frame (or a reply payload) did
//!   not match the expected shape.
//! - **Server errors**: `Server`. The server answered with an error
//!   envelope; exactly one pending operation receives it.
//! - **Transport errors**: `Transport`, `ConnectionClosed`, `NotConnected`.
//!   Socket-level trouble; the reconnection policy takes over.
//! - **Operational errors**: `Timeout`, `Http`, `Internal`.
//!
//! `Error` is `Clone` so a single disconnection can be fanned out to every
//! pending operation and to every event subscriber.
//!
//! # Examples
//!
//! ```rust
//! use linkwire_core::Error;
//!
//! let error = Error::server("bad auth");
//! assert!(error.is_server());
//! assert_eq!(error.to_string(), "Server error: bad auth");
//! ```

use thiserror::Error;

/// Result type for linkwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for linkwire operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The outbound payload could not be serialized.
    ///
    /// Nothing was written to the socket.
    #[error("Encode error: {0}")]
    Encode(String),

    /// An inbound frame or reply payload did not match the expected shape.
    ///
    /// Carries the raw serde diagnostic.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The server answered with an error envelope
    #[error("Server error: {message}")]
    Server {
        /// Message taken verbatim from the `error` field
        message: String,
    },

    /// Socket-level failure (dial, read, write or ping)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection went away while the operation was in flight
    #[error("Connection closed")]
    ConnectionClosed,

    /// The socket was not open when the send was attempted.
    ///
    /// A reconnect has been triggered (if the policy allows); the caller
    /// must resubmit.
    #[error("Not connected")]
    NotConnected,

    /// The configured instance host cannot form a valid endpoint
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No reply arrived within the configured request timeout
    #[error("Request timeout")]
    Timeout,

    /// The upload endpoint answered with a non-success status
    #[error("HTTP error: status={status}, body={body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// Broken internal invariant (dropped channel, panicked task)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a server error from the `error` field of an error envelope
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// True for errors reported by the server in an error envelope
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// True for errors that mean the socket is gone or was never there
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ConnectionClosed | Self::NotConnected
        )
    }

    /// Short machine-readable label, used as a metrics attribute
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Encode(_) => "encode",
            Self::Decode(_) => "decode",
            Self::Server { .. } => "server",
            Self::Transport(_) => "transport",
            Self::ConnectionClosed => "connection_closed",
            Self::NotConnected => "not_connected",
            Self::Configuration(_) => "configuration",
            Self::Timeout => "timeout",
            Self::Http { .. } => "http",
            Self::Internal(_) => "internal",
        }
    }
}
