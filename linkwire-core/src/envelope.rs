//! Wire envelopes
//!
//! Every frame on the socket is a JSON object in one of two shapes:
//!
//! ```text
//! {"op": "Login", "data": {"jwt": "..."}}    success (and every outbound frame)
//! {"error": "bad auth"}                      failure, optionally with "op"
//! ```
//!
//! The transport only understands the outer shell. `data` stays a
//! `serde_json::Value` until the caller decodes it into its own type.

use crate::operation::Operation;
use serde::{Deserialize, Serialize};

/// Outer wire unit carrying an operation name and an opaque payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation this frame belongs to
    pub op: Operation,
    /// Operation-specific payload
    pub data: serde_json::Value,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(op: impl Into<Operation>, data: serde_json::Value) -> Self {
        Self {
            op: op.into(),
            data,
        }
    }
}

/// Error-shaped inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable message from the server
    pub error: String,
    /// Operation the error answers, when the server says so
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<Operation>,
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `{op, data}`: a reply or a server push
    Reply(Envelope),
    /// `{error}`: the server rejected an operation
    Failure(ErrorEnvelope),
}

impl Inbound {
    /// Operation named by the frame, if any
    pub fn op(&self) -> Option<&Operation> {
        match self {
            Inbound::Reply(envelope) => Some(&envelope.op),
            Inbound::Failure(failure) => failure.op.as_ref(),
        }
    }
}
