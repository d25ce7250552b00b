//! Core wire types and codec for linkwire
//!
//! This crate holds everything about the realtime API that does not need a
//! socket:
//!
//! - **Operation**: the enumerated names of remote procedures multiplexed
//!   over the single connection
//! - **Envelope**: the `{op, data}` wire shell and its `{error}` sibling
//! - **Codec**: encoding outbound envelopes and classifying inbound frames
//! - **Endpoint**: turning a configured instance host into the canonical
//!   `wss://<host>/api/v2/ws` URL
//! - **Error handling**: the transport error taxonomy
//! - **Observability**: tracing subscriber and OpenTelemetry bootstrap
//!
//! The `linkwire-client` crate builds the connection supervisor, request
//! correlation and the public facade on top of this foundation.
//!
//! # Example
//!
//! ```rust
//! use linkwire_core::{codec, Inbound, Operation};
//!
//! let frame = codec::encode(&Operation::Login, &serde_json::json!({"user": "a"})).unwrap();
//! assert_eq!(frame, r#"{"op":"Login","data":{"user":"a"}}"#);
//!
//! match codec::decode(r#"{"op":"Login","data":{"jwt":"xyz"}}"#).unwrap() {
//!     Inbound::Reply(envelope) => assert_eq!(envelope.data["jwt"], "xyz"),
//!     Inbound::Failure(_) => unreachable!(),
//! }
//! ```

pub mod codec;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod observability;
pub mod operation;

pub use endpoint::{Endpoint, API_PATH, PICTRS_IMAGE_PATH};
pub use envelope::{Envelope, ErrorEnvelope, Inbound};
pub use error::{Error, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use operation::Operation;
