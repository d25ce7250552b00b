//! Codec for envelope serialization and deserialization
//!
//! Outbound, the codec wraps a payload into `{"op": ..., "data": ...}`.
//! Inbound, it classifies a text frame with a two-tier fallback:
//!
//! 1. try the success shape `{op, data}`
//! 2. otherwise try the error shape `{error, op?}`
//! 3. otherwise fail with `Error::Decode` carrying the serde diagnostic
//!
//! Servers may answer either way and the caller cannot know which in
//! advance, so both shapes are always attempted in that order.
//!
//! # Examples
//!
//! ```rust
//! use linkwire_core::{codec, Error, Inbound};
//!
//! match codec::decode(r#"{"error":"bad auth"}"#).unwrap() {
//!     Inbound::Failure(failure) => assert_eq!(failure.error, "bad auth"),
//!     Inbound::Reply(_) => unreachable!(),
//! }
//!
//! assert!(matches!(codec::decode("not json"), Err(Error::Decode(_))));
//! ```

use crate::envelope::{Envelope, ErrorEnvelope, Inbound};
use crate::error::{Error, Result};
use crate::operation::Operation;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Convert a caller payload into a JSON value
///
/// `None`/unit payloads become `null`, which [`encode`] turns into `{}`.
///
/// # Errors
///
/// Returns `Error::Encode` if the payload cannot be represented as JSON
/// (for example a map with non-string keys).
pub fn to_payload<T: Serialize>(payload: &T) -> Result<serde_json::Value> {
    serde_json::to_value(payload).map_err(|e| Error::Encode(e.to_string()))
}

/// Encode an outbound frame
///
/// A `null` payload is sent as an empty object, matching what servers
/// expect for parameterless operations.
///
/// # Errors
///
/// Returns `Error::Encode` for an empty operation name or an
/// unserializable payload.
pub fn encode<T: Serialize>(op: &Operation, payload: &T) -> Result<String> {
    if op.as_str().is_empty() {
        return Err(Error::Encode("operation name cannot be empty".to_string()));
    }

    let data = match to_payload(payload)? {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        value => value,
    };

    encode_envelope(&Envelope {
        op: op.clone(),
        data,
    })
}

/// Encode an already-built envelope
pub fn encode_envelope(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| Error::Encode(e.to_string()))
}

/// Classify an inbound text frame
///
/// # Errors
///
/// Returns `Error::Decode` if the text is not JSON or matches neither the
/// success nor the error shape.
pub fn decode(text: &str) -> Result<Inbound> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::Decode(e.to_string()))?;

    let reply_err = match serde_json::from_value::<Envelope>(value.clone()) {
        Ok(envelope) => return Ok(Inbound::Reply(envelope)),
        Err(e) => e,
    };

    match serde_json::from_value::<ErrorEnvelope>(value) {
        Ok(failure) => Ok(Inbound::Failure(failure)),
        Err(_) => Err(Error::Decode(format!(
            "frame matched neither envelope shape: {}",
            reply_err
        ))),
    }
}

/// Decode a reply payload into the caller's type
///
/// # Errors
///
/// Returns `Error::Decode` if the payload does not match `T`.
pub fn decode_payload<T: DeserializeOwned>(data: serde_json::Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::Decode(e.to_string()))
}

/// Decode a complete HTTP response body with the same fallback rules
///
/// Used by the upload path: the body is either `T` itself or an error
/// envelope.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let decode_err = match serde_json::from_slice::<T>(body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(failure) => Err(Error::server(failure.error)),
        Err(_) => Err(Error::Decode(decode_err.to_string())),
    }
}
