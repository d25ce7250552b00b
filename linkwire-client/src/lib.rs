//! Supervised WebSocket transport for the link-aggregator realtime API
//!
//! This crate multiplexes typed request/response traffic over one
//! persistent WebSocket, keeps it alive with a heartbeat and re-dials it when
//! it drops.
//!
//! # Core Features
//!
//! - **Request-Response**: send an operation and await its typed reply
//! - **Server Pushes**: frames no request claimed are published to subscribers
//! - **Auto-Reconnection**: pluggable strategies, exponential backoff by default
//! - **Heartbeat**: ping every 10s, reconnect when a pong goes missing
//! - **Endpoint Switching**: retarget a live client to another instance
//! - **Image Upload**: multipart POST to the instance's pictrs endpoint
//! - **Observability**: OpenTelemetry metrics and tracing spans
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use linkwire_client::ClientBuilder;
//! use linkwire_core::Operation;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new("lemmy.ml").connect().await?;
//!
//!     let login: Value = client
//!         .request(Operation::Login, json!({"username_or_email": "a", "password": "b"}))
//!         .await?;
//!     client.set_auth(login["jwt"].as_str().map(String::from)).await;
//!
//!     client.on_unsolicited(Operation::CreateComment, |data| async move {
//!         println!("New comment: {}", data);
//!     });
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod client_builder;
mod connection_state;
mod correlator;
mod events;
mod heartbeat;
mod metrics;
mod reconnect;
mod supervisor;
mod upload;

pub use client::LinkClient;
pub use client_builder::{
    ClientBuilder, TransportConfig, DEFAULT_CLOSE_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_PONG_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
pub use connection_state::{ConnectionState, StateWatch};
pub use events::TransportEvent;
pub use metrics::ClientMetrics;
pub use reconnect::{ExponentialBackoff, FixedDelay, Immediate, NoReconnect, ReconnectionStrategy};
pub use upload::IMAGE_FIELD;
