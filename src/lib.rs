//! linkwire - realtime API transport for federated link-aggregator clients
//!
//! This is the convenience crate that re-exports both sub-crates.
//!
//! # Architecture
//!
//! - **linkwire-core**: operations, wire envelopes, codec, endpoint
//!   normalization, error handling, observability
//! - **linkwire-client**: connection supervisor, heartbeat, reconnection,
//!   request correlation and the `LinkClient` facade
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use linkwire::{ClientBuilder, Operation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new("lemmy.ml").connect().await?;
//!
//!     let site: serde_json::Value = client.request(Operation::GetSite, serde_json::json!({})).await?;
//!     println!("Site: {}", site);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub use linkwire_client as client;
pub use linkwire_core as core;

pub use linkwire_client::{ClientBuilder, ConnectionState, LinkClient, TransportEvent};
pub use linkwire_core::{Endpoint, Error, Operation, Result};
