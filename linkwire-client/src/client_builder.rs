//! Client builder and transport configuration
//!
//! The `ClientBuilder` provides a fluent API for configuring the transport
//! before the supervisor starts. It allows you to:
//! - Target an instance host or an explicit WebSocket endpoint
//! - Set the auth token injected into outgoing payloads
//! - Pick a reconnection strategy, or disable reconnection
//! - Tune heartbeat, close and request timeouts
//! - Configure observability (OpenTelemetry)
//!
//! # Examples
//!
//! ```rust,no_run
//! use linkwire_client::{ClientBuilder, FixedDelay};
//! use std::time::Duration;
//!
//! # async fn example() -> linkwire_core::Result<()> {
//! // Defaults: exponential backoff, 10s heartbeat, 30s request timeout
//! let client = ClientBuilder::new("lemmy.ml").connect().await?;
//!
//! // Local instance, fixed reconnection delay, observability on
//! let local = ClientBuilder::with_url("ws://localhost:8536/api/v2/ws")?
//!     .with_reconnect(Box::new(FixedDelay::new(Duration::from_secs(2))))
//!     .with_default_observability()
//!     .service_name("lemmy-ios")
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::connection_state::StateCell;
use crate::reconnect::{ExponentialBackoff, NoReconnect, ReconnectionStrategy};
use crate::supervisor::{Supervisor, SupervisorSetup};
use crate::upload::Uploader;
use crate::{ClientMetrics, LinkClient};
use linkwire_core::{Endpoint, Error, ObservabilityConfig, Result};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};

/// Default delay between heartbeat pings
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Default time allowed for a pong to arrive
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);
/// Default wait for the peer to acknowledge a close frame
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default per-request reply timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_COMMAND_CAPACITY: usize = 64;
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Resolved transport settings
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub endpoint: Endpoint,
    pub auth: Option<String>,
    pub heartbeat_interval: Duration,
    pub pong_timeout: Duration,
    pub close_timeout: Duration,
    /// `None` waits for replies indefinitely
    pub request_timeout: Option<Duration>,
    pub command_capacity: usize,
    pub broadcast_capacity: usize,
}

enum Target {
    Instance(String),
    Endpoint(Endpoint),
}

/// Builder for configuring and creating a [`LinkClient`]
pub struct ClientBuilder {
    target: Target,
    auth: Option<String>,
    reconnect_strategy: Box<dyn ReconnectionStrategy>,
    heartbeat_interval: Duration,
    pong_timeout: Duration,
    close_timeout: Duration,
    request_timeout: Option<Duration>,
    command_capacity: usize,
    broadcast_capacity: usize,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Target an instance host such as `lemmy.ml` or `https://lemmy.ml/`
    ///
    /// The host is normalized when the client is built; a malformed host
    /// fails `build()` and `connect()` with `Error::Configuration`.
    pub fn new(instance: impl Into<String>) -> Self {
        Self::with_target(Target::Instance(instance.into()))
    }

    /// Target an explicit `ws://` or `wss://` URL, used verbatim
    pub fn with_url(url: &str) -> Result<Self> {
        Ok(Self::with_endpoint(Endpoint::from_url(url)?))
    }

    /// Target an already resolved endpoint
    pub fn with_endpoint(endpoint: Endpoint) -> Self {
        Self::with_target(Target::Endpoint(endpoint))
    }

    fn with_target(target: Target) -> Self {
        Self {
            target,
            auth: None,
            reconnect_strategy: Box::new(ExponentialBackoff::default()),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            observability_config: None,
            service_name: None,
        }
    }

    /// Auth token injected into object payloads that carry no `auth` field
    pub fn with_auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(token.into());
        self
    }

    /// Reconnect with the given strategy after unexpected drops
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = strategy;
        self
    }

    /// Reconnect with the default exponential backoff (the default)
    pub fn with_default_reconnect(mut self) -> Self {
        self.reconnect_strategy = Box::new(ExponentialBackoff::default());
        self
    }

    /// Never reconnect automatically
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect_strategy = Box::new(NoReconnect);
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Per-request reply timeout; `None` disables it
    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Capacity of the bounded command queue to the supervisor
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    /// Capacity of the event and unsolicited-frame broadcast channels
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Resolve the endpoint and collect the settings
    pub fn transport_config(&self) -> Result<TransportConfig> {
        let endpoint = match &self.target {
            Target::Instance(host) => Endpoint::from_instance(host)?,
            Target::Endpoint(endpoint) => endpoint.clone(),
        };

        Ok(TransportConfig {
            endpoint,
            auth: self.auth.clone(),
            heartbeat_interval: self.heartbeat_interval,
            pong_timeout: self.pong_timeout,
            close_timeout: self.close_timeout,
            request_timeout: self.request_timeout,
            command_capacity: self.command_capacity,
            broadcast_capacity: self.broadcast_capacity,
        })
    }

    /// Start the supervisor without dialing
    ///
    /// Must be called inside a Tokio runtime. The first `connect()` (or,
    /// with reconnection enabled, the first request) opens the socket.
    pub fn build(self) -> Result<LinkClient> {
        let config = self.transport_config()?;

        let metrics = match self.observability_config {
            Some(mut obs) => {
                if let Some(name) = self.service_name {
                    obs.service_name = name;
                }
                linkwire_core::init_observability(obs.clone()).map_err(|e| {
                    Error::Internal(format!("Failed to initialize observability: {}", e))
                })?;
                Some(Arc::new(ClientMetrics::new(&obs.service_name)))
            }
            None => None,
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let (events, _) = broadcast::channel(config.broadcast_capacity);
        let (unsolicited, _) = broadcast::channel(config.broadcast_capacity);
        let (state_cell, state) = StateCell::new();

        let supervisor = Supervisor::new(
            SupervisorSetup {
                endpoint: config.endpoint.clone(),
                strategy: self.reconnect_strategy,
                heartbeat_interval: config.heartbeat_interval,
                pong_timeout: config.pong_timeout,
                close_timeout: config.close_timeout,
                state: state_cell,
                events: events.clone(),
                unsolicited: unsolicited.clone(),
                metrics: metrics.clone(),
            },
            cmd_rx,
        );
        tokio::spawn(supervisor.run());

        tracing::debug!(endpoint = %config.endpoint, "Client built");

        Ok(LinkClient {
            commands: cmd_tx,
            state,
            events,
            unsolicited,
            endpoint: Arc::new(RwLock::new(config.endpoint)),
            auth: Arc::new(RwLock::new(config.auth)),
            ids: Arc::new(AtomicU64::new(1)),
            request_timeout: config.request_timeout,
            uploader: Uploader::new(),
            metrics,
        })
    }

    /// Build the client and open the first socket
    pub async fn connect(self) -> Result<LinkClient> {
        let client = self.build()?;
        client.connect().await?;
        Ok(client)
    }
}
