//! Transport facade
//!
//! `LinkClient` is the public surface of the transport. It encodes payloads,
//! hands frames to the supervisor and awaits the correlated replies.
//!
//! # Client Lifecycle
//!
//! 1. **Build**: [`ClientBuilder`](crate::ClientBuilder) resolves the endpoint
//!    and spawns the supervisor
//! 2. **Connect**: `connect()` dials and resolves once the socket is open
//! 3. **Use**: `request`, `send`, uploads, event and push subscriptions
//! 4. **Close**: `close()`, or drop every handle
//!
//! # Cloning
//!
//! `LinkClient` is cheap to clone. All clones share one supervisor and one
//! socket. When the last clone is dropped the supervisor closes the socket
//! and exits.
//!
//! # Delivery
//!
//! Frames are written at most once. A request made while the socket is not
//! open fails at once with `Error::NotConnected` and nudges the supervisor to
//! reconnect; the caller decides whether to retry.

use crate::connection_state::{ConnectionState, StateWatch};
use crate::events::TransportEvent;
use crate::supervisor::Command;
use crate::upload::Uploader;
use crate::ClientMetrics;
use linkwire_core::{codec, Endpoint, Envelope, Error, Operation, Result, PICTRS_IMAGE_PATH};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

/// Realtime API client over a supervised WebSocket
#[derive(Clone)]
pub struct LinkClient {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) state: StateWatch,
    pub(crate) events: broadcast::Sender<TransportEvent>,
    pub(crate) unsolicited: broadcast::Sender<Envelope>,
    /// Mirror of the supervisor's target, read by the upload path
    pub(crate) endpoint: Arc<RwLock<Endpoint>>,
    pub(crate) auth: Arc<RwLock<Option<String>>>,
    pub(crate) ids: Arc<AtomicU64>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) uploader: Uploader,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

impl LinkClient {
    /// Open the socket, or join the dial already in flight
    ///
    /// Resolves immediately if the socket is already open.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Connect { reply: tx }).await?;
        rx.await.map_err(|_| supervisor_gone())?
    }

    /// Close the socket with "going away" and fail every pending request
    /// with `Error::ConnectionClosed`
    ///
    /// The client stays disconnected until the next `connect()`.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Close { reply: tx }).await?;
        rx.await.map_err(|_| supervisor_gone())
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Wait until the connection reaches `target`
    pub async fn wait_for_state(&self, target: ConnectionState, within: Duration) -> Result<()> {
        self.state.wait_for(target, within).await
    }

    /// Send `op` and wait for its reply
    ///
    /// # Errors
    ///
    /// - `Error::Encode` if `params` cannot be serialized (nothing is sent)
    /// - `Error::NotConnected` if the socket is not open
    /// - `Error::Server` if the server answered with an error envelope
    /// - `Error::Decode` if the reply payload does not match `R`
    /// - `Error::ConnectionClosed` if the socket went away first
    /// - `Error::Timeout` if the request timeout elapsed
    #[tracing::instrument(skip(self, params), fields(op = %op))]
    pub async fn request<P, R>(&self, op: Operation, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let payload = self.payload(&params).await?;
        let frame = codec::encode(&op, &payload)?;

        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Request {
            id,
            op: op.clone(),
            frame,
            reply: tx,
        })
        .await?;

        let reply = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    // best effort; the supervisor may already be gone
                    let _ = self.commands.send(Command::Cancel { id }).await;
                    tracing::warn!(id, timeout_ms = limit.as_millis() as u64, "Request timed out");
                    Ok(Err(Error::Timeout))
                }
            },
            None => rx.await,
        };

        let result = reply
            .map_err(|_| supervisor_gone())
            .and_then(|outcome| outcome)
            .and_then(codec::decode_payload::<R>);

        self.record_request(&op, &result, start);
        match &result {
            Ok(_) => tracing::debug!(id, "Request completed"),
            Err(e) => tracing::debug!(id, error = %e, "Request failed"),
        }
        result
    }

    /// Send `op` without waiting for a reply
    ///
    /// Resolves once the frame has been written to the socket.
    #[tracing::instrument(skip(self, params), fields(op = %op))]
    pub async fn send<P: Serialize>(&self, op: Operation, params: P) -> Result<()> {
        let payload = self.payload(&params).await?;
        let frame = codec::encode(&op, &payload)?;

        let (tx, rx) = oneshot::channel();
        self.submit(Command::Send {
            op,
            frame,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| supervisor_gone())?
    }

    /// Upload an image to the instance's pictrs endpoint
    pub async fn upload_image<R: DeserializeOwned>(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<R> {
        self.upload_binary(PICTRS_IMAGE_PATH, bytes, filename).await
    }

    /// Upload a file to `path` on the instance's HTTP base
    ///
    /// Independent of the socket; works in any connection state. `path` may
    /// also be an absolute URL, in which case the `jwt` cookie is only sent
    /// if it points at the instance itself.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_binary<R: DeserializeOwned>(
        &self,
        path: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<R> {
        let (url, own_host) = {
            let endpoint = self.endpoint.read().await;
            let url = endpoint.http_url(path);
            let own_host = endpoint.serves(&url);
            (url, own_host)
        };
        let auth = if own_host {
            self.auth.read().await.clone()
        } else {
            tracing::debug!(url = %url, "Upload target is off-instance; sending without auth cookie");
            None
        };

        let result = self
            .uploader
            .upload(&url, auth.as_deref(), bytes, filename)
            .await;
        if let (Err(e), Some(m)) = (&result, &self.metrics) {
            m.record_error(e.kind());
        }
        result
    }

    /// Lifecycle events: connected, disconnected, transport errors
    pub fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Server frames that matched no pending request
    pub fn subscribe_unsolicited(&self) -> broadcast::Receiver<Envelope> {
        self.unsolicited.subscribe()
    }

    /// Run `handler` for every server push of `op`
    ///
    /// The listener stops when the supervisor and every client handle are
    /// gone, or when the returned handle is aborted.
    pub fn on_unsolicited<F, Fut>(&self, op: Operation, handler: F) -> JoinHandle<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut pushes = self.unsolicited.subscribe();
        tokio::spawn(async move {
            loop {
                match pushes.recv().await {
                    Ok(envelope) if envelope.op == op => handler(envelope.data).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(op = %op, skipped, "Push listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Point future connections at another instance host
    ///
    /// The open socket is replaced on the next request.
    pub async fn set_instance(&self, instance: &str) -> Result<()> {
        let endpoint = Endpoint::from_instance(instance)?;
        self.set_endpoint(endpoint).await
    }

    /// Point future connections at `endpoint`
    pub async fn set_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        *self.endpoint.write().await = endpoint.clone();
        self.submit(Command::SetEndpoint { endpoint }).await
    }

    /// Endpoint used by the next dial and by uploads
    pub async fn endpoint(&self) -> Endpoint {
        self.endpoint.read().await.clone()
    }

    /// Replace the auth token; `None` stops injecting it
    pub async fn set_auth(&self, token: Option<String>) {
        *self.auth.write().await = token;
    }

    async fn submit(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| supervisor_gone())
    }

    /// Serialize `params`, adding the auth token to object payloads that
    /// lack one
    async fn payload<P: Serialize>(&self, params: &P) -> Result<Value> {
        let mut payload = codec::to_payload(params)?;
        if let Some(token) = self.auth.read().await.as_ref() {
            inject_auth(&mut payload, token);
        }
        Ok(payload)
    }

    fn record_request<T>(&self, op: &Operation, result: &Result<T>, start: Instant) {
        if let Some(ref m) = self.metrics {
            let status = match result {
                Ok(_) => "success",
                Err(e) => {
                    m.record_error(e.kind());
                    e.kind()
                }
            };
            m.record_request(op.as_str(), status, start.elapsed().as_secs_f64());
        }
    }
}

/// A missing or `null` `auth` field is filled in; an explicit one wins
fn inject_auth(payload: &mut Value, token: &str) {
    if let Value::Object(map) = payload {
        let slot = map.entry("auth").or_insert(Value::Null);
        if slot.is_null() {
            *slot = Value::String(token.to_string());
        }
    }
}

fn supervisor_gone() -> Error {
    Error::Internal("supervisor stopped".to_string())
}
