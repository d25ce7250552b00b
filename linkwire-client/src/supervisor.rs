//! Connection supervisor
//!
//! A single background task owns the socket, the heartbeat, the pending
//! table and the dial task. Every other component talks to it through a
//! bounded command queue and awaits oneshot replies, so socket state is
//! never shared and never locked.
//!
//! The main loop multiplexes four sources with `tokio::select!`:
//!
//! - the command queue
//! - the in-flight dial task, if any
//! - the socket read half, if open
//! - the heartbeat deadline
//!
//! `select!` drops the losing futures before running a branch handler, so
//! each handler gets `&mut self` to itself. The dial, read and heartbeat
//! futures are cancel-safe; dropping them loses no data.

use crate::connection_state::{ConnectionState, StateCell};
use crate::correlator::{Correlator, Dispatch, ReplySender};
use crate::events::TransportEvent;
use crate::heartbeat::{Heartbeat, HeartbeatDue};
use crate::metrics::ClientMetrics;
use crate::reconnect::ReconnectionStrategy;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use linkwire_core::{Endpoint, Envelope, Error, Operation, Result};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;
type DialTask = JoinHandle<Result<WsStream>>;

/// Requests sent from the facade to the supervisor
pub(crate) enum Command {
    /// Open a socket if none is open or being dialed
    Connect { reply: oneshot::Sender<Result<()>> },
    /// Send a frame and await the correlated reply
    Request {
        id: u64,
        op: Operation,
        frame: String,
        reply: ReplySender,
    },
    /// Send a frame; the reply acknowledges the write only
    Send {
        op: Operation,
        frame: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Forget a pending request whose caller stopped waiting
    Cancel { id: u64 },
    /// Record a new target endpoint for future dials
    SetEndpoint { endpoint: Endpoint },
    /// Close the socket gracefully and stay disconnected
    Close { reply: oneshot::Sender<()> },
}

/// An outbound frame together with whoever waits on it
struct Outgoing {
    op: Operation,
    frame: String,
    reply: OutgoingReply,
}

enum OutgoingReply {
    Correlated { id: u64, tx: ReplySender },
    Written(oneshot::Sender<Result<()>>),
}

impl Outgoing {
    fn id(&self) -> Option<u64> {
        match &self.reply {
            OutgoingReply::Correlated { id, .. } => Some(*id),
            OutgoingReply::Written(_) => None,
        }
    }

    fn fail(self, error: Error) {
        match self.reply {
            OutgoingReply::Correlated { tx, .. } => {
                let _ = tx.send(Err(error));
            }
            OutgoingReply::Written(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

/// Channels and settings the supervisor is built from
pub(crate) struct SupervisorSetup {
    pub(crate) endpoint: Endpoint,
    pub(crate) strategy: Box<dyn ReconnectionStrategy>,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) pong_timeout: Duration,
    pub(crate) close_timeout: Duration,
    pub(crate) state: StateCell,
    pub(crate) events: broadcast::Sender<TransportEvent>,
    pub(crate) unsolicited: broadcast::Sender<Envelope>,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

pub(crate) struct Supervisor {
    cmd_rx: mpsc::Receiver<Command>,
    /// Target for the next dial
    endpoint: Endpoint,
    /// Endpoint the open socket was dialed against
    connected_to: Option<Endpoint>,
    writer: Option<WsWriter>,
    reader: Option<WsReader>,
    dial: Option<DialTask>,
    dialing: Option<Endpoint>,
    /// True while a dial triggered by an endpoint switch is in flight
    switching: bool,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
    parked: Vec<Outgoing>,
    correlator: Correlator,
    heartbeat: Heartbeat,
    strategy: Box<dyn ReconnectionStrategy>,
    attempt: u32,
    // strategy returned None; cleared by the next dial cycle
    exhausted: bool,
    closed_by_user: bool,
    close_timeout: Duration,
    state: StateCell,
    events: broadcast::Sender<TransportEvent>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Supervisor {
    pub(crate) fn new(setup: SupervisorSetup, cmd_rx: mpsc::Receiver<Command>) -> Self {
        Self {
            cmd_rx,
            endpoint: setup.endpoint,
            connected_to: None,
            writer: None,
            reader: None,
            dial: None,
            dialing: None,
            switching: false,
            connect_waiters: Vec::new(),
            parked: Vec::new(),
            correlator: Correlator::new(setup.unsolicited),
            heartbeat: Heartbeat::new(setup.heartbeat_interval, setup.pong_timeout),
            strategy: setup.strategy,
            attempt: 0,
            exhausted: false,
            closed_by_user: false,
            close_timeout: setup.close_timeout,
            state: setup.state,
            events: setup.events,
            metrics: setup.metrics,
        }
    }

    /// Run until every command sender is dropped
    pub(crate) async fn run(mut self) {
        tracing::debug!(endpoint = %self.endpoint, "Supervisor started");

        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                result = next_dial(&mut self.dial) => {
                    self.dial = None;
                    self.on_dial_result(result).await;
                }
                frame = next_frame(&mut self.reader) => self.on_frame(frame),
                due = self.heartbeat.due() => self.on_heartbeat(due).await,
            }
        }

        // all handles dropped
        self.close().await;
        tracing::debug!("Supervisor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.connect(reply).await,
            Command::Request {
                id,
                op,
                frame,
                reply,
            } => {
                let outgoing = Outgoing {
                    op,
                    frame,
                    reply: OutgoingReply::Correlated { id, tx: reply },
                };
                self.submit(outgoing).await;
            }
            Command::Send { op, frame, reply } => {
                let outgoing = Outgoing {
                    op,
                    frame,
                    reply: OutgoingReply::Written(reply),
                };
                self.submit(outgoing).await;
            }
            Command::Cancel { id } => {
                if self.correlator.cancel(id) {
                    tracing::debug!(id, "Pending request cancelled");
                }
                self.parked.retain(|outgoing| outgoing.id() != Some(id));
            }
            Command::SetEndpoint { endpoint } => {
                if endpoint != self.endpoint {
                    tracing::info!(from = %self.endpoint, to = %endpoint, "Endpoint updated");
                    self.endpoint = endpoint;
                }
            }
            Command::Close { reply } => {
                self.close().await;
                let _ = reply.send(());
            }
        }
    }

    async fn connect(&mut self, reply: oneshot::Sender<Result<()>>) {
        self.closed_by_user = false;

        if self.writer.is_some() {
            if self.connected_to.as_ref() == Some(&self.endpoint) {
                let _ = reply.send(Ok(()));
                return;
            }
            self.connect_waiters.push(reply);
            self.switch_endpoint().await;
            return;
        }

        self.connect_waiters.push(reply);
        if self.dial.is_none() {
            tracing::info!(endpoint = %self.endpoint, "Connecting");
            self.restart_reconnect_cycle();
            self.open_socket(Duration::ZERO);
        }
    }

    /// Route an outbound frame: write it, park it behind an endpoint switch,
    /// or fail it fast
    async fn submit(&mut self, outgoing: Outgoing) {
        if self.writer.is_some() && self.connected_to.as_ref() != Some(&self.endpoint) {
            self.parked.push(outgoing);
            self.switch_endpoint().await;
            return;
        }

        if self.writer.is_none() && self.switching && self.dial.is_some() {
            self.parked.push(outgoing);
            return;
        }

        if self.writer.is_some() {
            self.write(outgoing).await;
            return;
        }

        tracing::debug!(op = %outgoing.op, state = %self.state.get(), "Send while not connected");
        outgoing.fail(Error::NotConnected);
        if self.exhausted {
            tracing::info!("Send after reconnection gave up; starting a new cycle");
            self.restart_reconnect_cycle();
        }
        self.reconnect_if_needed();
    }

    async fn write(&mut self, outgoing: Outgoing) {
        let Some(writer) = self.writer.as_mut() else {
            outgoing.fail(Error::NotConnected);
            return;
        };

        let Outgoing { op, frame, reply } = outgoing;
        let (pending_id, ack) = match reply {
            OutgoingReply::Correlated { id, tx } => {
                self.correlator.register(id, op.clone(), tx);
                (Some(id), None)
            }
            OutgoingReply::Written(tx) => (None, Some(tx)),
        };

        tracing::debug!(op = %op, id = ?pending_id, "Sending frame");
        match writer.send(Message::Text(frame)).await {
            Ok(()) => {
                if let Some(ack) = ack {
                    let _ = ack.send(Ok(()));
                }
            }
            Err(e) => {
                let error = Error::Transport(format!("write failed: {}", e));
                if let Some(id) = pending_id {
                    self.correlator.fail(id, error.clone());
                }
                if let Some(ack) = ack {
                    let _ = ack.send(Err(error.clone()));
                }
                self.connection_lost(error);
            }
        }
    }

    /// Idempotent: at most one dial is ever in flight
    fn reconnect_if_needed(&mut self) {
        if self.writer.is_some() || self.dial.is_some() {
            return;
        }
        if self.closed_by_user || !self.strategy.is_enabled() {
            return;
        }

        match self.strategy.next_delay(self.attempt) {
            Some(delay) => {
                self.attempt += 1;
                if let Some(ref m) = self.metrics {
                    m.record_reconnection_attempt();
                }
                tracing::info!(
                    attempt = self.attempt,
                    delay_ms = delay.as_millis() as u64,
                    endpoint = %self.endpoint,
                    "Reconnecting"
                );
                self.open_socket(delay);
            }
            None => {
                self.exhausted = true;
                tracing::error!(attempts = self.attempt, "Giving up reconnecting");
                let error = Error::Transport(format!(
                    "reconnection abandoned after {} attempts",
                    self.attempt
                ));
                self.record_error(&error);
                self.emit(TransportEvent::Error(error));
            }
        }
    }

    fn restart_reconnect_cycle(&mut self) {
        self.attempt = 0;
        self.exhausted = false;
        self.strategy.reset();
    }

    /// Spawn a dial against the current endpoint after `delay`
    fn open_socket(&mut self, delay: Duration) {
        let endpoint = self.endpoint.clone();
        let url = endpoint.as_str().to_string();
        self.dialing = Some(endpoint);
        self.set_state(ConnectionState::Connecting);

        self.dial = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            connect_async(url)
                .await
                .map(|(ws, _response)| ws)
                .map_err(|e| Error::Transport(format!("dial failed: {}", e)))
        }));
    }

    async fn on_dial_result(&mut self, result: Result<WsStream>) {
        let endpoint = self
            .dialing
            .take()
            .unwrap_or_else(|| self.endpoint.clone());
        self.switching = false;

        match result {
            Ok(ws) => {
                let (writer, reader) = ws.split();
                self.writer = Some(writer);
                self.reader = Some(reader);
                self.connected_to = Some(endpoint.clone());
                self.set_state(ConnectionState::Open);

                if self.attempt > 0 {
                    if let Some(ref m) = self.metrics {
                        m.record_reconnection_success();
                    }
                }
                self.restart_reconnect_cycle();
                self.heartbeat.start();

                tracing::info!(endpoint = %endpoint, "Connected");
                self.emit(TransportEvent::Connected { endpoint });

                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                for outgoing in std::mem::take(&mut self.parked) {
                    self.write(outgoing).await;
                }
            }
            Err(error) => {
                tracing::warn!(endpoint = %endpoint, error = %error, "Dial failed");
                self.set_state(ConnectionState::Disconnected);
                self.record_error(&error);
                self.emit(TransportEvent::Error(error.clone()));

                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(error.clone()));
                }
                for outgoing in std::mem::take(&mut self.parked) {
                    outgoing.fail(error.clone());
                }
                self.reconnect_if_needed();
            }
        }
    }

    fn on_frame(&mut self, frame: Option<std::result::Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.on_text(&text),
            Some(Ok(Message::Binary(bytes))) => {
                tracing::warn!(len = bytes.len(), "Ignoring binary frame");
                if let Some(ref m) = self.metrics {
                    m.record_dropped_frame();
                }
            }
            Some(Ok(Message::Pong(_))) => {
                if self.heartbeat.acknowledged() {
                    tracing::trace!("Pong received");
                }
            }
            // tungstenite queues the pong reply itself
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                let reason = match frame {
                    Some(frame) => format!("closed by peer: {} {}", u16::from(frame.code), frame.reason),
                    None => "closed by peer".to_string(),
                };
                self.connection_lost(Error::Transport(reason));
            }
            Some(Err(e)) => self.connection_lost(Error::Transport(format!("read failed: {}", e))),
            None => self.connection_lost(Error::Transport("stream ended".to_string())),
        }
    }

    fn on_text(&mut self, text: &str) {
        match self.correlator.dispatch(text) {
            Dispatch::Resolved { .. } | Dispatch::Rejected { .. } => {}
            Dispatch::Unsolicited(op) => {
                if let Some(ref m) = self.metrics {
                    m.record_unsolicited(op.as_str());
                }
            }
            Dispatch::Unclaimed(error) => {
                self.record_error(&error);
                self.emit(TransportEvent::Error(error));
            }
            Dispatch::Dropped(_) => {
                if let Some(ref m) = self.metrics {
                    m.record_dropped_frame();
                }
            }
        }
    }

    async fn on_heartbeat(&mut self, due: HeartbeatDue) {
        let failure = match due {
            HeartbeatDue::Ping => {
                let Some(writer) = self.writer.as_mut() else {
                    self.heartbeat.stop();
                    return;
                };
                match writer.send(Message::Ping(Vec::new())).await {
                    Ok(()) => {
                        tracing::trace!("Ping sent");
                        self.heartbeat.ping_sent();
                        return;
                    }
                    Err(e) => Error::Transport(format!("ping failed: {}", e)),
                }
            }
            HeartbeatDue::PongOverdue => Error::Transport("pong not received in time".to_string()),
        };

        tracing::warn!(error = %failure, "Heartbeat failed");
        if let Some(ref m) = self.metrics {
            m.record_heartbeat_failure();
        }
        self.connection_lost(failure);
    }

    /// Tear down a socket that failed underneath us
    fn connection_lost(&mut self, error: Error) {
        if self.writer.is_none() && self.reader.is_none() {
            return;
        }
        tracing::warn!(
            error = %error,
            endpoint = ?self.connected_to.as_ref().map(Endpoint::as_str),
            pending = self.correlator.len(),
            "Connection lost"
        );

        self.drop_socket();
        let failed = self.correlator.fail_all(Error::ConnectionClosed);
        if failed > 0 {
            tracing::debug!(failed, "Failed pending requests after disconnect");
        }
        self.set_state(ConnectionState::Disconnected);
        self.record_error(&error);
        self.emit(TransportEvent::Disconnected);
        self.emit(TransportEvent::Error(error));

        self.reconnect_if_needed();
    }

    /// Replace the open socket with one against the updated endpoint
    async fn switch_endpoint(&mut self) {
        tracing::info!(
            from = ?self.connected_to.as_ref().map(Endpoint::as_str),
            to = %self.endpoint,
            "Switching endpoint"
        );

        if let Some(mut writer) = self.writer.take() {
            let _ = writer.send(Message::Close(Some(going_away()))).await;
        }
        self.drop_socket();
        self.correlator.fail_all(Error::ConnectionClosed);
        self.set_state(ConnectionState::Disconnected);
        self.emit(TransportEvent::Disconnected);

        if let Some(dial) = self.dial.take() {
            dial.abort();
        }
        self.switching = true;
        self.restart_reconnect_cycle();
        self.open_socket(Duration::ZERO);
    }

    /// Graceful close; leaves the supervisor disconnected until the next
    /// explicit connect
    async fn close(&mut self) {
        self.closed_by_user = true;
        self.switching = false;
        self.dialing = None;
        if let Some(dial) = self.dial.take() {
            dial.abort();
        }
        self.heartbeat.stop();

        let had_socket = self.writer.is_some();
        if let Some(mut writer) = self.writer.take() {
            self.set_state(ConnectionState::Closing);
            tracing::info!(endpoint = ?self.connected_to.as_ref().map(Endpoint::as_str), "Closing connection");

            if let Err(e) = writer.send(Message::Close(Some(going_away()))).await {
                tracing::debug!(error = %e, "Close frame not sent");
            }

            if let Some(mut reader) = self.reader.take() {
                let acknowledged = async {
                    while let Some(message) = reader.next().await {
                        if matches!(message, Ok(Message::Close(_)) | Err(_)) {
                            break;
                        }
                    }
                };
                if tokio::time::timeout(self.close_timeout, acknowledged)
                    .await
                    .is_err()
                {
                    tracing::debug!(timeout_ms = self.close_timeout.as_millis() as u64, "Close not acknowledged");
                }
            }
        }
        self.drop_socket();

        let failed = self.correlator.fail_all(Error::ConnectionClosed);
        if failed > 0 {
            tracing::debug!(failed, "Failed pending requests on close");
        }
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(Error::ConnectionClosed));
        }
        for outgoing in std::mem::take(&mut self.parked) {
            outgoing.fail(Error::ConnectionClosed);
        }

        self.set_state(ConnectionState::Disconnected);
        if had_socket {
            self.emit(TransportEvent::Disconnected);
        }
    }

    fn drop_socket(&mut self) {
        self.writer = None;
        self.reader = None;
        self.connected_to = None;
        self.heartbeat.stop();
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
        if let Some(ref m) = self.metrics {
            m.update_connection_state(state.as_gauge());
        }
    }

    fn record_error(&self, error: &Error) {
        if let Some(ref m) = self.metrics {
            m.record_error(error.kind());
        }
    }

    fn emit(&self, event: TransportEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

fn going_away() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Away,
        reason: "".into(),
    }
}

async fn next_dial(dial: &mut Option<DialTask>) -> Result<WsStream> {
    match dial {
        Some(task) => match task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("dial task failed: {}", e))),
        },
        None => pending().await,
    }
}

async fn next_frame(
    reader: &mut Option<WsReader>,
) -> Option<std::result::Result<Message, tungstenite::Error>> {
    match reader {
        Some(reader) => reader.next().await,
        None => pending().await,
    }
}
