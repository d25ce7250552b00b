//! Common test utilities for linkwire-client integration tests
//!
//! A lightweight WebSocket server speaking the `{op, data}` envelope, with
//! knobs to push frames, drop connections and stop answering pings.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone)]
enum Control {
    Push(String),
    Drop,
    Stall,
}

/// Mock WebSocket server for client testing
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    message_rx: mpsc::Receiver<String>,
    control: broadcast::Sender<Control>,
    accepted: Arc<AtomicUsize>,
    close_frames: Arc<Mutex<Vec<Option<CloseFrame<'static>>>>>,
}

impl MockWsServer {
    /// Start a server that never replies
    pub async fn silent() -> Self {
        Self::with_handler(|_frame| async move { None }).await
    }

    /// Start a silent server on a specific address
    pub async fn silent_at(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener, |_frame| async move { None })
    }

    /// Start a server that answers each text frame with `handler`'s output
    pub async fn with_handler<F, Fut>(handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, handler)
    }

    fn serve<F, Fut>(listener: TcpListener, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<String>> + Send + 'static,
    {
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, msg_rx) = mpsc::channel::<String>(100);
        let (control, _) = broadcast::channel::<Control>(16);
        let accepted = Arc::new(AtomicUsize::new(0));
        let close_frames = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let server_control = control.clone();
        let server_accepted = accepted.clone();
        let server_close_frames = close_frames.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let msg_tx = msg_tx.clone();
                        let handler = handler.clone();
                        let mut control_rx = server_control.subscribe();
                        let accepted = server_accepted.clone();
                        let close_frames = server_close_frames.clone();

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            accepted.fetch_add(1, Ordering::SeqCst);
                            let (mut write, mut read) = ws_stream.split();
                            let mut stalled = false;

                            loop {
                                tokio::select! {
                                    incoming = read.next(), if !stalled => match incoming {
                                        Some(Ok(Message::Text(text))) => {
                                            let _ = msg_tx.send(text.clone()).await;
                                            if let Some(response) = handler(text).await {
                                                let _ = write.send(Message::Text(response)).await;
                                            }
                                        }
                                        Some(Ok(Message::Close(frame))) => {
                                            close_frames.lock().unwrap().push(frame);
                                        }
                                        Some(Ok(_)) => {}
                                        Some(Err(_)) | None => break,
                                    },
                                    control = control_rx.recv() => match control {
                                        Ok(Control::Push(text)) => {
                                            let _ = write.send(Message::Text(text)).await;
                                        }
                                        Ok(Control::Stall) => stalled = true,
                                        Ok(Control::Drop) | Err(_) => break,
                                    },
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            message_rx: msg_rx,
            control,
            accepted,
            close_frames,
        }
    }

    /// WebSocket URL of this server
    pub fn url(&self) -> String {
        format!("ws://{}/api/v2/ws", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of WebSocket handshakes completed so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Next text frame received from any client, or `None` after 5s
    pub async fn wait_for_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Close frames received so far, in arrival order
    pub fn close_frames(&self) -> Vec<Option<CloseFrame<'static>>> {
        self.close_frames.lock().unwrap().clone()
    }

    /// Send a frame to every connected client
    pub fn push(&self, frame: String) {
        let _ = self.control.send(Control::Push(frame));
    }

    /// Drop every connection without a close handshake
    pub fn drop_connections(&self) {
        let _ = self.control.send(Control::Drop);
    }

    /// Stop reading on every connection, so pings go unanswered
    pub fn stall(&self) {
        let _ = self.control.send(Control::Stall);
    }

    /// Stop accepting; open connections are dropped too
    pub async fn shutdown(self) {
        self.drop_connections();
        let _ = self.shutdown_tx.send(()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Success envelope
pub fn mock_reply(op: &str, data: Value) -> String {
    serde_json::json!({ "op": op, "data": data }).to_string()
}

/// Error envelope without an `op`
pub fn mock_error(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

/// Parse an outbound frame into its `op` and `data`
pub fn parse_frame(frame: &str) -> (String, Value) {
    let value: Value = serde_json::from_str(frame).unwrap();
    let op = value["op"].as_str().unwrap_or_default().to_string();
    (op, value["data"].clone())
}

/// Poll `condition` every 10ms until it holds or `within` elapses
pub async fn eventually<F: Fn() -> bool>(within: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
