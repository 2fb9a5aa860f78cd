//! WebSocket sync agent.
//!
//! Provides:
//! - Connection lifecycle (connect, reconnect with backoff, close)
//! - Outgoing messages from local intents
//! - Remote events applied to the shared [`Replica`]
//!
//! Every (re)connection is a fresh participant: the server opens it with
//! `initialState`, which replaces the replica wholesale. The agent reports
//! [`ConnectionState::Connected`] only once that snapshot is applied.
//! Messages produced before that point were built on the replaced mirror
//! and are dropped rather than replayed onto the new snapshot.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use whiteboard_core::{ClientMessage, ProtocolError, ServerMessage, SyncProtocol};

use crate::event::MirrorEvent;
use crate::replica::{Replica, DEFAULT_PAGE_COUNT};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Client is closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket open and the server snapshot applied
    Connected,
    Reconnecting,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    State(ConnectionState),
    Mirror(MirrorEvent),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:5000/ws`
    pub url: String,
    pub page_count: usize,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page_count: DEFAULT_PAGE_COUNT,
            reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(10),
        }
    }

    pub fn with_page_count(mut self, page_count: usize) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }
}

/// Handle to a running sync agent.
///
/// The connection runs on a background task; this handle applies local
/// intents to the replica and queues the resulting messages.
pub struct SyncClient {
    replica: Arc<Mutex<Replica>>,
    outgoing_tx: mpsc::UnboundedSender<ClientMessage>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    event_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    task: JoinHandle<()>,
}

impl SyncClient {
    /// Start connecting in the background.
    pub fn spawn(config: ClientConfig) -> Self {
        let replica = Arc::new(Mutex::new(Replica::new(config.page_count)));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let agent = Agent {
            config,
            replica: replica.clone(),
            outgoing_rx,
            event_tx,
            state_tx,
            shutdown_rx,
        };
        let task = tokio::spawn(agent.run());

        Self {
            replica,
            outgoing_tx,
            state_rx,
            shutdown_tx,
            event_rx: Some(event_rx),
            task,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Run a local intent against the replica and send what it produces.
    ///
    /// The replica lock is held until the message is queued, so outgoing
    /// order always matches local application order.
    pub fn act<F>(&self, intent: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut Replica) -> Option<ClientMessage>,
    {
        let mut replica = self.replica.lock();
        if let Some(msg) = intent(&mut replica) {
            debug!("Queueing {}", msg.event_name());
            self.outgoing_tx.send(msg).map_err(|_| ClientError::Closed)?;
        }
        Ok(())
    }

    /// Place an image on the current page
    pub fn insert_image(
        &self,
        natural_width: f64,
        natural_height: f64,
        image_url: impl Into<String>,
    ) -> Result<(), ClientError> {
        let mut replica = self.replica.lock();
        let msg = replica.insert_image(natural_width, natural_height, image_url)?;
        self.outgoing_tx.send(msg).map_err(|_| ClientError::Closed)
    }

    /// Read the replica
    pub fn read<R>(&self, f: impl FnOnce(&Replica) -> R) -> R {
        f(&self.replica.lock())
    }

    /// Ask the server for a fresh snapshot
    pub fn request_state(&self) -> Result<(), ClientError> {
        self.act(|replica| Some(replica.request_state()))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Wait until the connection reaches `target`.
    pub async fn wait_for(&self, target: ConnectionState) -> Result<(), ClientError> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    /// Close the connection and stop reconnecting.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Sync task ended abnormally: {}", e);
        }
    }
}

/// How a session ended
#[derive(Debug, PartialEq)]
enum SessionEnd {
    Lost,
    Shutdown,
}

/// Background side of [`SyncClient`]
struct Agent {
    config: ClientConfig,
    replica: Arc<Mutex<Replica>>,
    outgoing_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Agent {
    async fn run(mut self) {
        let mut delay = self.config.reconnect_delay;
        let mut first_attempt = true;

        while !*self.shutdown_rx.borrow() {
            self.set_state(if first_attempt {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            first_attempt = false;

            match self.connect().await {
                Ok(socket) => {
                    delay = self.config.reconnect_delay;
                    let end = self.session(socket).await;
                    self.set_state(ConnectionState::Disconnected);
                    if end == SessionEnd::Shutdown {
                        break;
                    }
                    info!("Connection to {} lost, reconnecting", self.config.url);
                }
                Err(e) => warn!("{}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_rx.changed() => break,
            }
            delay = (delay * 2).min(self.config.max_reconnect_delay);
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("Sync agent stopped");
    }

    async fn connect(&self) -> Result<Socket, ClientError> {
        let (socket, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        info!("Connected to {}", self.config.url);
        Ok(socket)
    }

    /// Drive one connection until it drops or the client shuts down.
    ///
    /// Outgoing messages stay queued until the session's first snapshot
    /// has been applied.
    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let mut synced = false;

        loop {
            tokio::select! {
                frame = ws_receiver.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if self.handle_text(&text, synced) {
                            synced = true;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        return SessionEnd::Lost;
                    }
                },

                outgoing = self.outgoing_rx.recv(), if synced => match outgoing {
                    Some(msg) => match SyncProtocol::encode_client(&msg) {
                        Ok(text) => {
                            if ws_sender.send(Message::Text(text)).await.is_err() {
                                return SessionEnd::Lost;
                            }
                        }
                        Err(e) => warn!("Failed to encode message: {}", e),
                    },
                    // Every SyncClient handle is gone
                    None => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                },

                _ = self.shutdown_rx.changed() => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Apply one server frame; returns true if it completed the session
    /// handshake.
    fn handle_text(&mut self, text: &str, synced: bool) -> bool {
        let msg = match SyncProtocol::decode_server(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Ignoring server frame: {}", e);
                return false;
            }
        };
        let handshake = !synced && matches!(msg, ServerMessage::InitialState { .. });

        let shared = self.replica.clone();
        let mut replica = shared.lock();
        let events = replica.apply_remote(msg);
        if handshake {
            // Intents queue under the replica lock, so everything queued now
            // predates the snapshot just applied
            self.discard_stale_outgoing();
        }
        drop(replica);

        if handshake {
            self.set_state(ConnectionState::Connected);
        }
        for event in events {
            let _ = self.event_tx.send(SyncEvent::Mirror(event));
        }
        handshake
    }

    fn discard_stale_outgoing(&mut self) {
        let mut dropped = 0;
        while self.outgoing_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Dropped {} messages queued while disconnected", dropped);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            self.state_tx.send_replace(state);
            let _ = self.event_tx.send(SyncEvent::State(state));
        }
    }
}
