//! WebSocket client that connects a local editor to the relay.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - A [`SyncController`] wired to the socket in both directions
//! - An event stream for the application (connected, remote update, ...)
//!
//! There is no offline queue and no retry: anything sent while the socket is
//! down is dropped, and a reconnecting editor re-syncs from the snapshot the
//! relay pushes at connect time.

use std::sync::Arc;

use canvasx_core::{SceneEditor, Snapshot};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::controller::{ControllerConfig, SyncController};
use crate::protocol::{ProtocolError, WireEvent};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// A peer's snapshot was queued for applying
    RemoteUpdate(Snapshot),
    /// A clear was applied
    RemoteClear,
}

/// The sync client.
pub struct SyncClient<E: SceneEditor> {
    server_url: String,
    controller: Arc<SyncController<E>>,
    /// Held until connect hands it to the writer task
    outgoing_rx: Option<mpsc::UnboundedReceiver<WireEvent>>,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: mpsc::Sender<SyncEvent>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<E: SceneEditor> SyncClient<E> {
    /// Create a client for `editor`. Must be called inside a tokio runtime.
    pub fn new(server_url: impl Into<String>, editor: Arc<E>, config: ControllerConfig) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            controller: Arc::new(SyncController::new(editor, outgoing_tx, config)),
            outgoing_rx: Some(outgoing_rx),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_tx,
            event_rx: Some(event_rx),
            tasks: Vec::new(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect to the relay and start the reader and writer tasks.
    ///
    /// A client connects once; build a new client to reconnect.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        let mut outgoing_rx = self
            .outgoing_rx
            .take()
            .ok_or(ProtocolError::AlreadyConnected)?;
        *self.state.write().await = ConnectionState::Connecting;

        let ws_stream = match tokio_tungstenite::connect_async(self.server_url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                self.outgoing_rx = Some(outgoing_rx);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let mut stale = 0usize;
        while outgoing_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            log::debug!("Discarded {stale} event(s) produced while offline");
        }

        // Writer task: forward controller output to the socket.
        let writer = tokio::spawn(async move {
            while let Some(event) = outgoing_rx.recv().await {
                let frame = match event.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::error!("Failed to encode {}: {e}", event.name());
                        continue;
                    }
                };
                if let Err(e) = ws_writer.send(Message::Text(frame)).await {
                    log::warn!("Send failed, stopping writer: {e}");
                    break;
                }
            }
        });

        *self.state.write().await = ConnectionState::Connected;
        notify(&self.event_tx, SyncEvent::Connected);
        log::info!("Connected to relay at {}", self.server_url);

        // Reader task: dispatch relay events to the controller.
        let controller = self.controller.clone();
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match WireEvent::decode(text.as_str()) {
                        Ok(WireEvent::CanvasUpdate(snapshot)) => {
                            controller.on_remote_update(snapshot.clone());
                            notify(&event_tx, SyncEvent::RemoteUpdate(snapshot));
                        }
                        Ok(WireEvent::CanvasClear) => {
                            controller.on_remote_clear();
                            notify(&event_tx, SyncEvent::RemoteClear);
                        }
                        Err(e) => log::warn!("Ignoring malformed frame from relay: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            notify(&event_tx, SyncEvent::Disconnected);
            log::info!("Disconnected from relay");
        });

        self.tasks.push(writer);
        self.tasks.push(reader);
        Ok(())
    }

    /// Drop the connection. Pending outgoing events are discarded.
    pub async fn disconnect(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let mut state = self.state.write().await;
        if *state != ConnectionState::Disconnected {
            *state = ConnectionState::Disconnected;
            notify(&self.event_tx, SyncEvent::Disconnected);
        }
    }

    pub fn controller(&self) -> &SyncController<E> {
        &self.controller
    }

    pub fn editor(&self) -> &Arc<E> {
        self.controller.editor()
    }

    /// Clear locally and ask the relay to clear everyone.
    pub fn request_clear(&self) {
        self.controller.request_clear();
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

impl<E: SceneEditor> Drop for SyncClient<E> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Application events are informational; a full queue drops them.
fn notify(tx: &mpsc::Sender<SyncEvent>, event: SyncEvent) {
    if tx.try_send(event).is_err() {
        log::trace!("Sync event dropped (receiver full or gone)");
    }
}
