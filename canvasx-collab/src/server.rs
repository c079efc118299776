//! WebSocket relay server.
//!
//! Architecture:
//! ```text
//! Client A ──┐                        ┌──► Client A
//! Client B ──┼── connection tasks ──► RelayHub ──┼──► Client B
//! Client C ──┘   (decode / encode)    └──► Client C
//! ```
//!
//! Each accepted socket gets its own task. The task turns inbound text
//! frames into hub commands and drains the session's mailbox back out to
//! the socket. The hub itself never touches a socket.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::hub::HubHandle;
use crate::protocol::{ProtocolError, WireEvent};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Frames buffered per session before it is considered stalled
    pub mailbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
            mailbox_capacity: 256,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub malformed_messages: u64,
}

#[derive(Default)]
struct AtomicServerStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    total_messages: AtomicU64,
    total_bytes: AtomicU64,
    malformed_messages: AtomicU64,
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    hub: HubHandle,
    stats: Arc<AtomicServerStats>,
}

impl RelayServer {
    /// Create a server and spawn its hub. Must be called inside a tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let hub = HubHandle::spawn(config.mailbox_capacity);
        Self {
            config,
            hub,
            stats: Arc::new(AtomicServerStats::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind the configured address and serve forever. Only the bind can fail.
    pub async fn run(&self) -> Result<(), ProtocolError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Relay listening on {}", listener.local_addr()?);
        self.serve(listener).await;
        Ok(())
    }

    /// Serve connections from an already-bound listener. Never returns;
    /// accept errors are logged and the loop carries on.
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    match accept_backoff(&e) {
                        Some(delay) => {
                            log::warn!("Accept failed, retrying in {delay:?}: {e}");
                            tokio::time::sleep(delay).await;
                        }
                        None => log::debug!("Accept failed for one connection: {e}"),
                    }
                    continue;
                }
            };
            log::debug!("New TCP connection from {addr}");

            let hub = self.hub.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, hub, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        hub: HubHandle,
        stats: Arc<AtomicServerStats>,
    ) -> Result<(), ProtocolError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (session, mut mailbox) = hub.connect().await?;
        log::info!("WebSocket session {session} established from {addr}");

        stats.total_connections.fetch_add(1, Ordering::Relaxed);
        stats.active_connections.fetch_add(1, Ordering::Relaxed);

        let result = loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            stats.total_messages.fetch_add(1, Ordering::Relaxed);
                            stats.total_bytes.fetch_add(text.as_str().len() as u64, Ordering::Relaxed);

                            let sent = match WireEvent::decode(text.as_str()) {
                                Ok(WireEvent::CanvasUpdate(snapshot)) => hub.update(session, snapshot),
                                Ok(WireEvent::CanvasClear) => hub.clear(session),
                                Err(e) => {
                                    stats.malformed_messages.fetch_add(1, Ordering::Relaxed);
                                    log::warn!("Dropping malformed frame from {session}: {e}");
                                    Ok(())
                                }
                            };
                            if let Err(e) = sent {
                                break Err(e);
                            }
                        }

                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                                break Err(e.into());
                            }
                        }

                        Some(Ok(Message::Binary(_))) => {
                            log::debug!("Ignoring binary frame from {session}");
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break Ok(());
                        }

                        Some(Err(e)) => break Err(e.into()),

                        _ => {}
                    }
                }

                frame = mailbox.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Err(e) = ws_sender.send(Message::Text(frame)).await {
                                break Err(e.into());
                            }
                        }
                        None => {
                            // Hub dropped our mailbox: evicted or shutting down.
                            log::warn!("Session {session} evicted by hub, closing");
                            let _ = ws_sender.send(Message::Close(None)).await;
                            break Ok(());
                        }
                    }
                }
            }
        };

        let _ = hub.disconnect(session);
        stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        result
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            active_connections: self.stats.active_connections.load(Ordering::Relaxed),
            total_messages: self.stats.total_messages.load(Ordering::Relaxed),
            total_bytes: self.stats.total_bytes.load(Ordering::Relaxed),
            malformed_messages: self.stats.malformed_messages.load(Ordering::Relaxed),
        }
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}

/// Pause before the next accept. Errors about a single peer need none;
/// anything else (out of file descriptors, memory) gets a short back-off.
fn accept_backoff(error: &io::Error) -> Option<Duration> {
    match error.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
