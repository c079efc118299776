//! JSON wire protocol between editors and the relay.
//!
//! Wire format (one WebSocket text frame per event):
//! ```text
//! {"event":"canvas-update","data":<snapshot>}
//! {"event":"canvas-clear"}
//! ```
//!
//! The snapshot is carried as an opaque JSON value. Nothing on the relay
//! side inspects it, so a malformed scene is relayed exactly as received.

use std::fmt;

use canvasx_core::Snapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, Utf8Bytes};
use uuid::Uuid;

/// A pre-encoded event, shared by every recipient of one relay.
pub type Frame = Utf8Bytes;

/// Identity of one live connection, assigned by the relay at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Events exchanged over the persistent connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum WireEvent {
    /// Client→relay: local change. Relay→client: a peer's change.
    CanvasUpdate(Snapshot),
    /// Client→relay: clear request. Relay→client: clear, sent to everyone.
    CanvasClear,
}

impl WireEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CanvasUpdate(_) => "canvas-update",
            Self::CanvasClear => "canvas-clear",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Serialization)
    }

    /// Encode once into a frame that can be handed to many sessions.
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        self.encode().map(Frame::from)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Deserialization)
    }
}

/// Protocol and transport errors.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("Deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Relay hub is not running")]
    HubStopped,
    #[error("Client already connected")]
    AlreadyConnected,
}
