//! # canvasx-collab - Real-time canvas replication for CanvasX
//!
//! Whole-snapshot, last-writer-wins replication between one relay and any
//! number of editors.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐    WebSocket     ┌───────────────┐
//! │ SyncClient    │ ◄──────────────► │ RelayServer   │
//! │ (per editor)  │    JSON events   │ (central)     │
//! └──────┬────────┘                  └──────┬────────┘
//!        │                                  │
//!        ▼                                  ▼
//! ┌───────────────┐                  ┌───────────────┐
//! │SyncController │                  │ RelayHub      │
//! │ echo guard +  │                  │ latest        │
//! │ apply queue   │                  │ snapshot      │
//! └──────┬────────┘                  └──────┬────────┘
//!        │                                  │
//!        ▼                          ┌───────┴────────┐
//! ┌───────────────┐                 │ BroadcastGroup │
//! │ SceneEditor   │                 │ (mailboxes)    │
//! └───────────────┘                 └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - JSON wire events (`canvas-update`, `canvas-clear`)
//! - [`broadcast`] - Per-session mailboxes and fan-out
//! - [`hub`] - Single-task owner of the shared snapshot
//! - [`server`] - WebSocket relay server
//! - [`controller`] - Echo suppression and serialized remote applies
//! - [`client`] - WebSocket client driving a controller
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Total order of updates/clears | one hub task processes every command |
//! | Late joiners start from latest state | snapshot pushed inside connect |
//! | No echo of applied snapshots | suppression guard around each apply |
//! | Applies never overlap | single apply worker per controller |

pub mod protocol;
pub mod broadcast;
pub mod hub;
pub mod server;
pub mod controller;
pub mod client;

// Re-exports for convenience
pub use protocol::{Frame, ProtocolError, SessionId, WireEvent};
pub use broadcast::{BroadcastGroup, BroadcastStats, Delivery, Mailbox};
pub use hub::{HubHandle, HubStats, RelayHub};
pub use server::{RelayServer, ServerConfig, ServerStats};
pub use controller::{ControllerConfig, ControllerState, ControllerStats, SyncController};
pub use client::{ConnectionState, SyncClient, SyncEvent};
