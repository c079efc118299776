//! Relay hub: single owner of the latest shared snapshot.
//!
//! ```text
//! conn A ──┐                         ┌──► mailbox A
//! conn B ──┼── HubCommand (mpsc) ──► RelayHub ──┼──► mailbox B
//! conn C ──┘      one event loop     └──► mailbox C
//! ```
//!
//! Every operation runs on the hub's own task, one command at a time, so
//! state replacement and fan-out are never interleaved. That alone gives all
//! sessions the same total order of updates and clears; there is no lock
//! around the shared snapshot because nothing else can reach it.

use canvasx_core::Snapshot;
use tokio::sync::{mpsc, oneshot};

use crate::broadcast::{BroadcastGroup, BroadcastStats, Mailbox};
use crate::protocol::{ProtocolError, SessionId, WireEvent};

/// Hub counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    pub updates: u64,
    pub clears: u64,
    pub initial_syncs: u64,
    pub has_snapshot: bool,
    pub broadcast: BroadcastStats,
}

/// The hub state machine. Driven by [`HubHandle`] in production; tests can
/// call the operations directly.
pub struct RelayHub {
    /// Latest shared snapshot (None = empty)
    shared: Option<Snapshot>,
    group: BroadcastGroup,
    updates: u64,
    clears: u64,
    initial_syncs: u64,
}

impl RelayHub {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            shared: None,
            group: BroadcastGroup::new(mailbox_capacity),
            updates: 0,
            clears: 0,
            initial_syncs: 0,
        }
    }

    /// Register a session. A late joiner is sent the current snapshot, and
    /// only that session receives it.
    pub fn on_connect(&mut self, session: SessionId) -> Mailbox {
        let mailbox = self.group.add_session(session);
        log::info!("Session {session} connected ({} live)", self.group.session_count());

        if let Some(snapshot) = &self.shared {
            match WireEvent::CanvasUpdate(snapshot.clone()).to_frame() {
                Ok(frame) => {
                    self.group.send_to(session, &frame);
                    self.initial_syncs += 1;
                }
                Err(e) => log::error!("Failed to encode initial snapshot for {session}: {e}"),
            }
        }
        mailbox
    }

    /// Last writer wins: replace the shared snapshot and relay it to every
    /// session except the sender. The payload is not validated.
    pub fn on_update(&mut self, session: SessionId, snapshot: Snapshot) {
        let event = WireEvent::CanvasUpdate(snapshot);
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to encode update from {session}: {e}");
                return;
            }
        };
        if let WireEvent::CanvasUpdate(snapshot) = event {
            self.shared = Some(snapshot);
        }
        self.updates += 1;

        let delivery = self.group.broadcast(&frame, Some(session));
        log::debug!(
            "Relayed update from {session} to {} session(s)",
            delivery.delivered
        );
    }

    /// Reset the shared snapshot and tell everyone, the requester included.
    pub fn on_clear(&mut self, session: SessionId) {
        self.shared = None;
        self.clears += 1;

        match WireEvent::CanvasClear.to_frame() {
            Ok(frame) => {
                let delivery = self.group.broadcast(&frame, None);
                log::debug!(
                    "Clear from {session} sent to {} session(s)",
                    delivery.delivered
                );
            }
            Err(e) => log::error!("Failed to encode clear: {e}"),
        }
    }

    pub fn on_disconnect(&mut self, session: SessionId) {
        if self.group.remove_session(&session) {
            log::info!("Session {session} disconnected ({} live)", self.group.session_count());
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.shared.as_ref()
    }

    pub fn session_count(&self) -> usize {
        self.group.session_count()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.group.session_count(),
            updates: self.updates,
            clears: self.clears,
            initial_syncs: self.initial_syncs,
            has_snapshot: self.shared.is_some(),
            broadcast: self.group.stats(),
        }
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect { session, reply } => {
                let mailbox = self.on_connect(session);
                if reply.send(mailbox).is_err() {
                    // Connection task gave up while waiting.
                    self.on_disconnect(session);
                }
            }
            HubCommand::Update { session, snapshot } => self.on_update(session, snapshot),
            HubCommand::Clear { session } => self.on_clear(session),
            HubCommand::Disconnect { session } => self.on_disconnect(session),
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.shared.clone());
            }
            HubCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }
}

enum HubCommand {
    Connect {
        session: SessionId,
        reply: oneshot::Sender<Mailbox>,
    },
    Update {
        session: SessionId,
        snapshot: Snapshot,
    },
    Clear {
        session: SessionId,
    },
    Disconnect {
        session: SessionId,
    },
    Snapshot {
        reply: oneshot::Sender<Option<Snapshot>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Cloneable handle to a running hub.
///
/// The hub task exits once every handle is dropped.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Spawn a hub on the current tokio runtime.
    pub fn spawn(mailbox_capacity: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(RelayHub::new(mailbox_capacity), rx));
        Self { tx }
    }

    fn send(&self, command: HubCommand) -> Result<(), ProtocolError> {
        self.tx.send(command).map_err(|_| ProtocolError::HubStopped)
    }

    /// Open a new session.
    pub async fn connect(&self) -> Result<(SessionId, Mailbox), ProtocolError> {
        let session = SessionId::new();
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Connect { session, reply })?;
        let mailbox = rx.await.map_err(|_| ProtocolError::HubStopped)?;
        Ok((session, mailbox))
    }

    pub fn update(&self, session: SessionId, snapshot: Snapshot) -> Result<(), ProtocolError> {
        self.send(HubCommand::Update { session, snapshot })
    }

    pub fn clear(&self, session: SessionId) -> Result<(), ProtocolError> {
        self.send(HubCommand::Clear { session })
    }

    pub fn disconnect(&self, session: SessionId) -> Result<(), ProtocolError> {
        self.send(HubCommand::Disconnect { session })
    }

    /// Current shared snapshot, as of every command queued before this call.
    pub async fn snapshot(&self) -> Result<Option<Snapshot>, ProtocolError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply })?;
        rx.await.map_err(|_| ProtocolError::HubStopped)
    }

    pub async fn stats(&self) -> Result<HubStats, ProtocolError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply })?;
        rx.await.map_err(|_| ProtocolError::HubStopped)
    }
}

async fn run(mut hub: RelayHub, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
    log::debug!("Relay hub started");
    while let Some(command) = rx.recv().await {
        hub.handle(command);
    }
    log::debug!("Relay hub stopped");
}
