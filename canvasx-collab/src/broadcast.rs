//! Per-session mailboxes and fan-out.
//!
//! Every connected session owns one bounded mailbox. A relayed frame is
//! encoded once and the same buffer is pushed into each recipient's mailbox,
//! so a slow reader never costs the others a re-encode.
//!
//! A mailbox that is full or whose reader is gone gets its session evicted
//! instead of silently skipping a frame: a session either sees every frame
//! in order or is disconnected and re-syncs from the latest snapshot.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::{Frame, SessionId};

/// Receiving half of a session's mailbox.
pub type Mailbox = mpsc::Receiver<Frame>;

/// Counters for monitoring fan-out health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub sessions_evicted: u64,
    pub active_sessions: usize,
}

/// Result of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub evicted: Vec<SessionId>,
}

/// Registry of live sessions and their mailboxes.
pub struct BroadcastGroup {
    sessions: HashMap<SessionId, mpsc::Sender<Frame>>,
    /// Frames buffered per session before it counts as stalled
    capacity: usize,
    stats: BroadcastStats,
}

impl BroadcastGroup {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            capacity: capacity.max(1),
            stats: BroadcastStats::default(),
        }
    }

    /// Register a session, returning its mailbox.
    ///
    /// Re-adding an existing id replaces (and closes) the old mailbox.
    pub fn add_session(&mut self, session: SessionId) -> Mailbox {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions.insert(session, tx);
        rx
    }

    pub fn remove_session(&mut self, session: &SessionId) -> bool {
        self.sessions.remove(session).is_some()
    }

    /// Deliver to one session.
    pub fn send_to(&mut self, session: SessionId, frame: &Frame) -> Delivery {
        let mut delivery = Delivery::default();
        if let Some(tx) = self.sessions.get(&session) {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivery.delivered = 1,
                Err(e) => {
                    log_failure(session, &e);
                    delivery.evicted.push(session);
                }
            }
        }
        self.settle(&delivery);
        delivery
    }

    /// Deliver to every session, optionally skipping one.
    pub fn broadcast(&mut self, frame: &Frame, except: Option<SessionId>) -> Delivery {
        let mut delivery = Delivery::default();
        for (&session, tx) in &self.sessions {
            if Some(session) == except {
                continue;
            }
            match tx.try_send(frame.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    log_failure(session, &e);
                    delivery.evicted.push(session);
                }
            }
        }
        self.settle(&delivery);
        delivery
    }

    fn settle(&mut self, delivery: &Delivery) {
        self.stats.frames_delivered += delivery.delivered as u64;
        self.stats.frames_dropped += delivery.evicted.len() as u64;
        for session in &delivery.evicted {
            if self.sessions.remove(session).is_some() {
                self.stats.sessions_evicted += 1;
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, session: &SessionId) -> bool {
        self.sessions.contains_key(session)
    }

    pub fn sessions(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            active_sessions: self.sessions.len(),
            ..self.stats.clone()
        }
    }
}

fn log_failure(session: SessionId, error: &TrySendError<Frame>) {
    match error {
        TrySendError::Full(_) => {
            log::warn!("Session {session} mailbox full, evicting");
        }
        TrySendError::Closed(_) => {
            log::debug!("Session {session} mailbox closed, evicting");
        }
    }
}
