//! Sync controller: bridges a local [`SceneEditor`] and the relay.
//!
//! ```text
//!  user edit ──► editor ──change──► on_local_change ──(not suppressed)──► outgoing
//!                  ▲
//!                  │ load_snapshot (one at a time)
//!  relay ──► on_remote_update ──► apply queue ──► apply worker
//! ```
//!
//! Two hazards are handled here:
//!
//! - Echo: applying a remote snapshot makes the editor emit change events
//!   that look exactly like user edits. While a remote change is being
//!   applied the controller is in suppressed mode and those events are not
//!   forwarded.
//! - Interleaving: the editor's load is asynchronous and not re-entrant.
//!   Remote snapshots go through a single worker task, so two applies never
//!   overlap and they finish in arrival order.
//!
//! A remote clear is not queued. It is applied immediately, even while an
//! older update is still queued or applying; that update still lands
//! afterwards unless [`ControllerConfig::cancel_pending_on_clear`] is set.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use canvasx_core::{ChangeListener, SceneChange, SceneEditor, SceneError, Snapshot};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::protocol::WireEvent;

#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Discard remote applies queued before a clear instead of letting them
    /// land after it.
    pub cancel_pending_on_clear: bool,
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    /// Remote snapshots waiting for the worker
    QueuedApply,
    /// A remote snapshot is being loaded into the editor
    Applying,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub updates_sent: u64,
    pub clears_sent: u64,
    pub echoes_suppressed: u64,
    pub snapshots_applied: u64,
    pub apply_failures: u64,
    pub applies_cancelled: u64,
}

#[derive(Default)]
struct Counters {
    updates_sent: AtomicU64,
    clears_sent: AtomicU64,
    echoes_suppressed: AtomicU64,
    snapshots_applied: AtomicU64,
    apply_failures: AtomicU64,
    applies_cancelled: AtomicU64,
}

/// Echo suppression mode.
///
/// Entered through [`EchoSuppression::enter`]; the returned guard leaves the
/// mode when dropped, on every exit path. Entries nest, so a clear that
/// arrives while an apply is running cannot end the apply's suppression.
#[derive(Default)]
struct EchoSuppression {
    depth: AtomicUsize,
}

impl EchoSuppression {
    fn enter(&self) -> SuppressionGuard<'_> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        SuppressionGuard { owner: self }
    }

    fn is_active(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

struct SuppressionGuard<'a> {
    owner: &'a EchoSuppression,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.owner.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

enum ApplyTask {
    Apply { snapshot: Snapshot, epoch: u64 },
    Flush(oneshot::Sender<()>),
}

struct Shared<E> {
    editor: Arc<E>,
    outgoing: mpsc::UnboundedSender<WireEvent>,
    suppression: EchoSuppression,
    /// Applies waiting for the worker
    queued: AtomicUsize,
    applying: AtomicBool,
    /// Bumped by each clear when cancellation is enabled
    clear_epoch: AtomicU64,
    config: ControllerConfig,
    counters: Counters,
}

impl<E: SceneEditor> Shared<E> {
    fn on_local_change(&self, change: &SceneChange) {
        if self.suppression.is_active() {
            self.counters.echoes_suppressed.fetch_add(1, Ordering::Relaxed);
            log::trace!("Suppressed echo of remote change ({change:?})");
            return;
        }

        match self.editor.snapshot() {
            Ok(snapshot) => {
                if self.send(WireEvent::CanvasUpdate(snapshot)) {
                    self.counters.updates_sent.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => log::warn!("Could not serialize scene after {change:?}: {e}"),
        }
    }

    fn send(&self, event: WireEvent) -> bool {
        let name = event.name();
        if self.outgoing.send(event).is_err() {
            log::debug!("Dropping outgoing {name}: transport closed");
            return false;
        }
        true
    }

    fn bump_epoch(&self) {
        if self.config.cancel_pending_on_clear {
            self.clear_epoch.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Forwards editor events to the controller without keeping it alive.
struct ListenerBridge<E>(Weak<Shared<E>>);

impl<E: SceneEditor> ChangeListener for ListenerBridge<E> {
    fn scene_changed(&self, change: SceneChange) {
        if let Some(shared) = self.0.upgrade() {
            shared.on_local_change(&change);
        }
    }
}

/// Mediates between one local editor and the relay.
pub struct SyncController<E: SceneEditor> {
    shared: Arc<Shared<E>>,
    apply_tx: mpsc::UnboundedSender<ApplyTask>,
    worker: JoinHandle<()>,
}

impl<E: SceneEditor> SyncController<E> {
    /// Attach to `editor` and start the apply worker.
    ///
    /// Events meant for the relay are pushed into `outgoing`. Must be called
    /// inside a tokio runtime.
    pub fn new(
        editor: Arc<E>,
        outgoing: mpsc::UnboundedSender<WireEvent>,
        config: ControllerConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            editor,
            outgoing,
            suppression: EchoSuppression::default(),
            queued: AtomicUsize::new(0),
            applying: AtomicBool::new(false),
            clear_epoch: AtomicU64::new(0),
            config,
            counters: Counters::default(),
        });
        shared
            .editor
            .set_change_listener(Arc::new(ListenerBridge(Arc::downgrade(&shared))));

        let (apply_tx, apply_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(apply_worker(shared.clone(), apply_rx));

        Self {
            shared,
            apply_tx,
            worker,
        }
    }

    pub fn editor(&self) -> &Arc<E> {
        &self.shared.editor
    }

    /// A change reported by the editor. Forwarded as a full snapshot unless
    /// it was caused by applying a remote change.
    pub fn on_local_change(&self, change: SceneChange) {
        self.shared.on_local_change(&change);
    }

    /// Queue a remote snapshot behind any earlier ones.
    pub fn on_remote_update(&self, snapshot: Snapshot) {
        let epoch = self.shared.clear_epoch.load(Ordering::SeqCst);
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if self
            .apply_tx
            .send(ApplyTask::Apply { snapshot, epoch })
            .is_err()
        {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            log::error!("Apply worker stopped; dropping remote snapshot");
        }
    }

    /// Clear the editor on behalf of a peer. Not queued.
    pub fn on_remote_clear(&self) {
        let _guard = self.shared.suppression.enter();
        self.shared.bump_epoch();
        self.shared.editor.clear();
    }

    /// User-initiated clear: blank locally first, then tell the relay.
    pub fn request_clear(&self) {
        self.shared.bump_epoch();
        self.shared.editor.clear();
        if self.shared.send(WireEvent::CanvasClear) {
            self.shared.counters.clears_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Replace an element's text with an accepted suggestion. The edit is
    /// broadcast through the normal change path.
    pub fn accept_suggestion(&self, element_id: &str, text: &str) -> Result<(), SceneError> {
        self.shared.editor.edit_text(element_id, text)
    }

    /// Resolves once every apply queued before this call has finished.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.apply_tx.send(ApplyTask::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.shared.applying.load(Ordering::SeqCst) {
            ControllerState::Applying
        } else if self.shared.queued.load(Ordering::SeqCst) > 0 {
            ControllerState::QueuedApply
        } else {
            ControllerState::Idle
        }
    }

    /// Whether editor events are currently being treated as echoes.
    pub fn is_suppressing(&self) -> bool {
        self.shared.suppression.is_active()
    }

    pub fn stats(&self) -> ControllerStats {
        let c = &self.shared.counters;
        ControllerStats {
            updates_sent: c.updates_sent.load(Ordering::Relaxed),
            clears_sent: c.clears_sent.load(Ordering::Relaxed),
            echoes_suppressed: c.echoes_suppressed.load(Ordering::Relaxed),
            snapshots_applied: c.snapshots_applied.load(Ordering::Relaxed),
            apply_failures: c.apply_failures.load(Ordering::Relaxed),
            applies_cancelled: c.applies_cancelled.load(Ordering::Relaxed),
        }
    }
}

impl<E: SceneEditor> Drop for SyncController<E> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn apply_worker<E: SceneEditor>(
    shared: Arc<Shared<E>>,
    mut rx: mpsc::UnboundedReceiver<ApplyTask>,
) {
    while let Some(task) = rx.recv().await {
        match task {
            ApplyTask::Apply { snapshot, epoch } => {
                shared.applying.store(true, Ordering::SeqCst);
                shared.queued.fetch_sub(1, Ordering::SeqCst);

                if shared.config.cancel_pending_on_clear
                    && epoch != shared.clear_epoch.load(Ordering::SeqCst)
                {
                    shared.applying.store(false, Ordering::SeqCst);
                    shared.counters.applies_cancelled.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Skipping remote snapshot queued before a clear");
                    continue;
                }

                let result = {
                    let _guard = shared.suppression.enter();
                    shared.editor.load_snapshot(&snapshot).await
                };
                shared.applying.store(false, Ordering::SeqCst);

                match result {
                    Ok(()) => {
                        shared.counters.snapshots_applied.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        shared.counters.apply_failures.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Failed to apply remote snapshot: {e}");
                    }
                }
            }
            ApplyTask::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
