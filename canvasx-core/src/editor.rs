//! Editor capability and an in-memory implementation.
//!
//! The sync layer only needs four things from an editor: serialize the whole
//! scene, replace the whole scene (asynchronously), reset to blank, and tell
//! someone when an element was added, modified or had its text edited.
//! [`SceneEditor`] is that seam. [`MemoryScene`] implements it without any
//! rendering and is what headless clients and tests drive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{Element, Scene, SceneError, Snapshot, DEFAULT_BACKGROUND};

/// Change notifications emitted by an editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneChange {
    Added(String),
    Modified(String),
    TextEdited(String),
}

impl SceneChange {
    pub fn element_id(&self) -> &str {
        match self {
            Self::Added(id) | Self::Modified(id) | Self::TextEdited(id) => id,
        }
    }
}

/// Observer of editor changes.
///
/// Called synchronously on the task that made the change, so the observer
/// sees the editor's state as of that change.
pub trait ChangeListener: Send + Sync {
    fn scene_changed(&self, change: SceneChange);
}

/// What the sync layer requires of a scene-graph editor.
#[async_trait]
pub trait SceneEditor: Send + Sync + 'static {
    /// Serialize the full current state.
    fn snapshot(&self) -> Result<Snapshot, SceneError>;

    /// Replace the whole scene with `snapshot`. Resolves once the
    /// replacement is complete. Not safe to call re-entrantly.
    async fn load_snapshot(&self, snapshot: &Snapshot) -> Result<(), SceneError>;

    /// Reset to the blank scene. Emits no change event.
    fn clear(&self);

    /// Replace the text of one element.
    fn edit_text(&self, id: &str, text: &str) -> Result<(), SceneError>;

    /// Install the single change observer, replacing any previous one.
    fn set_change_listener(&self, listener: Arc<dyn ChangeListener>);
}

/// Headless editor holding the scene in memory.
pub struct MemoryScene {
    scene: Mutex<Scene>,
    listener: Mutex<Option<Arc<dyn ChangeListener>>>,
    /// Loads currently in progress
    loading: AtomicUsize,
    /// Highest number of loads ever observed in progress at once
    peak_loading: AtomicUsize,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScene {
    pub fn new() -> Self {
        Self {
            scene: Mutex::new(Scene::default()),
            listener: Mutex::new(None),
            loading: AtomicUsize::new(0),
            peak_loading: AtomicUsize::new(0),
        }
    }

    fn lock_scene(&self) -> MutexGuard<'_, Scene> {
        self.scene.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, change: SceneChange) {
        // Clone out so the listener can call back into the scene.
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.scene_changed(change);
        }
    }

    /// Add an element, as a user drawing on the canvas would.
    pub fn add_element(&self, element: Element) -> String {
        let id = element.id.clone();
        self.lock_scene().elements.push(element);
        self.notify(SceneChange::Added(id.clone()));
        id
    }

    /// Add a placeholder text box at `(left, top)`.
    pub fn add_text_box(&self, left: f64, top: f64) -> String {
        self.add_element(Element::text_box(left, top))
    }

    /// Mutate one element in place (move, resize, restyle).
    pub fn modify_element(
        &self,
        id: &str,
        modify: impl FnOnce(&mut Element),
    ) -> Result<(), SceneError> {
        {
            let mut scene = self.lock_scene();
            let element = scene
                .elements
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| SceneError::ElementNotFound(id.to_string()))?;
            modify(element);
        }
        self.notify(SceneChange::Modified(id.to_string()));
        Ok(())
    }

    pub fn elements(&self) -> Vec<Element> {
        self.lock_scene().elements.clone()
    }

    pub fn element(&self, id: &str) -> Option<Element> {
        self.lock_scene().elements.iter().find(|e| e.id == id).cloned()
    }

    pub fn scene(&self) -> Scene {
        self.lock_scene().clone()
    }

    pub fn is_blank(&self) -> bool {
        self.lock_scene().is_blank()
    }

    /// Highest number of overlapping `load_snapshot` calls seen so far.
    pub fn peak_concurrent_loads(&self) -> usize {
        self.peak_loading.load(Ordering::SeqCst)
    }
}

/// Counts one in-progress load; a load dropped halfway still counts down.
struct LoadGuard<'a> {
    counter: &'a AtomicUsize,
    /// Loads in progress, this one included, when it started
    depth: usize,
}

impl<'a> LoadGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let depth = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, depth }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SceneEditor for MemoryScene {
    fn snapshot(&self) -> Result<Snapshot, SceneError> {
        self.lock_scene().to_snapshot()
    }

    async fn load_snapshot(&self, snapshot: &Snapshot) -> Result<(), SceneError> {
        let incoming = snapshot.scene()?;

        let loading = LoadGuard::enter(&self.loading);
        let depth = loading.depth;
        self.peak_loading.fetch_max(depth, Ordering::SeqCst);
        if depth > 1 {
            log::error!("Overlapping snapshot loads ({depth} in progress)");
        }

        {
            let mut scene = self.lock_scene();
            scene.background = incoming.background;
            scene.elements.clear();
        }

        // Objects are materialized one at a time, yielding in between, the
        // way a rendering toolkit hydrates a serialized canvas.
        for element in incoming.elements {
            let id = element.id.clone();
            self.lock_scene().elements.push(element);
            self.notify(SceneChange::Added(id));
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn clear(&self) {
        let mut scene = self.lock_scene();
        scene.elements.clear();
        scene.background = DEFAULT_BACKGROUND.to_string();
    }

    fn edit_text(&self, id: &str, text: &str) -> Result<(), SceneError> {
        {
            let mut scene = self.lock_scene();
            let element = scene
                .elements
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| SceneError::ElementNotFound(id.to_string()))?;
            element.text = Some(text.to_string());
        }
        self.notify(SceneChange::TextEdited(id.to_string()));
        Ok(())
    }

    fn set_change_listener(&self, listener: Arc<dyn ChangeListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }
}
