//! # canvasx-core - Scene model shared by the relay and its editors
//!
//! A [`Snapshot`] is the unit of replication: the whole scene serialized as
//! JSON at one instant. The relay treats it as an opaque value and never
//! looks inside. Editors parse it into the typed [`Scene`] view when they
//! need to apply it.
//!
//! ```text
//! Snapshot (opaque JSON)  ──parse──►  Scene { background, elements[] }
//!         ▲                                   │
//!         └───────────── serialize ───────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod editor;

pub use editor::{ChangeListener, MemoryScene, SceneChange, SceneEditor};

/// Text given to a freshly created text box.
pub const PLACEHOLDER_TEXT: &str = "Click to edit";

/// Background a blank scene is reset to.
pub const DEFAULT_BACKGROUND: &str = "white";

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Element not found: {0}")]
    ElementNotFound(String),
}

/// Full serialized scene at one instant.
///
/// Never partially merged: a newer snapshot replaces an older one wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Value);

impl Snapshot {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// A scene with the default background and no elements.
    pub fn empty() -> Self {
        let mut map = Map::new();
        map.insert("background".into(), Value::String(DEFAULT_BACKGROUND.into()));
        map.insert("elements".into(), Value::Array(Vec::new()));
        Self(Value::Object(map))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Parse into the typed scene view.
    pub fn scene(&self) -> Result<Scene, SceneError> {
        Ok(Scene::deserialize(&self.0)?)
    }

    /// Number of elements, if the value has an `elements` array.
    pub fn element_count(&self) -> Option<usize> {
        self.0.get("elements").and_then(Value::as_array).map(Vec::len)
    }
}

impl From<Value> for Snapshot {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Typed view of a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default = "default_background")]
    pub background: String,
    pub elements: Vec<Element>,
}

fn default_background() -> String {
    DEFAULT_BACKGROUND.to_string()
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            background: default_background(),
            elements: Vec::new(),
        }
    }
}

impl Scene {
    pub fn to_snapshot(&self) -> Result<Snapshot, SceneError> {
        Ok(Snapshot(serde_json::to_value(self)?))
    }

    pub fn is_blank(&self) -> bool {
        self.elements.is_empty()
    }
}

/// One object on the canvas.
///
/// Parsing never rejects an attribute for its type. A known key whose value
/// does not fit the typed field (a gradient object for `fill`, a string
/// `fontSize`) stays in `extra` untouched and is written back as it came.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Element {
    pub id: String,
    /// Serialized as `type`.
    pub kind: String,
    pub bounds: Bounds,
    pub style: Style,
    pub text: Option<String>,
    /// Attributes this model does not know about, or could not type, kept
    /// verbatim.
    pub extra: Map<String, Value>,
}

/// Removes `key` from `map` when `convert` accepts its value; otherwise the
/// value is left where it is.
fn take_typed<T>(
    map: &mut Map<String, Value>,
    key: &str,
    convert: impl FnOnce(&Value) -> Option<T>,
) -> Option<T> {
    let typed = map.get(key).and_then(convert)?;
    map.remove(key);
    Some(typed)
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

impl From<Map<String, Value>> for Element {
    fn from(mut map: Map<String, Value>) -> Self {
        let mut number = |key: &str| take_typed(&mut map, key, Value::as_f64);
        let bounds = Bounds {
            left: number("left").unwrap_or_default(),
            top: number("top").unwrap_or_default(),
            width: number("width").unwrap_or_default(),
            height: number("height").unwrap_or_default(),
            angle: number("angle").unwrap_or_default(),
        };
        let font_size = number("fontSize");
        let opacity = number("opacity");

        Self {
            id: take_typed(&mut map, "id", as_string).unwrap_or_default(),
            kind: take_typed(&mut map, "type", as_string).unwrap_or_else(default_kind),
            bounds,
            style: Style {
                fill: take_typed(&mut map, "fill", as_string),
                stroke: take_typed(&mut map, "stroke", as_string),
                font_family: take_typed(&mut map, "fontFamily", as_string),
                font_size,
                opacity,
            },
            text: take_typed(&mut map, "text", as_string),
            extra: map,
        }
    }
}

impl From<Element> for Map<String, Value> {
    fn from(element: Element) -> Self {
        let mut map = element.extra;
        // Required fields yield to an untyped original under the same key.
        let mut required = |key: &str, value: Value| {
            map.entry(key.to_string()).or_insert(value);
        };
        required("id", Value::from(element.id));
        required("type", Value::from(element.kind));
        required("left", Value::from(element.bounds.left));
        required("top", Value::from(element.bounds.top));
        required("width", Value::from(element.bounds.width));
        required("height", Value::from(element.bounds.height));
        required("angle", Value::from(element.bounds.angle));

        // Optional fields that are set win; an edit replaces the original.
        let optional = [
            ("fill", element.style.fill.map(Value::from)),
            ("stroke", element.style.stroke.map(Value::from)),
            ("fontFamily", element.style.font_family.map(Value::from)),
            ("fontSize", element.style.font_size.map(Value::from)),
            ("opacity", element.style.opacity.map(Value::from)),
            ("text", element.text.map(Value::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.to_string(), value);
            }
        }
        map
    }
}

fn default_kind() -> String {
    "object".to_string()
}

impl Element {
    pub fn new(kind: impl Into<String>, bounds: Bounds) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            bounds,
            style: Style::default(),
            text: None,
            extra: Map::new(),
        }
    }

    /// A text box at `(left, top)` holding the placeholder text.
    pub fn text_box(left: f64, top: f64) -> Self {
        let mut element = Self::new(
            "textbox",
            Bounds {
                left,
                top,
                width: 200.0,
                height: 40.0,
                angle: 0.0,
            },
        );
        element.text = Some(PLACEHOLDER_TEXT.to_string());
        element.style = Style {
            fill: Some("#333".to_string()),
            font_family: Some("Arial".to_string()),
            font_size: Some(16.0),
            ..Style::default()
        };
        element
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Geometry in canvas coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

/// Styling; serialized as `fill`, `stroke`, `fontFamily`, `fontSize` and
/// `opacity`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Style {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<f64>,
    pub opacity: Option<f64>,
}
