//! Sensor/control directory.
//!
//! The hardware provider walks its device tree and publishes an immutable
//! [`DirectorySnapshot`] mapping readable paths (`"CPU / Temperatures / Core 0"`)
//! to elements. When the topology changes it builds a fresh snapshot and
//! swaps it into the [`SharedDirectory`]; readers never see a half-updated
//! map and never hold a lock while talking to hardware.

use super::CollabError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Separator between path segments.
pub const PATH_SEPARATOR: &str = " / ";

/// Read-only numeric reading.
pub trait Sensor: Send + Sync {
    /// Current reading, or `None` if the provider has none yet.
    fn value(&self) -> Option<f64>;
}

/// Writable control (fan duty, pump speed, ...).
///
/// `set` and `reset` touch hardware and must be called on the primary thread.
pub trait Control: Send + Sync {
    /// Current software-set value, or `None` while under automatic control.
    fn value(&self) -> Option<f64>;

    /// Lowest accepted value.
    fn min(&self) -> f64;

    /// Highest accepted value.
    fn max(&self) -> f64;

    /// Switches to software control at `value`.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] if the provider rejects the write.
    fn set(&self, value: f64) -> Result<(), CollabError>;

    /// Hands the control back to automatic mode.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] if the provider rejects the write.
    fn reset(&self) -> Result<(), CollabError>;

    /// Clamps `value` into `[min, max]`.
    fn clamp(&self, value: f64) -> f64 {
        let (lo, hi) = (self.min(), self.max());
        if lo > hi {
            return value;
        }
        value.clamp(lo, hi)
    }
}

/// One named entry in the directory.
#[derive(Clone)]
pub enum Element {
    Sensor(Arc<dyn Sensor>),
    Control(Arc<dyn Control>),
}

impl Element {
    /// Reads the element's current value regardless of kind.
    #[must_use]
    pub fn read(&self) -> Option<f64> {
        match self {
            Self::Sensor(s) => s.value(),
            Self::Control(c) => c.value(),
        }
    }

    /// Returns the control, if this element is one.
    #[must_use]
    pub fn as_control(&self) -> Option<&Arc<dyn Control>> {
        match self {
            Self::Control(c) => Some(c),
            Self::Sensor(_) => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sensor(_) => "sensor",
            Self::Control(_) => "control",
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(self.kind()).field(&self.read()).finish()
    }
}

/// Immutable path → element map.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    elements: BTreeMap<String, Element>,
}

impl DirectorySnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Starts building a new snapshot.
    #[must_use]
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Looks up an element by exact path.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Element> {
        self.elements.get(path)
    }

    /// Looks up an element for reading.
    ///
    /// Controls are readable too, so any element kind is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::NotFound`] if nothing is registered at `path`.
    pub fn sensor(&self, path: &str) -> Result<Element, CollabError> {
        self.lookup(path)
            .cloned()
            .ok_or_else(|| CollabError::NotFound(path.to_string()))
    }

    /// Looks up a writable control.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::NotFound`] for unknown paths and
    /// [`CollabError::WrongKind`] for read-only sensors.
    pub fn control(&self, path: &str) -> Result<Arc<dyn Control>, CollabError> {
        let element = self
            .lookup(path)
            .ok_or_else(|| CollabError::NotFound(path.to_string()))?;
        element
            .as_control()
            .cloned()
            .ok_or_else(|| CollabError::WrongKind {
                path: path.to_string(),
                expected: "control",
            })
    }

    /// Iterates over all paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Builder for [`DirectorySnapshot`].
#[derive(Default)]
pub struct SnapshotBuilder {
    elements: BTreeMap<String, Element>,
}

impl SnapshotBuilder {
    /// Joins path segments with the directory separator.
    ///
    /// ```
    /// use hws_runtime::collab::SnapshotBuilder;
    ///
    /// let path = SnapshotBuilder::path(&["CPU", "Temperatures", "Core 0"]);
    /// assert_eq!(path, "CPU / Temperatures / Core 0");
    /// ```
    #[must_use]
    pub fn path(segments: &[&str]) -> String {
        segments.join(PATH_SEPARATOR)
    }

    /// Registers a read-only sensor.
    #[must_use]
    pub fn sensor(mut self, path: impl Into<String>, sensor: Arc<dyn Sensor>) -> Self {
        self.elements.insert(path.into(), Element::Sensor(sensor));
        self
    }

    /// Registers a writable control.
    #[must_use]
    pub fn control(mut self, path: impl Into<String>, control: Arc<dyn Control>) -> Self {
        self.elements.insert(path.into(), Element::Control(control));
        self
    }

    #[must_use]
    pub fn build(self) -> DirectorySnapshot {
        DirectorySnapshot {
            elements: self.elements,
        }
    }
}

/// Source of the current directory snapshot.
pub trait Directory: Send + Sync {
    /// Returns the snapshot current at call time.
    fn snapshot(&self) -> Arc<DirectorySnapshot>;
}

/// Swap-on-rebuild holder for the current snapshot.
#[derive(Debug, Default)]
pub struct SharedDirectory {
    current: RwLock<Arc<DirectorySnapshot>>,
}

impl SharedDirectory {
    #[must_use]
    pub fn new(snapshot: DirectorySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Replaces the current snapshot. Readers holding the old one keep it.
    pub fn publish(&self, snapshot: DirectorySnapshot) {
        tracing::debug!(elements = snapshot.len(), "Directory snapshot published");
        *self.current.write() = Arc::new(snapshot);
    }
}

impl Directory for SharedDirectory {
    fn snapshot(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&self.current.read())
    }
}
