/// Binder: mirrors snapshot fields into page elements.
///
/// For every binding the binder resolves the field path, plans the element
/// updates (a pure function of the binding and the resolved value), and
/// applies them to a [`Document`]. Planning never fails: missing fields
/// render as empty text or unchecked/disabled controls.
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::binding::format::{format_value, sentinel_override};
use crate::binding::{Action, BindingKind, BindingTable, FieldBinding};
use crate::snapshot::{SnapshotSet, is_truthy};

/// Opacity applied to a disabled action button.
pub const DIMMED_OPACITY: f32 = 0.5;

/// Sensor lamp colours.
pub const SENSOR_ACTIVE: &str = "rgba(40, 174, 95, 1)";
pub const SENSOR_INACTIVE: &str = "rgba(100, 100, 100, 1)";

/// Reading colours for bindings with a nominal range.
pub const READING_NOMINAL: &str = "#28ae5f";
pub const READING_OFF_NOMINAL: &str = "#d82121";

// ---------------------------------------------------------------------------
// Element updates
// ---------------------------------------------------------------------------

/// A single change to one element's state.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementUpdate {
    Text(String),
    Checked(bool),
    Enabled { enabled: bool, opacity: f32 },
    Color(String),
}

/// The page surface the binder writes into.
pub trait Document {
    fn apply(&mut self, element: &str, update: &ElementUpdate);
}

/// Observable state of one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementState {
    pub text: Option<String>,
    pub checked: Option<bool>,
    pub enabled: Option<bool>,
    pub opacity: Option<f32>,
    pub color: Option<String>,
}

/// In-memory [`Document`] used by the terminal front end and the tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    elements: BTreeMap<String, ElementState>,
    writes: usize,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&self, id: &str) -> Option<&ElementState> {
        self.elements.get(id)
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.elements.get(id)?.text.as_deref()
    }

    pub fn checked(&self, id: &str) -> Option<bool> {
        self.elements.get(id)?.checked
    }

    pub fn enabled(&self, id: &str) -> Option<bool> {
        self.elements.get(id)?.enabled
    }

    pub fn color(&self, id: &str) -> Option<&str> {
        self.elements.get(id)?.color.as_deref()
    }

    /// Total number of updates applied so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ElementState)> {
        self.elements.iter()
    }
}

impl Document for MemoryDocument {
    fn apply(&mut self, element: &str, update: &ElementUpdate) {
        let state = self.elements.entry(element.to_string()).or_default();
        match update {
            ElementUpdate::Text(text) => state.text = Some(text.clone()),
            ElementUpdate::Checked(checked) => state.checked = Some(*checked),
            ElementUpdate::Enabled { enabled, opacity } => {
                state.enabled = Some(*enabled);
                state.opacity = Some(*opacity);
            }
            ElementUpdate::Color(color) => state.color = Some(color.clone()),
        }
        self.writes += 1;
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Plan the element updates for one binding.
///
/// `guard_open` only matters for start buttons: a start button whose
/// dependency is not satisfied stays disabled even when the field says the
/// process is stopped.
pub fn plan(binding: &FieldBinding, value: Option<&Value>, guard_open: bool) -> Vec<ElementUpdate> {
    if let Some(label) = sentinel_override(&binding.path, value) {
        return vec![ElementUpdate::Text(label.to_string())];
    }

    match binding.kind {
        BindingKind::Checkbox => vec![ElementUpdate::Checked(is_truthy(value))],
        BindingKind::Action(action) => {
            let running = is_truthy(value);
            let enabled = match action {
                Action::Start => !running && guard_open,
                Action::Reset | Action::Stop => running,
            };
            vec![ElementUpdate::Enabled {
                enabled,
                opacity: if enabled { 1.0 } else { DIMMED_OPACITY },
            }]
        }
        BindingKind::Button { .. } => Vec::new(),
        BindingKind::Indicator => {
            let color = if is_truthy(value) { SENSOR_ACTIVE } else { SENSOR_INACTIVE };
            vec![ElementUpdate::Color(color.to_string())]
        }
        BindingKind::Text => {
            let mut updates = vec![ElementUpdate::Text(format_value(binding, value))];
            if let (Some(range), Some(reading)) = (binding.range, value.and_then(Value::as_f64)) {
                let color = if range.contains(reading) {
                    READING_NOMINAL
                } else {
                    READING_OFF_NOMINAL
                };
                updates.push(ElementUpdate::Color(color.to_string()));
            }
            updates
        }
    }
}

// ---------------------------------------------------------------------------
// Binding pass
// ---------------------------------------------------------------------------

/// Applies a binding table to a document.
#[derive(Debug, Default)]
pub struct Binder;

impl Binder {
    /// Bind every field whose source was refreshed this cycle.
    ///
    /// Bindings on sources outside `refreshed` are left untouched so their
    /// elements keep the last good value. Returns the number of bindings
    /// applied.
    pub fn bind<D, G>(
        table: &BindingTable,
        snapshots: &SnapshotSet,
        refreshed: &BTreeSet<String>,
        guard_open: G,
        document: &mut D,
    ) -> usize
    where
        D: Document + ?Sized,
        G: Fn(&FieldBinding) -> bool,
    {
        let mut applied = 0;
        for binding in table.iter() {
            if !refreshed.contains(binding.source_prefix()) {
                continue;
            }
            let value = snapshots.resolve(&binding.path);
            for update in plan(binding, value, guard_open(binding)) {
                document.apply(&binding.element, &update);
            }
            applied += 1;
        }
        applied
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
