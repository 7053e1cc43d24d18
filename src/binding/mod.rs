/// Field bindings: the typed form of a page's `data-*` markup.
///
/// Each bindable element on a page carries a small attribute vocabulary:
///
/// | Attribute       | Meaning                                           |
/// |-----------------|---------------------------------------------------|
/// | `data-path`     | source field, e.g. `eva.telemetry.eva1.temperature` |
/// | `data-format`   | `none`, `time`, `status`, or `numeric`            |
/// | `data-units`    | display suffix (`psi`, `bpm`, ...)                |
/// | `data-action`   | `start`, `reset`, or `stop` for action buttons    |
/// | `data-value`    | boolean literal sent by a generic button          |
/// | `data-decimals` | numeric precision (default 2)                     |
/// | `data-min/max`  | nominal range for the reading                     |
/// | `data-readonly` | `true` to mirror a field without writing it back  |
///
/// The table is built once when a page loads and is read-only afterwards.
pub mod format;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::split_prefix;

/// Default fixed-point precision for numeric readings.
pub const DEFAULT_DECIMALS: usize = 2;

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

/// The element kinds a page can declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementTag {
    /// Any element whose text mirrors a field.
    #[default]
    Text,
    /// `<input type="checkbox">` switch.
    Checkbox,
    /// `<button>`, with or without `data-action`.
    Button,
    /// Sensor lamp coloured by a boolean field.
    Indicator,
}

/// One element as declared in a page's markup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMarkup {
    pub id: String,
    #[serde(default)]
    pub tag: ElementTag,
    /// Every other key is an element attribute (`data-path`, `data-units`, ...).
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementMarkup {
    pub fn new(id: &str, tag: ElementTag) -> Self {
        Self {
            id: id.to_string(),
            tag,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Errors raised while turning markup into bindings.
#[derive(Debug, Error, PartialEq)]
pub enum MarkupError {
    #[error("element '{element}': unknown data-format '{value}'")]
    UnknownFormat { element: String, value: String },
    #[error("element '{element}': unknown data-action '{value}'")]
    UnknownAction { element: String, value: String },
    #[error("element '{element}': {attribute} is not a number: '{value}'")]
    InvalidNumber {
        element: String,
        attribute: String,
        value: String,
    },
    #[error("element '{element}': data-path '{path}' has no source prefix")]
    MissingPrefix { element: String, path: String },
    #[error("element '{element}': data-action requires a button")]
    ActionOnNonButton { element: String },
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Display format hint for text bindings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    None,
    Time,
    Status,
    Numeric,
}

/// What an action button does when clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Reset,
    Stop,
}

impl Action {
    /// Value written to the server for this action.
    pub fn value(self) -> bool {
        matches!(self, Self::Start)
    }
}

/// How a binding reads from and writes to its element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindingKind {
    Text,
    Checkbox,
    Action(Action),
    /// Generic button that sends a fixed boolean literal.
    Button { value: bool },
    Indicator,
}

/// Inclusive nominal operating range for a reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NominalRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NominalRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// A declared association between a field path and one element.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub element: String,
    pub path: String,
    pub kind: BindingKind,
    pub format: Format,
    pub units: Option<String>,
    pub decimals: usize,
    pub range: Option<NominalRange>,
    /// Mirrors its field but never writes it.
    pub readonly: bool,
}

impl FieldBinding {
    pub fn new(element: &str, path: &str, kind: BindingKind) -> Self {
        Self {
            element: element.to_string(),
            path: path.to_string(),
            kind,
            format: Format::None,
            units: None,
            decimals: DEFAULT_DECIMALS,
            range: None,
            readonly: false,
        }
    }

    pub fn into_readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Source prefix of this binding's path (`eva`, `rover`, ...).
    pub fn source_prefix(&self) -> &str {
        split_prefix(&self.path).map_or("", |(prefix, _)| prefix)
    }

    /// Build a binding from element markup.
    ///
    /// Returns `Ok(None)` for elements without `data-path`.
    pub fn from_markup(markup: &ElementMarkup) -> Result<Option<Self>, MarkupError> {
        let Some(path) = markup.get("data-path") else {
            return Ok(None);
        };
        if split_prefix(path).is_none() {
            return Err(MarkupError::MissingPrefix {
                element: markup.id.clone(),
                path: path.to_string(),
            });
        }

        let action = markup
            .get("data-action")
            .map(|value| parse_action(&markup.id, value))
            .transpose()?;

        let kind = match (markup.tag, action) {
            (ElementTag::Button, Some(action)) => BindingKind::Action(action),
            (ElementTag::Button, None) => BindingKind::Button {
                value: markup.get("data-value") == Some("true"),
            },
            (_, Some(_)) => {
                return Err(MarkupError::ActionOnNonButton {
                    element: markup.id.clone(),
                });
            }
            (ElementTag::Checkbox, None) => BindingKind::Checkbox,
            (ElementTag::Indicator, None) => BindingKind::Indicator,
            (ElementTag::Text, None) => BindingKind::Text,
        };

        let format = match markup.get("data-format") {
            None => Format::None,
            Some(value) => parse_format(&markup.id, value)?,
        };

        let decimals = match markup.get("data-decimals") {
            None => DEFAULT_DECIMALS,
            Some(raw) => raw.trim().parse().map_err(|_| MarkupError::InvalidNumber {
                element: markup.id.clone(),
                attribute: "data-decimals".to_string(),
                value: raw.to_string(),
            })?,
        };

        let min = parse_bound(markup, "data-min")?;
        let max = parse_bound(markup, "data-max")?;
        let range = (min.is_some() || max.is_some()).then_some(NominalRange { min, max });

        Ok(Some(Self {
            element: markup.id.clone(),
            path: path.to_string(),
            kind,
            format,
            units: markup
                .get("data-units")
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            decimals,
            range,
            readonly: markup.get("data-readonly") == Some("true"),
        }))
    }
}

fn parse_format(element: &str, value: &str) -> Result<Format, MarkupError> {
    match value.to_ascii_lowercase().as_str() {
        "" | "none" => Ok(Format::None),
        "time" => Ok(Format::Time),
        "status" => Ok(Format::Status),
        "numeric" | "number" => Ok(Format::Numeric),
        _ => Err(MarkupError::UnknownFormat {
            element: element.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_action(element: &str, value: &str) -> Result<Action, MarkupError> {
    match value.to_ascii_lowercase().as_str() {
        "start" => Ok(Action::Start),
        "reset" => Ok(Action::Reset),
        "stop" => Ok(Action::Stop),
        _ => Err(MarkupError::UnknownAction {
            element: element.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_bound(markup: &ElementMarkup, attribute: &str) -> Result<Option<f64>, MarkupError> {
    markup
        .get(attribute)
        .map(|raw| {
            raw.trim().parse::<f64>().map_err(|_| MarkupError::InvalidNumber {
                element: markup.id.clone(),
                attribute: attribute.to_string(),
                value: raw.to_string(),
            })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// Binding table
// ---------------------------------------------------------------------------

/// All bindings declared by one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingTable {
    bindings: Vec<FieldBinding>,
}

impl BindingTable {
    pub fn new(bindings: Vec<FieldBinding>) -> Self {
        Self { bindings }
    }

    /// Build the table from a page's markup, skipping unbound elements.
    pub fn from_markup(elements: &[ElementMarkup]) -> Result<Self, MarkupError> {
        let mut bindings = Vec::with_capacity(elements.len());
        for element in elements {
            if let Some(binding) = FieldBinding::from_markup(element)? {
                bindings.push(binding);
            }
        }
        Ok(Self { bindings })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldBinding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Look up the binding attached to an element id.
    pub fn by_element(&self, element: &str) -> Option<&FieldBinding> {
        self.bindings.iter().find(|b| b.element == element)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
