/// Snapshots of the telemetry server's JSON data sources.
///
/// Each poll cycle fetches one document per configured source (`EVA`,
/// `ROVER`, `LTV`, `DCU`, `UIA`, `SPEC`, `TEAMS`, or a team-scoped variant
/// of any of them). A successful fetch replaces that source's snapshot
/// wholesale; snapshots are never patched in place.
///
/// Field paths address values across all sources at once: the first
/// segment names the source prefix (`eva.`, `rover.`, `ltv.`) and the rest
/// walks into that source's document.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Walk a dot-separated `path` through `value`.
///
/// Object keys are matched by name; numeric segments index into arrays.
/// Returns `None` for an empty path, a missing key, an out-of-range index,
/// or any attempt to descend into a scalar.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// JavaScript-style truthiness, used wherever a field is read as a flag.
///
/// Missing values, `null`, `false`, `0`, `NaN`, and the empty string are
/// falsy. Everything else (including empty objects and arrays) is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Whether a source lives at the server root or under a team's room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceScope {
    /// `GET /data/<NAME>.json`
    #[default]
    Global,
    /// `GET /data/teams/<room>/<NAME>.json`
    Team,
}

/// One data source polled by a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Upper-case source name as it appears in the URL (`EVA`, `ROVER`, ...).
    pub name: String,
    /// Path prefix used by bindings. Defaults to the lower-cased name.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub scope: SourceScope,
    /// Optional sub-tree of the fetched document to use as the snapshot.
    #[serde(default)]
    pub root: Option<String>,
}

impl SourceSpec {
    pub fn global(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: None,
            scope: SourceScope::Global,
            root: None,
        }
    }

    pub fn team(name: &str) -> Self {
        Self {
            scope: SourceScope::Team,
            ..Self::global(name)
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn with_root(mut self, root: &str) -> Self {
        self.root = Some(root.to_string());
        self
    }

    /// The binding prefix for this source.
    pub fn prefix(&self) -> String {
        self.prefix
            .clone()
            .unwrap_or_else(|| self.name.to_ascii_lowercase())
    }

    /// Build the read URL for this source.
    ///
    /// Team-scoped sources with no selected room read room 0, matching the
    /// server's default team.
    pub fn url(&self, base_url: &str, room: Option<u32>) -> String {
        let base = base_url.trim_end_matches('/');
        match self.scope {
            SourceScope::Global => format!("{base}/data/{}.json", self.name),
            SourceScope::Team => format!(
                "{base}/data/teams/{}/{}.json",
                room.unwrap_or(0),
                self.name
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable JSON document fetched from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    document: Value,
}

impl Snapshot {
    /// Wrap a fetched document, narrowing it to `root` when one is given.
    ///
    /// A root that does not exist yields an empty snapshot on which every
    /// lookup resolves to `None`.
    pub fn from_document(document: Value, root: Option<&str>) -> Self {
        let document = match root {
            Some(root) => resolve_path(&document, root).cloned().unwrap_or(Value::Null),
            None => document,
        };
        Self { document }
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn resolve(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.document, path)
    }
}

/// The latest snapshot of every source, keyed by binding prefix.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSet {
    snapshots: BTreeMap<String, Snapshot>,
}

impl SnapshotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace one source's snapshot wholesale.
    pub fn replace(&mut self, prefix: &str, snapshot: Snapshot) {
        self.snapshots.insert(prefix.to_string(), snapshot);
    }

    pub fn get(&self, prefix: &str) -> Option<&Snapshot> {
        self.snapshots.get(prefix)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Resolve a full field path such as `eva.telemetry.eva1.heart_rate`.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let (prefix, rest) = split_prefix(path)?;
        self.snapshots.get(prefix)?.resolve(rest)
    }
}

/// Split a field path into its source prefix and the in-document remainder.
pub fn split_prefix(path: &str) -> Option<(&str, &str)> {
    path.split_once('.')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
