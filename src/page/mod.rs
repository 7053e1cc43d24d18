/// Page tables: what a console page polls, shows, and guards.
///
/// A page is plain TOML: its sources, its bound elements (in the same
/// `data-*` attribute vocabulary the markup uses), the guards on its start
/// actions, and its header indicators. Four pages ship built in; any other
/// page can be loaded from a file.
pub mod session;

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub use session::PageSession;

use crate::binding::{BindingTable, ElementMarkup};
use crate::snapshot::{SourceScope, SourceSpec};
use crate::writer::ActionGuard;

const INDEX_PAGE: &str = include_str!("pages/index.toml");
const DCU_PAGE: &str = include_str!("pages/dcu.toml");
const UIA_PAGE: &str = include_str!("pages/uia.toml");
const SPEC_PAGE: &str = include_str!("pages/spec.toml");

const BUILTIN_PAGES: &[(&str, &str)] = &[
    ("index", INDEX_PAGE),
    ("dcu", DCU_PAGE),
    ("uia", UIA_PAGE),
    ("spec", SPEC_PAGE),
];

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    /// Health of our own reads.
    Connection,
    /// A dependency reported by the data, e.g. the DUST simulator.
    Link,
}

/// A header indicator element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    pub element: String,
    pub kind: IndicatorKind,
    pub name: String,
    /// Field path of the link's connected flag. Required for links.
    #[serde(default)]
    pub requires: Option<String>,
}

// ---------------------------------------------------------------------------
// Page table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTable {
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Element that shows the wall clock.
    #[serde(default)]
    pub clock: Option<String>,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceSpec>,
    #[serde(default, rename = "element")]
    pub elements: Vec<ElementMarkup>,
    #[serde(default, rename = "guard")]
    pub guards: Vec<ActionGuard>,
    #[serde(default, rename = "indicator")]
    pub indicators: Vec<IndicatorSpec>,
}

impl PageTable {
    /// Parse and validate a page.
    pub fn parse(text: &str) -> Result<Self> {
        let page: PageTable = toml::from_str(text).context("invalid page table")?;
        page.validate()?;
        Ok(page)
    }

    /// Load a page table from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read page {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in page {}", path.display()))
    }

    /// Build the page's binding table.
    pub fn bindings(&self) -> Result<BindingTable> {
        BindingTable::from_markup(&self.elements)
            .with_context(|| format!("page '{}' has bad element markup", self.name))
    }

    /// Whether writes from this page carry the selected room.
    pub fn is_team_scoped(&self) -> bool {
        self.sources.iter().any(|s| s.scope == SourceScope::Team)
    }

    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("page '{}' declares no sources", self.name);
        }
        for indicator in &self.indicators {
            if indicator.kind == IndicatorKind::Link && indicator.requires.is_none() {
                bail!(
                    "link indicator '{}' on page '{}' needs a `requires` path",
                    indicator.element,
                    self.name
                );
            }
        }
        // Bad markup fails the load, not the first tick.
        let prefixes: Vec<String> = self.sources.iter().map(SourceSpec::prefix).collect();
        for binding in self.bindings()?.iter() {
            if !prefixes.iter().any(|p| p == binding.source_prefix()) {
                bail!(
                    "element '{}' on page '{}' reads '{}', which no source provides",
                    binding.element,
                    self.name,
                    binding.path
                );
            }
        }
        Ok(())
    }
}

/// Names of the pages that ship with the console.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_PAGES.iter().map(|(name, _)| *name)
}

/// Load a built-in page by name.
pub fn builtin(name: &str) -> Result<PageTable> {
    let Some((_, text)) = BUILTIN_PAGES.iter().find(|(n, _)| *n == name) else {
        let known: Vec<_> = builtin_names().collect();
        bail!("unknown page '{name}' (available: {})", known.join(", "));
    };
    PageTable::parse(text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
