/// Configuration schema and defaults for tss-console.
///
/// Defines the TOML-serializable configuration structure with all sections:
/// `[server]`, `[poll]`, `[writer]`, `[session]`, and `[logging]`.
///
/// Every field has a built-in default. Users only need to set the values
/// they want to override.
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poller::{DEFAULT_DISCONNECT_AFTER, FailurePolicy};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
///
/// Maps directly to `~/.tss-console/config.toml` and `.tss-console.toml`.
/// All sections and fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub server: ServerConfig,
    pub poll: PollConfig,
    pub writer: WriterConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// [server]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the telemetry server. Reads go to `/data/...`, writes to `/`.
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:14141".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// [poll]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Period of the poll loop.
    pub interval_ms: u64,
    /// Per-fetch timeout. A fetch that exceeds it counts as failed.
    pub timeout_ms: u64,
    /// `strict` (all sources or nothing) or `per-source`.
    pub failure_policy: FailurePolicy,
    /// Consecutive failed cycles tolerated before showing "Disconnected".
    pub disconnect_after: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            timeout_ms: 2000,
            failure_policy: FailurePolicy::default(),
            disconnect_after: DEFAULT_DISCONNECT_AFTER,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// [writer]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub timeout_ms: u64,
    /// Surface server-side (5xx) and network write failures to the user.
    pub alert_on_server_error: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            alert_on_server_error: true,
        }
    }
}

impl WriterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// [session]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Built-in page shown when none is given on the command line.
    pub page: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page: "index".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// [logging]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether poll and write events are logged.
    pub enabled: bool,
    /// Path to the event log. `~` is expanded to the home directory.
    pub path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.tss-console/events.jsonl".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Resolved log path, or `None` when logging is off.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if !self.enabled || self.path.is_empty() {
            return None;
        }
        match self.path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
            None => Some(PathBuf::from(&self.path)),
        }
    }
}

// ---------------------------------------------------------------------------
// Default TOML content
// ---------------------------------------------------------------------------

impl ConsoleConfig {
    /// Annotated default config written by `tss-console config init`.
    pub fn default_toml() -> String {
        r#"# tss-console configuration
#
# Configuration hierarchy (highest precedence wins):
#   1. Environment variables (TSS_CONSOLE_*)
#   2. Project config (.tss-console.toml in current directory)
#   3. User global config (~/.tss-console/config.toml)
#   4. Built-in defaults

[server]
base_url = "http://127.0.0.1:14141"

[poll]
interval_ms = 1000
timeout_ms = 2000
failure_policy = "strict"   # strict | per-source
disconnect_after = 2        # failed cycles tolerated before "Disconnected"

[writer]
timeout_ms = 2000
alert_on_server_error = true

[session]
page = "index"              # index | dcu | uia | spec

[logging]
enabled = true
path = "~/.tss-console/events.jsonl"
"#
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
