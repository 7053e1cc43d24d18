/// Configuration system for tss-console.
///
/// Provides a layered configuration hierarchy:
///
/// 1. **Built-in defaults** — hardcoded in [`schema::ConsoleConfig::default()`]
/// 2. **User global config** — `~/.tss-console/config.toml`
/// 3. **Project local config** — `.tss-console.toml` in the current directory
/// 4. **Environment variables** — `TSS_CONSOLE_*` overrides (highest precedence)
///
/// Later layers override earlier ones key by key. Keys no layer sets fall
/// back to built-in defaults.
///
/// # Usage
///
/// ```rust,ignore
/// use tss_console::config;
///
/// let cfg = config::load();
/// let interval = cfg.poll.interval();
/// ```
pub mod schema;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub use schema::ConsoleConfig;

use crate::poller::FailurePolicy;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the fully resolved configuration.
///
/// Merges all layers in order: defaults → global TOML → project TOML → env
/// vars. TOML layers merge key by key, so a project file that only sets
/// `[poll]` keeps the global `server.base_url`.
pub fn load() -> ConsoleConfig {
    let layers = [global_config_path(), project_config_path()]
        .into_iter()
        .filter_map(load_toml_file);
    let mut config = merge_layers(layers);

    // Layer 4: environment variable overrides
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config
}

/// Load a TOML config layer from the given path (if it exists).
///
/// Malformed files, and files that do not describe a valid config on their
/// own, are ignored so a bad edit never stops the dashboard.
fn load_toml_file(path: Option<PathBuf>) -> Option<toml::Value> {
    let path = path?;
    let content = fs::read_to_string(&path).ok()?;
    let layer: toml::Value = toml::from_str(&content).ok()?;
    let _: ConsoleConfig = layer.clone().try_into().ok()?;
    Some(layer)
}

/// Fold TOML layers over the built-in defaults, later layers winning.
fn merge_layers<I>(layers: I) -> ConsoleConfig
where
    I: IntoIterator<Item = toml::Value>,
{
    let mut merged = toml::Value::Table(toml::Table::new());
    for layer in layers {
        merge_tables(&mut merged, layer);
    }
    merged.try_into().unwrap_or_default()
}

/// Recursively overlay `overlay` onto `base`. Tables merge; anything else
/// replaces.
fn merge_tables(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_tables(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

/// Path to the user global config: `~/.tss-console/config.toml`.
fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tss-console").join("config.toml"))
}

/// Path to the project local config: `.tss-console.toml` in the current directory.
fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(".tss-console.toml"))
}

/// Return the path to the global config file for display/init purposes.
pub fn global_config_file() -> Option<PathBuf> {
    global_config_path()
}

/// Return the path to the project config file for display purposes.
pub fn project_config_file() -> Option<PathBuf> {
    project_config_path()
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides (highest precedence layer).
///
/// Supported variables:
/// - `TSS_CONSOLE_URL` — telemetry server base URL
/// - `TSS_CONSOLE_INTERVAL_MS` — poll period
/// - `TSS_CONSOLE_TIMEOUT_MS` — per-fetch timeout
/// - `TSS_CONSOLE_POLICY` — `strict` or `per-source`
/// - `TSS_CONSOLE_DISCONNECT_AFTER` — tolerated failed cycles
/// - `TSS_CONSOLE_ALERTS` — surface write failures (`1`/`true`/`yes`/`on`)
/// - `TSS_CONSOLE_LOG` — event logging on/off
fn apply_env_overrides<F>(config: &mut ConsoleConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = var("TSS_CONSOLE_URL")
        && !val.is_empty()
    {
        config.server.base_url = val;
    }
    if let Some(val) = var("TSS_CONSOLE_INTERVAL_MS")
        && let Ok(ms) = val.parse::<u64>()
    {
        config.poll.interval_ms = ms;
    }
    if let Some(val) = var("TSS_CONSOLE_TIMEOUT_MS")
        && let Ok(ms) = val.parse::<u64>()
    {
        config.poll.timeout_ms = ms;
    }
    if let Some(val) = var("TSS_CONSOLE_POLICY")
        && let Some(policy) = parse_policy(&val)
    {
        config.poll.failure_policy = policy;
    }
    if let Some(val) = var("TSS_CONSOLE_DISCONNECT_AFTER")
        && let Ok(n) = val.parse::<u32>()
    {
        config.poll.disconnect_after = n;
    }
    if let Some(val) = var("TSS_CONSOLE_ALERTS") {
        config.writer.alert_on_server_error = is_truthy(&val);
    }
    if let Some(val) = var("TSS_CONSOLE_LOG") {
        config.logging.enabled = is_truthy(&val);
    }
}

/// Check if a string value represents a truthy boolean.
fn is_truthy(val: &str) -> bool {
    matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a failure policy string.
fn parse_policy(val: &str) -> Option<FailurePolicy> {
    match val.to_ascii_lowercase().as_str() {
        "strict" | "all" => Some(FailurePolicy::Strict),
        "per-source" | "per_source" | "persource" => Some(FailurePolicy::PerSource),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Config init / set
// ---------------------------------------------------------------------------

/// Write the default annotated config to `~/.tss-console/config.toml`.
///
/// Returns an error if the file already exists (use `force = true` to
/// overwrite).
pub fn init_config(force: bool) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create ~/.tss-console/ directory")?;
    }

    fs::write(&path, ConsoleConfig::default_toml()).context("failed to write config file")?;

    Ok(path)
}

/// Set a single config key in the global config file.
///
/// Supports dotted keys like `poll.timeout_ms`. When no file exists yet the
/// defaults are written out first so the key's type is known.
pub fn set_config_value(key: &str, value: &str) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;

    let content = if path.exists() {
        fs::read_to_string(&path).context("failed to read config file")?
    } else {
        toml::to_string_pretty(&ConsoleConfig::default())
            .context("failed to serialize default config")?
    };

    let mut root: toml::Value =
        toml::from_str(&content).context("failed to parse config as TOML value")?;
    set_toml_value(&mut root, key, value)?;

    // Reject edits that would leave the file unloadable.
    let updated = toml::to_string_pretty(&root).context("failed to serialize config")?;
    toml::from_str::<ConsoleConfig>(&updated)
        .with_context(|| format!("invalid value '{value}' for '{key}'"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    fs::write(&path, updated).context("failed to write config file")?;

    Ok(path)
}

/// Set a value in a TOML value tree using a dotted key path.
fn set_toml_value(root: &mut toml::Value, key: &str, raw_value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let Some((leaf, sections)) = parts.split_last() else {
        anyhow::bail!("empty config key");
    };

    // Navigate to the parent table
    let mut current = root;
    for &part in sections {
        current = current
            .get_mut(part)
            .with_context(|| format!("config key not found: section '{part}' in '{key}'"))?;
    }

    let table = current.as_table_mut().with_context(|| {
        format!(
            "expected table at '{}'",
            key.rsplit_once('.').map(|(s, _)| s).unwrap_or("")
        )
    })?;

    let new_value = match table.get(*leaf) {
        Some(toml::Value::Boolean(_)) => toml::Value::Boolean(is_truthy(raw_value)),
        Some(toml::Value::Integer(_)) => {
            let n: i64 = raw_value
                .parse()
                .with_context(|| format!("expected integer for '{key}', got '{raw_value}'"))?;
            toml::Value::Integer(n)
        }
        Some(toml::Value::Float(_)) => {
            let f: f64 = raw_value
                .parse()
                .with_context(|| format!("expected float for '{key}', got '{raw_value}'"))?;
            toml::Value::Float(f)
        }
        Some(_) => toml::Value::String(raw_value.to_string()),
        None => anyhow::bail!("unknown config key '{key}'"),
    };

    table.insert(leaf.to_string(), new_value);
    Ok(())
}

/// Show the effective (fully resolved) config as TOML.
pub fn show_effective_config() -> Result<String> {
    let config = load();
    toml::to_string_pretty(&config).context("failed to serialize effective config")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
