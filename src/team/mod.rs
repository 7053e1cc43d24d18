/// Team (room) selection, persisted in a cookie jar.
///
/// The selected room decides which team-scoped sources are read and is sent
/// with every write. It lives in `~/.tss-console/cookies` using the
/// browser's `name=value; name2=value2` cookie text, so the same jar format
/// works for every page. Reads are best-effort: a missing or garbled jar
/// simply means no room is selected.
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Cookie that stores the selected room.
pub const ROOM_COOKIE: &str = "room";

// ---------------------------------------------------------------------------
// Cookie text
// ---------------------------------------------------------------------------

/// Read a cookie value out of a jar string.
pub fn get_cookie(jar: &str, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    jar.split(';')
        .map(|c| c.trim_start_matches(' '))
        .find_map(|c| c.strip_prefix(prefix.as_str()))
        .map(|v| v.trim_end().to_string())
}

/// Return `jar` with `name` set to `value`, replacing any existing entry.
pub fn set_cookie(jar: &str, name: &str, value: &str) -> String {
    let mut cookies = split_jar(jar, name);
    cookies.push(format!("{name}={value}"));
    cookies.join("; ")
}

/// Return `jar` without `name`.
pub fn remove_cookie(jar: &str, name: &str) -> String {
    split_jar(jar, name).join("; ")
}

fn split_jar(jar: &str, skip: &str) -> Vec<String> {
    let prefix = format!("{skip}=");
    jar.split(';')
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.starts_with(prefix.as_str()))
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Team selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeamSelection {
    pub room: Option<u32>,
}

impl TeamSelection {
    pub fn new(room: Option<u32>) -> Self {
        Self { room }
    }

    pub fn clear(&mut self) {
        self.room = None;
    }

    /// Parse the selection out of jar text.
    pub fn from_jar(jar: &str) -> Self {
        Self {
            room: get_cookie(jar, ROOM_COOKIE).and_then(|v| v.parse().ok()),
        }
    }

    /// Load the persisted selection. Never fails.
    pub fn load() -> Self {
        cookie_jar_path()
            .and_then(|path| fs::read_to_string(path).ok())
            .map(|jar| Self::from_jar(&jar))
            .unwrap_or_default()
    }

    /// Persist the selection, keeping any other cookies in the jar.
    pub fn save(&self) -> Result<PathBuf> {
        let path = cookie_jar_path().context("could not determine home directory")?;
        let jar = fs::read_to_string(&path).unwrap_or_default();

        let updated = match self.room {
            Some(room) => set_cookie(&jar, ROOM_COOKIE, &room.to_string()),
            None => remove_cookie(&jar, ROOM_COOKIE),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create ~/.tss-console/ directory")?;
        }
        fs::write(&path, updated).context("failed to write cookie jar")?;
        Ok(path)
    }
}

/// Path to the cookie jar: `~/.tss-console/cookies`.
pub fn cookie_jar_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tss-console").join("cookies"))
}
