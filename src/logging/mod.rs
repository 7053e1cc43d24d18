//! Structured event log: one JSON line per poll cycle and per write.
//!
//! Log file: `~/.tss-console/events.jsonl`
//!
//! Logging is best-effort: a log that cannot be written is skipped and
//! never interrupts the poll loop.

use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::poller::CycleReport;
use crate::writer::{WriteOutcome, WriteRequest};

/// Bytes read per step when scanning the log backwards.
const TAIL_CHUNK: u64 = 64 * 1024;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A single line in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum LogEntry {
    Poll {
        timestamp: String,
        page: String,
        ok: bool,
        consecutive_failures: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_sources: Vec<String>,
        latency_ms: u64,
    },
    Write {
        timestamp: String,
        page: String,
        path: String,
        value: String,
        outcome: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
}

impl LogEntry {
    pub fn poll(page: &str, report: &CycleReport, consecutive_failures: u32) -> Self {
        Self::Poll {
            timestamp: Utc::now().to_rfc3339(),
            page: page.to_string(),
            ok: report.is_success(),
            consecutive_failures,
            failed_sources: report.failed.iter().map(|(name, _)| name.clone()).collect(),
            latency_ms: report.latency.as_millis() as u64,
        }
    }

    pub fn write(page: &str, request: &WriteRequest, outcome: &WriteOutcome) -> Self {
        Self::Write {
            timestamp: Utc::now().to_rfc3339(),
            page: page.to_string(),
            path: request.path.clone(),
            value: request.value.clone(),
            outcome: outcome.tag().to_string(),
            status: outcome.status(),
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            Self::Poll { timestamp, .. } | Self::Write { timestamp, .. } => timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------

/// Append-only JSONL sink. A log without a path discards everything.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    /// The default log under the user's home directory.
    pub fn open_default() -> Self {
        Self {
            path: events_log_path(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append an entry, ignoring I/O failures.
    pub fn record(&self, entry: &LogEntry) {
        let _ = self.append(entry);
    }

    fn append(&self, entry: &LogEntry) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let json = serde_json::to_string(entry)?;
        writeln!(file, "{json}")?;

        Ok(())
    }

    /// Read every entry, silently skipping malformed lines.
    pub fn read_all(&self) -> Vec<LogEntry> {
        let Some(path) = &self.path else {
            return Vec::new();
        };
        let Ok(file) = fs::File::open(path) else {
            return Vec::new();
        };

        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter_map(|line| serde_json::from_str::<LogEntry>(&line).ok())
            .collect()
    }

    /// The last `n` entries, oldest first.
    ///
    /// Reads backwards from the end of the file, so a long-running log
    /// costs only as much as the entries asked for.
    pub fn tail(&self, n: usize) -> Vec<LogEntry> {
        self.tail_in_chunks(n, TAIL_CHUNK).unwrap_or_default()
    }

    fn tail_in_chunks(&self, n: usize, chunk: u64) -> std::io::Result<Vec<LogEntry>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut file = fs::File::open(path)?;
        let mut start = file.seek(SeekFrom::End(0))?;
        let mut window: Vec<u8> = Vec::new();

        loop {
            let from = start.saturating_sub(chunk.max(1));
            let mut buf = vec![0; usize::try_from(start - from).unwrap_or(0)];
            file.seek(SeekFrom::Start(from))?;
            file.read_exact(&mut buf)?;
            buf.extend_from_slice(&window);
            window = buf;
            start = from;

            let text = String::from_utf8_lossy(&window);
            let mut lines = text.lines();
            if start > 0 {
                // First line may be cut off mid-entry.
                lines.next();
            }
            let mut entries: Vec<LogEntry> = lines
                .filter_map(|line| serde_json::from_str(line).ok())
                .collect();

            if entries.len() >= n || start == 0 {
                let skip = entries.len().saturating_sub(n);
                entries.drain(..skip);
                return Ok(entries);
            }
        }
    }
}

/// Path to the event log file.
pub fn events_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tss-console").join("events.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::FetchError;
    use std::time::Duration;

    fn temp_log(name: &str) -> EventLog {
        let path = std::env::temp_dir().join(format!(
            "tss-console-{}-{name}.jsonl",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        EventLog::at(path)
    }

    #[test]
    fn disabled_log_discards() {
        let log = EventLog::disabled();
        log.record(&LogEntry::poll("index", &CycleReport::default(), 0));
        assert!(log.read_all().is_empty());
    }

    #[test]
    fn records_and_tails_entries() {
        let log = temp_log("tail");
        let failed = CycleReport {
            failed: vec![("LTV".to_string(), FetchError::Status(500))],
            latency: Duration::from_millis(12),
            ..CycleReport::default()
        };
        log.record(&LogEntry::poll("index", &failed, 1));
        log.record(&LogEntry::write(
            "index",
            &WriteRequest::new("eva.status.started", true),
            &WriteOutcome::Sent { status: 200 },
        ));

        let all = log.read_all();
        assert_eq!(all.len(), 2);
        match &all[0] {
            LogEntry::Poll { ok, failed_sources, latency_ms, .. } => {
                assert!(!ok);
                assert_eq!(failed_sources, &vec!["LTV".to_string()]);
                assert_eq!(*latency_ms, 12);
            }
            other => panic!("expected poll entry, got {other:?}"),
        }

        let tail = log.tail(1);
        assert_eq!(tail.len(), 1);
        assert!(matches!(&tail[0], LogEntry::Write { outcome, status: Some(200), .. } if outcome == "sent"));

        if let Some(path) = log.path() {
            let _ = fs::remove_file(path);
        }
    }

    #[test]
    fn tail_scans_back_across_chunks() {
        let log = temp_log("chunks");
        for failures in 0..25 {
            log.record(&LogEntry::poll("index", &CycleReport::default(), failures));
        }

        let all = log.read_all();
        // Chunks far smaller than one line force many partial reads.
        let tail = log.tail_in_chunks(4, 40).unwrap();
        assert_eq!(tail, all[21..].to_vec());
        assert_eq!(log.tail_in_chunks(100, 40).unwrap(), all);
        assert!(log.tail(0).is_empty());

        if let Some(path) = log.path() {
            let _ = fs::remove_file(path);
        }
    }

    #[test]
    fn tail_of_missing_file_is_empty() {
        let log = temp_log("missing");
        assert!(log.tail(5).is_empty());
    }

    #[test]
    fn skips_malformed_lines() {
        let log = temp_log("malformed");
        let path = log.path().unwrap().to_path_buf();
        fs::write(&path, "not json\n{\"event\":\"unknown\"}\n").unwrap();
        log.record(&LogEntry::poll("dcu", &CycleReport::default(), 0));

        assert_eq!(log.read_all().len(), 1);
        let _ = fs::remove_file(path);
    }
}
