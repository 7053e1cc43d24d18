/// Poller: one fixed-period read cycle across all of a page's sources.
///
/// Each cycle fetches every source concurrently (one scoped thread per
/// source, each bounded by the per-fetch timeout), so a cycle takes as long
/// as its slowest source. An abandoned fetch is a failure like any other.
///
/// # Failure policy
///
/// | Policy      | On any failure                                   |
/// |-------------|--------------------------------------------------|
/// | `strict`    | nothing is replaced, nothing is bound            |
/// | `per-source`| healthy sources are replaced and bound           |
///
/// In both policies a cycle with any failure increments the consecutive
/// failure counter, and only a fully successful cycle resets it.
pub mod transport;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use transport::{FetchError, HttpTransport, PostError, Transport};

use crate::snapshot::{Snapshot, SnapshotSet, SourceSpec};

/// Consecutive failures tolerated before the connection counts as down.
pub const DEFAULT_DISCONNECT_AFTER: u32 = 2;

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Read health as seen by the poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub consecutive_failures: u32,
    pub last_known_good: bool,
}

impl ConnectionState {
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_known_good = true;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_known_good = false;
    }

    /// Healthy while no more than `threshold` cycles in a row have failed.
    pub fn is_healthy(&self, threshold: u32) -> bool {
        self.consecutive_failures <= threshold
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What a partially failed cycle does to the binding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// All sources must succeed together or nothing is bound.
    #[default]
    Strict,
    /// Each source succeeds or fails on its own.
    PerSource,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::PerSource => write!(f, "per-source"),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle results
// ---------------------------------------------------------------------------

/// Raw result of fetching every source once.
#[derive(Debug)]
pub struct PollOutcome {
    pub results: Vec<(SourceSpec, Result<Value, FetchError>)>,
    pub latency: Duration,
}

/// What a cycle changed, after the failure policy was applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Prefixes whose snapshots were replaced this cycle.
    pub refreshed: BTreeSet<String>,
    /// Sources that failed, with the reason.
    pub failed: Vec<(String, FetchError)>,
    pub latency: Duration,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Poller {
    base_url: String,
    timeout: Duration,
    policy: FailurePolicy,
}

impl Poller {
    pub fn new(base_url: &str, timeout: Duration, policy: FailurePolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            policy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Fetch every source concurrently and wait for all of them.
    pub fn poll<T: Transport + ?Sized>(
        &self,
        transport: &T,
        sources: &[SourceSpec],
        room: Option<u32>,
    ) -> PollOutcome {
        let start = Instant::now();
        let timeout = self.timeout;

        let results: Vec<(SourceSpec, Result<Value, FetchError>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = sources
                .iter()
                .map(|source| {
                    let url = source.url(&self.base_url, room);
                    scope.spawn(move || transport.get_json(&url, timeout))
                })
                .collect();

            sources
                .iter()
                .cloned()
                .zip(handles)
                .map(|(source, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(FetchError::Network("fetch worker panicked".to_string()))
                    });
                    (source, result)
                })
                .collect()
        });

        PollOutcome {
            results,
            latency: start.elapsed(),
        }
    }

    /// Apply a cycle's results to the connection state and snapshots.
    pub fn absorb(
        &self,
        outcome: PollOutcome,
        connection: &mut ConnectionState,
        snapshots: &mut SnapshotSet,
    ) -> CycleReport {
        let mut report = CycleReport {
            latency: outcome.latency,
            ..CycleReport::default()
        };
        let mut fresh = Vec::new();

        for (source, result) in outcome.results {
            match result {
                Ok(document) => fresh.push((source, document)),
                Err(err) => report.failed.push((source.name.clone(), err)),
            }
        }

        if report.failed.is_empty() {
            connection.record_success();
        } else {
            connection.record_failure();
            if self.policy == FailurePolicy::Strict {
                return report;
            }
        }

        for (source, document) in fresh {
            let prefix = source.prefix();
            snapshots.replace(
                &prefix,
                Snapshot::from_document(document, source.root.as_deref()),
            );
            report.refreshed.insert(prefix);
        }

        report
    }

    /// One full read cycle: fetch, then absorb.
    pub fn cycle<T: Transport + ?Sized>(
        &self,
        transport: &T,
        sources: &[SourceSpec],
        room: Option<u32>,
        connection: &mut ConnectionState,
        snapshots: &mut SnapshotSet,
    ) -> CycleReport {
        let outcome = self.poll(transport, sources, room);
        self.absorb(outcome, connection, snapshots)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
