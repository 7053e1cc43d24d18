/// Page session: the live state behind one open console page.
///
/// The session is the single owner of everything a page needs between
/// ticks: the transport, the connection counter, the latest snapshots, the
/// selected team and the event log. It is created when a page is opened and
/// dropped when it closes; nothing here is global.
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;

use super::{IndicatorKind, PageTable};
use crate::binder::{Binder, Document, ElementUpdate};
use crate::binding::{Action, BindingKind, BindingTable, FieldBinding};
use crate::config::ConsoleConfig;
use crate::logging::{EventLog, LogEntry};
use crate::poller::{ConnectionState, CycleReport, Poller, Transport};
use crate::snapshot::{SnapshotSet, is_truthy};
use crate::status::{self, Indicator};
use crate::team::TeamSelection;
use crate::writer::{
    ActionGuard, UserEvent, WriteError, WriteOutcome, WriteRequest, Writer, guard_for,
};

pub struct PageSession<T: Transport> {
    page: PageTable,
    bindings: BindingTable,
    transport: T,
    poller: Poller,
    writer: Writer,
    connection: ConnectionState,
    snapshots: SnapshotSet,
    team: TeamSelection,
    log: EventLog,
    interval: Duration,
    disconnect_after: u32,
}

impl<T: Transport> PageSession<T> {
    pub fn new(
        page: PageTable,
        config: &ConsoleConfig,
        transport: T,
        team: TeamSelection,
        log: EventLog,
    ) -> Result<Self> {
        let bindings = page.bindings()?;
        let base_url = &config.server.base_url;

        Ok(Self {
            page,
            bindings,
            transport,
            poller: Poller::new(base_url, config.poll.timeout(), config.poll.failure_policy),
            writer: Writer::new(
                base_url,
                config.writer.timeout(),
                config.writer.alert_on_server_error,
            ),
            connection: ConnectionState::default(),
            snapshots: SnapshotSet::new(),
            team,
            log,
            interval: config.poll.interval(),
            disconnect_after: config.poll.disconnect_after,
        })
    }

    pub fn page(&self) -> &PageTable {
        &self.page
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn snapshots(&self) -> &SnapshotSet {
        &self.snapshots
    }

    pub fn team(&self) -> TeamSelection {
        self.team
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_healthy(self.disconnect_after)
    }

    /// Room sent with writes: only pages that read team data carry one.
    pub fn room_for_writes(&self) -> Option<u32> {
        self.team.room.filter(|_| self.page.is_team_scoped())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Run one poll cycle and refresh the document.
    ///
    /// Refreshed sources are bound first. Header indicators and the clock
    /// are updated on every tick, including ticks whose cycle aborted.
    pub fn tick<D: Document + ?Sized>(&mut self, doc: &mut D) -> CycleReport {
        let report = self.poller.cycle(
            &self.transport,
            &self.page.sources,
            self.team.room,
            &mut self.connection,
            &mut self.snapshots,
        );

        Binder::bind(
            &self.bindings,
            &self.snapshots,
            &report.refreshed,
            |binding| self.start_allowed(binding),
            doc,
        );

        for (element, indicator) in self.indicators() {
            doc.apply(&element, &ElementUpdate::Text(indicator.label));
            doc.apply(&element, &ElementUpdate::Color(indicator.color.to_string()));
        }

        if let Some(clock) = &self.page.clock {
            doc.apply(clock, &ElementUpdate::Text(status::clock_text(&Local::now())));
        }

        self.log.record(&LogEntry::poll(
            &self.page.name,
            &report,
            self.connection.consecutive_failures,
        ));

        report
    }

    /// Current state of every header indicator, keyed by element.
    pub fn indicators(&self) -> Vec<(String, Indicator)> {
        self.page
            .indicators
            .iter()
            .map(|spec| {
                let indicator = match spec.kind {
                    IndicatorKind::Connection => status::connection_indicator(
                        &spec.name,
                        &self.connection,
                        self.disconnect_after,
                    ),
                    IndicatorKind::Link => status::link_indicator(
                        &spec.name,
                        self.flag(spec.requires.as_deref()),
                        &self.connection,
                        self.disconnect_after,
                    ),
                };
                (spec.element.clone(), indicator)
            })
            .collect()
    }

    fn flag(&self, path: Option<&str>) -> bool {
        path.is_some_and(|p| is_truthy(self.snapshots.resolve(p)))
    }

    /// Whether a guard's dependency is up right now.
    pub fn link_open(&self, guard: &ActionGuard) -> bool {
        status::link_connected(
            self.flag(Some(&guard.requires)),
            &self.connection,
            self.disconnect_after,
        )
    }

    fn start_allowed(&self, binding: &FieldBinding) -> bool {
        if binding.kind != BindingKind::Action(Action::Start) {
            return true;
        }
        guard_for(&self.page.guards, &binding.path).is_none_or(|guard| self.link_open(guard))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Turn a user event into a write. The page is never updated here; the
    /// next tick shows what the server accepted.
    pub fn handle_event(&self, event: &UserEvent) -> Result<WriteOutcome, WriteError> {
        let request = Writer::request_for(&self.bindings, event)?;
        Ok(self.submit(&request))
    }

    /// Write an arbitrary field, bypassing the binding table.
    ///
    /// Setting a guarded path to `true` is a start and goes through the
    /// same guard check as its button.
    pub fn write_raw(&self, path: &str, value: &str) -> WriteOutcome {
        let mut request = WriteRequest::new(path, value);
        if value == "true" && guard_for(&self.page.guards, path).is_some() {
            request.action = Some(Action::Start);
        }
        self.submit(&request)
    }

    fn submit(&self, request: &WriteRequest) -> WriteOutcome {
        let outcome = Writer::check_guard(request, &self.page.guards, |g| self.link_open(g))
            .unwrap_or_else(|| {
                self.writer
                    .send(&self.transport, request, self.room_for_writes())
            });

        self.log
            .record(&LogEntry::write(&self.page.name, request, &outcome));
        outcome
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Tick at the configured period until `cycles` ticks have run (forever
    /// when `None`). A tick that overruns the period skips the ticks it
    /// missed; ticks never overlap.
    pub fn run<D, F>(&mut self, doc: &mut D, cycles: Option<u64>, mut on_cycle: F)
    where
        D: Document + ?Sized,
        F: FnMut(&Self, &D, &CycleReport),
    {
        let mut deadline = Instant::now();
        let mut done = 0u64;

        while cycles.is_none_or(|n| done < n) {
            let report = self.tick(doc);
            on_cycle(self, doc, &report);
            done += 1;

            if cycles.is_some_and(|n| done >= n) {
                break;
            }

            let now = Instant::now();
            deadline = next_deadline(deadline, now, self.interval);
            std::thread::sleep(deadline.saturating_duration_since(now));
        }
    }
}

/// The first deadline after `now` on the `period` grid anchored at `last`.
fn next_deadline(last: Instant, now: Instant, period: Duration) -> Instant {
    let next = last + period;
    if next > now {
        return next;
    }
    let behind = now.duration_since(next).as_nanos();
    let skipped = behind / period.as_nanos().max(1) + 1;
    let skipped = u32::try_from(skipped).unwrap_or(u32::MAX);
    next + period.saturating_mul(skipped)
}
