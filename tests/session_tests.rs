/// Page session tests.
///
/// Drives whole pages (poll, bind, indicators, writes) against an in-memory
/// server so every cycle is deterministic. Real HTTP is covered in
/// `http_tests.rs`.
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tss_console::binder::{MemoryDocument, READING_NOMINAL, READING_OFF_NOMINAL, SENSOR_ACTIVE};
use tss_console::config::ConsoleConfig;
use tss_console::logging::{EventLog, LogEntry};
use tss_console::page::{self, PageSession, PageTable};
use tss_console::poller::{FailurePolicy, FetchError, PostError, Transport};
use tss_console::status::{CONNECTED_COLOR, DISCONNECTED_COLOR, LINK_DOWN_COLOR};
use tss_console::team::TeamSelection;
use tss_console::binding::BindingKind;
use tss_console::writer::{UserEvent, WriteError, WriteOutcome};

// ---------------------------------------------------------------------------
// Fake server
// ---------------------------------------------------------------------------

const BASE: &str = "http://tss";

struct FakeServer {
    docs: Mutex<HashMap<String, Value>>,
    down: AtomicBool,
    post_status: AtomicU16,
    gets: Mutex<Vec<String>>,
    posts: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeServer {
    fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            down: AtomicBool::new(false),
            post_status: AtomicU16::new(200),
            gets: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
        }
    }

    fn serve(&self, source: &str, doc: Value) {
        self.docs
            .lock()
            .unwrap()
            .insert(format!("{BASE}/data/{source}.json"), doc);
    }

    fn serve_url(&self, url: &str, doc: Value) {
        self.docs.lock().unwrap().insert(url.to_string(), doc);
    }

    fn remove(&self, source: &str) {
        self.docs
            .lock()
            .unwrap()
            .remove(&format!("{BASE}/data/{source}.json"));
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn posts(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.posts.lock().unwrap().clone()
    }
}

impl Transport for FakeServer {
    fn get_json(&self, url: &str, _timeout: Duration) -> Result<Value, FetchError> {
        self.gets.lock().unwrap().push(url.to_string());
        if self.down.load(Ordering::SeqCst) {
            return Err(FetchError::Network("connection refused".to_string()));
        }
        self.docs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }

    fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
        _timeout: Duration,
    ) -> Result<u16, PostError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(PostError("connection refused".to_string()));
        }
        self.posts
            .lock()
            .unwrap()
            .push((url.to_string(), fields.to_vec()));
        Ok(self.post_status.load(Ordering::SeqCst))
    }
}

fn config() -> ConsoleConfig {
    let mut config = ConsoleConfig::default();
    config.server.base_url = BASE.to_string();
    config.poll.interval_ms = 1;
    config
}

fn session(page: PageTable, server: FakeServer) -> PageSession<FakeServer> {
    session_with(page, &config(), server, TeamSelection::default())
}

fn session_with(
    page: PageTable,
    config: &ConsoleConfig,
    server: FakeServer,
    team: TeamSelection,
) -> PageSession<FakeServer> {
    PageSession::new(page, config, server, team, EventLog::disabled()).unwrap()
}

fn index_server(dust_connected: bool) -> FakeServer {
    let server = FakeServer::new();
    server.serve(
        "EVA",
        json!({
            "status": {"started": false, "total_time": 3725},
            "telemetry": {"eva1": {"heart_rate": 98.0, "oxy_pri_pressure": 420.5}}
        }),
    );
    server.serve(
        "ROVER",
        json!({"pr_telemetry": {"dust_connected": dust_connected, "cabin_heating": true}}),
    );
    server.serve(
        "LTV",
        json!({"signal": {"strength": 0.75, "ping_requested": false}}),
    );
    server
}

fn index() -> PageTable {
    page::builtin("index").unwrap()
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[test]
fn binds_fields_indicators_and_clock() {
    let mut session = session(index(), index_server(true));
    let mut doc = MemoryDocument::new();

    let report = session.tick(&mut doc);

    assert!(report.is_success());
    assert_eq!(doc.text("eva1-heart-rate"), Some("98.00 bpm"));
    assert_eq!(doc.color("eva1-heart-rate"), Some(READING_NOMINAL));
    assert_eq!(doc.text("eva1-primary-o2-pressure"), Some("420.50 psi"));
    assert_eq!(doc.color("eva1-primary-o2-pressure"), Some(READING_OFF_NOMINAL));
    assert_eq!(doc.text("eva-total-time"), Some("01:02:05"));
    assert_eq!(doc.checked("rover-cabin-heating"), Some(true));
    assert_eq!(doc.text("ltv-signal-strength"), Some("0.75"));

    assert_eq!(doc.text("telemetry-status"), Some("● Telemetry Connected"));
    assert_eq!(doc.color("telemetry-status"), Some(CONNECTED_COLOR));
    assert_eq!(doc.text("dust-status"), Some("● DUST Connected"));

    let clock = doc.text("nav-clock").unwrap();
    assert_eq!(clock.len(), 8);
    assert_eq!(clock.matches(':').count(), 2);
}

#[test]
fn missing_fields_render_empty() {
    let mut session = session(index(), index_server(true));
    let mut doc = MemoryDocument::new();
    session.tick(&mut doc);

    // Present in the page, absent from the served EVA document.
    assert_eq!(doc.text("eva1-temperature"), Some(""));
    assert_eq!(doc.color("eva1-temperature"), None);
}

#[test]
fn signal_sentinel_shows_not_in_range() {
    let server = index_server(true);
    server.serve("LTV", json!({"signal": {"strength": 1.0, "ping_requested": false}}));
    let mut session = session(index(), server);
    let mut doc = MemoryDocument::new();

    session.tick(&mut doc);
    assert_eq!(doc.text("ltv-signal-strength"), Some("NOT IN RANGE"));
}

#[test]
fn disconnects_after_threshold_and_recovers() {
    let mut session = session(index(), index_server(true));
    let mut doc = MemoryDocument::new();
    session.transport().set_down(true);

    for expected in 1..=2 {
        let report = session.tick(&mut doc);
        assert!(!report.is_success());
        assert_eq!(session.connection().consecutive_failures, expected);
        assert_eq!(doc.text("telemetry-status"), Some("● Telemetry Connected"));
    }

    session.tick(&mut doc);
    assert_eq!(session.connection().consecutive_failures, 3);
    assert!(!session.is_connected());
    assert_eq!(doc.text("telemetry-status"), Some("● Telemetry Disconnected"));
    assert_eq!(doc.color("telemetry-status"), Some(DISCONNECTED_COLOR));
    assert_eq!(doc.text("dust-status"), Some("● DUST Disconnected"));
    assert_eq!(doc.color("dust-status"), Some(LINK_DOWN_COLOR));

    session.transport().set_down(false);
    let report = session.tick(&mut doc);
    assert!(report.is_success());
    assert_eq!(session.connection().consecutive_failures, 0);
    assert_eq!(doc.text("telemetry-status"), Some("● Telemetry Connected"));
    assert_eq!(doc.text("eva1-heart-rate"), Some("98.00 bpm"));
}

#[test]
fn strict_cycle_keeps_last_good_values() {
    let mut session = session(index(), index_server(true));
    let mut doc = MemoryDocument::new();
    session.tick(&mut doc);

    session.transport().remove("LTV");
    session.transport().serve(
        "EVA",
        json!({"telemetry": {"eva1": {"heart_rate": 120.0}}}),
    );
    let report = session.tick(&mut doc);

    assert!(report.refreshed.is_empty());
    assert_eq!(report.failed, vec![("LTV".to_string(), FetchError::Status(404))]);
    assert_eq!(doc.text("eva1-heart-rate"), Some("98.00 bpm"));
}

#[test]
fn per_source_cycle_binds_healthy_sources() {
    let mut config = config();
    config.poll.failure_policy = FailurePolicy::PerSource;
    let mut session = session_with(index(), &config, index_server(true), TeamSelection::default());
    let mut doc = MemoryDocument::new();
    session.tick(&mut doc);

    session.transport().remove("LTV");
    session.transport().serve(
        "EVA",
        json!({"telemetry": {"eva1": {"heart_rate": 120.0}}}),
    );
    let report = session.tick(&mut doc);

    assert!(!report.is_success());
    assert!(report.refreshed.contains("eva"));
    assert!(!report.refreshed.contains("ltv"));
    assert_eq!(doc.text("eva1-heart-rate"), Some("120.00 bpm"));
    assert_eq!(doc.text("ltv-signal-strength"), Some("0.75"));
    assert_eq!(session.connection().consecutive_failures, 1);
}

#[test]
fn dcu_page_reads_rooted_document() {
    let server = FakeServer::new();
    server.serve(
        "DCU",
        json!({"dcu": {"eva1": {"batt": true, "oxy": false}, "eva2": {"batt": false}}}),
    );
    let mut session = session(page::builtin("dcu").unwrap(), server);
    let mut doc = MemoryDocument::new();

    session.tick(&mut doc);

    assert_eq!(doc.checked("eva1-dcu-batt-switch"), Some(true));
    assert_eq!(doc.color("eva1-battery-sensor"), Some(SENSOR_ACTIVE));
    assert_eq!(doc.checked("eva1-dcu-oxy-switch"), Some(false));
    assert_eq!(doc.checked("eva2-dcu-batt-switch"), Some(false));
}

#[test]
fn run_stops_after_requested_cycles() {
    let mut session = session(index(), index_server(true));
    let mut doc = MemoryDocument::new();
    let mut seen = 0;

    session.run(&mut doc, Some(3), |_, _, report| {
        assert!(report.is_success());
        seen += 1;
    });

    assert_eq!(seen, 3);
    assert_eq!(session.transport().gets.lock().unwrap().len(), 9);
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[test]
fn checkbox_toggle_posts_once() {
    let mut session = session(index(), index_server(true));
    let mut doc = MemoryDocument::new();
    session.tick(&mut doc);
    let writes_before = doc.writes();

    let outcome = session
        .handle_event(&UserEvent::Toggle {
            element: "rover-cabin-heating".into(),
            checked: false,
        })
        .unwrap();

    assert_eq!(outcome, WriteOutcome::Sent { status: 200 });
    assert_eq!(
        session.transport().posts(),
        vec![(
            format!("{BASE}/"),
            vec![("rover.pr_telemetry.cabin_heating".to_string(), "false".to_string())]
        )]
    );
    // No optimistic update: the switch waits for the next poll.
    assert_eq!(doc.writes(), writes_before);
    assert_eq!(doc.checked("rover-cabin-heating"), Some(true));
}

#[test]
fn dcu_and_uia_switches_are_read_only() {
    let server = FakeServer::new();
    server.serve("DCU", json!({"dcu": {"eva1": {"batt": false}}}));
    let mut dcu = session(page::builtin("dcu").unwrap(), server);
    let mut doc = MemoryDocument::new();
    dcu.tick(&mut doc);

    let err = dcu
        .handle_event(&UserEvent::Toggle {
            element: "eva1-dcu-batt-switch".into(),
            checked: true,
        })
        .unwrap_err();
    assert_eq!(err, WriteError::ReadOnly("eva1-dcu-batt-switch".into()));
    assert!(dcu.transport().posts().is_empty());
    assert_eq!(doc.checked("eva1-dcu-batt-switch"), Some(false));

    let uia = session(page::builtin("uia").unwrap(), FakeServer::new());
    assert!(matches!(
        uia.handle_event(&UserEvent::Toggle {
            element: "uia-eva1-power-switch".into(),
            checked: true,
        }),
        Err(WriteError::ReadOnly(_))
    ));
    assert!(uia.transport().posts().is_empty());

    // Every key the console can post is one the server's form handler takes.
    for name in page::builtin_names() {
        let table = page::builtin(name).unwrap().bindings().unwrap();
        for binding in table.iter() {
            let writable = !binding.readonly
                && !matches!(binding.kind, BindingKind::Text | BindingKind::Indicator);
            if writable {
                assert!(
                    ["eva", "rover", "ltv"].contains(&binding.source_prefix()),
                    "{name}: {} writes {}",
                    binding.element,
                    binding.path
                );
            }
        }
    }
}

#[test]
fn start_and_reset_buttons_follow_state() {
    let mut session = session(index(), index_server(true));
    let mut doc = MemoryDocument::new();
    session.tick(&mut doc);

    assert_eq!(doc.enabled("eva-start"), Some(true));
    assert_eq!(doc.enabled("eva-reset"), Some(false));

    session.handle_event(&UserEvent::Click { element: "eva-start".into() }).unwrap();
    session.handle_event(&UserEvent::Click { element: "eva-reset".into() }).unwrap();

    let posts = session.transport().posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].1, vec![("eva.status.started".to_string(), "true".to_string())]);
    assert_eq!(posts[1].1, vec![("eva.status.started".to_string(), "false".to_string())]);
}

#[test]
fn guarded_ping_is_blocked_until_dust_connects() {
    let mut session = session(index(), index_server(false));
    let mut doc = MemoryDocument::new();
    session.tick(&mut doc);

    assert_eq!(doc.enabled("ltv-ping"), Some(false));
    assert_eq!(doc.text("dust-status"), Some("● DUST Disconnected"));

    let outcome = session
        .handle_event(&UserEvent::Click { element: "ltv-ping".into() })
        .unwrap();
    match &outcome {
        WriteOutcome::Blocked { message } => assert!(message.starts_with("DUST simulator is not connected")),
        other => panic!("expected blocked, got {other:?}"),
    }
    assert!(!outcome.was_sent());
    assert!(session.transport().posts().is_empty());

    session.transport().serve(
        "ROVER",
        json!({"pr_telemetry": {"dust_connected": true}}),
    );
    session.tick(&mut doc);
    assert_eq!(doc.enabled("ltv-ping"), Some(true));

    let outcome = session
        .handle_event(&UserEvent::Click { element: "ltv-ping".into() })
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Sent { status: 200 });
    assert_eq!(
        session.transport().posts()[0].1,
        vec![("ltv.signal.ping_requested".to_string(), "true".to_string())]
    );
}

#[test]
fn unguarded_raw_write_goes_through() {
    let session = session(index(), index_server(false));
    let outcome = session.write_raw("rover.pr_telemetry.brakes", "true");
    assert!(outcome.was_sent());
    assert_eq!(session.transport().posts().len(), 1);
}

#[test]
fn raw_write_to_guarded_path_honours_the_guard() {
    let mut session = session(index(), index_server(false));
    let mut doc = MemoryDocument::new();
    session.tick(&mut doc);

    let outcome = session.write_raw("ltv.signal.ping_requested", "true");
    assert!(matches!(outcome, WriteOutcome::Blocked { .. }));
    assert!(session.transport().posts().is_empty());

    // Clearing the flag is not a start.
    assert!(session.write_raw("ltv.signal.ping_requested", "false").was_sent());

    session.transport().serve(
        "ROVER",
        json!({"pr_telemetry": {"dust_connected": true}}),
    );
    session.tick(&mut doc);
    assert_eq!(
        session.write_raw("ltv.signal.ping_requested", "true"),
        WriteOutcome::Sent { status: 200 }
    );
    assert_eq!(session.transport().posts().len(), 2);
}

#[test]
fn server_errors_alert_and_client_errors_do_not() {
    let session = session(index(), index_server(true));

    session.transport().post_status.store(503, Ordering::SeqCst);
    let outcome = session
        .handle_event(&UserEvent::Toggle {
            element: "rover-cabin-cooling".into(),
            checked: true,
        })
        .unwrap();
    assert_eq!(
        outcome.notice(),
        Some("Server error while updating rover.pr_telemetry.cabin_cooling. Server may be down.")
    );

    session.transport().post_status.store(400, Ordering::SeqCst);
    let outcome = session
        .handle_event(&UserEvent::Toggle {
            element: "rover-cabin-cooling".into(),
            checked: false,
        })
        .unwrap();
    assert_eq!(outcome, WriteOutcome::ClientRejected { status: 400 });
    assert_eq!(outcome.notice(), None);
}

#[test]
fn events_on_unknown_elements_are_errors() {
    let session = session(index(), index_server(true));
    assert!(session
        .handle_event(&UserEvent::Click { element: "no-such-button".into() })
        .is_err());
    assert!(session
        .handle_event(&UserEvent::Click { element: "eva1-heart-rate".into() })
        .is_err());
    assert!(session.transport().posts().is_empty());
}

// ---------------------------------------------------------------------------
// Team scope
// ---------------------------------------------------------------------------

fn team_page() -> PageTable {
    PageTable::parse(
        r#"
name = "team"

[[source]]
name = "EVA"
scope = "team"

[[element]]
id = "eva-started"
tag = "checkbox"
data-path = "eva.status.started"
"#,
    )
    .unwrap()
}

#[test]
fn team_page_reads_and_writes_the_selected_room() {
    let server = FakeServer::new();
    server.serve_url(
        &format!("{BASE}/data/teams/4/EVA.json"),
        json!({"status": {"started": true}}),
    );
    let mut session = session_with(team_page(), &config(), server, TeamSelection::new(Some(4)));
    let mut doc = MemoryDocument::new();

    assert!(session.tick(&mut doc).is_success());
    assert_eq!(doc.checked("eva-started"), Some(true));
    assert_eq!(session.room_for_writes(), Some(4));

    session
        .handle_event(&UserEvent::Toggle {
            element: "eva-started".into(),
            checked: false,
        })
        .unwrap();
    assert_eq!(
        session.transport().posts()[0].1,
        vec![
            ("eva.status.started".to_string(), "false".to_string()),
            ("room".to_string(), "4".to_string()),
        ]
    );
}

#[test]
fn global_pages_never_send_a_room() {
    let session = session_with(index(), &config(), index_server(true), TeamSelection::new(Some(4)));
    assert_eq!(session.room_for_writes(), None);

    session.write_raw("eva.status.started", "true");
    assert_eq!(session.transport().posts()[0].1.len(), 1);
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

#[test]
fn ticks_and_writes_are_logged() {
    let path = std::env::temp_dir().join(format!(
        "tss-console-session-{}.jsonl",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);

    let log = EventLog::at(&path);
    let mut session = PageSession::new(
        index(),
        &config(),
        index_server(true),
        TeamSelection::default(),
        log.clone(),
    )
    .unwrap();
    let mut doc = MemoryDocument::new();

    session.tick(&mut doc);
    session.write_raw("eva.status.started", "true");

    let entries = log.read_all();
    assert_eq!(entries.len(), 2);
    assert!(matches!(&entries[0], LogEntry::Poll { ok: true, page, .. } if page == "index"));
    assert!(matches!(
        &entries[1],
        LogEntry::Write { path, outcome, status: Some(200), .. }
            if path == "eva.status.started" && outcome == "sent"
    ));

    let _ = std::fs::remove_file(&path);
}
