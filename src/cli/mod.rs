//! CLI command implementations for tss-console.
//!
//! Provides subcommand handlers for:
//! - `tss-console watch` — poll a page and redraw it every cycle
//! - `tss-console toggle|press|set` — write a field back to the server
//! - `tss-console team` — show or change the selected team room
//! - `tss-console pages` — list the built-in pages
//! - `tss-console config show|init|set` — configuration management
//! - `tss-console log` — recent poll and write events

use std::io::IsTerminal;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::binder::{ElementState, MemoryDocument};
use crate::config::{self, ConsoleConfig};
use crate::logging::{EventLog, LogEntry};
use crate::page::{self, PageSession, PageTable};
use crate::poller::{CycleReport, HttpTransport};
use crate::status::{CONNECTED_COLOR, DISCONNECTED_COLOR, LINK_DOWN_COLOR};
use crate::team::TeamSelection;
use crate::writer::{UserEvent, WriteOutcome};

/// Which page to open: a built-in by name, or a page file.
#[derive(Debug, Clone, Default)]
pub struct PageChoice<'a> {
    pub name: Option<&'a str>,
    pub file: Option<&'a Path>,
}

impl PageChoice<'_> {
    fn resolve(&self, config: &ConsoleConfig) -> Result<PageTable> {
        match (self.file, self.name) {
            (Some(file), _) => PageTable::from_file(file),
            (None, Some(name)) => page::builtin(name),
            (None, None) => page::builtin(&config.session.page),
        }
    }
}

fn event_log(config: &ConsoleConfig) -> EventLog {
    config
        .logging
        .resolved_path()
        .map_or_else(EventLog::disabled, EventLog::at)
}

/// Open a session against the configured server.
///
/// `room` overrides the persisted team selection for this session only.
pub fn open_session(choice: &PageChoice, room: Option<u32>) -> Result<PageSession<HttpTransport>> {
    let config = config::load();
    let page = choice.resolve(&config)?;
    let team = match room {
        Some(room) => TeamSelection::new(Some(room)),
        None => TeamSelection::load(),
    };
    PageSession::new(page, &config, HttpTransport::new(), team, event_log(&config))
}

// ---------------------------------------------------------------------------
// tss-console watch
// ---------------------------------------------------------------------------

/// Poll a page and print it after every cycle.
pub fn run_watch(choice: &PageChoice, room: Option<u32>, cycles: Option<u64>) -> Result<()> {
    let mut session = open_session(choice, room)?;
    let mut doc = MemoryDocument::new();
    let redraw = cycles.is_none() && std::io::stdout().is_terminal();

    session.run(&mut doc, cycles, |session, doc, report| {
        if redraw {
            print!("\x1B[2J\x1B[H");
        }
        print_frame(session, doc, report);
    });

    Ok(())
}

fn print_frame(session: &PageSession<HttpTransport>, doc: &MemoryDocument, report: &CycleReport) {
    let page = session.page();
    let title = if page.title.is_empty() { &page.name } else { &page.title };

    println!("{}", title.bold().cyan());
    println!("{}", "=".repeat(60));

    let mut header: Vec<String> = session
        .indicators()
        .into_iter()
        .map(|(_, indicator)| paint(&indicator.label, indicator.color).to_string())
        .collect();
    if let Some(clock) = page.clock.as_deref().and_then(|id| doc.text(id)) {
        header.push(clock.dimmed().to_string());
    }
    if let Some(room) = session.team().room {
        header.push(format!("room {room}").dimmed().to_string());
    }
    println!("  {}", header.join("   "));

    for (source, err) in &report.failed {
        println!("  {} {}: {}", "✗".red().bold(), source, err.to_string().dimmed());
    }
    println!();

    let indicator_ids: Vec<&str> = page.indicators.iter().map(|i| i.element.as_str()).collect();
    for (id, state) in doc.iter() {
        if indicator_ids.contains(&id.as_str()) || page.clock.as_deref() == Some(id.as_str()) {
            continue;
        }
        let line = format!("  {:<32} {}", id, element_summary(state));
        match state.color.as_deref() {
            Some(color) => println!("{}", paint(&line, color)),
            None if state.enabled == Some(false) => println!("{}", line.dimmed()),
            None => println!("{line}"),
        }
    }
    println!();
    println!(
        "  {} {}ms",
        "latency".dimmed(),
        report.latency.as_millis()
    );
}

/// Plain-text rendering of one element's state.
fn element_summary(state: &ElementState) -> String {
    let mut parts = Vec::new();
    if let Some(text) = &state.text {
        parts.push(text.clone());
    }
    if let Some(checked) = state.checked {
        parts.push(if checked { "[x]" } else { "[ ]" }.to_string());
    }
    if let Some(enabled) = state.enabled {
        parts.push(if enabled { "(enabled)" } else { "(disabled)" }.to_string());
    }
    if parts.is_empty() && state.color.is_some() {
        parts.push("●".to_string());
    }
    parts.join(" ")
}

/// Map the page's CSS colours onto terminal colours.
fn paint(text: &str, css: &str) -> colored::ColoredString {
    match css {
        CONNECTED_COLOR | crate::binder::SENSOR_ACTIVE => text.green(),
        DISCONNECTED_COLOR => text.red(),
        LINK_DOWN_COLOR => text.blue(),
        crate::binder::SENSOR_INACTIVE => text.dimmed(),
        _ => text.normal(),
    }
}

// ---------------------------------------------------------------------------
// tss-console toggle | press | set
// ---------------------------------------------------------------------------

/// Flip a checkbox element.
pub fn run_toggle(choice: &PageChoice, element: &str, checked: bool) -> Result<()> {
    let event = UserEvent::Toggle {
        element: element.to_string(),
        checked,
    };
    send_event(choice, &event)
}

/// Click a button element.
pub fn run_press(choice: &PageChoice, element: &str) -> Result<()> {
    let event = UserEvent::Click {
        element: element.to_string(),
    };
    send_event(choice, &event)
}

fn send_event(choice: &PageChoice, event: &UserEvent) -> Result<()> {
    let session = guarded_session(choice)?;
    let outcome = session.handle_event(event)?;
    print_outcome(element_path(&session, event.element()), &outcome);
    Ok(())
}

/// Open a session for a write. Guards read live data, so a page with
/// guards takes one reading first.
fn guarded_session(choice: &PageChoice) -> Result<PageSession<HttpTransport>> {
    let mut session = open_session(choice, None)?;
    if !session.page().guards.is_empty() {
        session.tick(&mut MemoryDocument::new());
    }
    Ok(session)
}

fn element_path<'a>(session: &'a PageSession<HttpTransport>, element: &'a str) -> &'a str {
    session
        .bindings()
        .by_element(element)
        .map_or(element, |b| b.path.as_str())
}

/// Write a raw value to any field path.
pub fn run_set(choice: &PageChoice, path: &str, value: &str) -> Result<()> {
    let session = guarded_session(choice)?;
    let outcome = session.write_raw(path, value);
    print_outcome(path, &outcome);
    Ok(())
}

fn print_outcome(path: &str, outcome: &WriteOutcome) {
    match outcome {
        WriteOutcome::Sent { status } => println!(
            "{} {} {}",
            "✓".green().bold(),
            path.bold(),
            format!("({status})").dimmed()
        ),
        WriteOutcome::ClientRejected { status } => println!(
            "{} {} {}",
            "·".dimmed(),
            path,
            format!("rejected by server ({status})").dimmed()
        ),
        WriteOutcome::Blocked { message } => {
            println!("{} {}", "!".yellow().bold(), message.yellow())
        }
        WriteOutcome::Ignored => println!("{} {}", "·".dimmed(), "action ignored".dimmed()),
        WriteOutcome::ServerFailed { .. } | WriteOutcome::Unreachable { .. } => {
            match outcome.notice() {
                Some(notice) => eprintln!("{} {}", "✗".red().bold(), notice.red()),
                None => println!("{} {}", "·".dimmed(), outcome.tag().dimmed()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// tss-console team
// ---------------------------------------------------------------------------

/// Show, set, or clear the selected team room.
pub fn run_team(room: Option<u32>, clear: bool) -> Result<()> {
    let mut team = TeamSelection::load();

    if clear {
        team.clear();
        team.save()?;
        println!("{} Team selection cleared", "✓".green().bold());
        return Ok(());
    }

    match room {
        Some(room) => {
            team = TeamSelection::new(Some(room));
            let path = team.save()?;
            println!(
                "{} Room {} saved to {}",
                "✓".green().bold(),
                room.to_string().bold(),
                path.display()
            );
        }
        None => match team.room {
            Some(room) => println!("Room {}", room.to_string().bold()),
            None => println!("{}", "No team selected.".yellow()),
        },
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// tss-console pages
// ---------------------------------------------------------------------------

pub fn run_pages() -> Result<()> {
    println!("{}", "Built-in Pages".bold().cyan());
    println!("{}", "=".repeat(50));
    println!("  {:<8} {:<28} {:>7} {:>8}", "Name", "Title", "Sources", "Elements");
    println!("  {}", "-".repeat(54));

    let default_page = config::load().session.page;
    for name in page::builtin_names() {
        let table = page::builtin(name)?;
        let line = format!(
            "  {:<8} {:<28} {:>7} {:>8}",
            name,
            table.title,
            table.sources.len(),
            table.elements.len()
        );
        if name == default_page {
            println!("{}", line.bold());
        } else {
            println!("{line}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// tss-console config show | init | set
// ---------------------------------------------------------------------------

/// Show the effective (merged) configuration as TOML.
pub fn run_config_show() -> Result<()> {
    let toml_str = config::show_effective_config()?;
    println!("{}", "Effective tss-console Configuration".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();
    println!("{toml_str}");

    let global_exists = config::global_config_file().is_some_and(|p| p.exists());
    let project_exists = config::project_config_file().is_some_and(|p| p.exists());
    println!("{}", "Sources (highest priority last):".dimmed());
    println!("  {} built-in defaults", "·".dimmed());
    print_source(global_exists, "~/.tss-console/config.toml");
    print_source(project_exists, ".tss-console.toml");
    println!(
        "  {} {}",
        "·".dimmed(),
        "TSS_CONSOLE_* environment variables".dimmed()
    );

    Ok(())
}

fn print_source(exists: bool, name: &str) {
    if exists {
        println!("  {} {}", "✓".green(), name.dimmed());
    } else {
        println!("  {} {}", "·".dimmed(), format!("{name} (not found)").dimmed());
    }
}

/// Initialize a default config file at `~/.tss-console/config.toml`.
pub fn run_config_init(force: bool) -> Result<()> {
    let path = config::init_config(force)?;
    println!(
        "{} Config written to {}",
        "✓".green().bold(),
        path.display()
    );
    Ok(())
}

/// Set a single configuration value in the global config file.
pub fn run_config_set(key: &str, value: &str) -> Result<()> {
    config::set_config_value(key, value)?;
    println!("{} Set {} = {}", "✓".green().bold(), key.bold(), value);
    Ok(())
}

// ---------------------------------------------------------------------------
// tss-console log
// ---------------------------------------------------------------------------

/// Print the most recent poll and write events.
pub fn run_log(tail: usize) -> Result<()> {
    let log = event_log(&config::load());
    let entries = log.tail(tail);

    if entries.is_empty() {
        println!("{}", "No events logged yet.".yellow());
        return Ok(());
    }

    for entry in &entries {
        println!("{}", describe_entry(entry));
    }
    Ok(())
}

fn describe_entry(entry: &LogEntry) -> String {
    match entry {
        LogEntry::Poll {
            timestamp,
            page,
            ok,
            consecutive_failures,
            failed_sources,
            latency_ms,
        } => {
            let status = if *ok {
                "ok".green()
            } else {
                format!("failed x{consecutive_failures} [{}]", failed_sources.join(", ")).red()
            };
            format!("{} poll  {:<6} {} {}ms", timestamp.dimmed(), page, status, latency_ms)
        }
        LogEntry::Write {
            timestamp,
            page,
            path,
            value,
            outcome,
            status,
        } => {
            let status = status.map(|s| format!(" ({s})")).unwrap_or_default();
            format!(
                "{} write {:<6} {}={} {}{}",
                timestamp.dimmed(),
                page,
                path,
                value,
                outcome,
                status
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
