use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use tss_console::cli::{self, PageChoice};

#[derive(Debug, Parser)]
#[command(name = "tss-console")]
#[command(about = "Operator console for the telemetry stream server")]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct PageArgs {
    /// Built-in page: index, dcu, uia, spec (default from config)
    #[arg(long)]
    page: Option<String>,
    /// Load the page table from a TOML file instead
    #[arg(long, conflicts_with = "page")]
    page_file: Option<PathBuf>,
}

impl PageArgs {
    fn choice(&self) -> PageChoice<'_> {
        PageChoice {
            name: self.page.as_deref(),
            file: self.page_file.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll a page and redraw it every cycle
    Watch {
        #[command(flatten)]
        page: PageArgs,
        /// Read team data for this room instead of the saved selection
        #[arg(long)]
        room: Option<u32>,
        /// Stop after N cycles (default: run until interrupted)
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Flip a checkbox element on or off
    Toggle {
        element: String,
        #[arg(value_enum)]
        state: Switch,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Click a button element
    Press {
        element: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Write a raw value to a field path
    Set {
        path: String,
        value: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Show, set, or clear the selected team room
    Team {
        room: Option<u32>,
        #[arg(long, conflicts_with = "room")]
        clear: bool,
    },
    /// List the built-in pages
    Pages,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show recent poll and write events
    Log {
        /// Number of events to show
        #[arg(long, default_value = "20")]
        tail: usize,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default config to ~/.tss-console/config.toml
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Set a dotted key, e.g. `poll.interval_ms 500`
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    let app = App::parse();

    match app.command {
        Commands::Watch { page, room, cycles } => cli::run_watch(&page.choice(), room, cycles),
        Commands::Toggle {
            element,
            state,
            page,
        } => cli::run_toggle(&page.choice(), &element, matches!(state, Switch::On)),
        Commands::Press { element, page } => cli::run_press(&page.choice(), &element),
        Commands::Set { path, value, page } => cli::run_set(&page.choice(), &path, &value),
        Commands::Team { room, clear } => cli::run_team(room, clear),
        Commands::Pages => cli::run_pages(),
        Commands::Config { action } => match action {
            ConfigAction::Show => cli::run_config_show(),
            ConfigAction::Init { force } => cli::run_config_init(force),
            ConfigAction::Set { key, value } => cli::run_config_set(&key, &value),
        },
        Commands::Log { tail } => cli::run_log(tail),
    }
}
