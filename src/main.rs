// FlashBatch - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. Configuration loading and logging initialisation
// 3. Offline management of settings and session logs
// 4. Replay of recorded engine traffic

use clap::{Parser, Subcommand, ValueEnum};
use flashbatch::app::engine::DetachedEngine;
use flashbatch::app::reconciler::MassProduction;
use flashbatch::app::replay;
use flashbatch::app::session_log::SessionLogStore;
use flashbatch::app::state::AppState;
use flashbatch::core::export;
use flashbatch::core::filter::RuleDraft;
use flashbatch::core::model::{FilterField, FilterList, Session};
use flashbatch::platform::bus::EventBus;
use flashbatch::platform::config::{self, AppConfig, PlatformPaths};
use flashbatch::platform::store::JsonStore;
use flashbatch::util::error::{FlashBatchError, Result};
use flashbatch::util::{constants, logging, time};
use std::error::Error as _;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "FlashBatch", version, about)]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Directory holding the settings and session log documents.
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print where settings, session logs and the runtime log live.
    Paths,

    /// List finalized sessions, newest first.
    Sessions {
        /// Show every retained session instead of the most recent ones.
        #[arg(long)]
        all: bool,
    },

    /// Remove every stored session log.
    ClearSessions,

    /// Export session logs.
    Export {
        #[arg(short = 'f', long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        #[arg(short = 'o', long)]
        output: PathBuf,
    },

    /// Manage whitelist and blacklist rules.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Set the maximum number of ports flashed at once (clamped to 1-32).
    Concurrency {
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Turn port filtering on or off.
    Filter {
        #[arg(value_enum)]
        state: Switch,
    },

    /// Feed a JSON-lines recording of engine traffic through the client.
    Replay { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum RulesAction {
    /// Print both rule lists.
    List,

    /// Add a rule and print its id.
    Add {
        #[arg(value_enum)]
        list: ListArg,
        /// vid_pid, serial_number, location_path or port_name.
        #[arg(value_parser = parse_field)]
        field: FilterField,
        value: String,
        /// Store the rule disabled.
        #[arg(long)]
        disabled: bool,
    },

    /// Delete a rule by id.
    Remove {
        #[arg(value_enum)]
        list: ListArg,
        id: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportFormat {
    Csv,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Switch {
    On,
    Off,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListArg {
    Whitelist,
    Blacklist,
}

impl From<ListArg> for FilterList {
    fn from(arg: ListArg) -> Self {
        match arg {
            ListArg::Whitelist => FilterList::Whitelist,
            ListArg::Blacklist => FilterList::Blacklist,
        }
    }
}

fn parse_field(raw: &str) -> std::result::Result<FilterField, String> {
    FilterField::parse(raw).ok_or_else(|| {
        format!("unknown field '{raw}'; expected vid_pid, serial_number, location_path or port_name")
    })
}

fn main() {
    let cli = Cli::parse();

    let mut paths = PlatformPaths::resolve();
    if let Some(dir) = cli.data_dir.clone() {
        paths = paths.with_data_dir(dir);
    }
    let (app_config, config_warnings) = config::load_config(&paths.config_dir);

    let log_file = app_config
        .log_file
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| paths.runtime_log_path());
    let _log_guard = logging::init(cli.debug, app_config.log_level.as_deref(), Some(&log_file));

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        data_dir = %paths.data_dir.display(),
        "FlashBatch starting"
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Configuration warning");
        eprintln!("Warning: {warning}");
    }

    if let Err(e) = run(cli.command, &paths, &app_config, &log_file) {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

/// Build the reconciler over the on-disk documents, with no engine attached.
fn open_mass_production(paths: &PlatformPaths, app_config: &AppConfig) -> MassProduction<DetachedEngine> {
    let session_logs = SessionLogStore::with_retention(
        JsonStore::new(paths.session_log_path()),
        app_config.retention_days,
    );
    let mut mp = MassProduction::new(
        DetachedEngine,
        JsonStore::new(paths.settings_path()),
        session_logs,
        time::now_ms,
    );
    mp.load_from_storage();
    mp
}

fn run(command: Command, paths: &PlatformPaths, app_config: &AppConfig, log_file: &Path) -> Result<()> {
    match command {
        Command::Paths => {
            println!("config:      {}", paths.config_path().display());
            println!("settings:    {}", paths.settings_path().display());
            println!("session log: {}", paths.session_log_path().display());
            println!("runtime log: {}", log_file.display());
        }

        Command::Sessions { all } => {
            let mp = open_mass_production(paths, app_config);
            let logs = mp.session_logs();
            let sessions = if all { logs.logs() } else { logs.recent() };
            if sessions.is_empty() {
                println!("No session logs.");
            }
            for session in sessions {
                print_session(session);
            }
        }

        Command::ClearSessions => {
            let mut mp = open_mass_production(paths, app_config);
            mp.clear_session_logs()?;
            println!("Session logs cleared.");
        }

        Command::Export { format, output } => {
            let mp = open_mass_production(paths, app_config);
            let file = File::create(&output).map_err(|e| FlashBatchError::Io {
                path: output.clone(),
                operation: "create export file",
                source: e,
            })?;
            let writer = BufWriter::new(file);
            let sessions = mp.session_logs().logs();
            let count = match format {
                ExportFormat::Csv => export::export_csv(sessions, writer, &output)?,
                ExportFormat::Json => export::export_json(sessions, writer, &output)?,
            };
            println!("Exported {count} row(s) to {}", output.display());
        }

        Command::Rules { action } => run_rules(action, paths, app_config),

        Command::Concurrency { value } => {
            let mut mp = open_mass_production(paths, app_config);
            let stored = mp.set_max_concurrency(value);
            println!("Max concurrency: {stored}");
        }

        Command::Filter { state } => {
            let mut mp = open_mass_production(paths, app_config);
            let enabled = matches!(state, Switch::On);
            mp.set_filter_enabled(enabled);
            println!("Filtering {}", if enabled { "enabled" } else { "disabled" });
        }

        Command::Replay { file } => {
            let mp = open_mass_production(paths, app_config);
            let bus = EventBus::new();
            let mut state = AppState::new(mp, &bus, app_config.max_log_messages, time::now_ms);
            let reader = File::open(&file).map(BufReader::new).map_err(|e| FlashBatchError::Io {
                path: file.clone(),
                operation: "open replay",
                source: e,
            })?;
            let summary = replay::replay(&mut state, reader, &file)?;
            for line in &summary.lines {
                println!("{line}");
            }
            for error in &summary.errors {
                eprintln!("Skipped {error}");
            }
            println!(
                "Replayed {} record(s), skipped {}; {} session(s) stored",
                summary.applied,
                summary.skipped,
                state.mass_production.session_logs().logs().len()
            );
        }
    }
    Ok(())
}

fn run_rules(action: RulesAction, paths: &PlatformPaths, app_config: &AppConfig) {
    let mut mp = open_mass_production(paths, app_config);
    match action {
        RulesAction::List => {
            let settings = mp.settings();
            println!(
                "Filtering {}",
                if settings.is_filter_enabled { "enabled" } else { "disabled" }
            );
            for list in [FilterList::Whitelist, FilterList::Blacklist] {
                println!("{}:", list.label());
                let rules = settings.rules(list);
                if rules.is_empty() {
                    println!("  (none)");
                }
                for rule in rules {
                    let mark = if rule.enabled { 'x' } else { ' ' };
                    println!("  [{mark}] {}  {} = {}", rule.id, rule.field, rule.value);
                }
            }
        }
        RulesAction::Add {
            list,
            field,
            value,
            disabled,
        } => {
            let id = mp.add_rule(
                list.into(),
                RuleDraft {
                    field,
                    value,
                    enabled: !disabled,
                },
            );
            println!("{id}");
        }
        RulesAction::Remove { list, id } => {
            if mp.remove_rule(list.into(), &id) {
                println!("Removed {id}");
            } else {
                println!("No rule {id} in {}", FilterList::from(list).label());
            }
        }
    }
}

fn print_session(session: &Session) {
    let duration = session
        .duration_ms()
        .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "#{:<6} {}  {:>8}  {:<10} {} ok / {} failed / {} total{}",
        session.session_id,
        time::format_local(session.started_at),
        duration,
        session.chip_model.as_deref().unwrap_or("-"),
        session.success,
        session.failed,
        session.total,
        if session.manual_stopped { "  (stopped)" } else { "" }
    );
}
