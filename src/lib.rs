//! SIGMA: maintenance tracking for railway signalling installations.
//!
//! SIGMA keeps the inspection elements of a maintenance organization
//! (track circuits, point motors, level crossings, signals, batteries,
//! interlockings) organized by sector, station and installation type, and
//! tracks the work done on them.
//!
//! # Core
//!
//! - **Assignment ledger** ([`plugins::assignments`]): which agents work each
//!   sector. An agent is in at most one sector at any time.
//! - **Monthly cycles** ([`plugins::cycles`]): per (month, year, sector), a
//!   mutable plan that validation freezes into an immutable archive. After
//!   validation the whole sector goes back to pending.
//!
//! # Architecture
//!
//! All state lives in `<project>/.sigma/data/sigma.db`. Every access goes
//! through `DbBroker`, which serializes callers in-process, wraps mutations
//! in one SQLite transaction and appends an event to
//! `broker.events.jsonl`.
//!
//! The CLI is the presentation layer. It takes the claimed user from
//! `.sigma/config.toml` (or `SIGMA_ACTOR` / `SIGMA_ROLE`), replaces the role
//! with the stored one for registered users, and checks the role before
//! calling into a subsystem.
//!
//! # Examples
//!
//! ```bash
//! sigma init --actor 9001 --role admin
//! sigma element add --sector UTRERA --station ARAHAL --type motores --name "AG 3"
//! sigma agent add --name "ruiz"
//! sigma assign move --agent AG_... --to UTRERA
//! sigma cycle plan --sector UTRERA --month 3 --year 2024 --element EL_...
//! sigma cycle validate --sector UTRERA --month 3 --year 2024
//! sigma dashboard --sector UTRERA --format json
//! ```

pub mod core;
pub mod plugins;
mod subsystems;

use crate::core::{
    broker,
    config::{self, SigmaConfig},
    error::SigmaError,
    identity::{Actor, Capability, Role},
    output::{self, OutputFormat},
    store::{self, Store},
};
use crate::plugins::{agents, assignments, cycles, elements, users};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(
    name = "sigma",
    version = env!("CARGO_PKG_VERSION"),
    about = "Maintenance tracking for railway signalling installations"
)]
struct Cli {
    /// Output format
    #[clap(long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct InitCli {
    /// Directory to initialize (defaults to the current directory)
    #[clap(long)]
    dir: Option<PathBuf>,
    /// Overwrite an existing configuration
    #[clap(long)]
    force: bool,
    /// Matricula of the local operator
    #[clap(long, default_value = "admin")]
    actor: String,
    #[clap(long, value_enum, default_value = "admin")]
    role: Role,
}

#[derive(clap::Args, Debug)]
struct BrowseCli {
    /// List the stations of a sector
    #[clap(long)]
    sector: Option<String>,
    /// List installation types of a station
    #[clap(long, conflicts_with = "sector")]
    station: Option<String>,
}

#[derive(clap::Args, Debug)]
struct AuditCli {
    /// Show only the last N events
    #[clap(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the project store and default configuration
    #[clap(name = "init")]
    Init(InitCli),

    /// Navigate sectors, stations and installation types
    #[clap(name = "browse", visible_alias = "b")]
    Browse(BrowseCli),

    /// Manage inspection elements and record work
    #[clap(name = "element", visible_alias = "e")]
    Element(elements::ElementCli),

    /// Manage the agent registry
    #[clap(name = "agent")]
    Agent(agents::AgentCli),

    /// Assign agents to sectors
    #[clap(name = "assign", visible_alias = "a")]
    Assign(assignments::AssignCli),

    /// Plan and validate monthly cycles
    #[clap(name = "cycle", visible_alias = "c")]
    Cycle(cycles::CycleCli),

    /// Completion dashboard for a sector
    #[clap(name = "dashboard", visible_alias = "d")]
    Dashboard(cycles::DashboardCli),

    /// User accounts and registration requests
    #[clap(name = "user", visible_alias = "u")]
    User(users::UserCli),

    /// Print subsystem schemas as JSON
    #[clap(name = "schema")]
    Schema,

    /// Show the audit log of brokered operations
    #[clap(name = "audit")]
    Audit(AuditCli),

    /// Show version information
    #[clap(name = "version")]
    Version,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Init(_) => "init",
            Command::Browse(_) => "browse",
            Command::Element(_) => "element",
            Command::Agent(_) => "agent",
            Command::Assign(_) => "assign",
            Command::Cycle(_) => "cycle",
            Command::Dashboard(_) => "dashboard",
            Command::User(_) => "user",
            Command::Schema => "schema",
            Command::Audit(_) => "audit",
            Command::Version => "version",
        }
    }
}

pub fn run() -> Result<(), SigmaError> {
    let cli = Cli::parse();
    let format = cli.format;
    let cmd_name = cli.command.name();

    let result = dispatch(cli.command, format);
    if let (Err(e), OutputFormat::Json) = (&result, format) {
        println!(
            "{}",
            serde_json::to_string_pretty(&output::error_envelope(cmd_name, e))?
        );
    }
    result
}

fn dispatch(command: Command, format: OutputFormat) -> Result<(), SigmaError> {
    let current_dir = std::env::current_dir()?;

    let command = match command {
        Command::Version => {
            return output::emit(
                format,
                "version",
                serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
                || println!("v{}", env!("CARGO_PKG_VERSION")),
            );
        }
        Command::Schema => return print_schema(),
        Command::Init(init) => return init_project(&current_dir, init, format),
        other => other,
    };

    let project_root = store::find_project_root(&current_dir)?;
    let config = config::load_config(&project_root)?;
    let store = Store::for_project(&project_root)?;
    let claimed = config.resolve_actor()?;
    let actor = match &command {
        Command::User(cli) if cli.is_request() => claimed,
        _ => users::authenticate(&store, claimed, &config.actor.matricula)?,
    };

    match command {
        Command::Browse(cli) => run_browse(&store, &config, &actor, format, cli),
        Command::Element(cli) => elements::run_element_cli(&store, &config, &actor, format, cli),
        Command::Agent(cli) => agents::run_agent_cli(&store, &actor, format, cli),
        Command::Assign(cli) => assignments::run_assign_cli(&store, &config, &actor, format, cli),
        Command::Cycle(cli) => cycles::run_cycle_cli(&store, &config, &actor, format, cli),
        Command::Dashboard(cli) => {
            cycles::run_dashboard_cli(&store, &config, &actor, format, cli)
        }
        Command::User(cli) => users::run_user_cli(&store, &actor, format, cli),
        Command::Audit(cli) => run_audit(&store, &actor, format, cli),
        Command::Init(_) | Command::Schema | Command::Version => Ok(()),
    }
}

fn init_project(current_dir: &Path, init: InitCli, format: OutputFormat) -> Result<(), SigmaError> {
    let target_dir = init.dir.unwrap_or_else(|| current_dir.to_path_buf());
    std::fs::create_dir_all(&target_dir)?;
    let target_dir = std::fs::canonicalize(&target_dir)?;

    let config_path = config::config_path(&target_dir);
    if config_path.exists() && !init.force {
        return output::emit(
            format,
            "init",
            serde_json::json!({ "initialized": false, "config": config_path, "reason": "already initialized" }),
            || {
                println!("{} SIGMA already initialized here", "▸".bright_yellow());
                println!("  Use {} to overwrite the configuration", "--force".bright_cyan());
            },
        );
    }

    let mut cfg = SigmaConfig::default();
    cfg.actor.matricula = init.actor.trim().to_string();
    cfg.actor.role = init.role.as_str().to_string();
    let written = config::write_config(&target_dir, &cfg, init.force)?;

    let store = Store::for_project(&target_dir)?;
    subsystems::initialize_all_dbs(&store.root)?;

    output::emit(
        format,
        "init",
        serde_json::json!({
            "initialized": true,
            "config": written,
            "store": store.root,
            "subsystems": subsystems::subsystem_names(),
        }),
        || {
            println!("{} SIGMA initialized in {}", "✓".green(), target_dir.display());
            println!("  Config: {}", written.display());
            println!("  Operator: {} ({})", cfg.actor.matricula, cfg.actor.role);
        },
    )
}

#[derive(serde::Serialize)]
struct SectorSummary {
    sector: String,
    stations: usize,
    elements: usize,
    agents: usize,
}

fn run_browse(
    store: &Store,
    config: &SigmaConfig,
    actor: &Actor,
    format: OutputFormat,
    cli: BrowseCli,
) -> Result<(), SigmaError> {
    actor.require(Capability::Read)?;
    subsystems::initialize_all_dbs(&store.root)?;

    if let Some(sector) = cli.sector {
        let stations = elements::station_overview(store, config, &sector)?;
        return output::emit(
            format,
            "browse.sector",
            serde_json::json!({ "sector": sector, "stations": stations }),
            || {
                println!("{}", sector.bold());
                if stations.is_empty() {
                    println!("  No stations configured.");
                }
                for s in &stations {
                    println!("  {:<28} {:>4} elements", s.station, s.elements);
                }
            },
        );
    }

    if let Some(station) = cli.station {
        let types = elements::type_overview(store, &station)?;
        return output::emit(
            format,
            "browse.station",
            serde_json::json!({ "station": station, "types": types }),
            || {
                println!("{}", station.bold());
                for t in &types {
                    println!("  {:<18} {:>4} elements", t.label, t.elements);
                }
            },
        );
    }

    let all = elements::list_elements(store, &elements::ElementFilter::default())?;
    let mapping = assignments::load_assignments(store)?;
    let sectors: Vec<SectorSummary> = config
        .sectors
        .iter()
        .map(|sector| SectorSummary {
            sector: sector.clone(),
            stations: config.stations_of(sector).len(),
            elements: all.iter().filter(|e| &e.sector == sector).count(),
            agents: mapping.agents_in(sector).len(),
        })
        .collect();
    output::emit(
        format,
        "browse",
        serde_json::json!({ "sectors": sectors }),
        || {
            for s in &sectors {
                println!(
                    "{:<22} {:>3} stations {:>5} elements {:>3} agents",
                    s.sector.bold(),
                    s.stations,
                    s.elements,
                    s.agents
                );
            }
        },
    )
}

fn run_audit(
    store: &Store,
    actor: &Actor,
    format: OutputFormat,
    cli: AuditCli,
) -> Result<(), SigmaError> {
    actor.require(Capability::Read)?;
    let events = broker::read_audit_log(&store.root)?;
    let skip = events.len().saturating_sub(cli.limit);
    let shown = &events[skip..];
    output::emit(
        format,
        "audit",
        serde_json::json!({ "total": events.len(), "events": shown }),
        || {
            for ev in shown {
                let status = if ev.status == "success" {
                    ev.status.green()
                } else {
                    ev.status.red()
                };
                println!("{}  {:<10} {:<22} {}", ev.ts, ev.actor, ev.op, status);
            }
        },
    )
}

fn print_schema() -> Result<(), SigmaError> {
    let schema = serde_json::json!({
        "name": "sigma",
        "version": env!("CARGO_PKG_VERSION"),
        "subsystems": subsystems::subsystem_names(),
        "schemas": [
            broker::schema(),
            elements::schema(),
            agents::schema(),
            assignments::schema(),
            cycles::schema(),
            users::schema(),
        ]
    });
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
