//! Assignment ledger: which agents currently work each sector.
//!
//! The mapping logic is pure. [`reassign`] and [`remove_agent`] take the
//! current mapping and return a full replacement, so an agent can never end
//! up listed under two sectors. Persistence goes through [`AssignmentStore`],
//! one row per sector holding the ordered agent ids.

use crate::core::broker::DbBroker;
use crate::core::config::SigmaConfig;
use crate::core::db::{self, json_column};
use crate::core::error::SigmaError;
use crate::core::identity::{Actor, Capability};
use crate::core::output::{self, OutputFormat};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::agents::{self, Agent, AgentRepository, SqliteAgents};
use colored::Colorize;
use rusqlite::{Connection, params};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use ulid::Ulid;

/// Sector name to the ordered agents assigned there. Sectors with no
/// agents are not listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Assignments {
    sectors: BTreeMap<String, Vec<Agent>>,
}

impl Assignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sectors(&self) -> &BTreeMap<String, Vec<Agent>> {
        &self.sectors
    }

    pub fn agents_in(&self, sector: &str) -> &[Agent] {
        self.sectors.get(sector).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn agent_ids(&self, sector: &str) -> Vec<String> {
        self.agents_in(sector).iter().map(|a| a.id.clone()).collect()
    }

    pub fn sector_of(&self, agent_id: &str) -> Option<&str> {
        self.sectors
            .iter()
            .find(|(_, agents)| agents.iter().any(|a| a.id == agent_id))
            .map(|(sector, _)| sector.as_str())
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.sector_of(agent_id).is_some()
    }
}

/// Where a reassigned agent goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Sector(String),
    Unassigned,
}

/// Move `agent_id` to `target`, removing it from wherever it was.
pub fn reassign(
    mapping: &Assignments,
    all_agents: &[Agent],
    agent_id: &str,
    target: &Target,
) -> Result<Assignments, SigmaError> {
    let agent = all_agents
        .iter()
        .find(|a| a.id == agent_id)
        .ok_or_else(|| SigmaError::NotFound(format!("Agent '{}'", agent_id)))?;

    let mut next = remove_agent(agent_id, mapping);
    if let Target::Sector(sector) = target {
        next.sectors
            .entry(sector.clone())
            .or_default()
            .push(agent.clone());
    }
    Ok(next)
}

/// Drop `agent_id` from every sector. Unknown ids leave the mapping as is.
pub fn remove_agent(agent_id: &str, mapping: &Assignments) -> Assignments {
    let sectors = mapping
        .sectors
        .iter()
        .map(|(sector, agents)| {
            (
                sector.clone(),
                agents
                    .iter()
                    .filter(|a| a.id != agent_id)
                    .cloned()
                    .collect::<Vec<_>>(),
            )
        })
        .filter(|(_, agents)| !agents.is_empty())
        .collect();
    Assignments { sectors }
}

/// Agents not assigned to any sector, in registry order.
pub fn unassigned_agents(all_agents: &[Agent], mapping: &Assignments) -> Vec<Agent> {
    all_agents
        .iter()
        .filter(|a| !mapping.contains(&a.id))
        .cloned()
        .collect()
}

/// Sectors whose agent list differs between two mappings.
pub fn changed_sectors(before: &Assignments, after: &Assignments) -> Vec<String> {
    let keys: BTreeSet<&String> = before.sectors.keys().chain(after.sectors.keys()).collect();
    keys.into_iter()
        .filter(|s| before.agents_in(s) != after.agents_in(s))
        .cloned()
        .collect()
}

/// Resolve stored ids to agents. Ids with no agent are dropped, and an id
/// already seen in an earlier sector is ignored.
pub fn hydrate(stored: &BTreeMap<String, Vec<String>>, all_agents: &[Agent]) -> Assignments {
    let mut seen = HashSet::new();
    let mut sectors = BTreeMap::new();
    for (sector, ids) in stored {
        let agents: Vec<Agent> = ids
            .iter()
            .filter_map(|id| all_agents.iter().find(|a| &a.id == id))
            .filter(|a| seen.insert(a.id.clone()))
            .cloned()
            .collect();
        if !agents.is_empty() {
            sectors.insert(sector.clone(), agents);
        }
    }
    Assignments { sectors }
}

pub trait AssignmentStore {
    fn load(&self) -> Result<BTreeMap<String, Vec<String>>, SigmaError>;
    /// Replace the agent ids stored for one sector.
    fn save(&self, sector: &str, agent_ids: &[String]) -> Result<(), SigmaError>;
}

pub struct SqliteAssignments<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteAssignments<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl AssignmentStore for SqliteAssignments<'_> {
    fn load(&self) -> Result<BTreeMap<String, Vec<String>>, SigmaError> {
        let mut stmt = self
            .conn
            .prepare("SELECT sector, agent_ids FROM assignments ORDER BY sector")?;
        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(1)?;
            Ok((row.get::<_, String>(0)?, json_column::<Vec<String>>(&raw, 1)?))
        })?;
        let mut out = BTreeMap::new();
        for r in rows {
            let (sector, ids) = r?;
            out.insert(sector, ids);
        }
        Ok(out)
    }

    fn save(&self, sector: &str, agent_ids: &[String]) -> Result<(), SigmaError> {
        self.conn.execute(
            "INSERT INTO assignments(sector, agent_ids, updated_at) VALUES(?1, ?2, ?3)
             ON CONFLICT(sector) DO UPDATE SET agent_ids = excluded.agent_ids, updated_at = excluded.updated_at",
            params![sector, serde_json::to_string(agent_ids)?, time::now_epoch_z()],
        )?;
        Ok(())
    }
}

pub fn initialize_assignments_db(root: &Path) -> Result<(), SigmaError> {
    let broker = DbBroker::new(root);
    let db_path = db::sigma_db_path(root);

    broker.with_conn(&db_path, "sigma", None, "assignments.init", |conn| {
        conn.execute(schemas::ASSIGNMENTS_DB_SCHEMA, [])?;
        Ok(())
    })
}

fn load_with(conn: &Connection) -> Result<(Assignments, Vec<Agent>), SigmaError> {
    let all = SqliteAgents::new(conn).list()?;
    let stored = SqliteAssignments::new(conn).load()?;
    Ok((hydrate(&stored, &all), all))
}

pub fn load_assignments(store: &Store) -> Result<Assignments, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "assign.load", |conn| {
        Ok(load_with(conn)?.0)
    })
}

#[derive(Debug, Serialize, Clone)]
pub struct LedgerView {
    pub assignments: Assignments,
    pub unassigned: Vec<Agent>,
}

/// The mapping plus the agents not working any sector.
pub fn ledger_view(store: &Store) -> Result<LedgerView, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "assign.view", |conn| {
        let (assignments, all) = load_with(conn)?;
        let unassigned = unassigned_agents(&all, &assignments);
        Ok(LedgerView {
            assignments,
            unassigned,
        })
    })
}

pub fn sector_of(store: &Store, agent_id: &str) -> Result<Option<String>, SigmaError> {
    Ok(load_assignments(store)?.sector_of(agent_id).map(str::to_string))
}

/// Apply a reassignment and persist every sector it changed, atomically.
pub fn reassign_agent(
    store: &Store,
    config: &SigmaConfig,
    actor: &Actor,
    agent_id: &str,
    target: Target,
) -> Result<Assignments, SigmaError> {
    if let Target::Sector(sector) = &target {
        config.require_sector(sector)?;
    }

    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:assign.reassign:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "assign.reassign", |conn| {
        let (before, all) = load_with(conn)?;
        let after = reassign(&before, &all, agent_id, &target)?;
        let ledger = SqliteAssignments::new(conn);
        for sector in changed_sectors(&before, &after) {
            ledger.save(&sector, &after.agent_ids(&sector))?;
        }
        Ok(after)
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "assign",
        "version": "0.1.0",
        "description": "Sector assignment ledger; each agent works at most one sector",
        "commands": [
            { "name": "show", "parameters": [] },
            { "name": "move", "parameters": ["agent", "to?", "unassign"] },
            { "name": "where", "parameters": ["agent"] }
        ],
        "storage": [schemas::SIGMA_DB_NAME]
    })
}

// CLI types for clap integration
#[derive(clap::Args, Debug)]
pub struct AssignCli {
    #[clap(subcommand)]
    pub command: AssignCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum AssignCommand {
    /// Show sector assignments and unassigned agents
    Show,
    /// Move an agent to a sector, or back to the unassigned pool
    Move {
        #[clap(long)]
        agent: String,
        #[clap(long, conflicts_with = "unassign", required_unless_present = "unassign")]
        to: Option<String>,
        #[clap(long)]
        unassign: bool,
    },
    /// Print the sector an agent works
    Where {
        #[clap(long)]
        agent: String,
    },
}

fn print_ledger(config: &SigmaConfig, view: &LedgerView) {
    for sector in &config.sectors {
        let agents = view.assignments.agents_in(sector);
        let names: Vec<String> = agents.iter().map(|a| a.name.clone()).collect();
        println!(
            "{} ({}): {}",
            sector.bold(),
            agents.len(),
            if names.is_empty() {
                "-".dimmed().to_string()
            } else {
                names.join(", ")
            }
        );
    }
    // Sectors assigned before they were dropped from the navigation list.
    for (sector, agents) in view.assignments.sectors() {
        if !config.sectors.contains(sector) {
            let names: Vec<String> = agents.iter().map(|a| a.name.clone()).collect();
            println!("{} ({}): {}", sector, agents.len(), names.join(", "));
        }
    }
    let pool: Vec<String> = view.unassigned.iter().map(|a| a.name.clone()).collect();
    println!("{}: {}", "UNASSIGNED".yellow(), pool.join(", "));
}

pub fn run_assign_cli(
    store: &Store,
    config: &SigmaConfig,
    actor: &Actor,
    format: OutputFormat,
    cli: AssignCli,
) -> Result<(), SigmaError> {
    agents::initialize_agents_db(&store.root)?;
    initialize_assignments_db(&store.root)?;

    match cli.command {
        AssignCommand::Show => {
            actor.require(Capability::Read)?;
            let view = ledger_view(store)?;
            output::emit(format, "assign.show", serde_json::json!({ "ledger": view }), || {
                print_ledger(config, &view)
            })?;
        }
        AssignCommand::Move {
            agent,
            to,
            unassign,
        } => {
            actor.require(Capability::ManageAgents)?;
            let target = match to {
                Some(sector) if !unassign => Target::Sector(sector),
                _ => Target::Unassigned,
            };
            let mapping = reassign_agent(store, config, actor, &agent, target)?;
            let sector = mapping.sector_of(&agent).map(str::to_string);
            output::emit(
                format,
                "assign.move",
                serde_json::json!({ "agent": agent, "sector": sector, "assignments": mapping }),
                || match &sector {
                    Some(s) => println!("✓ {} now works {}", agent, s),
                    None => println!("✓ {} is unassigned", agent),
                },
            )?;
        }
        AssignCommand::Where { agent } => {
            actor.require(Capability::Read)?;
            let sector = sector_of(store, &agent)?;
            output::emit(
                format,
                "assign.where",
                serde_json::json!({ "agent": agent, "sector": sector }),
                || println!("{}", sector.as_deref().unwrap_or("UNASSIGNED")),
            )?;
        }
    }

    Ok(())
}
