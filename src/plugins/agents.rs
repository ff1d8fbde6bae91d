//! Agent registry.
//!
//! Agents are field staff that can be assigned to a sector. Names are stored
//! uppercase. History records mention agents by name, so deleting an agent
//! never touches maintenance or fault history.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::SigmaError;
use crate::core::identity::{Actor, Capability};
use crate::core::output::{self, OutputFormat};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::assignments::{self, AssignmentStore, SqliteAssignments};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use ulid::Ulid;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Agent {
    pub id: String,
    pub name: String,
}

pub trait AgentRepository {
    fn list(&self) -> Result<Vec<Agent>, SigmaError>;
    fn create(&self, name: &str) -> Result<Agent, SigmaError>;
    fn delete(&self, id: &str) -> Result<(), SigmaError>;
}

pub struct SqliteAgents<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteAgents<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl AgentRepository for SqliteAgents<'_> {
    fn list(&self) -> Result<Vec<Agent>, SigmaError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM agents ORDER BY name, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Agent {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    fn create(&self, name: &str) -> Result<Agent, SigmaError> {
        let agent = Agent {
            id: time::new_id("AG"),
            name: name.to_string(),
        };
        self.conn.execute(
            "INSERT INTO agents(id, name, created_at) VALUES(?1, ?2, ?3)",
            params![agent.id, agent.name, time::now_epoch_z()],
        )?;
        Ok(agent)
    }

    fn delete(&self, id: &str) -> Result<(), SigmaError> {
        let changed = self.conn.execute("DELETE FROM agents WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(SigmaError::NotFound(format!("Agent '{}'", id)));
        }
        Ok(())
    }
}

pub fn initialize_agents_db(root: &Path) -> Result<(), SigmaError> {
    let broker = DbBroker::new(root);
    let db_path = db::sigma_db_path(root);

    broker.with_conn(&db_path, "sigma", None, "agents.init", |conn| {
        conn.execute(schemas::AGENTS_DB_SCHEMA, [])?;
        Ok(())
    })
}

/// Display form of an agent name: trimmed and uppercased.
pub fn normalize_name(raw: &str) -> Result<String, SigmaError> {
    let name = raw.trim().to_uppercase();
    if name.is_empty() {
        return Err(SigmaError::ValidationError(
            "Agent name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

pub fn create_agent(store: &Store, actor: &Actor, name: &str) -> Result<Agent, SigmaError> {
    let name = normalize_name(name)?;
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:agent.create:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "agent.create", |conn| {
        SqliteAgents::new(conn).create(&name)
    })
}

pub fn list_agents(store: &Store) -> Result<Vec<Agent>, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "agent.list", |conn| {
        SqliteAgents::new(conn).list()
    })
}

/// Delete an agent and purge it from every sector in one transaction.
pub fn delete_agent(store: &Store, actor: &Actor, id: &str) -> Result<Agent, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:agent.delete:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "agent.delete", |conn| {
        let agents = SqliteAgents::new(conn);
        let all = agents.list()?;
        let agent = all
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| SigmaError::NotFound(format!("Agent '{}'", id)))?;

        let ledger = SqliteAssignments::new(conn);
        let before = assignments::hydrate(&ledger.load()?, &all);
        let after = assignments::remove_agent(id, &before);
        for sector in assignments::changed_sectors(&before, &after) {
            ledger.save(&sector, &after.agent_ids(&sector))?;
        }

        agents.delete(id)?;
        Ok(agent)
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "agents",
        "version": "0.1.0",
        "description": "Registry of field agents",
        "commands": [
            { "name": "add", "parameters": ["name"] },
            { "name": "list", "parameters": [] },
            { "name": "delete", "parameters": ["id"] }
        ],
        "storage": [schemas::SIGMA_DB_NAME]
    })
}

// CLI types for clap integration
#[derive(clap::Args, Debug)]
pub struct AgentCli {
    #[clap(subcommand)]
    pub command: AgentCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum AgentCommand {
    /// Register an agent
    Add {
        #[clap(long)]
        name: String,
    },
    /// List agents
    List,
    /// Delete an agent (also removes it from its sector)
    Delete {
        #[clap(long)]
        id: String,
    },
}

pub fn run_agent_cli(
    store: &Store,
    actor: &Actor,
    format: OutputFormat,
    cli: AgentCli,
) -> Result<(), SigmaError> {
    initialize_agents_db(&store.root)?;
    assignments::initialize_assignments_db(&store.root)?;

    match cli.command {
        AgentCommand::Add { name } => {
            actor.require(Capability::ManageAgents)?;
            let agent = create_agent(store, actor, &name)?;
            output::emit(format, "agent.add", serde_json::json!({ "item": agent }), || {
                println!("✓ Agent added: {} (id: {})", agent.name, agent.id);
            })?;
        }
        AgentCommand::List => {
            actor.require(Capability::Read)?;
            let items = list_agents(store)?;
            output::emit(format, "agent.list", serde_json::json!({ "items": items }), || {
                if items.is_empty() {
                    println!("No agents registered.");
                }
                for a in &items {
                    println!("{}  {}", a.id, a.name);
                }
            })?;
        }
        AgentCommand::Delete { id } => {
            actor.require(Capability::ManageAgents)?;
            let agent = delete_agent(store, actor, &id)?;
            output::emit(format, "agent.delete", serde_json::json!({ "item": agent }), || {
                println!("✓ Agent deleted: {}", agent.name);
            })?;
        }
    }

    Ok(())
}
