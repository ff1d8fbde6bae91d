//! User accounts and registration requests.
//!
//! Staff ask for an account with their matricula and name. An admin
//! approves the request, which turns it into an `AGENT` user, or rejects
//! it. Credentials are out of scope: nothing here stores a password.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::SigmaError;
use crate::core::identity::{Actor, Capability, Role};
use crate::core::output::{self, OutputFormat};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use ulid::Ulid;

static MATRICULA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{1,16}$").unwrap());

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RegistrationRequest {
    pub matricula: String,
    pub name: String,
    pub surname1: String,
    pub surname2: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub matricula: String,
    pub name: String,
    pub surname1: String,
    pub surname2: String,
    pub role: Role,
}

impl User {
    pub fn full_name(&self) -> String {
        [&self.name, &self.surname1, &self.surname2]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn validate_matricula(raw: &str) -> Result<String, SigmaError> {
    let m = raw.trim();
    if !MATRICULA_PATTERN.is_match(m) {
        return Err(SigmaError::ValidationError(format!(
            "Invalid matricula '{}': expected 1-16 letters or digits",
            raw
        )));
    }
    Ok(m.to_string())
}

pub fn initialize_users_db(root: &Path) -> Result<(), SigmaError> {
    let broker = DbBroker::new(root);
    let db_path = db::sigma_db_path(root);

    broker.with_conn(&db_path, "sigma", None, "users.init", |conn| {
        conn.execute(schemas::REGISTRATION_REQUESTS_DB_SCHEMA, [])?;
        conn.execute(schemas::USERS_DB_SCHEMA, [])?;
        Ok(())
    })
}

fn row_to_user(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let role_raw: String = row.get(5)?;
    let role = Role::parse(&role_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(User {
        id: row.get(0)?,
        matricula: row.get(1)?,
        name: row.get(2)?,
        surname1: row.get(3)?,
        surname2: row.get(4)?,
        role,
    })
}

fn row_to_request(row: &rusqlite::Row) -> Result<RegistrationRequest, rusqlite::Error> {
    Ok(RegistrationRequest {
        matricula: row.get(0)?,
        name: row.get(1)?,
        surname1: row.get(2)?,
        surname2: row.get(3)?,
        created_at: row.get(4)?,
    })
}

const USER_COLUMNS: &str = "id, matricula, name, surname1, surname2, role";

fn get_user_by_id(conn: &Connection, id: &str) -> Result<User, SigmaError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        [id],
        row_to_user,
    )
    .optional()?
    .ok_or_else(|| SigmaError::NotFound(format!("User '{}'", id)))
}

fn find_request(conn: &Connection, matricula: &str) -> Result<Option<RegistrationRequest>, SigmaError> {
    Ok(conn
        .query_row(
            "SELECT matricula, name, surname1, surname2, created_at
             FROM registration_requests WHERE matricula = ?1",
            [matricula],
            row_to_request,
        )
        .optional()?)
}

fn user_exists(conn: &Connection, matricula: &str) -> Result<bool, SigmaError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE matricula = ?1",
        [matricula],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[derive(Debug, Clone)]
pub struct RequestInput {
    pub matricula: String,
    pub name: String,
    pub surname1: String,
    pub surname2: String,
}

/// File a registration request. A matricula can only be requested once and
/// never for an existing user.
pub fn submit_request(store: &Store, input: RequestInput) -> Result<RegistrationRequest, SigmaError> {
    let matricula = validate_matricula(&input.matricula)?;
    let name = input.name.trim().to_string();
    let surname1 = input.surname1.trim().to_string();
    if name.is_empty() || surname1.is_empty() {
        return Err(SigmaError::ValidationError(
            "name and first surname are required".to_string(),
        ));
    }

    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:user.request:{}", Ulid::new());
    broker.with_tx(&db_path, &matricula, Some(&intent_ref), "user.request", |conn| {
        if user_exists(conn, &matricula)? {
            return Err(SigmaError::ValidationError(format!(
                "Matricula '{}' is already registered",
                matricula
            )));
        }
        if find_request(conn, &matricula)?.is_some() {
            return Err(SigmaError::ValidationError(format!(
                "A request for matricula '{}' is already pending",
                matricula
            )));
        }
        let req = RegistrationRequest {
            matricula: matricula.clone(),
            name,
            surname1,
            surname2: input.surname2.trim().to_string(),
            created_at: time::now_epoch_z(),
        };
        conn.execute(
            "INSERT INTO registration_requests(matricula, name, surname1, surname2, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5)",
            params![req.matricula, req.name, req.surname1, req.surname2, req.created_at],
        )?;
        Ok(req)
    })
}

pub fn list_requests(store: &Store) -> Result<Vec<RegistrationRequest>, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "user.requests", |conn| {
        let mut stmt = conn.prepare(
            "SELECT matricula, name, surname1, surname2, created_at
             FROM registration_requests ORDER BY created_at, matricula",
        )?;
        let rows = stmt.query_map([], row_to_request)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn reject_request(store: &Store, actor: &Actor, matricula: &str) -> Result<(), SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:user.reject:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "user.reject", |conn| {
        let changed = conn.execute(
            "DELETE FROM registration_requests WHERE matricula = ?1",
            [matricula],
        )?;
        if changed == 0 {
            return Err(SigmaError::NotFound(format!("Request '{}'", matricula)));
        }
        Ok(())
    })
}

/// Turn a pending request into an `AGENT` user.
pub fn approve_request(store: &Store, actor: &Actor, matricula: &str) -> Result<User, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:user.approve:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "user.approve", |conn| {
        let req = find_request(conn, matricula)?
            .ok_or_else(|| SigmaError::NotFound(format!("Request '{}'", matricula)))?;
        let user = User {
            id: time::new_id("US"),
            matricula: req.matricula,
            name: req.name,
            surname1: req.surname1,
            surname2: req.surname2,
            role: Role::Agent,
        };
        let ts = time::now_epoch_z();
        conn.execute(
            "INSERT INTO users(id, matricula, name, surname1, surname2, role, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                user.id,
                user.matricula,
                user.name,
                user.surname1,
                user.surname2,
                user.role.as_str(),
                ts
            ],
        )?;
        conn.execute(
            "DELETE FROM registration_requests WHERE matricula = ?1",
            [matricula],
        )?;
        Ok(user)
    })
}

/// Settle the role of a claimed actor against the users table.
///
/// A registered user always acts with the stored role, whatever the
/// environment claims. Before the first user is approved, and for the
/// operator named in `config.toml`, the claimed role stands. Anyone else is
/// refused until an admin approves their request.
pub fn authenticate(store: &Store, claimed: Actor, operator: &str) -> Result<Actor, SigmaError> {
    initialize_users_db(&store.root)?;
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let (stored, registered) = broker.with_conn(
        &db_path,
        &claimed.matricula,
        None,
        "user.authenticate",
        |conn| {
            let stored = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE matricula = ?1", USER_COLUMNS),
                    [&claimed.matricula],
                    row_to_user,
                )
                .optional()?;
            let registered: i64 =
                conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            Ok((stored, registered))
        },
    )?;

    match stored {
        Some(user) => Ok(Actor::new(&user.matricula, user.role)),
        None if registered == 0 || claimed.matricula == operator => Ok(claimed),
        None => Err(SigmaError::Forbidden(format!(
            "'{}' is not a registered user (file a request with `sigma user request`)",
            claimed.matricula
        ))),
    }
}

pub fn list_users(store: &Store) -> Result<Vec<User>, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "user.list", |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY surname1, name, matricula",
            USER_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_user)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn update_role(store: &Store, actor: &Actor, id: &str, role: Role) -> Result<User, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:user.role:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "user.role", |conn| {
        let changed = conn.execute(
            "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
            params![role.as_str(), time::now_epoch_z(), id],
        )?;
        if changed == 0 {
            return Err(SigmaError::NotFound(format!("User '{}'", id)));
        }
        get_user_by_id(conn, id)
    })
}

pub fn delete_user(store: &Store, actor: &Actor, id: &str) -> Result<User, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:user.delete:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "user.delete", |conn| {
        let user = get_user_by_id(conn, id)?;
        conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(user)
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "user",
        "version": "0.1.0",
        "description": "User accounts and registration requests (no credentials)",
        "commands": [
            { "name": "request", "parameters": ["matricula", "name", "surname1", "surname2?"] },
            { "name": "requests", "parameters": [] },
            { "name": "approve", "parameters": ["matricula"] },
            { "name": "reject", "parameters": ["matricula"] },
            { "name": "list", "parameters": [] },
            { "name": "set-role", "parameters": ["id", "role"] },
            { "name": "delete", "parameters": ["id"] }
        ],
        "roles": ["AGENT", "SUPERVISOR", "ADMIN"],
        "storage": [schemas::SIGMA_DB_NAME]
    })
}

// CLI types for clap integration
#[derive(clap::Args, Debug)]
pub struct UserCli {
    #[clap(subcommand)]
    pub command: UserCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum UserCommand {
    /// Ask for an account
    Request {
        #[clap(long)]
        matricula: String,
        #[clap(long)]
        name: String,
        #[clap(long)]
        surname1: String,
        #[clap(long, default_value = "")]
        surname2: String,
    },
    /// List pending registration requests
    Requests,
    /// Approve a request (creates an AGENT user)
    Approve {
        #[clap(long)]
        matricula: String,
    },
    /// Reject a request
    Reject {
        #[clap(long)]
        matricula: String,
    },
    /// List users
    List,
    /// Change a user's role
    SetRole {
        #[clap(long)]
        id: String,
        #[clap(long, value_enum)]
        role: Role,
    },
    /// Delete a user
    Delete {
        #[clap(long)]
        id: String,
    },
}

impl UserCli {
    /// Filing a request is the one command open to unregistered staff.
    pub fn is_request(&self) -> bool {
        matches!(self.command, UserCommand::Request { .. })
    }
}

pub fn run_user_cli(
    store: &Store,
    actor: &Actor,
    format: OutputFormat,
    cli: UserCli,
) -> Result<(), SigmaError> {
    initialize_users_db(&store.root)?;

    match cli.command {
        UserCommand::Request {
            matricula,
            name,
            surname1,
            surname2,
        } => {
            // Anyone may file a request.
            let req = submit_request(
                store,
                RequestInput {
                    matricula,
                    name,
                    surname1,
                    surname2,
                },
            )?;
            output::emit(format, "user.request", serde_json::json!({ "item": req }), || {
                println!("✓ Request filed for {}", req.matricula);
            })?;
        }
        UserCommand::Requests => {
            actor.require(Capability::ManageUsers)?;
            let items = list_requests(store)?;
            output::emit(format, "user.requests", serde_json::json!({ "items": items }), || {
                if items.is_empty() {
                    println!("No pending requests.");
                }
                for r in &items {
                    println!("{}  {} {} {}", r.matricula, r.name, r.surname1, r.surname2);
                }
            })?;
        }
        UserCommand::Approve { matricula } => {
            actor.require(Capability::ManageUsers)?;
            let user = approve_request(store, actor, &matricula)?;
            output::emit(format, "user.approve", serde_json::json!({ "item": user }), || {
                println!("✓ {} approved as {} (id: {})", user.full_name(), user.role, user.id);
            })?;
        }
        UserCommand::Reject { matricula } => {
            actor.require(Capability::ManageUsers)?;
            reject_request(store, actor, &matricula)?;
            output::emit(
                format,
                "user.reject",
                serde_json::json!({ "matricula": matricula }),
                || println!("✓ Request {} rejected", matricula),
            )?;
        }
        UserCommand::List => {
            actor.require(Capability::ManageUsers)?;
            let items = list_users(store)?;
            output::emit(format, "user.list", serde_json::json!({ "items": items }), || {
                for u in &items {
                    println!("{}  {:<10} {}  ({})", u.matricula, u.role, u.full_name(), u.id);
                }
            })?;
        }
        UserCommand::SetRole { id, role } => {
            actor.require(Capability::ManageUsers)?;
            let user = update_role(store, actor, &id, role)?;
            output::emit(format, "user.set_role", serde_json::json!({ "item": user }), || {
                println!("✓ {} is now {}", user.full_name(), user.role);
            })?;
        }
        UserCommand::Delete { id } => {
            actor.require(Capability::ManageUsers)?;
            let user = delete_user(store, actor, &id)?;
            output::emit(format, "user.delete", serde_json::json!({ "item": user }), || {
                println!("✓ User {} deleted", user.matricula);
            })?;
        }
    }

    Ok(())
}
