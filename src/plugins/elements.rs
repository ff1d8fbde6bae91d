//! Elements plugin: inspection elements and their maintenance/fault history.
//!
//! Elements are classified by sector, station and installation type. Each
//! carries free-form technical params, a monthly check flag, and two
//! append-only histories kept newest-first. History records name the
//! completing agents with a plain string so they survive agent renames and
//! deletions.

use crate::core::broker::DbBroker;
use crate::core::config::SigmaConfig;
use crate::core::db::{self, json_column};
use crate::core::error::SigmaError;
use crate::core::identity::{Actor, Capability};
use crate::core::output::{self, OutputFormat};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use clap::ValueEnum;
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use ulid::Ulid;

pub type Params = BTreeMap<String, JsonValue>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstallationType {
    /// Track circuits
    Circuitos,
    /// Point motors
    Motores,
    /// Level crossings
    Pn,
    /// Signals and ASFA beacons
    Senales,
    Baterias,
    Enclavamiento,
}

impl InstallationType {
    pub const ALL: [InstallationType; 6] = [
        InstallationType::Circuitos,
        InstallationType::Motores,
        InstallationType::Pn,
        InstallationType::Senales,
        InstallationType::Baterias,
        InstallationType::Enclavamiento,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationType::Circuitos => "CIRCUITOS",
            InstallationType::Motores => "MOTORES",
            InstallationType::Pn => "PN",
            InstallationType::Senales => "SENALES",
            InstallationType::Baterias => "BATERIAS",
            InstallationType::Enclavamiento => "ENCLAVAMIENTO",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InstallationType::Circuitos => "CIRCUITOS DE VÍA",
            InstallationType::Motores => "MOTORES",
            InstallationType::Pn => "PN",
            InstallationType::Senales => "SEÑALES Y ASFA",
            InstallationType::Baterias => "BATERÍAS",
            InstallationType::Enclavamiento => "ENCLAVAMIENTO",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MaintenanceRecord {
    pub id: String,
    pub date: String,
    /// Completing agents, as typed on the record.
    pub agents: String,
    /// Params at the time of the maintenance.
    pub snapshot: Params,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FaultRecord {
    pub id: String,
    pub date: String,
    pub agents: String,
    pub description: String,
    pub causes: String,
    pub repair: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Element {
    pub id: String,
    pub name: String,
    pub installation_type: InstallationType,
    pub sector: String,
    pub station: String,
    pub params: Params,
    /// `true` while the monthly check is still open.
    pub is_pending_monthly: bool,
    pub last_maintenance: Option<String>,
    pub completed_by: Option<String>,
    #[serde(default)]
    pub maintenance_history: Vec<MaintenanceRecord>,
    #[serde(default)]
    pub fault_history: Vec<FaultRecord>,
}

impl Element {
    /// Prepend a maintenance record and stamp the element with it.
    pub fn push_maintenance(&mut self, record: MaintenanceRecord) {
        self.last_maintenance = Some(record.date.clone());
        self.completed_by = Some(record.agents.clone());
        self.maintenance_history.insert(0, record);
    }

    pub fn push_fault(&mut self, record: FaultRecord) {
        self.fault_history.insert(0, record);
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewElement {
    pub name: String,
    pub installation_type: InstallationType,
    pub sector: String,
    pub station: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, Default)]
pub struct ElementFilter {
    pub sector: Option<String>,
    pub station: Option<String>,
    pub installation_type: Option<InstallationType>,
    /// Case-insensitive substring of the element name.
    pub name_query: Option<String>,
}

impl ElementFilter {
    pub fn matches(&self, element: &Element) -> bool {
        if let Some(sector) = &self.sector
            && &element.sector != sector
        {
            return false;
        }
        if let Some(station) = &self.station
            && &element.station != station
        {
            return false;
        }
        if let Some(t) = self.installation_type
            && element.installation_type != t
        {
            return false;
        }
        if let Some(q) = &self.name_query
            && !element.name.to_lowercase().contains(&q.to_lowercase())
        {
            return false;
        }
        true
    }
}

/// Read/write access to elements. Implementations decide where they live.
pub trait ElementRepository {
    fn list(&self) -> Result<Vec<Element>, SigmaError>;
    fn get(&self, id: &str) -> Result<Element, SigmaError>;
    /// Store a new element and assign its id.
    fn create(&self, element: NewElement) -> Result<Element, SigmaError>;
    /// Persist the mutable fields of `element`. History records not yet
    /// stored are appended; stored records are never rewritten or removed.
    fn update(&self, id: &str, element: &Element) -> Result<Element, SigmaError>;
    fn delete(&self, id: &str) -> Result<(), SigmaError>;
}

/// SQLite-backed repository borrowing an open (possibly transactional) connection.
pub struct SqliteElements<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteElements<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn load_maintenance(
        &self,
        element_id: Option<&str>,
    ) -> Result<HashMap<String, Vec<MaintenanceRecord>>, SigmaError> {
        let mut stmt = self.conn.prepare(
            "SELECT element_id, id, date, agents, snapshot FROM maintenance_records
             WHERE (?1 IS NULL OR element_id = ?1)
             ORDER BY element_id, seq DESC",
        )?;
        let rows = stmt.query_map([element_id], |row| {
            let raw: String = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                MaintenanceRecord {
                    id: row.get(1)?,
                    date: row.get(2)?,
                    agents: row.get(3)?,
                    snapshot: json_column(&raw, 4)?,
                },
            ))
        })?;
        let mut out: HashMap<String, Vec<MaintenanceRecord>> = HashMap::new();
        for r in rows {
            let (eid, rec) = r?;
            out.entry(eid).or_default().push(rec);
        }
        Ok(out)
    }

    fn load_faults(
        &self,
        element_id: Option<&str>,
    ) -> Result<HashMap<String, Vec<FaultRecord>>, SigmaError> {
        let mut stmt = self.conn.prepare(
            "SELECT element_id, id, date, agents, description, causes, repair FROM fault_records
             WHERE (?1 IS NULL OR element_id = ?1)
             ORDER BY element_id, seq DESC",
        )?;
        let rows = stmt.query_map([element_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                FaultRecord {
                    id: row.get(1)?,
                    date: row.get(2)?,
                    agents: row.get(3)?,
                    description: row.get(4)?,
                    causes: row.get(5)?,
                    repair: row.get(6)?,
                },
            ))
        })?;
        let mut out: HashMap<String, Vec<FaultRecord>> = HashMap::new();
        for r in rows {
            let (eid, rec) = r?;
            out.entry(eid).or_default().push(rec);
        }
        Ok(out)
    }

    fn append_history(&self, element: &Element, ts: &str) -> Result<(), SigmaError> {
        // Oldest first so that newer records receive higher seq values.
        for rec in element.maintenance_history.iter().rev() {
            self.conn.execute(
                "INSERT OR IGNORE INTO maintenance_records(id, element_id, seq, date, agents, snapshot, created_at)
                 VALUES(?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM maintenance_records WHERE element_id = ?2), ?3, ?4, ?5, ?6)",
                params![
                    rec.id,
                    element.id,
                    rec.date,
                    rec.agents,
                    serde_json::to_string(&rec.snapshot)?,
                    ts
                ],
            )?;
        }
        for rec in element.fault_history.iter().rev() {
            self.conn.execute(
                "INSERT OR IGNORE INTO fault_records(id, element_id, seq, date, agents, description, causes, repair, created_at)
                 VALUES(?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM fault_records WHERE element_id = ?2), ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    rec.id,
                    element.id,
                    rec.date,
                    rec.agents,
                    rec.description,
                    rec.causes,
                    rec.repair,
                    ts
                ],
            )?;
        }
        Ok(())
    }
}

const ELEMENT_COLUMNS: &str = "id, name, installation_type, sector, station, params, is_pending_monthly, last_maintenance, completed_by";

fn row_to_element(row: &rusqlite::Row) -> Result<Element, rusqlite::Error> {
    let type_raw: String = row.get(2)?;
    let installation_type = InstallationType::from_code(&type_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown installation type '{}'", type_raw).into(),
        )
    })?;
    let params_raw: String = row.get(5)?;
    Ok(Element {
        id: row.get(0)?,
        name: row.get(1)?,
        installation_type,
        sector: row.get(3)?,
        station: row.get(4)?,
        params: json_column(&params_raw, 5)?,
        is_pending_monthly: row.get::<_, i64>(6)? != 0,
        last_maintenance: row.get(7)?,
        completed_by: row.get(8)?,
        maintenance_history: Vec::new(),
        fault_history: Vec::new(),
    })
}

impl ElementRepository for SqliteElements<'_> {
    fn list(&self) -> Result<Vec<Element>, SigmaError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM elements ORDER BY sector, station, installation_type, name",
            ELEMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_element)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }

        let mut maintenance = self.load_maintenance(None)?;
        let mut faults = self.load_faults(None)?;
        for el in &mut out {
            el.maintenance_history = maintenance.remove(&el.id).unwrap_or_default();
            el.fault_history = faults.remove(&el.id).unwrap_or_default();
        }
        Ok(out)
    }

    fn get(&self, id: &str) -> Result<Element, SigmaError> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT {} FROM elements WHERE id = ?1", ELEMENT_COLUMNS),
                [id],
                row_to_element,
            )
            .optional()?;
        let mut el = found.ok_or_else(|| SigmaError::NotFound(format!("Element '{}'", id)))?;
        el.maintenance_history = self.load_maintenance(Some(id))?.remove(id).unwrap_or_default();
        el.fault_history = self.load_faults(Some(id))?.remove(id).unwrap_or_default();
        Ok(el)
    }

    fn create(&self, element: NewElement) -> Result<Element, SigmaError> {
        let id = time::new_id("EL");
        let ts = time::now_epoch_z();
        self.conn.execute(
            "INSERT INTO elements(id, name, installation_type, sector, station, params, is_pending_monthly, last_maintenance, completed_by, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, 1, NULL, NULL, ?7, ?7)",
            params![
                id,
                element.name,
                element.installation_type.as_str(),
                element.sector,
                element.station,
                serde_json::to_string(&element.params)?,
                ts
            ],
        )?;
        self.get(&id)
    }

    fn update(&self, id: &str, element: &Element) -> Result<Element, SigmaError> {
        let ts = time::now_epoch_z();
        let changed = self.conn.execute(
            "UPDATE elements SET name = ?1, installation_type = ?2, sector = ?3, station = ?4, params = ?5,
                 is_pending_monthly = ?6, last_maintenance = ?7, completed_by = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                element.name,
                element.installation_type.as_str(),
                element.sector,
                element.station,
                serde_json::to_string(&element.params)?,
                element.is_pending_monthly,
                element.last_maintenance,
                element.completed_by,
                ts,
                id
            ],
        )?;
        if changed == 0 {
            return Err(SigmaError::NotFound(format!("Element '{}'", id)));
        }
        let mut stored = element.clone();
        stored.id = id.to_string();
        self.append_history(&stored, &ts)?;
        self.get(id)
    }

    fn delete(&self, id: &str) -> Result<(), SigmaError> {
        let changed = self.conn.execute("DELETE FROM elements WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(SigmaError::NotFound(format!("Element '{}'", id)));
        }
        Ok(())
    }
}

pub fn initialize_elements_db(root: &Path) -> Result<(), SigmaError> {
    let broker = DbBroker::new(root);
    let db_path = db::sigma_db_path(root);

    broker.with_conn(&db_path, "sigma", None, "elements.init", |conn| {
        conn.execute(schemas::ELEMENTS_DB_SCHEMA, [])?;
        conn.execute(schemas::ELEMENTS_DB_SCHEMA_INDEX_SECTOR, [])?;
        conn.execute(schemas::ELEMENTS_DB_SCHEMA_INDEX_STATION, [])?;
        conn.execute(schemas::MAINTENANCE_DB_SCHEMA, [])?;
        conn.execute(schemas::MAINTENANCE_DB_SCHEMA_INDEX, [])?;
        conn.execute(schemas::FAULTS_DB_SCHEMA, [])?;
        conn.execute(schemas::FAULTS_DB_SCHEMA_INDEX, [])?;
        Ok(())
    })
}

fn intent(op: &str) -> String {
    format!("intent:{}:{}", op, Ulid::new())
}

fn require_text(field: &str, value: &str) -> Result<String, SigmaError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SigmaError::ValidationError(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

pub fn create_element(
    store: &Store,
    config: &SigmaConfig,
    actor: &Actor,
    input: NewElement,
) -> Result<Element, SigmaError> {
    let name = require_text("name", &input.name)?;
    config.require_sector(&input.sector)?;
    if !config.stations_of(&input.sector).contains(&input.station) {
        return Err(SigmaError::ValidationError(format!(
            "Station '{}' is not configured for sector '{}'",
            input.station, input.sector
        )));
    }

    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = intent("element.create");
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "element.create", |conn| {
        SqliteElements::new(conn).create(NewElement { name, ..input })
    })
}

pub fn get_element(store: &Store, id: &str) -> Result<Element, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "element.get", |conn| {
        SqliteElements::new(conn).get(id)
    })
}

pub fn list_elements(store: &Store, filter: &ElementFilter) -> Result<Vec<Element>, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let all = broker.with_conn(&db_path, "sigma", None, "element.list", |conn| {
        SqliteElements::new(conn).list()
    })?;
    Ok(all.into_iter().filter(|e| filter.matches(e)).collect())
}

/// Load, modify and persist one element inside a single transaction.
fn modify_element<F>(
    store: &Store,
    actor: &Actor,
    op: &str,
    id: &str,
    f: F,
) -> Result<Element, SigmaError>
where
    F: FnOnce(&mut Element) -> Result<(), SigmaError>,
{
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = intent(op);
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), op, |conn| {
        let repo = SqliteElements::new(conn);
        let mut el = repo.get(id)?;
        f(&mut el)?;
        repo.update(id, &el)
    })
}

/// Replace the whole params map.
pub fn update_params(
    store: &Store,
    actor: &Actor,
    id: &str,
    params: Params,
) -> Result<Element, SigmaError> {
    modify_element(store, actor, "element.params", id, |el| {
        el.params = params;
        Ok(())
    })
}

/// Edit some params in place. Keys in `set` are inserted or overwritten,
/// keys in `unset` are removed, everything else is kept.
pub fn merge_params(
    store: &Store,
    actor: &Actor,
    id: &str,
    set: Params,
    unset: &[String],
) -> Result<Element, SigmaError> {
    if let Some(key) = unset.iter().find(|k| set.contains_key(k.trim())) {
        return Err(SigmaError::ValidationError(format!(
            "Param '{}' is both set and unset",
            key.trim()
        )));
    }
    modify_element(store, actor, "element.params", id, |el| {
        for key in unset {
            el.params.remove(key.trim());
        }
        el.params.extend(set);
        Ok(())
    })
}

pub fn rename_element(
    store: &Store,
    actor: &Actor,
    id: &str,
    name: &str,
) -> Result<Element, SigmaError> {
    let name = require_text("name", name)?;
    modify_element(store, actor, "element.rename", id, |el| {
        el.name = name;
        Ok(())
    })
}

pub fn delete_element(store: &Store, actor: &Actor, id: &str) -> Result<(), SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = intent("element.delete");
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "element.delete", |conn| {
        SqliteElements::new(conn).delete(id)
    })
}

/// Tick (`completed = true`) or untick the monthly check of an element.
pub fn set_monthly_check(
    store: &Store,
    actor: &Actor,
    id: &str,
    completed: bool,
) -> Result<Element, SigmaError> {
    modify_element(store, actor, "element.check", id, |el| {
        el.is_pending_monthly = !completed;
        Ok(())
    })
}

#[derive(Debug, Clone)]
pub struct MaintenanceInput {
    pub date: String,
    pub agents: String,
    /// Recorded values; the element's current params when absent.
    pub values: Option<Params>,
}

pub fn record_maintenance(
    store: &Store,
    actor: &Actor,
    id: &str,
    input: MaintenanceInput,
) -> Result<Element, SigmaError> {
    let date = time::parse_date(&input.date)?;
    let agents = require_text("agents", &input.agents)?;
    modify_element(store, actor, "element.maintenance", id, |el| {
        let snapshot = input.values.unwrap_or_else(|| el.params.clone());
        el.push_maintenance(MaintenanceRecord {
            id: time::new_id("MH"),
            date,
            agents,
            snapshot,
        });
        Ok(())
    })
}

#[derive(Debug, Clone)]
pub struct FaultInput {
    pub date: String,
    pub agents: String,
    pub description: String,
    pub causes: String,
    pub repair: String,
}

pub fn record_fault(
    store: &Store,
    actor: &Actor,
    id: &str,
    input: FaultInput,
) -> Result<Element, SigmaError> {
    let date = time::parse_date(&input.date)?;
    let agents = require_text("agents", &input.agents)?;
    let description = require_text("description", &input.description)?;
    modify_element(store, actor, "element.fault", id, |el| {
        el.push_fault(FaultRecord {
            id: time::new_id("FH"),
            date,
            agents,
            description,
            causes: input.causes.trim().to_string(),
            repair: input.repair.trim().to_string(),
        });
        Ok(())
    })
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct StationCount {
    pub station: String,
    pub elements: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TypeCount {
    pub installation_type: InstallationType,
    pub label: &'static str,
    pub elements: usize,
}

/// Configured stations of a sector with their element counts.
pub fn station_overview(
    store: &Store,
    config: &SigmaConfig,
    sector: &str,
) -> Result<Vec<StationCount>, SigmaError> {
    config.require_sector(sector)?;
    let elements = list_elements(
        store,
        &ElementFilter {
            sector: Some(sector.to_string()),
            ..Default::default()
        },
    )?;
    Ok(config
        .stations_of(sector)
        .iter()
        .map(|station| StationCount {
            station: station.clone(),
            elements: elements.iter().filter(|e| &e.station == station).count(),
        })
        .collect())
}

/// Element counts per installation type for one station.
pub fn type_overview(store: &Store, station: &str) -> Result<Vec<TypeCount>, SigmaError> {
    let elements = list_elements(
        store,
        &ElementFilter {
            station: Some(station.to_string()),
            ..Default::default()
        },
    )?;
    Ok(InstallationType::ALL
        .iter()
        .map(|t| TypeCount {
            installation_type: *t,
            label: t.label(),
            elements: elements.iter().filter(|e| e.installation_type == *t).count(),
        })
        .collect())
}

/// Parse `key=value` pairs. Values that parse as JSON keep their type;
/// anything else is stored as a string.
pub fn parse_param_pairs(pairs: &[String]) -> Result<Params, SigmaError> {
    let mut out = Params::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            SigmaError::ValidationError(format!("Invalid param '{}': expected key=value", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(SigmaError::ValidationError(format!(
                "Invalid param '{}': empty key",
                pair
            )));
        }
        let value = value.trim();
        let parsed = serde_json::from_str::<JsonValue>(value)
            .unwrap_or_else(|_| JsonValue::String(value.to_string()));
        out.insert(key.to_string(), parsed);
    }
    Ok(out)
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "elements",
        "version": "0.1.0",
        "description": "Inspection elements with maintenance and fault history",
        "commands": [
            { "name": "add", "parameters": ["sector", "station", "type", "name", "param*"] },
            { "name": "list", "parameters": ["sector?", "station?", "type?", "search?"] },
            { "name": "get", "parameters": ["id"] },
            { "name": "set-params", "parameters": ["id", "param*", "unset*"] },
            { "name": "rename", "parameters": ["id", "name"] },
            { "name": "delete", "parameters": ["id"] },
            { "name": "check", "parameters": ["id", "undo"] },
            { "name": "maintenance", "parameters": ["id", "date", "agents", "value*"] },
            { "name": "fault", "parameters": ["id", "date", "agents", "description", "causes", "repair"] }
        ],
        "storage": [schemas::SIGMA_DB_NAME],
        "installation_types": InstallationType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>()
    })
}

// CLI types for clap integration
#[derive(clap::Args, Debug)]
pub struct ElementCli {
    #[clap(subcommand)]
    pub command: ElementCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum ElementCommand {
    /// Add a new element
    Add {
        #[clap(long)]
        sector: String,
        #[clap(long)]
        station: String,
        #[clap(long = "type", value_enum)]
        installation_type: InstallationType,
        #[clap(long)]
        name: String,
        /// Technical parameter as key=value (repeatable)
        #[clap(long = "param")]
        params: Vec<String>,
    },
    /// List elements, optionally filtered
    List {
        #[clap(long)]
        sector: Option<String>,
        #[clap(long)]
        station: Option<String>,
        #[clap(long = "type", value_enum)]
        installation_type: Option<InstallationType>,
        /// Case-insensitive name search
        #[clap(long)]
        search: Option<String>,
    },
    /// Show one element with its history
    Get {
        #[clap(long)]
        id: String,
    },
    /// Replace the technical parameters of an element
    /// Edit technical parameters; keys not named are kept
    SetParams {
        #[clap(long)]
        id: String,
        /// key=value to add or overwrite (repeatable)
        #[clap(long = "param")]
        params: Vec<String>,
        /// Key to remove (repeatable)
        #[clap(long = "unset")]
        unset: Vec<String>,
    },
    /// Rename an element
    Rename {
        #[clap(long)]
        id: String,
        #[clap(long)]
        name: String,
    },
    /// Delete an element and its history
    Delete {
        #[clap(long)]
        id: String,
    },
    /// Tick the monthly check (use --undo to mark pending again)
    Check {
        #[clap(long)]
        id: String,
        #[clap(long)]
        undo: bool,
    },
    /// Record a maintenance
    Maintenance {
        #[clap(long)]
        id: String,
        /// YYYY-MM-DD (defaults to today)
        #[clap(long)]
        date: Option<String>,
        /// Agents who did the work
        #[clap(long)]
        agents: String,
        /// Recorded value as key=value (repeatable); defaults to current params
        #[clap(long = "value")]
        values: Vec<String>,
    },
    /// Record a fault
    Fault {
        #[clap(long)]
        id: String,
        #[clap(long)]
        date: Option<String>,
        #[clap(long)]
        agents: String,
        #[clap(long)]
        description: String,
        #[clap(long, default_value = "")]
        causes: String,
        #[clap(long, default_value = "")]
        repair: String,
    },
}

fn print_element_line(el: &Element) {
    let check = if el.is_pending_monthly {
        "[ ]".yellow()
    } else {
        "[x]".green()
    };
    println!(
        "{} {}  {} / {} / {}  ({})",
        check,
        el.name.bold(),
        el.sector,
        el.station,
        el.installation_type.label(),
        el.id
    );
}

fn print_element_detail(el: &Element) {
    print_element_line(el);
    if !el.params.is_empty() {
        let params: Vec<String> = el.params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("  Params: {}", output::preview_messages(&params, 8, 40));
    }
    println!(
        "  Last maintenance: {} by {}",
        el.last_maintenance.as_deref().unwrap_or("-"),
        el.completed_by.as_deref().unwrap_or("-")
    );
    for rec in el.maintenance_history.iter().take(5) {
        println!("  M {}  {}", rec.date, output::compact_line(&rec.agents, 60));
    }
    for rec in el.fault_history.iter().take(5) {
        println!(
            "  F {}  {}: {}",
            rec.date,
            output::compact_line(&rec.agents, 30),
            output::compact_line(&rec.description, 60)
        );
    }
}

pub fn run_element_cli(
    store: &Store,
    config: &SigmaConfig,
    actor: &Actor,
    format: OutputFormat,
    cli: ElementCli,
) -> Result<(), SigmaError> {
    initialize_elements_db(&store.root)?;

    match cli.command {
        ElementCommand::Add {
            sector,
            station,
            installation_type,
            name,
            params,
        } => {
            actor.require(Capability::ManageElements)?;
            let el = create_element(
                store,
                config,
                actor,
                NewElement {
                    name,
                    installation_type,
                    sector,
                    station,
                    params: parse_param_pairs(&params)?,
                },
            )?;
            output::emit(format, "element.add", serde_json::json!({ "item": el }), || {
                println!("✓ Element added: {} (id: {})", el.name, el.id);
            })?;
        }
        ElementCommand::List {
            sector,
            station,
            installation_type,
            search,
        } => {
            actor.require(Capability::Read)?;
            let filter = ElementFilter {
                sector,
                station,
                installation_type,
                name_query: search,
            };
            let items = list_elements(store, &filter)?;
            output::emit(format, "element.list", serde_json::json!({ "items": items }), || {
                if items.is_empty() {
                    println!("No elements found.");
                }
                for el in &items {
                    print_element_line(el);
                }
            })?;
        }
        ElementCommand::Get { id } => {
            actor.require(Capability::Read)?;
            let el = get_element(store, &id)?;
            output::emit(format, "element.get", serde_json::json!({ "item": el }), || {
                print_element_detail(&el)
            })?;
        }
        ElementCommand::SetParams { id, params, unset } => {
            actor.require(Capability::ManageElements)?;
            let el = merge_params(store, actor, &id, parse_param_pairs(&params)?, &unset)?;
            output::emit(format, "element.set_params", serde_json::json!({ "item": el }), || {
                println!("✓ Params updated for {}", el.name);
            })?;
        }
        ElementCommand::Rename { id, name } => {
            actor.require(Capability::ManageElements)?;
            let el = rename_element(store, actor, &id, &name)?;
            output::emit(format, "element.rename", serde_json::json!({ "item": el }), || {
                println!("✓ Element renamed to {}", el.name);
            })?;
        }
        ElementCommand::Delete { id } => {
            actor.require(Capability::ManageElements)?;
            delete_element(store, actor, &id)?;
            output::emit(format, "element.delete", serde_json::json!({ "id": id }), || {
                println!("✓ Element deleted: {}", id);
            })?;
        }
        ElementCommand::Check { id, undo } => {
            actor.require(Capability::RecordWork)?;
            let el = set_monthly_check(store, actor, &id, !undo)?;
            output::emit(format, "element.check", serde_json::json!({ "item": el }), || {
                print_element_line(&el)
            })?;
        }
        ElementCommand::Maintenance {
            id,
            date,
            agents,
            values,
        } => {
            actor.require(Capability::RecordWork)?;
            let values = if values.is_empty() {
                None
            } else {
                Some(parse_param_pairs(&values)?)
            };
            let el = record_maintenance(
                store,
                actor,
                &id,
                MaintenanceInput {
                    date: date.unwrap_or_else(time::today),
                    agents,
                    values,
                },
            )?;
            output::emit(format, "element.maintenance", serde_json::json!({ "item": el }), || {
                println!("✓ Maintenance recorded for {}", el.name);
            })?;
        }
        ElementCommand::Fault {
            id,
            date,
            agents,
            description,
            causes,
            repair,
        } => {
            actor.require(Capability::RecordWork)?;
            let el = record_fault(
                store,
                actor,
                &id,
                FaultInput {
                    date: date.unwrap_or_else(time::today),
                    agents,
                    description,
                    causes,
                    repair,
                },
            )?;
            output::emit(format, "element.fault", serde_json::json!({ "item": el }), || {
                println!("✓ Fault recorded for {}", el.name);
            })?;
        }
    }

    Ok(())
}
