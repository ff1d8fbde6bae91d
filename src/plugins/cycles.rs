//! Monthly maintenance cycles.
//!
//! A cycle is keyed by (month, year, sector) and moves through
//! `NO_PLAN -> PLANNED -> VALIDATED`. The plan is mutable until validation.
//! Validation freezes the completion status of every planned element into an
//! archive and then puts every element of the sector back to pending, ready
//! for the next month. Archives are write-once and carry a SHA-256 hash of
//! their content so tampering can be detected later.

use crate::core::broker::DbBroker;
use crate::core::config::SigmaConfig;
use crate::core::db::{self, json_column};
use crate::core::error::SigmaError;
use crate::core::identity::{Actor, Capability};
use crate::core::output::{self, OutputFormat};
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::elements::{
    self, Element, ElementFilter, ElementRepository, InstallationType, SqliteElements,
};
use colored::Colorize;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CycleKey {
    /// 1-12
    pub month: u32,
    pub year: i32,
    pub sector: String,
}

impl CycleKey {
    pub fn new(month: u32, year: i32, sector: &str) -> Result<Self, SigmaError> {
        if !(1..=12).contains(&month) {
            return Err(SigmaError::ValidationError(format!(
                "Invalid month {}: expected 1-12",
                month
            )));
        }
        Ok(Self {
            month,
            year,
            sector: sector.to_string(),
        })
    }
}

impl fmt::Display for CycleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}/{}", self.sector, self.month, self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    NoPlan,
    Planned,
    Validated,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::NoPlan => "NO_PLAN",
            CycleStatus::Planned => "PLANNED",
            CycleStatus::Validated => "VALIDATED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotStatus {
    Completed,
    Pending,
}

impl SnapshotStatus {
    pub fn of(element: &Element) -> Self {
        if element.is_pending_monthly {
            SnapshotStatus::Pending
        } else {
            SnapshotStatus::Completed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub element_id: String,
    pub status: SnapshotStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyPlan {
    pub key: CycleKey,
    pub element_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyArchive {
    pub key: CycleKey,
    pub snapshots: Vec<Snapshot>,
    pub content_hash: String,
    pub validated_at: String,
    pub validated_by: String,
}

/// SHA-256 over the canonical JSON of key and snapshots.
pub fn content_hash(key: &CycleKey, snapshots: &[Snapshot]) -> Result<String, SigmaError> {
    let bytes = serde_json::to_vec(&serde_json::json!({
        "key": key,
        "snapshots": snapshots,
    }))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Integer percentage, rounded half-up. Zero when there is nothing to count.
pub fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((2 * part * 100 + total) / (2 * total)) as u32
}

/// Result of validating a cycle: the archive to store and the elements to
/// put back to pending.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub archive: MonthlyArchive,
    pub reset_ids: Vec<String>,
}

/// Everything known about one cycle key.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleState {
    pub key: CycleKey,
    pub plan: Option<Vec<String>>,
    pub archive: Option<MonthlyArchive>,
}

impl CycleState {
    pub fn empty(key: CycleKey) -> Self {
        Self {
            key,
            plan: None,
            archive: None,
        }
    }

    pub fn status(&self) -> CycleStatus {
        if self.archive.is_some() {
            CycleStatus::Validated
        } else if self.plan.is_some() {
            CycleStatus::Planned
        } else {
            CycleStatus::NoPlan
        }
    }

    fn ensure_open(&self) -> Result<(), SigmaError> {
        if self.archive.is_some() {
            return Err(SigmaError::Immutable(format!(
                "Cycle {} is already validated",
                self.key
            )));
        }
        Ok(())
    }

    /// Replace the plan. Duplicate ids keep their first position.
    pub fn set_plan(&self, element_ids: &[String]) -> Result<CycleState, SigmaError> {
        self.ensure_open()?;
        let mut seen = HashSet::new();
        let ids = element_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        Ok(CycleState {
            key: self.key.clone(),
            plan: Some(ids),
            archive: None,
        })
    }

    /// Planned elements that still exist, in plan order.
    pub fn tracked<'a>(&self, elements: &'a [Element]) -> Vec<&'a Element> {
        self.plan
            .iter()
            .flatten()
            .filter_map(|id| elements.iter().find(|e| &e.id == id))
            .collect()
    }

    pub fn validate(
        &self,
        elements: &[Element],
        validated_by: &str,
        validated_at: &str,
    ) -> Result<Validation, SigmaError> {
        self.ensure_open()?;
        let tracked = self.tracked(elements);
        if tracked.is_empty() {
            return Err(SigmaError::EmptyPlan(format!(
                "Cycle {} has no elements to validate",
                self.key
            )));
        }

        let snapshots: Vec<Snapshot> = tracked
            .iter()
            .map(|e| Snapshot {
                element_id: e.id.clone(),
                status: SnapshotStatus::of(e),
            })
            .collect();
        let archive = MonthlyArchive {
            key: self.key.clone(),
            content_hash: content_hash(&self.key, &snapshots)?,
            snapshots,
            validated_at: validated_at.to_string(),
            validated_by: validated_by.to_string(),
        };
        // TODO: confirm with operations whether unplanned elements of the sector should also be reset.
        let reset_ids = elements
            .iter()
            .filter(|e| e.sector == self.key.sector)
            .map(|e| e.id.clone())
            .collect();
        Ok(Validation { archive, reset_ids })
    }

    pub fn progress(&self, elements: &[Element]) -> u32 {
        if let Some(archive) = &self.archive {
            let done = archive
                .snapshots
                .iter()
                .filter(|s| s.status == SnapshotStatus::Completed)
                .count();
            return percent(done, archive.snapshots.len());
        }
        let tracked = self.tracked(elements);
        let done = tracked.iter().filter(|e| !e.is_pending_monthly).count();
        percent(done, tracked.len())
    }
}

pub fn initialize_cycles_db(root: &Path) -> Result<(), SigmaError> {
    let broker = DbBroker::new(root);
    let db_path = db::sigma_db_path(root);

    broker.with_conn(&db_path, "sigma", None, "cycles.init", |conn| {
        conn.execute(schemas::MONTHLY_PLANS_DB_SCHEMA, [])?;
        conn.execute(schemas::MONTHLY_ARCHIVES_DB_SCHEMA, [])?;
        conn.execute(schemas::MONTHLY_ARCHIVES_DB_SCHEMA_INDEX, [])?;
        Ok(())
    })
}

fn row_to_archive(row: &rusqlite::Row) -> Result<MonthlyArchive, rusqlite::Error> {
    let raw: String = row.get(3)?;
    Ok(MonthlyArchive {
        key: CycleKey {
            month: row.get(0)?,
            year: row.get(1)?,
            sector: row.get(2)?,
        },
        snapshots: json_column(&raw, 3)?,
        content_hash: row.get(4)?,
        validated_at: row.get(5)?,
        validated_by: row.get(6)?,
    })
}

const ARCHIVE_COLUMNS: &str =
    "month, year, sector, snapshots, content_hash, validated_at, validated_by";

fn load_state(conn: &Connection, key: &CycleKey) -> Result<CycleState, SigmaError> {
    let plan = conn
        .query_row(
            "SELECT element_ids FROM monthly_plans WHERE month = ?1 AND year = ?2 AND sector = ?3",
            params![key.month, key.year, key.sector],
            |row| {
                let raw: String = row.get(0)?;
                json_column::<Vec<String>>(&raw, 0)
            },
        )
        .optional()?;
    let archive = conn
        .query_row(
            &format!(
                "SELECT {} FROM monthly_archives WHERE month = ?1 AND year = ?2 AND sector = ?3",
                ARCHIVE_COLUMNS
            ),
            params![key.month, key.year, key.sector],
            row_to_archive,
        )
        .optional()?;
    Ok(CycleState {
        key: key.clone(),
        plan,
        archive,
    })
}

fn sector_elements(conn: &Connection, sector: &str) -> Result<Vec<Element>, SigmaError> {
    Ok(SqliteElements::new(conn)
        .list()?
        .into_iter()
        .filter(|e| e.sector == sector)
        .collect())
}

pub fn cycle_state(store: &Store, key: &CycleKey) -> Result<CycleState, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "cycle.state", |conn| {
        load_state(conn, key)
    })
}

/// Replace the plan of an open cycle. Every id must name an element of the
/// cycle's sector.
pub fn set_plan(
    store: &Store,
    config: &SigmaConfig,
    actor: &Actor,
    key: &CycleKey,
    element_ids: &[String],
) -> Result<MonthlyPlan, SigmaError> {
    config.require_sector(&key.sector)?;

    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:cycle.plan:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "cycle.plan", |conn| {
        let next = load_state(conn, key)?.set_plan(element_ids)?;
        let ids = next.plan.unwrap_or_default();

        let repo = SqliteElements::new(conn);
        for id in &ids {
            let el = repo.get(id)?;
            if el.sector != key.sector {
                return Err(SigmaError::ValidationError(format!(
                    "Element '{}' belongs to sector '{}', not '{}'",
                    id, el.sector, key.sector
                )));
            }
        }

        conn.execute(
            "INSERT INTO monthly_plans(month, year, sector, element_ids, updated_at, updated_by)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(month, year, sector) DO UPDATE SET
                 element_ids = excluded.element_ids,
                 updated_at = excluded.updated_at,
                 updated_by = excluded.updated_by",
            params![
                key.month,
                key.year,
                key.sector,
                serde_json::to_string(&ids)?,
                time::now_epoch_z(),
                actor.matricula
            ],
        )?;
        Ok(MonthlyPlan {
            key: key.clone(),
            element_ids: ids,
        })
    })
}

/// Archive the cycle and reset the sector's monthly checks in one transaction.
pub fn validate_cycle(
    store: &Store,
    actor: &Actor,
    key: &CycleKey,
) -> Result<MonthlyArchive, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    let intent_ref = format!("intent:cycle.validate:{}", Ulid::new());
    broker.with_tx(&db_path, &actor.matricula, Some(&intent_ref), "cycle.validate", |conn| {
        let state = load_state(conn, key)?;
        let elements = sector_elements(conn, &key.sector)?;
        let validation = state.validate(&elements, &actor.matricula, &time::now_epoch_z())?;
        let archive = validation.archive;

        conn.execute(
            &format!(
                "INSERT INTO monthly_archives({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                ARCHIVE_COLUMNS
            ),
            params![
                key.month,
                key.year,
                key.sector,
                serde_json::to_string(&archive.snapshots)?,
                archive.content_hash,
                archive.validated_at,
                archive.validated_by
            ],
        )?;

        let repo = SqliteElements::new(conn);
        for el in elements
            .into_iter()
            .filter(|e| validation.reset_ids.contains(&e.id) && !e.is_pending_monthly)
        {
            let id = el.id.clone();
            repo.update(&id, &Element {
                is_pending_monthly: true,
                ..el
            })?;
        }
        Ok(archive)
    })
}

pub fn cycle_status(store: &Store, key: &CycleKey) -> Result<CycleStatus, SigmaError> {
    Ok(cycle_state(store, key)?.status())
}

pub fn cycle_progress(store: &Store, key: &CycleKey) -> Result<u32, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "cycle.progress", |conn| {
        let state = load_state(conn, key)?;
        Ok(state.progress(&sector_elements(conn, &key.sector)?))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub status: CycleStatus,
    pub progress: u32,
}

/// Status and progress taken from one read of the cycle.
pub fn cycle_summary(store: &Store, key: &CycleKey) -> Result<CycleSummary, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "cycle.summary", |conn| {
        let state = load_state(conn, key)?;
        Ok(CycleSummary {
            status: state.status(),
            progress: state.progress(&sector_elements(conn, &key.sector)?),
        })
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleRow {
    pub element_id: String,
    /// Absent when the element was deleted after validation.
    pub name: Option<String>,
    pub station: Option<String>,
    pub installation_type: Option<InstallationType>,
    pub status: SnapshotStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleView {
    pub key: CycleKey,
    pub status: CycleStatus,
    pub progress: u32,
    pub rows: Vec<CycleRow>,
    pub validated_by: Option<String>,
}

fn build_view(state: &CycleState, elements: &[Element]) -> CycleView {
    let rows = match &state.archive {
        Some(archive) => archive
            .snapshots
            .iter()
            .map(|s| {
                let el = elements.iter().find(|e| e.id == s.element_id);
                CycleRow {
                    element_id: s.element_id.clone(),
                    name: el.map(|e| e.name.clone()),
                    station: el.map(|e| e.station.clone()),
                    installation_type: el.map(|e| e.installation_type),
                    status: s.status,
                }
            })
            .collect(),
        None => state
            .tracked(elements)
            .into_iter()
            .map(|e| CycleRow {
                element_id: e.id.clone(),
                name: Some(e.name.clone()),
                station: Some(e.station.clone()),
                installation_type: Some(e.installation_type),
                status: SnapshotStatus::of(e),
            })
            .collect(),
    };
    CycleView {
        key: state.key.clone(),
        status: state.status(),
        progress: state.progress(elements),
        rows,
        validated_by: state.archive.as_ref().map(|a| a.validated_by.clone()),
    }
}

/// Status, progress and per-element rows of one cycle.
pub fn cycle_view(store: &Store, key: &CycleKey) -> Result<CycleView, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "cycle.view", |conn| {
        let state = load_state(conn, key)?;
        Ok(build_view(&state, &sector_elements(conn, &key.sector)?))
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthSummary {
    pub month: u32,
    pub status: CycleStatus,
    pub progress: u32,
    pub planned: usize,
}

fn half_months(half: u8) -> Result<std::ops::RangeInclusive<u32>, SigmaError> {
    match half {
        1 => Ok(1..=6),
        2 => Ok(7..=12),
        other => Err(SigmaError::ValidationError(format!(
            "Invalid half-year {}: expected 1 or 2",
            other
        ))),
    }
}

/// The six cycles of a half-year for one sector.
pub fn semester_overview(
    store: &Store,
    config: &SigmaConfig,
    sector: &str,
    year: i32,
    half: u8,
) -> Result<Vec<MonthSummary>, SigmaError> {
    config.require_sector(sector)?;
    let months = half_months(half)?;

    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "cycle.semester", |conn| {
        let elements = sector_elements(conn, sector)?;
        let mut out = Vec::new();
        for month in months {
            let state = load_state(conn, &CycleKey::new(month, year, sector)?)?;
            let planned = match &state.archive {
                Some(a) => a.snapshots.len(),
                None => state.tracked(&elements).len(),
            };
            out.push(MonthSummary {
                month,
                status: state.status(),
                progress: state.progress(&elements),
                planned,
            });
        }
        Ok(out)
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TypeStats {
    pub installation_type: InstallationType,
    pub label: &'static str,
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub completed_pct: u32,
    pub pending_pct: u32,
}

impl TypeStats {
    fn tally(installation_type: InstallationType, elements: &[Element]) -> Self {
        let of_type: Vec<&Element> = elements
            .iter()
            .filter(|e| e.installation_type == installation_type)
            .collect();
        let total = of_type.len();
        let completed = of_type.iter().filter(|e| !e.is_pending_monthly).count();
        let completed_pct = percent(completed, total);
        Self {
            installation_type,
            label: installation_type.label(),
            total,
            completed,
            pending: total - completed,
            completed_pct,
            pending_pct: if total == 0 { 0 } else { 100 - completed_pct },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorDashboard {
    pub sector: String,
    pub by_type: Vec<TypeStats>,
    pub total: usize,
    pub completed: usize,
    pub completed_pct: u32,
}

/// Live monthly-check completion of a sector, per installation type.
pub fn sector_dashboard(
    store: &Store,
    config: &SigmaConfig,
    sector: &str,
) -> Result<SectorDashboard, SigmaError> {
    config.require_sector(sector)?;
    let elements = elements::list_elements(
        store,
        &ElementFilter {
            sector: Some(sector.to_string()),
            ..Default::default()
        },
    )?;
    let by_type = InstallationType::ALL
        .iter()
        .map(|t| TypeStats::tally(*t, &elements))
        .collect();
    let completed = elements.iter().filter(|e| !e.is_pending_monthly).count();
    Ok(SectorDashboard {
        sector: sector.to_string(),
        by_type,
        total: elements.len(),
        completed,
        completed_pct: percent(completed, elements.len()),
    })
}

pub fn list_archives(
    store: &Store,
    sector: Option<&str>,
) -> Result<Vec<MonthlyArchive>, SigmaError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::sigma_db_path(&store.root);
    broker.with_conn(&db_path, "sigma", None, "cycle.archives", |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM monthly_archives
             WHERE (?1 IS NULL OR sector = ?1)
             ORDER BY sector, year, month",
            ARCHIVE_COLUMNS
        ))?;
        let rows = stmt.query_map([sector], row_to_archive)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveMismatch {
    pub key: CycleKey,
    pub stored_hash: String,
    pub computed_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub mismatches: Vec<ArchiveMismatch>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Recompute every archive's content hash and report the ones that differ.
pub fn verify_archives(store: &Store) -> Result<IntegrityReport, SigmaError> {
    let archives = list_archives(store, None)?;
    let mut mismatches = Vec::new();
    for archive in &archives {
        let computed = content_hash(&archive.key, &archive.snapshots)?;
        if computed != archive.content_hash {
            mismatches.push(ArchiveMismatch {
                key: archive.key.clone(),
                stored_hash: archive.content_hash.clone(),
                computed_hash: computed,
            });
        }
    }
    Ok(IntegrityReport {
        checked: archives.len(),
        mismatches,
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "cycle",
        "version": "0.1.0",
        "description": "Monthly maintenance cycles: plan, validate, archive",
        "states": ["NO_PLAN", "PLANNED", "VALIDATED"],
        "commands": [
            { "name": "plan", "parameters": ["sector", "month?", "year?", "element*"] },
            { "name": "validate", "parameters": ["sector", "month?", "year?"] },
            { "name": "status", "parameters": ["sector", "month?", "year?"] },
            { "name": "show", "parameters": ["sector", "month?", "year?"] },
            { "name": "semester", "parameters": ["sector", "year?", "half?"] },
            { "name": "archives", "parameters": ["sector?"] },
            { "name": "verify", "parameters": [] }
        ],
        "storage": [schemas::SIGMA_DB_NAME]
    })
}

// CLI types for clap integration
#[derive(clap::Args, Debug, Clone)]
pub struct CycleKeyArgs {
    #[clap(long)]
    pub sector: String,
    /// 1-12 (defaults to the current month)
    #[clap(long)]
    pub month: Option<u32>,
    /// Defaults to the current year
    #[clap(long)]
    pub year: Option<i32>,
}

impl CycleKeyArgs {
    pub fn resolve(&self) -> Result<CycleKey, SigmaError> {
        let (month, year) = time::current_month_year();
        CycleKey::new(
            self.month.unwrap_or(month),
            self.year.unwrap_or(year),
            &self.sector,
        )
    }
}

#[derive(clap::Args, Debug)]
pub struct CycleCli {
    #[clap(subcommand)]
    pub command: CycleCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum CycleCommand {
    /// Replace the plan of a cycle
    Plan {
        #[clap(flatten)]
        key: CycleKeyArgs,
        /// Element id (repeatable); none clears the plan
        #[clap(long = "element")]
        elements: Vec<String>,
    },
    /// Validate a cycle: archive it and reset the sector's monthly checks
    Validate {
        #[clap(flatten)]
        key: CycleKeyArgs,
    },
    /// Print the status of a cycle
    Status {
        #[clap(flatten)]
        key: CycleKeyArgs,
    },
    /// Show a cycle with its elements
    Show {
        #[clap(flatten)]
        key: CycleKeyArgs,
    },
    /// Six-month overview for a sector
    Semester {
        #[clap(long)]
        sector: String,
        #[clap(long)]
        year: Option<i32>,
        /// 1 = Jan-Jun, 2 = Jul-Dec (defaults to the current half)
        #[clap(long)]
        half: Option<u8>,
    },
    /// List validated archives
    Archives {
        #[clap(long)]
        sector: Option<String>,
    },
    /// Check archive content hashes
    Verify,
}

fn current_half() -> u8 {
    let (month, _) = time::current_month_year();
    if month <= 6 { 1 } else { 2 }
}

fn status_label(status: CycleStatus) -> colored::ColoredString {
    match status {
        CycleStatus::NoPlan => status.as_str().dimmed(),
        CycleStatus::Planned => status.as_str().yellow(),
        CycleStatus::Validated => status.as_str().green(),
    }
}

fn print_semester(sector: &str, year: i32, months: &[MonthSummary]) {
    println!("{} {}", sector.bold(), year);
    for m in months {
        println!(
            "  {:02}  {:<10} {} {:>3}%  ({} elements)",
            m.month,
            status_label(m.status),
            output::progress_bar(m.progress, 20),
            m.progress,
            m.planned
        );
    }
}

pub fn run_cycle_cli(
    store: &Store,
    config: &SigmaConfig,
    actor: &Actor,
    format: OutputFormat,
    cli: CycleCli,
) -> Result<(), SigmaError> {
    elements::initialize_elements_db(&store.root)?;
    initialize_cycles_db(&store.root)?;

    match cli.command {
        CycleCommand::Plan { key, elements } => {
            actor.require(Capability::PlanCycles)?;
            let key = key.resolve()?;
            let plan = set_plan(store, config, actor, &key, &elements)?;
            output::emit(format, "cycle.plan", serde_json::json!({ "plan": plan }), || {
                println!(
                    "✓ Plan for {} set ({} elements)",
                    plan.key,
                    plan.element_ids.len()
                );
            })?;
        }
        CycleCommand::Validate { key } => {
            actor.require(Capability::PlanCycles)?;
            let key = key.resolve()?;
            let archive = validate_cycle(store, actor, &key)?;
            let done = archive
                .snapshots
                .iter()
                .filter(|s| s.status == SnapshotStatus::Completed)
                .count();
            output::emit(format, "cycle.validate", serde_json::json!({ "archive": archive }), || {
                println!(
                    "✓ Cycle {} validated: {}/{} completed",
                    archive.key,
                    done,
                    archive.snapshots.len()
                );
            })?;
        }
        CycleCommand::Status { key } => {
            actor.require(Capability::Read)?;
            let key = key.resolve()?;
            let CycleSummary { status, progress } = cycle_summary(store, &key)?;
            output::emit(
                format,
                "cycle.status",
                serde_json::json!({ "key": key, "state": status, "progress": progress }),
                || println!("{}  {}  {}%", key, status_label(status), progress),
            )?;
        }
        CycleCommand::Show { key } => {
            actor.require(Capability::Read)?;
            let view = cycle_view(store, &key.resolve()?)?;
            output::emit(format, "cycle.show", serde_json::json!({ "cycle": view }), || {
                println!(
                    "{}  {}  {} {}%",
                    view.key.to_string().bold(),
                    status_label(view.status),
                    output::progress_bar(view.progress, 20),
                    view.progress
                );
                for row in &view.rows {
                    let mark = match row.status {
                        SnapshotStatus::Completed => "[x]".green(),
                        SnapshotStatus::Pending => "[ ]".yellow(),
                    };
                    println!(
                        "  {} {}  {}",
                        mark,
                        row.name.as_deref().unwrap_or("(deleted)"),
                        row.station.as_deref().unwrap_or("-")
                    );
                }
            })?;
        }
        CycleCommand::Semester { sector, year, half } => {
            actor.require(Capability::Read)?;
            let year = year.unwrap_or_else(|| time::current_month_year().1);
            let months =
                semester_overview(store, config, &sector, year, half.unwrap_or_else(current_half))?;
            output::emit(
                format,
                "cycle.semester",
                serde_json::json!({ "sector": sector, "year": year, "months": months }),
                || print_semester(&sector, year, &months),
            )?;
        }
        CycleCommand::Archives { sector } => {
            actor.require(Capability::Read)?;
            let items = list_archives(store, sector.as_deref())?;
            output::emit(format, "cycle.archives", serde_json::json!({ "items": items }), || {
                if items.is_empty() {
                    println!("No validated cycles.");
                }
                for a in &items {
                    println!(
                        "{}  {} snapshots  by {} at {}",
                        a.key,
                        a.snapshots.len(),
                        a.validated_by,
                        a.validated_at
                    );
                }
            })?;
        }
        CycleCommand::Verify => {
            actor.require(Capability::Read)?;
            let report = verify_archives(store)?;
            output::emit(format, "cycle.verify", serde_json::json!({ "report": report }), || {
                if report.is_clean() {
                    println!("✓ {} archives verified", report.checked);
                } else {
                    for m in &report.mismatches {
                        eprintln!("{} archive {} hash mismatch", "✗".red(), m.key);
                    }
                }
            })?;
            if !report.is_clean() {
                return Err(SigmaError::ValidationError(format!(
                    "{} of {} archives failed verification",
                    report.mismatches.len(),
                    report.checked
                )));
            }
        }
    }

    Ok(())
}

#[derive(clap::Args, Debug)]
pub struct DashboardCli {
    #[clap(long)]
    pub sector: String,
    #[clap(long)]
    pub year: Option<i32>,
    /// 1 = Jan-Jun, 2 = Jul-Dec
    #[clap(long)]
    pub half: Option<u8>,
}

/// Per-type completion chart plus the semester cycle list for a sector.
pub fn run_dashboard_cli(
    store: &Store,
    config: &SigmaConfig,
    actor: &Actor,
    format: OutputFormat,
    cli: DashboardCli,
) -> Result<(), SigmaError> {
    elements::initialize_elements_db(&store.root)?;
    initialize_cycles_db(&store.root)?;
    actor.require(Capability::Read)?;

    let year = cli.year.unwrap_or_else(|| time::current_month_year().1);
    let half = cli.half.unwrap_or_else(current_half);
    let dashboard = sector_dashboard(store, config, &cli.sector)?;
    let months = semester_overview(store, config, &cli.sector, year, half)?;

    output::emit(
        format,
        "dashboard",
        serde_json::json!({ "dashboard": dashboard, "semester": { "year": year, "half": half, "months": months } }),
        || {
            println!(
                "{}  {}/{} completed ({}%)",
                dashboard.sector.bold(),
                dashboard.completed,
                dashboard.total,
                dashboard.completed_pct
            );
            for t in &dashboard.by_type {
                println!(
                    "  {:<18} {} {:>3}%  {} done, {} pending",
                    t.label,
                    output::progress_bar(t.completed_pct, 20),
                    t.completed_pct,
                    t.completed,
                    t.pending
                );
            }
            println!();
            print_semester(&dashboard.sector, year, &months);
        },
    )
}
