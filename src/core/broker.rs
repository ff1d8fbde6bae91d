use crate::core::db;
use crate::core::error::SigmaError;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const AUDIT_LOG_NAME: &str = "broker.events.jsonl";

/// The DB Broker is the single entry point for state access.
/// It is an in-process serialized request layer that audits every operation.
pub struct DbBroker {
    audit_log_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub intent_ref: Option<String>,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join(AUDIT_LOG_NAME),
        }
    }

    /// Execute a closure with a serialized connection to the specified DB.
    pub fn with_conn<F, R>(
        &self,
        db_path: &Path,
        actor: &str,
        intent_ref: Option<&str>,
        op_name: &str,
        f: F,
    ) -> Result<R, SigmaError>
    where
        F: FnOnce(&Connection) -> Result<R, SigmaError>,
    {
        // One writer at a time across the whole process.
        static DB_LOCK: Mutex<()> = Mutex::new(());
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let db_id = db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let conn = db::db_connect(&db_path.to_string_lossy())?;

        let result = f(&conn);

        let status = match &result {
            Ok(_) => "success".to_string(),
            Err(e) => format!("error:{}", e.code()),
        };
        // The outcome stands even if the audit line is lost.
        if let Err(e) = self.log_event(actor, intent_ref, op_name, &db_id, &status) {
            eprintln!("warning: audit event for '{}' not recorded: {}", op_name, e);
        }

        result
    }

    /// Like [`DbBroker::with_conn`], but the closure runs inside one SQLite
    /// transaction. Any error rolls the whole operation back.
    pub fn with_tx<F, R>(
        &self,
        db_path: &Path,
        actor: &str,
        intent_ref: Option<&str>,
        op_name: &str,
        f: F,
    ) -> Result<R, SigmaError>
    where
        F: FnOnce(&Connection) -> Result<R, SigmaError>,
    {
        self.with_conn(db_path, actor, intent_ref, op_name, |conn| {
            let tx = conn.unchecked_transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    fn log_event(
        &self,
        actor: &str,
        intent_ref: Option<&str>,
        op: &str,
        db_id: &str,
        status: &str,
    ) -> Result<(), SigmaError> {
        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            intent_ref: intent_ref.map(|s| s.to_string()),
            op: op.to_string(),
            db_id: db_id.to_string(),
            status: status.to_string(),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)?;

        writeln!(f, "{}", serde_json::to_string(&ev)?)?;
        Ok(())
    }
}

/// Read the audit log. Unparseable lines are skipped.
pub fn read_audit_log(root: &Path) -> Result<Vec<BrokerEvent>, SigmaError> {
    let path = root.join(AUDIT_LOG_NAME);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str::<BrokerEvent>(l).ok())
        .collect())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "broker",
        "version": "0.1.0",
        "description": "Serialized state access with audit trail",
        "commands": [
            { "name": "audit", "description": "Show the mutation audit log" }
        ],
        "storage": [AUDIT_LOG_NAME]
    })
}
