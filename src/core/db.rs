use crate::core::error::SigmaError;
use crate::core::schemas;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, SigmaError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn sigma_db_path(root: &Path) -> PathBuf {
    root.join(schemas::SIGMA_DB_NAME)
}

/// Decode a JSON text column, surfacing corruption as a SQLite conversion error.
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    raw: &str,
    idx: usize,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
