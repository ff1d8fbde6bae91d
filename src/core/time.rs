//! Shared timestamp/event helpers for deterministic envelopes.

use crate::core::error::SigmaError;
use chrono::{Datelike, NaiveDate};
use serde_json::Value as JsonValue;
use ulid::Ulid;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Prefixed identifier, e.g. `EL_01J...`.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Validate a calendar date and return it in canonical `YYYY-MM-DD` form.
pub fn parse_date(raw: &str) -> Result<String, SigmaError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .map_err(|_| {
            SigmaError::ValidationError(format!("Invalid date '{}': expected YYYY-MM-DD", raw))
        })
}

/// Today's `(month, year)` in local time, months 1-12.
pub fn current_month_year() -> (u32, i32) {
    let today = chrono::Local::now().date_naive();
    (today.month(), today.year())
}

pub fn today() -> String {
    chrono::Local::now().date_naive().format(DATE_FORMAT).to_string()
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_epoch_z(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}
