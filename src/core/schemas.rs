//! Centralized database schema definitions.
//!
//! SIGMA keeps all subsystem state in one SQLite database (`sigma.db`).
//! Each subsystem owns its tables; `subsystems.rs` runs the initializers.

pub const SIGMA_DB_NAME: &str = "sigma.db";

// --- Elements ---

pub const ELEMENTS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS elements (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        installation_type TEXT NOT NULL,
        sector TEXT NOT NULL,
        station TEXT NOT NULL,
        params TEXT NOT NULL DEFAULT '{}', -- JSON object, schema varies by type
        is_pending_monthly INTEGER NOT NULL DEFAULT 1,
        last_maintenance TEXT,
        completed_by TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";
pub const ELEMENTS_DB_SCHEMA_INDEX_SECTOR: &str =
    "CREATE INDEX IF NOT EXISTS idx_elements_sector ON elements(sector)";
pub const ELEMENTS_DB_SCHEMA_INDEX_STATION: &str =
    "CREATE INDEX IF NOT EXISTS idx_elements_station_type ON elements(station, installation_type)";

// History rows are append-only; `seq` orders them per element.
pub const MAINTENANCE_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS maintenance_records (
        id TEXT PRIMARY KEY,
        element_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        date TEXT NOT NULL,
        agents TEXT NOT NULL,
        snapshot TEXT NOT NULL, -- JSON object of params at the time of the record
        created_at TEXT NOT NULL,
        FOREIGN KEY(element_id) REFERENCES elements(id) ON DELETE CASCADE
    )
";
pub const MAINTENANCE_DB_SCHEMA_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_maintenance_element ON maintenance_records(element_id, seq)";

pub const FAULTS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS fault_records (
        id TEXT PRIMARY KEY,
        element_id TEXT NOT NULL,
        seq INTEGER NOT NULL,
        date TEXT NOT NULL,
        agents TEXT NOT NULL,
        description TEXT NOT NULL,
        causes TEXT NOT NULL,
        repair TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(element_id) REFERENCES elements(id) ON DELETE CASCADE
    )
";
pub const FAULTS_DB_SCHEMA_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_faults_element ON fault_records(element_id, seq)";

// --- Agents & assignments ---

pub const AGENTS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";

pub const ASSIGNMENTS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS assignments (
        sector TEXT PRIMARY KEY,
        agent_ids TEXT NOT NULL DEFAULT '[]', -- JSON array, insertion order
        updated_at TEXT NOT NULL
    )
";

// --- Monthly cycles ---

pub const MONTHLY_PLANS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS monthly_plans (
        month INTEGER NOT NULL,
        year INTEGER NOT NULL,
        sector TEXT NOT NULL,
        element_ids TEXT NOT NULL DEFAULT '[]',
        updated_at TEXT NOT NULL,
        updated_by TEXT NOT NULL,
        PRIMARY KEY(month, year, sector)
    )
";

pub const MONTHLY_ARCHIVES_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS monthly_archives (
        month INTEGER NOT NULL,
        year INTEGER NOT NULL,
        sector TEXT NOT NULL,
        snapshots TEXT NOT NULL, -- JSON array of {element_id, status}
        content_hash TEXT NOT NULL,
        validated_at TEXT NOT NULL,
        validated_by TEXT NOT NULL,
        PRIMARY KEY(month, year, sector)
    )
";
pub const MONTHLY_ARCHIVES_DB_SCHEMA_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_archives_sector ON monthly_archives(sector, year, month)";

// --- Users ---

pub const REGISTRATION_REQUESTS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS registration_requests (
        matricula TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        surname1 TEXT NOT NULL,
        surname2 TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
";

pub const USERS_DB_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        matricula TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        surname1 TEXT NOT NULL,
        surname2 TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'AGENT',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";
