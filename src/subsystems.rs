//! Subsystem registration: centralizes all DB initialization functions.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::error::SigmaError;
use crate::plugins::{agents, assignments, cycles, elements, users};
use std::path::Path;

pub(crate) struct SubsystemInit {
    pub name: &'static str,
    pub initialize_db: fn(&Path) -> Result<(), SigmaError>,
}

/// Elements come before cycles: cycle validation reads and resets elements.
pub(crate) const SUBSYSTEMS: &[SubsystemInit] = &[
    SubsystemInit { name: "elements", initialize_db: elements::initialize_elements_db },
    SubsystemInit { name: "agents", initialize_db: agents::initialize_agents_db },
    SubsystemInit { name: "assignments", initialize_db: assignments::initialize_assignments_db },
    SubsystemInit { name: "cycles", initialize_db: cycles::initialize_cycles_db },
    SubsystemInit { name: "users", initialize_db: users::initialize_users_db },
];

/// Initialize all subsystem tables sequentially.
pub(crate) fn initialize_all_dbs(data_root: &Path) -> Result<(), SigmaError> {
    for sub in SUBSYSTEMS {
        (sub.initialize_db)(data_root)?;
    }
    Ok(())
}

pub(crate) fn subsystem_names() -> Vec<&'static str> {
    SUBSYSTEMS.iter().map(|s| s.name).collect()
}
