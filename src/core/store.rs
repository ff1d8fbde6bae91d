//! Store abstraction for SIGMA's project state.
//!
//! A project keeps its state under `<project>/.sigma/`. The store root is the
//! `data/` directory beneath it, which holds the SQLite database and the
//! broker audit log.

use crate::core::error::SigmaError;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROJECT_DIR_NAME: &str = ".sigma";
pub const DATA_DIR_NAME: &str = "data";

/// Store handle representing a SIGMA state workspace.
///
/// All subsystem state (elements, agents, assignments, cycles, users) is
/// scoped to a store.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory (`.sigma/data`)
    pub root: PathBuf,
}

impl Store {
    /// Open (and create if needed) the store root directory.
    pub fn open(root: &Path) -> Result<Self, SigmaError> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Store root for a project directory containing `.sigma/`.
    pub fn for_project(project_root: &Path) -> Result<Self, SigmaError> {
        Self::open(&project_root.join(PROJECT_DIR_NAME).join(DATA_DIR_NAME))
    }
}

/// Walk up from `start_dir` to the nearest directory containing `.sigma/`.
pub fn find_project_root(start_dir: &Path) -> Result<PathBuf, SigmaError> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(PROJECT_DIR_NAME).exists() {
            return Ok(current_dir);
        }
        if !current_dir.pop() {
            return Err(SigmaError::NotFound(
                "'.sigma' directory not found in current or parent directories. Run `sigma init` first.".to_string(),
            ));
        }
    }
}
