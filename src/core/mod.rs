//! Core modules shared by every SIGMA subsystem.
//!
//! Store location, serialized database access, schemas, configuration,
//! identity and output helpers live here.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod output;
pub mod schemas;
pub mod store;
pub mod time;
