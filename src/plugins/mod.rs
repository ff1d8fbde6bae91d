//! SIGMA subsystems. Each module owns its tables, its core operations and
//! its CLI surface.

pub mod agents;
pub mod assignments;
pub mod cycles;
pub mod elements;
pub mod users;
