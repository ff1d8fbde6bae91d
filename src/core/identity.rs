//! Acting-user identity and role gating.
//!
//! Core operations trust their caller. The CLI resolves the acting user and
//! checks the role against the capability a command needs before invoking
//! any subsystem.

use crate::core::error::SigmaError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Agent,
    Supervisor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "AGENT",
            Role::Supervisor => "SUPERVISOR",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SigmaError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AGENT" | "AGENTE" => Ok(Role::Agent),
            "SUPERVISOR" => Ok(Role::Supervisor),
            "ADMIN" | "ADMINISTRADOR" => Ok(Role::Admin),
            other => Err(SigmaError::ValidationError(format!(
                "Invalid role: {}. Must be one of: AGENT, SUPERVISOR, ADMIN",
                other
            ))),
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        *self >= capability.minimum_role()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// What a command needs to be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    /// Monthly checks, maintenance and fault records.
    RecordWork,
    ManageElements,
    PlanCycles,
    ManageAgents,
    ManageUsers,
}

impl Capability {
    fn minimum_role(self) -> Role {
        match self {
            Capability::Read | Capability::RecordWork => Role::Agent,
            Capability::ManageElements | Capability::PlanCycles | Capability::ManageAgents => {
                Role::Supervisor
            }
            Capability::ManageUsers => Role::Admin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::RecordWork => "record_work",
            Capability::ManageElements => "manage_elements",
            Capability::PlanCycles => "plan_cycles",
            Capability::ManageAgents => "manage_agents",
            Capability::ManageUsers => "manage_users",
        }
    }
}

/// The user on whose behalf a command runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub matricula: String,
    pub role: Role,
}

impl Actor {
    pub fn new(matricula: &str, role: Role) -> Self {
        Self {
            matricula: matricula.to_string(),
            role,
        }
    }

    pub fn require(&self, capability: Capability) -> Result<(), SigmaError> {
        if self.role.allows(capability) {
            Ok(())
        } else {
            Err(SigmaError::Forbidden(format!(
                "'{}' ({}) lacks permission '{}'",
                self.matricula,
                self.role,
                capability.as_str()
            )))
        }
    }
}
