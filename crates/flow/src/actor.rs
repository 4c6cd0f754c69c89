// Archivo: actor.rs
// Propósito: identidad opaca del actor que invoca una operación. La
// autenticación ocurre fuera del crate; aquí sólo se consultan sus roles.
use onestop_forms::StepRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Submitter,
    Coordinator,
    Processor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Submitter => "submitter",
            Role::Coordinator => "coordinator",
            Role::Processor => "processor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "submitter" => Ok(Role::Submitter),
            "coordinator" => Ok(Role::Coordinator),
            "processor" => Ok(Role::Processor),
            "admin" => Ok(Role::Admin),
            other => Err(WorkflowError::Validation(format!("rol desconocido: {}", other))),
        }
    }
}

impl From<StepRole> for Role {
    fn from(r: StepRole) -> Self {
        match r {
            StepRole::Coordinator => Role::Coordinator,
            StepRole::Processor => Role::Processor,
        }
    }
}

/// Actor autenticado: id opaco + roles que posee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub roles: BTreeSet<Role>,
}

impl Actor {
    pub fn new(id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self { id: id.into(), roles: roles.into_iter().collect() }
    }

    pub fn submitter(id: impl Into<String>) -> Self {
        Self::new(id, [Role::Submitter])
    }

    pub fn coordinator(id: impl Into<String>) -> Self {
        Self::new(id, [Role::Coordinator])
    }

    pub fn processor(id: impl Into<String>) -> Self {
        Self::new(id, [Role::Processor])
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, [Role::Admin])
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Devuelve `Forbidden` si el actor no posee `role`.
    pub fn require(&self, role: Role) -> Result<(), WorkflowError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden(format!("el actor {} no tiene el rol {}", self.id, role)))
        }
    }
}
