pub mod error;
pub mod http;
pub mod messaging;
pub mod transfer;
pub mod visitation;

use serde::{Deserialize, Serialize};

pub use error::{RepositoryError, ValidationErrors, WorkflowError};

/// Role of whoever is acting on a workflow. Resolved by the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Visitor,
    Woreda,
    Inspector,
    Staff,
    Admin,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Visitor => "visitor",
            ActorRole::Woreda => "woreda",
            ActorRole::Inspector => "inspector",
            ActorRole::Staff => "staff",
            ActorRole::Admin => "admin",
        }
    }

    pub const fn is_staff(self) -> bool {
        matches!(
            self,
            ActorRole::Staff | ActorRole::Admin | ActorRole::Inspector
        )
    }
}

/// Authenticated identity handed to the engines. Never synthesized by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}
