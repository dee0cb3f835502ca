//! Authentication and authorization module
//!
//! Provides JWT-based authentication and role-based access control for the
//! command surface.

mod jwt;
mod middleware;

pub use jwt::{create_token, decode_token, Claims};
pub use middleware::{auth_middleware, require_role};

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Member roles for authorization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can view drafts and open votes
    #[default]
    Member,
    /// Can write and publish drafts
    Steward,
    /// Can also cancel votes and force a tally sweep
    Admin,
}

impl Role {
    pub fn can_manage_drafts(&self) -> bool {
        matches!(self, Role::Steward | Role::Admin)
    }

    pub fn can_administer(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "steward" => Ok(Role::Steward),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Validation(format!("Unknown role: {}", other))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Steward => write!(f, "steward"),
            Role::Admin => write!(f, "admin"),
        }
    }
}
