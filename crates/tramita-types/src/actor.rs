//! Identity context supplied by the external auth layer.
//! The engine never authenticates; it only authorizes using role and
//! sector membership.

use crate::ids::{SectorId, UserId};
use serde::{Deserialize, Serialize};

/// Roles recognized by the authorization policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Agent,
    SectorSupervisor,
    Manager,
    Auditor,
    Administrator,
}

impl Role {
    /// Roles allowed to act on any stage regardless of sector membership
    pub fn has_sector_override(&self) -> bool {
        matches!(self, Self::Administrator | Self::Manager)
    }

    /// Roles allowed to list every protocol, not just their own
    pub fn sees_all_protocols(&self) -> bool {
        matches!(self, Self::Administrator | Self::Manager | Self::Auditor)
    }
}

/// Authenticated caller context, as handed over by the auth boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    /// Sector the user belongs to, if any
    pub sector_id: Option<SectorId>,
}

impl Actor {
    pub fn new(user_id: UserId, roles: Vec<Role>, sector_id: Option<SectorId>) -> Self {
        Self {
            user_id,
            roles,
            sector_id,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_sector_override(&self) -> bool {
        self.roles.iter().any(Role::has_sector_override)
    }

    pub fn sees_all_protocols(&self) -> bool {
        self.roles.iter().any(Role::sees_all_protocols)
    }
}
