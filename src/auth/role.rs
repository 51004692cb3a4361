use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    GUEST_COOLDOWN_MS, MEMBER_COOLDOWN_MS, MOD_COOLDOWN_MS, OWNER_COOLDOWN_MS,
};

/// Capability tier of a connected user.
///
/// Ordering is meaningful: `Guest < Member < Mod < Owner`. Comparisons
/// drive the moderation authorization checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Member,
    Mod,
    Owner,
}

impl Role {
    /// Minimum interval between accepted sends for this role.
    pub fn cooldown(&self) -> Duration {
        let ms = match self {
            Role::Guest => GUEST_COOLDOWN_MS,
            Role::Member => MEMBER_COOLDOWN_MS,
            Role::Mod => MOD_COOLDOWN_MS,
            Role::Owner => OWNER_COOLDOWN_MS,
        };
        Duration::from_millis(ms)
    }

    /// Whether this role may issue moderation actions at all.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Mod | Role::Owner)
    }

    /// Wire name, matching the serde rename
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Member => "member",
            Role::Mod => "mod",
            Role::Owner => "owner",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Guest
    }
}
