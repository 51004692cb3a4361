use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::role::Role;

/// Authoritative user record held by the identity store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub show_star_pawn: bool,
    pub pawn: Option<String>,
}

impl UserRecord {
    pub fn new(id: String, username: String, email: String, role: Role) -> Self {
        Self {
            id,
            username,
            email,
            role,
            avatar: None,
            show_star_pawn: false,
            pawn: None,
        }
    }
}

/// Ban record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanRecord {
    pub id: String,
    pub user_id: String,
    pub banned_by: String,
    pub reason: String,
    pub banned_at: DateTime<Utc>,
    /// None means permanent
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

impl BanRecord {
    /// A ban is in effect when it is not revoked and has no expiry,
    /// or an expiry still in the future.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.revoked {
            return false;
        }
        match self.expires_at {
            None => true,
            Some(expiry) => expiry > now,
        }
    }
}

/// Ban request issued by a moderator
#[derive(Debug, Clone)]
pub struct BanRequest {
    pub target_id: String,
    pub reason: String,
    pub hours: Option<u32>,
    pub permanent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ban(expires_at: Option<DateTime<Utc>>, revoked: bool) -> BanRecord {
        BanRecord {
            id: "ban1".to_string(),
            user_id: "user1".to_string(),
            banned_by: "mod1".to_string(),
            reason: "spam".to_string(),
            banned_at: Utc::now(),
            expires_at,
            revoked,
        }
    }

    #[test]
    fn test_permanent_ban_active() {
        assert!(ban(None, false).is_active(Utc::now()));
    }

    #[test]
    fn test_revoked_ban_inactive() {
        assert!(!ban(None, true).is_active(Utc::now()));
    }

    #[test]
    fn test_expired_ban_inactive() {
        let now = Utc::now();
        assert!(!ban(Some(now - Duration::hours(1)), false).is_active(now));
        assert!(ban(Some(now + Duration::hours(1)), false).is_active(now));
    }
}
