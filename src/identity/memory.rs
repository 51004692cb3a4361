//! In-memory identity store for development and testing
//!
//! Keeps all identity data in process memory behind async locks.
//! Suitable for development, tests, or single-instance deployments
//! that do not need durable user data.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use super::types::{BanRecord, BanRequest, UserRecord};
use super::IdentityStore;
use crate::auth::role::Role;
use crate::error::{GatewayError, Result};

/// In-memory identity backend
pub struct MemoryIdentityStore {
    users: RwLock<HashMap<String, UserRecord>>,
    whitelist: RwLock<HashSet<String>>,
    bans: RwLock<Vec<BanRecord>>,
    /// Directional pairs: (ignorer, ignored)
    ignores: RwLock<HashSet<(String, String)>>,
    friends: RwLock<HashMap<String, HashSet<String>>>,
    powers: RwLock<HashMap<String, Vec<String>>>,
    next_ban_id: RwLock<u64>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            whitelist: RwLock::new(HashSet::new()),
            bans: RwLock::new(Vec::new()),
            ignores: RwLock::new(HashSet::new()),
            friends: RwLock::new(HashMap::new()),
            powers: RwLock::new(HashMap::new()),
            next_ban_id: RwLock::new(1),
        }
    }

    async fn generate_ban_id(&self) -> String {
        let mut id = self.next_ban_id.write().await;
        let current = *id;
        *id += 1;
        format!("ban_{}", current)
    }

    /// Seed a user record
    pub async fn insert_user(&self, user: UserRecord) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    /// Add an email to the allow-list
    pub async fn allow_email(&self, email: &str) {
        self.whitelist.write().await.insert(email.to_string());
    }

    /// Make `ignorer` ignore `ignored`
    pub async fn add_ignore(&self, ignorer: &str, ignored: &str) {
        self.ignores
            .write()
            .await
            .insert((ignorer.to_string(), ignored.to_string()));
    }

    /// Record a mutual friendship
    pub async fn add_friends(&self, a: &str, b: &str) {
        let mut friends = self.friends.write().await;
        friends
            .entry(a.to_string())
            .or_insert_with(HashSet::new)
            .insert(b.to_string());
        friends
            .entry(b.to_string())
            .or_insert_with(HashSet::new)
            .insert(a.to_string());
    }

    /// Grant a feature flag to a subject
    pub async fn grant_power(&self, subject_id: &str, power: &str) {
        self.powers
            .write()
            .await
            .entry(subject_id.to_string())
            .or_insert_with(Vec::new)
            .push(power.to_string());
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_id(&self, subject_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(subject_id).cloned())
    }

    async fn is_banned(&self, subject_id: &str) -> Result<bool> {
        let now = Utc::now();
        let bans = self.bans.read().await;
        Ok(bans
            .iter()
            .any(|ban| ban.user_id == subject_id && ban.is_active(now)))
    }

    async fn is_allow_listed(&self, email: &str) -> Result<bool> {
        Ok(self.whitelist.read().await.contains(email))
    }

    async fn get_friends(&self, subject_id: &str) -> Result<Vec<UserRecord>> {
        let friends = self.friends.read().await;
        let users = self.users.read().await;
        let ids = match friends.get(subject_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn get_ignored(&self, subject_id: &str) -> Result<Vec<UserRecord>> {
        let ignores = self.ignores.read().await;
        let users = self.users.read().await;
        Ok(ignores
            .iter()
            .filter(|(ignorer, _)| ignorer == subject_id)
            .filter_map(|(_, ignored)| users.get(ignored).cloned())
            .collect())
    }

    async fn is_ignored_by(&self, subject_id: &str, by_subject_id: &str) -> Result<bool> {
        let ignores = self.ignores.read().await;
        Ok(ignores.contains(&(by_subject_id.to_string(), subject_id.to_string())))
    }

    async fn remove_ignore(&self, subject_id: &str, ignored_id: &str) -> Result<()> {
        self.ignores
            .write()
            .await
            .remove(&(subject_id.to_string(), ignored_id.to_string()));
        Ok(())
    }

    async fn get_feature_flags(&self, subject_id: &str) -> Result<Vec<String>> {
        Ok(self
            .powers
            .read()
            .await
            .get(subject_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn ban_user(&self, actor_id: &str, request: BanRequest) -> Result<BanRecord> {
        // Target must exist before a ban can be recorded
        if self.users.read().await.get(&request.target_id).is_none() {
            return Err(GatewayError::IdentityStore(format!(
                "unknown ban target: {}",
                request.target_id
            )));
        }

        let now = Utc::now();
        let expires_at = if request.permanent {
            None
        } else {
            let hours = request.hours.ok_or_else(|| {
                GatewayError::IdentityStore("ban requires hours or permanent flag".to_string())
            })?;
            Some(now + Duration::hours(hours as i64))
        };

        let ban = BanRecord {
            id: self.generate_ban_id().await,
            user_id: request.target_id,
            banned_by: actor_id.to_string(),
            reason: request.reason,
            banned_at: now,
            expires_at,
            revoked: false,
        };

        self.bans.write().await.push(ban.clone());
        Ok(ban)
    }

    async fn update_role(
        &self,
        _actor_id: &str,
        target_id: &str,
        role: Role,
    ) -> Result<UserRecord> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(target_id)
            .ok_or_else(|| GatewayError::IdentityStore(format!("unknown user: {}", target_id)))?;
        user.role = role;
        Ok(user.clone())
    }

    async fn update_avatar(&self, subject_id: &str, avatar: &str) -> Result<UserRecord> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(subject_id)
            .ok_or_else(|| GatewayError::IdentityStore(format!("unknown user: {}", subject_id)))?;
        user.avatar = Some(avatar.to_string());
        Ok(user.clone())
    }

    async fn update_star_pawn(&self, subject_id: &str, show: bool) -> Result<UserRecord> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(subject_id)
            .ok_or_else(|| GatewayError::IdentityStore(format!("unknown user: {}", subject_id)))?;
        user.show_star_pawn = show;
        Ok(user.clone())
    }

    async fn update_pawn(&self, subject_id: &str, pawn: &str) -> Result<UserRecord> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(subject_id)
            .ok_or_else(|| GatewayError::IdentityStore(format!("unknown user: {}", subject_id)))?;
        user.pawn = Some(pawn.to_string());
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str) -> UserRecord {
        UserRecord::new(
            id.to_string(),
            format!("user_{}", id),
            format!("{}@example.com", id),
            Role::Member,
        )
    }

    #[tokio::test]
    async fn test_find_and_whitelist() {
        let store = MemoryIdentityStore::new();
        store.insert_user(member("u1")).await;
        store.allow_email("u1@example.com").await;

        assert!(store.find_by_id("u1").await.unwrap().is_some());
        assert!(store.find_by_id("u2").await.unwrap().is_none());
        assert!(store.is_allow_listed("u1@example.com").await.unwrap());
        assert!(!store.is_allow_listed("u2@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_timed_ban_activates() {
        let store = MemoryIdentityStore::new();
        store.insert_user(member("u1")).await;

        assert!(!store.is_banned("u1").await.unwrap());

        let request = BanRequest {
            target_id: "u1".to_string(),
            reason: "spam".to_string(),
            hours: Some(2),
            permanent: false,
        };
        let ban = store.ban_user("mod1", request).await.unwrap();
        assert!(ban.expires_at.is_some());
        assert!(store.is_banned("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_ban_unknown_target_fails() {
        let store = MemoryIdentityStore::new();
        let request = BanRequest {
            target_id: "ghost".to_string(),
            reason: "spam".to_string(),
            hours: None,
            permanent: true,
        };
        assert!(store.ban_user("mod1", request).await.is_err());
    }

    #[tokio::test]
    async fn test_ignore_is_directional() {
        let store = MemoryIdentityStore::new();
        store.insert_user(member("a")).await;
        store.insert_user(member("b")).await;
        store.add_ignore("b", "a").await;

        // b ignores a, not the other way around
        assert!(store.is_ignored_by("a", "b").await.unwrap());
        assert!(!store.is_ignored_by("b", "a").await.unwrap());

        store.remove_ignore("b", "a").await.unwrap();
        assert!(!store.is_ignored_by("a", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_cosmetic_updates_persist() {
        let store = MemoryIdentityStore::new();
        store.insert_user(member("u1")).await;

        store.update_avatar("u1", "avatar_3").await.unwrap();
        store.update_pawn("u1", "knight").await.unwrap();
        store.update_star_pawn("u1", true).await.unwrap();

        let user = store.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.avatar.as_deref(), Some("avatar_3"));
        assert_eq!(user.pawn.as_deref(), Some("knight"));
        assert!(user.show_star_pawn);
    }
}
