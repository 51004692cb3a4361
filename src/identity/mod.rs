//! Identity store interface consumed by the gateway
//!
//! The gateway treats user records, bans, whitelist entries, and
//! ignore relationships as externally persisted data reached through
//! this trait. Registration, profile CRUD, and token issuance live in
//! whatever service implements it.

pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::auth::role::Role;
use crate::error::Result;

pub use memory::MemoryIdentityStore;
pub use types::{BanRecord, BanRequest, UserRecord};

/// Lookup and mutation operations the gateway needs from the identity
/// backend. All calls may suspend; failures surface as
/// `GatewayError::IdentityStore` and are contained per event.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Resolve a subject id to its authoritative user record
    async fn find_by_id(&self, subject_id: &str) -> Result<Option<UserRecord>>;

    /// Whether the subject has an active, non-revoked ban
    async fn is_banned(&self, subject_id: &str) -> Result<bool>;

    /// Whether an email is on the allow-list
    async fn is_allow_listed(&self, email: &str) -> Result<bool>;

    /// Friend list for a subject
    async fn get_friends(&self, subject_id: &str) -> Result<Vec<UserRecord>>;

    /// Users this subject ignores
    async fn get_ignored(&self, subject_id: &str) -> Result<Vec<UserRecord>>;

    /// Whether `by_subject_id` ignores `subject_id` (directional)
    async fn is_ignored_by(&self, subject_id: &str, by_subject_id: &str) -> Result<bool>;

    /// Remove a directional ignore relationship; no-op if absent
    async fn remove_ignore(&self, subject_id: &str, ignored_id: &str) -> Result<()>;

    /// Feature flags granted to a subject
    async fn get_feature_flags(&self, subject_id: &str) -> Result<Vec<String>>;

    /// Record a ban issued by `actor_id`
    async fn ban_user(&self, actor_id: &str, request: BanRequest) -> Result<BanRecord>;

    /// Persist a role change issued by `actor_id`
    async fn update_role(&self, actor_id: &str, target_id: &str, role: Role)
        -> Result<UserRecord>;

    /// Persist an avatar change
    async fn update_avatar(&self, subject_id: &str, avatar: &str) -> Result<UserRecord>;

    /// Persist the star-pawn cosmetic flag
    async fn update_star_pawn(&self, subject_id: &str, show: bool) -> Result<UserRecord>;

    /// Persist a pawn change
    async fn update_pawn(&self, subject_id: &str, pawn: &str) -> Result<UserRecord>;
}
