//! Storage capabilities used by the session core.
//!
//! [`SessionStore`] persists refresh sessions, [`IdentityStore`] is the
//! narrow view of user accounts the auth service needs. Both have a SQLite
//! implementation in [`crate::db`] and an in-memory one in [`memory`].

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;

pub use memory::{MemoryIdentityStore, MemorySessionStore};

/// A persisted refresh session: one row per successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub id: i64,
    pub user_id: i64,
    /// SHA-256 of the refresh token value, base64url encoded
    pub token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    /// Unix seconds
    pub expires_at: i64,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
    pub is_revoked: bool,
}

impl RefreshSession {
    /// Usable for renewal at `now`: not revoked and strictly before expiry.
    pub fn is_active_at(&self, now: i64) -> bool {
        !self.is_revoked && now < self.expires_at
    }
}

/// A session row that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefreshSession {
    pub user_id: i64,
    pub token_hash: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: i64,
    pub created_at: i64,
}

/// A user account as seen by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role_id: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: i64,
    pub created_at: i64,
}

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn create(&self, session: NewRefreshSession) -> Result<RefreshSession, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<RefreshSession>, StoreError>;

    async fn find_by_token_hash(&self, token_hash: &str)
    -> Result<Option<RefreshSession>, StoreError>;

    /// Stamp `last_used_at`.
    async fn touch(&self, id: i64, now: i64) -> Result<(), StoreError>;

    /// Mark one session revoked. Returns false if it was missing or already revoked.
    async fn revoke(&self, id: i64, now: i64) -> Result<bool, StoreError>;

    /// Revoke every non-revoked session of a user. Returns how many changed.
    async fn revoke_all_for_user(&self, user_id: i64, now: i64) -> Result<u64, StoreError>;

    /// Non-revoked, unexpired sessions, newest first.
    async fn list_active_for_user(
        &self,
        user_id: i64,
        now: i64,
    ) -> Result<Vec<RefreshSession>, StoreError>;

    /// Hard-delete rows that are expired or revoked.
    async fn delete_expired_or_revoked(&self, now: i64) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync + 'static {
    async fn get_by_username(&self, username: &str) -> Result<Option<IdentityRecord>, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<IdentityRecord>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the username or email is taken.
    async fn create(&self, identity: NewIdentity) -> Result<IdentityRecord, StoreError>;

    /// Returns false if the user does not exist.
    async fn set_role(&self, user_id: i64, role_id: i64) -> Result<bool, StoreError>;
}
