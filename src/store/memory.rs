//! In-memory stores for tests and single-process experiments.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    IdentityRecord, IdentityStore, NewIdentity, NewRefreshSession, RefreshSession, SessionStore,
};
use crate::error::StoreError;

struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn insert(&mut self, make: impl FnOnce(i64) -> T) -> &T {
        self.next_id += 1;
        let id = self.next_id;
        self.rows.entry(id).or_insert_with(|| make(id))
    }
}

fn poisoned<E>(_: E) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[derive(Default)]
pub struct MemorySessionStore {
    table: Mutex<Table<RefreshSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, including revoked ones.
    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: NewRefreshSession) -> Result<RefreshSession, StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        if table
            .rows
            .values()
            .any(|row| row.token_hash == session.token_hash)
        {
            return Err(StoreError::Conflict("refresh session"));
        }
        let row = table.insert(|id| RefreshSession {
            id,
            user_id: session.user_id,
            token_hash: session.token_hash,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            expires_at: session.expires_at,
            last_used_at: None,
            created_at: session.created_at,
            is_revoked: false,
        });
        Ok(row.clone())
    }

    async fn get(&self, id: i64) -> Result<Option<RefreshSession>, StoreError> {
        let table = self.table.lock().map_err(poisoned)?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let table = self.table.lock().map_err(poisoned)?;
        Ok(table
            .rows
            .values()
            .find(|row| row.token_hash == token_hash)
            .cloned())
    }

    async fn touch(&self, id: i64, now: i64) -> Result<(), StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        if let Some(row) = table.rows.get_mut(&id) {
            row.last_used_at = Some(now);
        }
        Ok(())
    }

    async fn revoke(&self, id: i64, now: i64) -> Result<bool, StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        match table.rows.get_mut(&id) {
            Some(row) if !row.is_revoked => {
                row.is_revoked = true;
                row.last_used_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: i64, now: i64) -> Result<u64, StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        let mut count = 0;
        for row in table
            .rows
            .values_mut()
            .filter(|row| row.user_id == user_id && !row.is_revoked)
        {
            row.is_revoked = true;
            row.last_used_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    async fn list_active_for_user(
        &self,
        user_id: i64,
        now: i64,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let table = self.table.lock().map_err(poisoned)?;
        let mut rows: Vec<RefreshSession> = table
            .rows
            .values()
            .filter(|row| row.user_id == user_id && row.is_active_at(now))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn delete_expired_or_revoked(&self, now: i64) -> Result<u64, StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        let before = table.rows.len();
        table.rows.retain(|_, row| row.is_active_at(now));
        Ok((before - table.rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    table: Mutex<Table<IdentityRecord>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let table = self.table.lock().map_err(poisoned)?;
        Ok(table
            .rows
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<IdentityRecord>, StoreError> {
        let table = self.table.lock().map_err(poisoned)?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn create(&self, identity: NewIdentity) -> Result<IdentityRecord, StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        for existing in table.rows.values() {
            if existing.username.eq_ignore_ascii_case(&identity.username) {
                return Err(StoreError::Conflict("username"));
            }
            if existing.email.eq_ignore_ascii_case(&identity.email) {
                return Err(StoreError::Conflict("email"));
            }
        }
        let row = table.insert(|id| IdentityRecord {
            id,
            username: identity.username,
            email: identity.email,
            password_hash: identity.password_hash,
            role_id: identity.role_id,
            created_at: identity.created_at,
        });
        Ok(row.clone())
    }

    async fn set_role(&self, user_id: i64, role_id: i64) -> Result<bool, StoreError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        match table.rows.get_mut(&user_id) {
            Some(user) => {
                user.role_id = role_id;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
