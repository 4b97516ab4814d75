//! Refresh session storage for revocation tracking.
//!
//! Only refresh tokens are tracked, and only by hash. Access tokens are
//! stateless and never touch the database.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::error::StoreError;
use crate::store::{NewRefreshSession, RefreshSession, SessionStore};

/// Store for refresh sessions.
#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    token_hash: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
    expires_at: i64,
    last_used_at: Option<i64>,
    created_at: i64,
    is_revoked: i32,
}

impl From<SessionRow> for RefreshSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            expires_at: row.expires_at,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            is_revoked: row.is_revoked != 0,
        }
    }
}

const SELECT_SESSION: &str = "SELECT id, user_id, token_hash, user_agent, ip_address, expires_at, last_used_at, created_at, is_revoked FROM refresh_sessions";

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for TokenStore {
    async fn create(&self, session: NewRefreshSession) -> Result<RefreshSession, StoreError> {
        let result = sqlx::query(
            "INSERT INTO refresh_sessions (user_id, token_hash, user_agent, ip_address, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, "refresh session"))?;

        Ok(RefreshSession {
            id: result.last_insert_rowid(),
            user_id: session.user_id,
            token_hash: session.token_hash,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            expires_at: session.expires_at,
            last_used_at: None,
            created_at: session.created_at,
            is_revoked: false,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<RefreshSession>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!("{SELECT_SESSION} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(RefreshSession::from))
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, StoreError> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("{SELECT_SESSION} WHERE token_hash = ?"))
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(RefreshSession::from))
    }

    async fn touch(&self, id: i64, now: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE refresh_sessions SET last_used_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke(&self, id: i64, now: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET is_revoked = 1, last_used_at = ? WHERE id = ? AND is_revoked = 0",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: i64, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET is_revoked = 1, last_used_at = ? WHERE user_id = ? AND is_revoked = 0",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_active_for_user(
        &self,
        user_id: i64,
        now: i64,
    ) -> Result<Vec<RefreshSession>, StoreError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{SELECT_SESSION} WHERE user_id = ? AND is_revoked = 0 AND expires_at > ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RefreshSession::from).collect())
    }

    async fn delete_expired_or_revoked(&self, now: i64) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM refresh_sessions WHERE expires_at <= ? OR is_revoked = 1")
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
