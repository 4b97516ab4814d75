use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::error::StoreError;
use crate::store::{IdentityRecord, IdentityStore, NewIdentity};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    role_id: i64,
    created_at: i64,
}

impl From<UserRow> for IdentityRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role_id: row.role_id,
            created_at: row.created_at,
        }
    }
}

const SELECT_USER: &str =
    "SELECT id, username, email, password_hash, role_id, created_at FROM users";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of users holding a given role.
    pub async fn count_with_role(&self, role_id: i64) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role_id = ?")
            .bind(role_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[async_trait]
impl IdentityStore for UserStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(IdentityRecord::from))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<IdentityRecord>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(IdentityRecord::from))
    }

    async fn create(&self, identity: NewIdentity) -> Result<IdentityRecord, StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.role_id)
        .bind(identity.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let taken = match e.as_database_error() {
                Some(db) if db.message().contains("users.email") => "email",
                _ => "username",
            };
            StoreError::from_insert(e, taken)
        })?;

        Ok(IdentityRecord {
            id: result.last_insert_rowid(),
            username: identity.username,
            email: identity.email,
            password_hash: identity.password_hash,
            role_id: identity.role_id,
            created_at: identity.created_at,
        })
    }

    async fn set_role(&self, user_id: i64, role_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET role_id = ? WHERE id = ?")
            .bind(role_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn new_user(username: &str, email: &str) -> NewIdentity {
        NewIdentity {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$fake".to_string(),
            role_id: 1,
            created_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();
        let users = db.users();

        let alice = users
            .create(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        let by_name = users.get_by_username("ALICE").await.unwrap().unwrap();
        assert_eq!(by_name, alice);

        let by_id = users.get_by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "alice@example.com");
        assert_eq!(by_id.role_id, 1);

        assert!(users.get_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email() {
        let db = Database::open(":memory:").await.unwrap();
        let users = db.users();

        users
            .create(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(matches!(
            users.create(new_user("Alice", "other@example.com")).await,
            Err(StoreError::Conflict("username"))
        ));
        assert!(matches!(
            users.create(new_user("bob", "ALICE@example.com")).await,
            Err(StoreError::Conflict("email"))
        ));
    }

    #[tokio::test]
    async fn test_set_role() {
        let db = Database::open(":memory:").await.unwrap();
        let users = db.users();

        let alice = users
            .create(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(users.set_role(alice.id, 3).await.unwrap());
        assert_eq!(users.get_by_id(alice.id).await.unwrap().unwrap().role_id, 3);
        assert_eq!(users.count_with_role(3).await.unwrap(), 1);
        assert!(!users.set_role(999, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_unknown_role_fails() {
        let db = Database::open(":memory:").await.unwrap();
        let users = db.users();

        let alice = users
            .create(new_user("alice", "alice@example.com"))
            .await
            .unwrap();

        assert!(users.set_role(alice.id, 42).await.is_err());
    }
}
