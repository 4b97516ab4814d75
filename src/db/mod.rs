mod role;
mod token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use role::{LoadRolesError, RoleStore};
pub use token::TokenStore;
pub use user::UserStore;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let pool = if path == ":memory:" {
            // Every connection to sqlite::memory: is its own database, so pin one.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite:{}?mode=rwc", path))
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE roles (
                    id INTEGER PRIMARY KEY,
                    name TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    rank INTEGER UNIQUE NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1
                )",
                "INSERT INTO roles (id, name, rank, active) VALUES
                    (1, 'user', 10, 1),
                    (2, 'editor', 20, 1),
                    (3, 'admin', 30, 1)",
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    role_id INTEGER NOT NULL REFERENCES roles(id),
                    created_at INTEGER NOT NULL
                )",
                // Refresh sessions, one per login. Only the token hash is stored.
                "CREATE TABLE refresh_sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    token_hash TEXT UNIQUE NOT NULL,
                    user_agent TEXT,
                    ip_address TEXT,
                    expires_at INTEGER NOT NULL,
                    last_used_at INTEGER,
                    created_at INTEGER NOT NULL,
                    is_revoked INTEGER NOT NULL DEFAULT 0
                )",
                "CREATE INDEX idx_refresh_sessions_user_id ON refresh_sessions(user_id)",
                "CREATE INDEX idx_refresh_sessions_expires_at ON refresh_sessions(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the role store.
    pub fn roles(&self) -> RoleStore {
        RoleStore::new(self.pool.clone())
    }

    /// Get the refresh session store.
    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migration_seeds_roles() {
        let db = Database::open(":memory:").await.unwrap();

        let roles = db.roles().list().await.unwrap();
        let names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["user", "editor", "admin"]);
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);
        assert_eq!(db.roles().list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let db = Database::open(":memory:").await.unwrap();
        let result = sqlx::query(
            "INSERT INTO refresh_sessions (user_id, token_hash, expires_at, created_at)
             VALUES (999, 'h', 10, 0)",
        )
        .execute(db.pool())
        .await;
        assert!(result.is_err());
    }
}
