use sqlx::sqlite::SqlitePool;

use crate::roles::{Role, RoleHierarchy};

#[derive(Clone)]
pub struct RoleStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    rank: i64,
    active: i32,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            rank: row.rank,
            active: row.active != 0,
        }
    }
}

/// Error loading the hierarchy from storage.
#[derive(Debug, thiserror::Error)]
pub enum LoadRolesError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("invalid role table: {0}")]
    Invalid(#[from] crate::roles::RoleError),
}

impl RoleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All roles, including inactive ones, by ascending rank.
    pub async fn list(&self) -> Result<Vec<Role>, sqlx::Error> {
        let rows: Vec<RoleRow> =
            sqlx::query_as("SELECT id, name, rank, active FROM roles ORDER BY rank")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    /// Build the in-memory hierarchy. Called once at startup.
    pub async fn load_hierarchy(&self) -> Result<RoleHierarchy, LoadRolesError> {
        Ok(RoleHierarchy::new(self.list().await?)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::roles::{ADMIN, EDITOR, USER};

    #[tokio::test]
    async fn test_load_hierarchy() {
        let db = Database::open(":memory:").await.unwrap();
        let roles = db.roles().load_hierarchy().await.unwrap();

        assert!(roles.can_access(ADMIN, EDITOR));
        assert!(!roles.can_access(USER, EDITOR));
        assert_eq!(roles.default_role().name, USER);
    }

    #[tokio::test]
    async fn test_inactive_role_loaded_without_rank() {
        let db = Database::open(":memory:").await.unwrap();
        sqlx::query("UPDATE roles SET active = 0 WHERE id = 2")
            .execute(db.pool())
            .await
            .unwrap();

        let roles = db.roles().load_hierarchy().await.unwrap();
        assert_eq!(roles.rank(EDITOR), None);
        assert_eq!(roles.active().count(), 2);
    }
}
