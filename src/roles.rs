//! Role hierarchy.
//!
//! Roles form a total order by rank. A caller holding role `a` may perform an
//! operation requiring role `b` exactly when `rank(a) >= rank(b)`. Roles are
//! reference data: loaded once at startup and shared read-only.

use serde::Serialize;
use thiserror::Error;

pub const USER: &str = "user";
pub const EDITOR: &str = "editor";
pub const ADMIN: &str = "admin";

/// A named role with its position in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub rank: i64,
    pub active: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("no roles defined")]
    Empty,
    #[error("duplicate role name '{0}'")]
    DuplicateName(String),
    #[error("duplicate rank {0}")]
    DuplicateRank(i64),
    #[error("no active role to use as default")]
    NoActiveRole,
}

/// Immutable, rank-ordered set of roles.
#[derive(Debug, Clone)]
pub struct RoleHierarchy {
    roles: Vec<Role>,
}

impl RoleHierarchy {
    /// Build a hierarchy; names and ranks must both be unique.
    pub fn new(mut roles: Vec<Role>) -> Result<Self, RoleError> {
        if roles.is_empty() {
            return Err(RoleError::Empty);
        }
        roles.sort_by_key(|r| r.rank);

        for pair in roles.windows(2) {
            if pair[0].rank == pair[1].rank {
                return Err(RoleError::DuplicateRank(pair[0].rank));
            }
        }
        for (i, role) in roles.iter().enumerate() {
            if roles[..i]
                .iter()
                .any(|r| r.name.eq_ignore_ascii_case(&role.name))
            {
                return Err(RoleError::DuplicateName(role.name.clone()));
            }
        }
        if !roles.iter().any(|r| r.active) {
            return Err(RoleError::NoActiveRole);
        }

        Ok(Self { roles })
    }

    /// The three roles seeded into a fresh database.
    pub fn builtin() -> Self {
        let role = |id, name: &str, rank| Role {
            id,
            name: name.to_string(),
            rank,
            active: true,
        };
        Self {
            roles: vec![role(1, USER, 10), role(2, EDITOR, 20), role(3, ADMIN, 30)],
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn by_id(&self, id: i64) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// Rank of an active role. Inactive and unknown roles have no rank.
    pub fn rank(&self, name: &str) -> Option<i64> {
        self.by_name(name).filter(|r| r.active).map(|r| r.rank)
    }

    /// `CanAccess(actual, required)`.
    pub fn can_access(&self, actual: &str, required: &str) -> bool {
        match (self.rank(actual), self.rank(required)) {
            (Some(have), Some(need)) => have >= need,
            _ => false,
        }
    }

    /// Lowest-ranked active role, granted on registration.
    pub fn default_role(&self) -> &Role {
        // `new` and `builtin` guarantee at least one active role.
        self.roles
            .iter()
            .find(|r| r.active)
            .unwrap_or(&self.roles[0])
    }

    /// Active roles in ascending rank order.
    pub fn active(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter().filter(|r| r.active)
    }
}

impl Default for RoleHierarchy {
    fn default() -> Self {
        Self::builtin()
    }
}
