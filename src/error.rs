//! Error taxonomy shared by the session core and the HTTP layer.

use thiserror::Error;

/// Reasons a presented token is not accepted.
///
/// Every variant is reported to clients the same way; the distinction only
/// exists for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("session has been revoked")]
    Revoked,
    #[error("session not found")]
    NotFound,
}

/// Storage failures from a [`crate::store::SessionStore`] or
/// [`crate::store::IdentityStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Map unique-constraint violations to [`StoreError::Conflict`].
    pub fn from_insert(err: sqlx::Error, what: &'static str) -> Self {
        match err.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::Conflict(what),
            _ => StoreError::Database(err),
        }
    }
}

/// Outcome of any authentication or authorization step.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Wrong username or password. Deliberately carries no detail.
    #[error("invalid credentials")]
    Authentication,

    /// Neither an access token nor a refresh cookie was presented.
    #[error("authentication required")]
    AuthenticationRequired,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("role '{required}' required")]
    Authorization { required: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("persistence failure: {0}")]
    Persistence(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => AuthError::Conflict(what),
            other => AuthError::Persistence(other),
        }
    }
}

impl AuthError {
    /// True for failures that mean "who you are could not be established".
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            AuthError::Authentication | AuthError::AuthenticationRequired | AuthError::Token(_)
        )
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
