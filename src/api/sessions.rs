//! Session management endpoints (behind the gatekeeper).
//!
//! - GET `/` - List the caller's active sessions
//! - DELETE `/{id}` - Revoke one session (own session, or any as admin)

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;

use super::error::ApiError;
use super::response::ApiResponse;
use crate::auth::{Auth, AuthBackend};
use crate::store::RefreshSession;

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: i64,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
    pub expires_at: i64,
}

impl From<RefreshSession> for SessionInfo {
    fn from(s: RefreshSession) -> Self {
        Self {
            id: s.id,
            user_agent: s.user_agent,
            ip_address: s.ip_address,
            created_at: s.created_at,
            last_used_at: s.last_used_at,
            expires_at: s.expires_at,
        }
    }
}

pub(super) async fn list_sessions(
    State(backend): State<AuthBackend>,
    auth: Auth,
) -> Result<impl IntoResponse, ApiError> {
    let sessions: Vec<SessionInfo> = backend
        .manager
        .list_sessions(auth.user_id())
        .await?
        .into_iter()
        .map(SessionInfo::from)
        .collect();

    Ok(ApiResponse::ok("Active sessions", sessions))
}

pub(super) async fn revoke_session(
    State(backend): State<AuthBackend>,
    auth: Auth,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    backend.manager.revoke_session(&auth.user.claims, id).await?;
    Ok(ApiResponse::message("Session revoked"))
}
