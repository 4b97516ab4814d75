//! Role endpoints.
//!
//! - GET `/` - Active roles, lowest rank first
//! - GET `/my-role` - The caller's role and rank
//! - POST `/assign` - Give a user a role (admin)
//! - DELETE `/remove` - Reset a user to the default role (admin)

use axum::{extract::State, response::IntoResponse};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::ApiError;
use super::extract::ValidatedJson;
use super::response::ApiResponse;
use crate::auth::{Auth, AuthBackend};
use crate::roles::Role;

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRoleRequest {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
    #[validate(range(min = 1, message = "role_id must be positive"))]
    pub role_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RemoveRoleRequest {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MyRoleResponse {
    pub role: String,
    /// `None` when the role in the token is no longer active
    pub rank: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UserRoleResponse {
    pub user_id: i64,
    pub role: Role,
}

pub(super) async fn list_roles(State(backend): State<AuthBackend>) -> impl IntoResponse {
    let roles: Vec<Role> = backend.manager.roles().active().cloned().collect();
    ApiResponse::ok("Roles", roles)
}

pub(super) async fn my_role(State(backend): State<AuthBackend>, auth: Auth) -> impl IntoResponse {
    let role = auth.user.role().to_string();
    let rank = backend.manager.roles().rank(&role);
    ApiResponse::ok("Current role", MyRoleResponse { role, rank })
}

pub(super) async fn assign_role(
    State(backend): State<AuthBackend>,
    ValidatedJson(body): ValidatedJson<AssignRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = backend
        .manager
        .assign_role(body.user_id, body.role_id)
        .await?;

    Ok(ApiResponse::ok(
        "Role assigned",
        UserRoleResponse {
            user_id: body.user_id,
            role,
        },
    ))
}

pub(super) async fn remove_role(
    State(backend): State<AuthBackend>,
    ValidatedJson(body): ValidatedJson<RemoveRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = backend.manager.remove_role(body.user_id).await?;

    Ok(ApiResponse::ok(
        "Role removed",
        UserRoleResponse {
            user_id: body.user_id,
            role,
        },
    ))
}
