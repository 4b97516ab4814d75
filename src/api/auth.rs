//! Credential and session endpoints.
//!
//! - POST `/login` - Verify credentials, set access and refresh cookies
//! - POST `/register` - Create an account with the default role
//! - POST `/refresh` - Exchange the refresh cookie for a new access token
//! - POST `/logout` - Revoke the session behind the refresh cookie
//! - POST `/logout-all` - Revoke every session of the caller (gatekeeper)
//! - GET `/me` - Claims of the current caller (gatekeeper)

use axum::{
    extract::State,
    http::{HeaderMap, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::ApiError;
use super::extract::{ValidatedJson, valid_username};
use super::response::ApiResponse;
use crate::auth::{
    ACCESS_COOKIE_NAME, ApiAuthError, Auth, AuthBackend, Device, REFRESH_COOKIE_NAME,
    auth_cookie, clear_cookie, get_cookie, renewal_cookies,
};
use crate::error::AuthError;
use crate::jwt::Identity;
use crate::store::IdentityRecord;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, max = 1024, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "valid_username"))]
    pub username: String,
    #[validate(email(message = "Email address is not valid"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8 to 128 characters"))]
    pub password: String,
}

/// Public view of a user.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<Identity> for UserView {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.user_id,
            username: identity.username,
            email: identity.email,
            role: identity.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserView,
    /// Seconds until the access token expires
    pub access_expires_in: u64,
    /// Seconds until the refresh token expires
    pub refresh_expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_expires_in: u64,
    pub refresh_expires_in: u64,
    pub rotated: bool,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked: u64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserView,
    /// Unix seconds at which the current access token expires
    pub expires_at: u64,
    /// True when this request's access token was minted from the refresh cookie
    pub renewed: bool,
}

fn user_view(backend: &AuthBackend, record: &IdentityRecord) -> Result<UserView, ApiError> {
    Ok(backend.manager.identity_of(record)?.into())
}

fn clear_both() -> AppendHeaders<[(axum::http::HeaderName, String); 2]> {
    AppendHeaders([
        (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME)),
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME)),
    ])
}

pub(super) async fn login(
    State(backend): State<AuthBackend>,
    Device(device): Device,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let issued = backend
        .manager
        .login(&body.username, &body.password, device)
        .await?;

    let cookies = AppendHeaders([
        (
            SET_COOKIE,
            auth_cookie(
                ACCESS_COOKIE_NAME,
                &issued.access.token,
                issued.access.duration,
            ),
        ),
        (
            SET_COOKIE,
            auth_cookie(
                REFRESH_COOKIE_NAME,
                &issued.refresh.token,
                issued.refresh.duration,
            ),
        ),
    ]);

    Ok((
        cookies,
        ApiResponse::ok(
            "Login successful",
            LoginResponse {
                user: issued.identity.into(),
                access_expires_in: issued.access.duration,
                refresh_expires_in: issued.refresh.duration,
            },
        ),
    ))
}

pub(super) async fn register(
    State(backend): State<AuthBackend>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = backend
        .manager
        .register(body.username.trim(), body.email.trim(), &body.password)
        .await?;

    Ok(ApiResponse::created(
        "User registered",
        user_view(&backend, &record)?,
    ))
}

pub(super) async fn refresh(
    State(backend): State<AuthBackend>,
    Device(device): Device,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiAuthError> {
    let token = get_cookie(&headers, REFRESH_COOKIE_NAME).ok_or(AuthError::AuthenticationRequired)?;
    let renewal = backend.manager.refresh(token, device).await?;

    let cookies: Vec<(axum::http::HeaderName, String)> = renewal_cookies(&renewal)
        .into_iter()
        .map(|cookie| (SET_COOKIE, cookie))
        .collect();

    Ok((
        AppendHeaders(cookies),
        ApiResponse::ok(
            "Token refreshed",
            RefreshResponse {
                access_expires_in: renewal.access.duration,
                refresh_expires_in: renewal.refresh_remaining,
                rotated: renewal.rotated.is_some(),
            },
        ),
    ))
}

/// Cookies are cleared even when the session is already gone.
pub(super) async fn logout(
    State(backend): State<AuthBackend>,
    headers: HeaderMap,
) -> axum::response::Response {
    let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME) else {
        return ApiAuthError::new(AuthError::AuthenticationRequired).into_response();
    };

    match backend.manager.logout(token).await {
        Ok(_) => (clear_both(), ApiResponse::message("Logged out")).into_response(),
        Err(e) => (clear_both(), ApiError::from(e)).into_response(),
    }
}

pub(super) async fn logout_all(
    State(backend): State<AuthBackend>,
    auth: Auth,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = backend.manager.logout_all(auth.user_id()).await?;

    Ok((
        clear_both(),
        ApiResponse::ok(
            "Logged out of all sessions",
            LogoutAllResponse { revoked },
        ),
    ))
}

pub(super) async fn me(auth: Auth) -> impl IntoResponse {
    let user = auth.user;
    ApiResponse::ok(
        "Authenticated",
        MeResponse {
            user: user.claims.identity().into(),
            expires_at: user.claims.exp,
            renewed: user.renewed,
        },
    )
}
