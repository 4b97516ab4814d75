//! Axum extractors and middleware for role-based authorization.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::errors::ApiAuthError;
use super::ip::device_info;
use super::state::{AuthBackend, HasAuthBackend};
use super::types::AuthenticatedUser;
use crate::error::AuthError;
use crate::roles::RoleHierarchy;
use crate::session::DeviceInfo;

/// Check that the caller's role ranks at least as high as `required`.
///
/// No caller means the gatekeeper never admitted the request (401). A caller
/// whose role is unknown or inactive, or ranks too low, is forbidden (403).
pub fn authorize(
    user: Option<&AuthenticatedUser>,
    required: &str,
    roles: &RoleHierarchy,
) -> Result<(), AuthError> {
    let user = user.ok_or(AuthError::AuthenticationRequired)?;
    if roles.can_access(user.role(), required) {
        Ok(())
    } else {
        debug!(
            user_id = user.user_id(),
            role = user.role(),
            required,
            "Insufficient role"
        );
        Err(AuthError::Authorization {
            required: required.to_string(),
        })
    }
}

/// Extractor for handlers behind the gatekeeper.
///
/// Reads the caller placed in request extensions by the gatekeeper. Role
/// requirements are enforced by the `require_role` layer.
pub struct Auth {
    pub user: AuthenticatedUser,
}

impl Auth {
    pub fn user_id(&self) -> i64 {
        self.user.user_id()
    }
}

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthError::AuthenticationRequired)?;
        Ok(Auth { user })
    }
}

/// User agent and client address of the request, recorded on new sessions.
pub struct Device(pub DeviceInfo);

impl<S> FromRequestParts<S> for Device
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Device(device_info(
            &*parts,
            state.settings().ip_extractor.as_ref(),
        )))
    }
}

/// State for the `require_role` middleware.
#[derive(Clone)]
pub struct RequireRole {
    pub backend: AuthBackend,
    pub required: &'static str,
}

impl RequireRole {
    pub fn new(backend: AuthBackend, required: &'static str) -> Self {
        Self { backend, required }
    }
}

/// Route-level guard; layer it inside the gatekeeper.
pub async fn require_role(State(guard): State<RequireRole>, request: Request, next: Next) -> Response {
    let user = request.extensions().get::<AuthenticatedUser>();
    if let Err(e) = authorize(user, guard.required, guard.backend.roles()) {
        return ApiAuthError::new(e).into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{AccessClaims, TokenType};
    use crate::roles;

    fn user(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            claims: AccessClaims {
                sub: 7,
                username: "alice".into(),
                email: "alice@example.com".into(),
                role: role.into(),
                token_type: TokenType::Access,
                iat: 0,
                exp: 900,
            },
            renewed: false,
        }
    }

    #[test]
    fn test_authorize_without_caller() {
        let roles = RoleHierarchy::builtin();
        let err = authorize(None, roles::USER, &roles).unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationRequired));
    }

    #[test]
    fn test_authorize_by_rank() {
        let roles = RoleHierarchy::builtin();
        let admin = user(roles::ADMIN);
        let editor = user(roles::EDITOR);
        let plain = user(roles::USER);

        assert!(authorize(Some(&admin), roles::EDITOR, &roles).is_ok());
        assert!(authorize(Some(&editor), roles::EDITOR, &roles).is_ok());
        assert!(matches!(
            authorize(Some(&plain), roles::EDITOR, &roles),
            Err(AuthError::Authorization { .. })
        ));
    }

    #[test]
    fn test_unknown_role_is_forbidden() {
        let roles = RoleHierarchy::builtin();
        let ghost = user("superuser");
        assert!(matches!(
            authorize(Some(&ghost), roles::USER, &roles),
            Err(AuthError::Authorization { .. })
        ));
    }
}
