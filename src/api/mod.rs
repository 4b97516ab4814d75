mod auth;
mod error;
mod extract;
mod response;
mod roles;
mod sessions;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::auth::{AuthBackend, RequireRole, gatekeeper, require_role};
use crate::rate_limit::{RateLimitConfig, RateLimitState, rate_limit};
use crate::roles::ADMIN;

pub use error::{AUTH_REQUIRED_MESSAGE, ApiError, INVALID_SESSION_MESSAGE};
pub use extract::{ValidatedJson, valid_username};
pub use response::{ApiResponse, Envelope, ErrorBody};

/// Create the API router.
///
/// Credential routes are public and rate limited, everything else sits
/// behind the gatekeeper. Role mutation additionally requires an admin.
pub fn create_api_router(backend: AuthBackend) -> Router {
    let limits = RateLimitConfig::new(&backend.settings.rate_limits);
    let ip_extractor = backend.settings.ip_extractor.clone();

    let login = post(auth::login).layer(middleware::from_fn_with_state(
        RateLimitState::login(&limits, ip_extractor.clone()),
        rate_limit,
    ));
    let register = post(auth::register).layer(middleware::from_fn_with_state(
        RateLimitState::register(&limits, ip_extractor),
        rate_limit,
    ));

    let public = Router::new()
        .route("/login", login)
        .route("/register", register)
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/health", get(health));

    let admin_roles = Router::new()
        .route("/assign", post(roles::assign_role))
        .route("/remove", delete(roles::remove_role))
        .route_layer(middleware::from_fn_with_state(
            RequireRole::new(backend.clone(), ADMIN),
            require_role,
        ));

    let role_routes = Router::new()
        .route("/", get(roles::list_roles))
        .route("/my-role", get(roles::my_role))
        .merge(admin_roles);

    let protected = Router::new()
        .route("/logout-all", post(auth::logout_all))
        .route("/me", get(auth::me))
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/{id}", delete(sessions::revoke_session))
        .nest("/roles", role_routes)
        .route_layer(middleware::from_fn_with_state(backend.clone(), gatekeeper));

    public.merge(protected).with_state(backend)
}

async fn health() -> ApiResponse<()> {
    ApiResponse::message("ok")
}
