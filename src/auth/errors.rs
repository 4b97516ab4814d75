//! Authentication rejections.

use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie};
use crate::api::ApiError;
use crate::error::AuthError;

/// Rejection from the gatekeeper and the `Auth` extractors.
///
/// Renders the standard error envelope. When the presented tokens were bad,
/// both auth cookies are cleared so the client stops sending them.
#[derive(Debug)]
pub struct ApiAuthError {
    error: AuthError,
}

impl ApiAuthError {
    pub fn new(error: AuthError) -> Self {
        Self { error }
    }

    fn clears_cookies(&self) -> bool {
        matches!(self.error, AuthError::Token(_) | AuthError::Authentication)
    }
}

impl From<AuthError> for ApiAuthError {
    fn from(error: AuthError) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        let clear = self.clears_cookies();
        let mut response = ApiError::from(self.error).into_response();

        if clear {
            let headers = response.headers_mut();
            for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
                if let Ok(value) = HeaderValue::from_str(&clear_cookie(name)) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}
