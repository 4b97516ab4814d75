//! Shared error handling for API endpoints.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;
use validator::ValidationErrors;

use super::response::{Envelope, ErrorBody};
use crate::error::AuthError;

/// Shown for every credential and token failure, whatever the cause.
pub const INVALID_SESSION_MESSAGE: &str = "Invalid credentials or session";
pub const AUTH_REQUIRED_MESSAGE: &str = "Authentication required";
const INTERNAL_MESSAGE: &str = "Internal server error";

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest {
        message: String,
        details: Option<BTreeMap<String, Vec<String>>>,
    },
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    TooManyRequests(String),
    /// Detail is logged when constructed and never sent.
    Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest {
            message: msg.into(),
            details: None,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::TooManyRequests(msg.into())
    }

    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!(error = %e, "{}", context);
        Self::Internal
    }

    pub fn from_validation_errors(errors: ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| match &e.message {
                        Some(m) => m.to_string(),
                        None => format!("invalid {}", e.code),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();

        Self::BadRequest {
            message: "Validation failed".to_string(),
            details: Some(details),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests(_) => "RATE_LIMITED",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(msg) => ApiError::bad_request(msg),
            AuthError::Authentication | AuthError::Token(_) => {
                ApiError::unauthorized(INVALID_SESSION_MESSAGE)
            }
            AuthError::AuthenticationRequired => ApiError::unauthorized(AUTH_REQUIRED_MESSAGE),
            AuthError::Authorization { .. } => ApiError::forbidden("Insufficient permissions"),
            AuthError::NotFound(what) => ApiError::not_found(format!("{} not found", capitalize(what))),
            AuthError::Conflict(what) => ApiError::Conflict(format!("{} is already taken", capitalize(what))),
            AuthError::Persistence(e) => ApiError::internal("Storage failure", e),
            AuthError::Internal(e) => ApiError::internal("Internal failure", e),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::from_validation_errors(errors)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, details) = match self {
            ApiError::BadRequest { message, details } => (message, details),
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::TooManyRequests(msg) => (msg, None),
            ApiError::Internal => (INTERNAL_MESSAGE.to_string(), None),
        };

        let body = Envelope::failure(status, message, ErrorBody { code, details });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, TokenError};

    #[test]
    fn test_token_errors_share_one_message() {
        let messages: Vec<String> = [
            AuthError::Authentication,
            AuthError::Token(TokenError::Malformed),
            AuthError::Token(TokenError::Expired),
            AuthError::Token(TokenError::BadSignature),
            AuthError::Token(TokenError::Revoked),
            AuthError::Token(TokenError::NotFound),
        ]
        .into_iter()
        .map(|e| match ApiError::from(e) {
            ApiError::Unauthorized(msg) => msg,
            other => panic!("expected 401, got {:?}", other),
        })
        .collect();

        assert!(messages.iter().all(|m| m == INVALID_SESSION_MESSAGE));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AuthError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AuthError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (
                AuthError::Authorization {
                    required: "admin".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (AuthError::NotFound("session"), StatusCode::NOT_FOUND),
            (AuthError::Conflict("username"), StatusCode::CONFLICT),
            (
                AuthError::Persistence(StoreError::Unavailable("db down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = ApiError::from(AuthError::Persistence(StoreError::Unavailable(
            "connection refused at /var/db/secret.sqlite".into(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The message is fixed; internal detail only reaches the log.
        assert!(matches!(
            ApiError::from(AuthError::Internal("boom".into())),
            ApiError::Internal
        ));
    }

    #[test]
    fn test_not_found_message() {
        match ApiError::from(AuthError::NotFound("session")) {
            ApiError::NotFound(msg) => assert_eq!(msg, "Session not found"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
