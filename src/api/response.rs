//! The JSON envelope every endpoint answers with.

use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    /// Field name to messages, for validation failures only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Vec<String>>>,
}

impl<T: Serialize> Envelope<T> {
    pub fn success(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            timestamp: Utc::now(),
            status: status.as_u16(),
            success: true,
            message: message.into(),
            data,
            error: None,
        }
    }
}

impl Envelope<()> {
    pub fn failure(status: StatusCode, message: impl Into<String>, error: ErrorBody) -> Self {
        Self {
            timestamp: Utc::now(),
            status: status.as_u16(),
            success: false,
            message: message.into(),
            data: None,
            error: Some(error),
        }
    }
}

/// Successful response with a payload.
pub struct ApiResponse<T> {
    status: StatusCode,
    message: String,
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope::success(self.status, self.message, self.data);
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let envelope = Envelope::success(StatusCode::OK, "done", Some(serde_json::json!({"a": 1})));
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["status"], 200);
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "done");
        assert_eq!(value["data"]["a"], 1);
        assert!(value.get("error").is_none());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_failure_envelope_omits_data() {
        let envelope = Envelope::failure(
            StatusCode::NOT_FOUND,
            "Session not found",
            ErrorBody {
                code: "NOT_FOUND",
                details: None,
            },
        );
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["status"], 404);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "NOT_FOUND");
        assert!(value.get("data").is_none());
        assert!(value["error"].get("details").is_none());
    }
}
