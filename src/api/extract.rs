//! Request body extraction with validation.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use super::error::ApiError;

/// JSON body that has passed its `validator` rules. Malformed JSON and rule
/// violations both become 400 responses in the standard envelope.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e.body_text())))?;

        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Usernames: 3 to 32 characters, ASCII letters, digits and underscores.
pub fn valid_username(value: &str) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ValidationError::new("username_length")
            .with_message("Username must be 3 to 32 characters".into()));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::new("username_charset").with_message(
            "Username can only contain letters, numbers and underscores".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_username() {
        assert!(valid_username("alice").is_ok());
        assert!(valid_username("bob_42").is_ok());
        assert!(valid_username("ab").is_err());
        assert!(valid_username(&"a".repeat(33)).is_err());
        assert!(valid_username("alice smith").is_err());
        assert!(valid_username("alice!").is_err());
    }
}
