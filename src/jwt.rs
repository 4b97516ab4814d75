//! JWT token generation and validation.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token, stateless
    Access,
    /// Long-lived refresh token, backed by a session row
    Refresh,
}

/// Identity snapshot embedded in both token types at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: i64,
    pub username: String,
    pub email: String,
    /// Role name at issuance
    pub role: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// JWT claims for refresh tokens. `jti` keeps every token value unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub jti: String,
    pub sub: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

impl AccessClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.sub,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }
}

impl RefreshClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.sub,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
        }
    }
}

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: u64,
    refresh_ttl: u64,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    pub token: String,
    pub claims: AccessClaims,
    /// Token duration in seconds
    pub duration: u64,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    pub token: String,
    pub claims: RefreshClaims,
    pub jti: String,
    /// Unix seconds
    pub issued_at: u64,
    /// Unix seconds
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

impl JwtConfig {
    /// Default lifetimes on the wall clock.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: ACCESS_TOKEN_DURATION_SECS,
            refresh_ttl: REFRESH_TOKEN_DURATION_SECS,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttls(mut self, access_ttl: u64, refresh_ttl: u64) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn access_ttl(&self) -> u64 {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> u64 {
        self.refresh_ttl
    }

    pub fn generate_access_token(&self, identity: &Identity) -> Result<AccessTokenResult, JwtError> {
        let now = self.now();

        let claims = AccessClaims {
            sub: identity.user_id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            token_type: TokenType::Access,
            iat: now,
            exp: now + self.access_ttl,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;

        Ok(AccessTokenResult {
            token,
            claims,
            duration: self.access_ttl,
        })
    }

    pub fn generate_refresh_token(
        &self,
        identity: &Identity,
    ) -> Result<RefreshTokenResult, JwtError> {
        let now = self.now();
        let jti = uuid::Uuid::new_v4().to_string();
        let exp = now + self.refresh_ttl;

        let claims = RefreshClaims {
            jti: jti.clone(),
            sub: identity.user_id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;

        Ok(RefreshTokenResult {
            token,
            claims,
            jti,
            issued_at: now,
            expires_at: exp,
            duration: self.refresh_ttl,
        })
    }

    /// Validate an access token. Pure: no storage is consulted.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let claims: AccessClaims = self.decode(token)?;
        if claims.token_type != TokenType::Access {
            return Err(TokenError::Malformed);
        }
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    /// Signature, type and expiry checks for a refresh token. Revocation is
    /// checked against the session store by the caller.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let claims: RefreshClaims = self.decode(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(TokenError::Malformed);
        }
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        // Expiry is checked against our own clock, see `check_expiry`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })
    }

    /// Valid strictly before `exp`.
    fn check_expiry(&self, exp: u64) -> Result<(), TokenError> {
        if self.now() >= exp {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

/// Errors that can occur while minting tokens.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("failed to encode token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}
