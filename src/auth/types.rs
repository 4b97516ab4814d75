//! Authentication user types.

use crate::jwt::AccessClaims;

/// The caller's identity for the current request.
///
/// Inserted into request extensions by the gatekeeper and read back by the
/// `Auth` extractors. Nothing else is stored there under this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Claims of the access token that admitted the request
    pub claims: AccessClaims,
    /// True when the access token was minted from the refresh cookie
    pub renewed: bool,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> i64 {
        self.claims.sub
    }

    pub fn role(&self) -> &str {
        &self.claims.role
    }
}
