//! Session lifecycle: login, renewal, explicit refresh, revocation and cleanup.
//!
//! [`SessionManager`] is the one place that combines the credential verifier,
//! the token issuer/validator and the session store. HTTP handlers and the
//! gatekeeper middleware only talk to it.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::{AuthError, Result, TokenError};
use crate::jwt::{AccessClaims, AccessTokenResult, Identity, JwtConfig, RefreshClaims, RefreshTokenResult};
use crate::password::{self, PasswordError};
use crate::roles::{ADMIN, Role, RoleHierarchy};
use crate::store::{
    IdentityRecord, IdentityStore, NewIdentity, NewRefreshSession, RefreshSession, SessionStore,
};

/// When a refresh token is replaced by a new one.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// Keep the refresh token for its whole lifetime. Concurrent renewals
    /// from several tabs all succeed.
    #[default]
    Never,
    /// Replace the refresh token (and revoke the old session) on every renewal.
    Always,
}

/// Request metadata recorded on a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Everything produced by a successful login.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub identity: Identity,
    pub access: AccessTokenResult,
    pub refresh: RefreshTokenResult,
    pub session: RefreshSession,
}

/// A refresh token that replaced an older one.
#[derive(Debug, Clone)]
pub struct RotatedRefresh {
    pub refresh: RefreshTokenResult,
    pub session: RefreshSession,
}

/// Result of exchanging a refresh token for a new access token.
#[derive(Debug, Clone)]
pub struct Renewal {
    pub access: AccessTokenResult,
    /// Set when the refresh token was rotated.
    pub rotated: Option<RotatedRefresh>,
    /// Seconds left on the refresh session that remains in use.
    pub refresh_remaining: u64,
}

/// Hash of a refresh token value as stored in the session table.
pub fn token_hash(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

pub struct SessionManager {
    jwt: Arc<JwtConfig>,
    sessions: Arc<dyn SessionStore>,
    identities: Arc<dyn IdentityStore>,
    roles: Arc<RoleHierarchy>,
    rotation: RotationPolicy,
}

impl SessionManager {
    pub fn new(
        jwt: Arc<JwtConfig>,
        sessions: Arc<dyn SessionStore>,
        identities: Arc<dyn IdentityStore>,
        roles: Arc<RoleHierarchy>,
        rotation: RotationPolicy,
    ) -> Self {
        Self {
            jwt,
            sessions,
            identities,
            roles,
            rotation,
        }
    }

    pub fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }

    pub fn roles(&self) -> &RoleHierarchy {
        &self.roles
    }

    fn now(&self) -> i64 {
        self.jwt.now() as i64
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Create an account with the default role.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<IdentityRecord> {
        let hash = hash_blocking(password.to_string()).await?;
        let role = self.roles.default_role();

        let record = self
            .identities
            .create(NewIdentity {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: hash,
                role_id: role.id,
                created_at: self.now(),
            })
            .await?;

        info!(user_id = record.id, username = %record.username, "User registered");
        Ok(record)
    }

    /// Unknown user and wrong password are indistinguishable to the caller.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> Result<IdentityRecord> {
        let Some(record) = self.identities.get_by_username(username).await? else {
            burn_blocking(password.to_string()).await;
            debug!(username = %username, "Login for unknown user");
            return Err(AuthError::Authentication);
        };

        match verify_blocking(password.to_string(), record.password_hash.clone()).await? {
            Ok(()) => Ok(record),
            Err(PasswordError::Mismatch) => Err(AuthError::Authentication),
            Err(e) => {
                error!(user_id = record.id, error = %e, "Stored password hash is unusable");
                Err(AuthError::Authentication)
            }
        }
    }

    /// Snapshot a stored user for embedding into tokens.
    pub fn identity_of(&self, record: &IdentityRecord) -> Result<Identity> {
        let role = self.roles.by_id(record.role_id).ok_or_else(|| {
            AuthError::Internal(format!(
                "user {} has unknown role id {}",
                record.id, record.role_id
            ))
        })?;
        Ok(Identity {
            user_id: record.id,
            username: record.username.clone(),
            email: record.email.clone(),
            role: role.name.clone(),
        })
    }

    // =========================================================================
    // Issuance
    // =========================================================================

    /// Verify credentials and open a new session. Nothing is stored on failure.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        device: DeviceInfo,
    ) -> Result<IssuedSession> {
        let record = match self.verify_credentials(username, password).await {
            Ok(record) => record,
            Err(e) => {
                warn!(username = %username, "Login failed");
                return Err(e);
            }
        };
        let identity = self.identity_of(&record)?;
        let issued = self.start_session(identity, device).await?;

        info!(
            user_id = issued.identity.user_id,
            session_id = issued.session.id,
            "Login succeeded"
        );
        Ok(issued)
    }

    /// Mint both tokens for an identity and persist the refresh session.
    pub async fn start_session(&self, identity: Identity, device: DeviceInfo) -> Result<IssuedSession> {
        let access = self.issue_access(&identity)?;
        let (refresh, new_session) = self.issue_refresh(&identity, device)?;
        let session = self.sessions.create(new_session).await?;

        Ok(IssuedSession {
            identity,
            access,
            refresh,
            session,
        })
    }

    pub fn issue_access(&self, identity: &Identity) -> Result<AccessTokenResult> {
        self.jwt
            .generate_access_token(identity)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Mint a refresh token and the matching, not yet stored, session row.
    pub fn issue_refresh(
        &self,
        identity: &Identity,
        device: DeviceInfo,
    ) -> Result<(RefreshTokenResult, NewRefreshSession)> {
        let refresh = self
            .jwt
            .generate_refresh_token(identity)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let session = NewRefreshSession {
            user_id: identity.user_id,
            token_hash: token_hash(&refresh.token),
            user_agent: device.user_agent,
            ip_address: device.ip_address,
            expires_at: refresh.expires_at as i64,
            created_at: refresh.issued_at as i64,
        };
        Ok((refresh, session))
    }

    // =========================================================================
    // Validation and renewal
    // =========================================================================

    pub fn validate_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.jwt.validate_access_token(token)
    }

    /// Two-step refresh validation: the token itself, then its session row.
    /// Stamps `last_used_at` on success.
    pub async fn validate_refresh(&self, token: &str) -> Result<(RefreshClaims, RefreshSession)> {
        let claims = self.jwt.validate_refresh_token(token)?;

        let session = self
            .sessions
            .find_by_token_hash(&token_hash(token))
            .await?
            .filter(|s| s.user_id == claims.sub)
            .ok_or(TokenError::NotFound)?;

        let now = self.now();
        if session.is_revoked {
            return Err(TokenError::Revoked.into());
        }
        if now >= session.expires_at {
            return Err(TokenError::Expired.into());
        }

        self.sessions.touch(session.id, now).await?;
        Ok((claims, session))
    }

    /// Silent renewal for the gatekeeper: the new access token is built from
    /// the refresh token's own claims, without reading the identity store.
    pub async fn renew(&self, refresh_token: &str, device: DeviceInfo) -> Result<Renewal> {
        let (claims, session) = self.validate_refresh(refresh_token).await?;
        let identity = claims.identity();
        let renewal = self.finish_renewal(&identity, &session, device, false).await?;

        debug!(user_id = identity.user_id, session_id = session.id, "Access token renewed");
        Ok(renewal)
    }

    /// Explicit refresh. Re-reads the user so role changes are picked up; a
    /// changed snapshot forces a new refresh token regardless of policy.
    pub async fn refresh(&self, refresh_token: &str, device: DeviceInfo) -> Result<Renewal> {
        let (claims, session) = self.validate_refresh(refresh_token).await?;

        let record = self
            .identities
            .get_by_id(claims.sub)
            .await?
            .ok_or(TokenError::NotFound)?;
        let identity = self.identity_of(&record)?;
        let stale = identity != claims.identity();

        let renewal = self
            .finish_renewal(&identity, &session, device, stale)
            .await?;

        info!(
            user_id = identity.user_id,
            session_id = session.id,
            rotated = renewal.rotated.is_some(),
            "Tokens refreshed"
        );
        Ok(renewal)
    }

    async fn finish_renewal(
        &self,
        identity: &Identity,
        session: &RefreshSession,
        device: DeviceInfo,
        force_rotate: bool,
    ) -> Result<Renewal> {
        let access = self.issue_access(identity)?;

        if !force_rotate && self.rotation == RotationPolicy::Never {
            let remaining = (session.expires_at - self.now()).max(0) as u64;
            return Ok(Renewal {
                access,
                rotated: None,
                refresh_remaining: remaining,
            });
        }

        let device = DeviceInfo {
            user_agent: device.user_agent.or_else(|| session.user_agent.clone()),
            ip_address: device.ip_address.or_else(|| session.ip_address.clone()),
        };
        let (refresh, new_session) = self.issue_refresh(identity, device)?;
        let new_session = self.sessions.create(new_session).await?;
        self.sessions.revoke(session.id, self.now()).await?;

        Ok(Renewal {
            access,
            refresh_remaining: refresh.duration,
            rotated: Some(RotatedRefresh {
                refresh,
                session: new_session,
            }),
        })
    }

    // =========================================================================
    // Revocation
    // =========================================================================

    /// Revoke the session behind a refresh token value.
    pub async fn logout(&self, refresh_token: &str) -> Result<RefreshSession> {
        let session = self
            .sessions
            .find_by_token_hash(&token_hash(refresh_token))
            .await?
            .filter(|s| !s.is_revoked)
            .ok_or(AuthError::NotFound("session"))?;

        if !self.sessions.revoke(session.id, self.now()).await? {
            return Err(AuthError::NotFound("session"));
        }

        info!(user_id = session.user_id, session_id = session.id, "Logged out");
        Ok(session)
    }

    /// Revoke every session of a user. Returns how many were revoked.
    pub async fn logout_all(&self, user_id: i64) -> Result<u64> {
        let count = self
            .sessions
            .revoke_all_for_user(user_id, self.now())
            .await?;
        info!(user_id, count, "Logged out of all sessions");
        Ok(count)
    }

    pub async fn list_sessions(&self, user_id: i64) -> Result<Vec<RefreshSession>> {
        Ok(self
            .sessions
            .list_active_for_user(user_id, self.now())
            .await?)
    }

    /// Revoke one session by id. Callers may revoke their own sessions;
    /// admins may revoke anyone's.
    pub async fn revoke_session(&self, caller: &AccessClaims, session_id: i64) -> Result<()> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(AuthError::NotFound("session"))?;

        if session.user_id != caller.sub && !self.roles.can_access(&caller.role, ADMIN) {
            // Someone else's session looks the same as a missing one.
            return Err(AuthError::NotFound("session"));
        }

        if !self.sessions.revoke(session.id, self.now()).await? {
            return Err(AuthError::NotFound("session"));
        }

        info!(
            user_id = caller.sub,
            session_id,
            owner_id = session.user_id,
            "Session revoked"
        );
        Ok(())
    }

    /// Hard-delete expired and revoked sessions.
    pub async fn cleanup(&self) -> Result<u64> {
        Ok(self.sessions.delete_expired_or_revoked(self.now()).await?)
    }

    // =========================================================================
    // Roles
    // =========================================================================

    /// Give a user an active role and end their sessions. Access tokens
    /// already issued keep the old role until they expire.
    pub async fn assign_role(&self, user_id: i64, role_id: i64) -> Result<Role> {
        let role = self
            .roles
            .by_id(role_id)
            .filter(|r| r.active)
            .ok_or_else(|| AuthError::Validation(format!("unknown or inactive role {role_id}")))?
            .clone();

        let revoked = self.change_role(user_id, &role).await?;
        info!(user_id, role = %role.name, revoked, "Role assigned");
        Ok(role)
    }

    /// Reset a user to the default role and end their sessions.
    pub async fn remove_role(&self, user_id: i64) -> Result<Role> {
        let role = self.roles.default_role().clone();
        let revoked = self.change_role(user_id, &role).await?;
        info!(user_id, role = %role.name, revoked, "Role reset to default");
        Ok(role)
    }

    /// Renewal never reads the user table, so refresh tokens carrying the
    /// old role must not outlive the change.
    async fn change_role(&self, user_id: i64, role: &Role) -> Result<u64> {
        if !self.identities.set_role(user_id, role.id).await? {
            return Err(AuthError::NotFound("user"));
        }
        Ok(self
            .sessions
            .revoke_all_for_user(user_id, self.now())
            .await?)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<IdentityRecord> {
        self.identities
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound("user"))
    }
}

async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .map_err(|e| match e {
            PasswordError::TooShort | PasswordError::TooLong => AuthError::Validation(e.to_string()),
            other => AuthError::Internal(other.to_string()),
        })
}

async fn verify_blocking(
    password: String,
    hash: String,
) -> Result<std::result::Result<(), PasswordError>> {
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))
}

async fn burn_blocking(password: String) {
    let _ = tokio::task::spawn_blocking(move || password::verify_dummy(&password)).await;
}
