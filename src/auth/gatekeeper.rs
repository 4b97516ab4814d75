//! Per-request authentication with transparent access-token renewal.
//!
//! 1. A valid access token (bearer header or cookie) admits the request
//!    without touching storage.
//! 2. Otherwise the refresh cookie is required; without it the request is
//!    rejected as unauthenticated.
//! 3. The refresh token must pass signature and session checks.
//! 4. A new access token is minted from the refresh token's claims and sent
//!    back as a cookie alongside the handler's response.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, access_token, auth_cookie, get_cookie, sets_cookie,
};
use super::errors::ApiAuthError;
use super::ip::device_info;
use super::state::AuthBackend;
use super::types::AuthenticatedUser;
use crate::error::AuthError;
use crate::session::{DeviceInfo, Renewal, SessionManager};

/// Run the gatekeeper state machine against request headers.
///
/// Returns the caller and, when the refresh path was taken, the renewal
/// whose cookies must be set on the response.
pub async fn authenticate(
    headers: &HeaderMap,
    device: DeviceInfo,
    manager: &SessionManager,
) -> Result<(AuthenticatedUser, Option<Renewal>), AuthError> {
    if let Some(token) = access_token(headers) {
        match manager.validate_access(token) {
            Ok(claims) => {
                return Ok((
                    AuthenticatedUser {
                        claims,
                        renewed: false,
                    },
                    None,
                ));
            }
            Err(e) => debug!(reason = %e, "Access token rejected, trying refresh cookie"),
        }
    }

    let refresh_token =
        get_cookie(headers, REFRESH_COOKIE_NAME).ok_or(AuthError::AuthenticationRequired)?;

    let renewal = manager.renew(refresh_token, device).await?;
    let user = AuthenticatedUser {
        claims: renewal.access.claims.clone(),
        renewed: true,
    };
    Ok((user, Some(renewal)))
}

/// Cookies carrying a renewal back to the client.
pub fn renewal_cookies(renewal: &Renewal) -> Vec<String> {
    let mut cookies = vec![auth_cookie(
        ACCESS_COOKIE_NAME,
        &renewal.access.token,
        renewal.access.duration,
    )];
    if let Some(rotated) = &renewal.rotated {
        cookies.push(auth_cookie(
            REFRESH_COOKIE_NAME,
            &rotated.refresh.token,
            rotated.refresh.duration,
        ));
    }
    cookies
}

/// Middleware guarding every protected route.
pub async fn gatekeeper(
    State(backend): State<AuthBackend>,
    mut request: Request,
    next: Next,
) -> Response {
    let device = device_info(&request, backend.settings.ip_extractor.as_ref());

    let (user, renewal) = match authenticate(request.headers(), device, &backend.manager).await {
        Ok(result) => result,
        Err(e) => {
            debug!(reason = %e, "Request rejected by gatekeeper");
            return ApiAuthError::new(e).into_response();
        }
    };

    request.extensions_mut().insert(user);
    let mut response = next.run(request).await;

    if let Some(renewal) = renewal {
        let headers = response.headers_mut();
        // Handlers that end the session (logout-all) clear cookies themselves.
        if !sets_cookie(headers, ACCESS_COOKIE_NAME) {
            for cookie in renewal_cookies(&renewal) {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::HeaderValue;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TokenError;
    use crate::jwt::JwtConfig;
    use crate::roles::RoleHierarchy;
    use crate::session::{IssuedSession, RotationPolicy};
    use crate::store::{IdentityStore, MemoryIdentityStore, MemorySessionStore};

    /// Fails the test if the identity store is consulted after setup.
    struct CountingIdentities {
        inner: MemoryIdentityStore,
        lookups: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl IdentityStore for CountingIdentities {
        async fn get_by_username(
            &self,
            username: &str,
        ) -> Result<Option<crate::store::IdentityRecord>, crate::error::StoreError> {
            self.lookups
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.get_by_username(username).await
        }
        async fn get_by_id(
            &self,
            id: i64,
        ) -> Result<Option<crate::store::IdentityRecord>, crate::error::StoreError> {
            self.lookups
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.get_by_id(id).await
        }
        async fn create(
            &self,
            identity: crate::store::NewIdentity,
        ) -> Result<crate::store::IdentityRecord, crate::error::StoreError> {
            self.inner.create(identity).await
        }
        async fn set_role(
            &self,
            user_id: i64,
            role_id: i64,
        ) -> Result<bool, crate::error::StoreError> {
            self.inner.set_role(user_id, role_id).await
        }
    }

    struct Setup {
        manager: SessionManager,
        clock: ManualClock,
        identities: Arc<CountingIdentities>,
        issued: IssuedSession,
    }

    async fn setup() -> Setup {
        let clock = ManualClock::new(1_700_000_000);
        let jwt = JwtConfig::new(b"gatekeeper-test-secret-0123456789abcdef")
            .with_ttls(900, 86_400)
            .with_clock(Arc::new(clock.clone()));
        let identities = Arc::new(CountingIdentities {
            inner: MemoryIdentityStore::new(),
            lookups: Default::default(),
        });
        let manager = SessionManager::new(
            Arc::new(jwt),
            Arc::new(MemorySessionStore::new()),
            identities.clone(),
            Arc::new(RoleHierarchy::builtin()),
            RotationPolicy::Never,
        );
        manager
            .register("alice", "alice@example.com", "Secret123!")
            .await
            .unwrap();
        let issued = manager
            .login("alice", "Secret123!", DeviceInfo::default())
            .await
            .unwrap();
        Setup {
            manager,
            clock,
            identities,
            issued,
        }
    }

    fn headers(cookie: Option<String>, bearer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = cookie {
            headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        }
        if let Some(token) = bearer {
            headers.insert(
                header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            );
        }
        headers
    }

    fn lookups(s: &Setup) -> usize {
        s.identities
            .lookups
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_valid_access_token_admits_without_renewal() {
        let s = setup().await;
        let h = headers(None, Some(&s.issued.access.token));

        let (user, renewal) = authenticate(&h, DeviceInfo::default(), &s.manager)
            .await
            .unwrap();
        assert!(!user.renewed);
        assert!(renewal.is_none());
        assert_eq!(user.claims.username, "alice");
    }

    #[tokio::test]
    async fn test_no_credentials_requires_authentication() {
        let s = setup().await;
        let err = authenticate(&HeaderMap::new(), DeviceInfo::default(), &s.manager)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_refresh_is_not_read_from_bearer() {
        let s = setup().await;
        let h = headers(None, Some(&s.issued.refresh.token));

        let err = authenticate(&h, DeviceInfo::default(), &s.manager)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationRequired));
    }

    #[tokio::test]
    async fn test_expired_access_renews_from_snapshot() {
        let s = setup().await;
        s.clock.advance(901);
        let before = lookups(&s);

        let h = headers(
            Some(format!(
                "access_token={}; refresh_token={}",
                s.issued.access.token, s.issued.refresh.token
            )),
            None,
        );
        let (user, renewal) = authenticate(&h, DeviceInfo::default(), &s.manager)
            .await
            .unwrap();

        assert!(user.renewed);
        assert_eq!(user.claims.identity(), s.issued.identity);
        assert_eq!(lookups(&s), before, "identity store must not be queried");

        let renewal = renewal.unwrap();
        let cookies = renewal_cookies(&renewal);
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].starts_with("access_token="));
        assert!(cookies[0].contains("Max-Age=900"));
    }

    #[tokio::test]
    async fn test_revoked_refresh_rejected() {
        let s = setup().await;
        s.manager.logout(&s.issued.refresh.token).await.unwrap();

        let h = headers(
            Some(format!("refresh_token={}", s.issued.refresh.token)),
            None,
        );
        let err = authenticate(&h, DeviceInfo::default(), &s.manager)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::Revoked)));
    }

    #[tokio::test]
    async fn test_garbage_refresh_cookie_rejected() {
        let s = setup().await;
        let h = headers(Some("refresh_token=garbage".to_string()), None);
        let err = authenticate(&h, DeviceInfo::default(), &s.manager)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Token(TokenError::Malformed)));
    }
}
