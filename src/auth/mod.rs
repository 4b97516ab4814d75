//! JWT authentication with role-based access control.
//!
//! Dual-token system: short-lived access tokens (15 min, stateless) and
//! long-lived refresh tokens (days, backed by a session row). The gatekeeper
//! middleware renews an expired access token from the refresh cookie.

mod cookie;
mod errors;
mod extractors;
mod gatekeeper;
mod ip;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, access_token, auth_cookie, bearer_token,
    clear_cookie, get_cookie,
};
pub use errors::ApiAuthError;
pub use extractors::{Auth, Device, RequireRole, authorize, require_role};
pub use gatekeeper::{authenticate, gatekeeper, renewal_cookies};
pub use ip::{HasHeadersAndExtensions, device_info, extract_client_ip};
pub use state::{AuthBackend, HasAuthBackend};
pub use types::AuthenticatedUser;
