//! CLI argument parsing, validation, and startup helpers.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::password::{hash_password, validate_password};
use crate::roles;
use crate::server_config::{RateLimitSettings, ServerSettings};
use crate::session::RotationPolicy;
use crate::store::{IdentityStore, NewIdentity, SessionStore};

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Environment variable holding the password for `--create-admin`.
pub const ADMIN_PASSWORD_ENV: &str = "TOLLGATE_ADMIN_PASSWORD";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Proxy header carrying the real client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    XForwardedFor,
    XRealIp,
    CfConnectingIp,
}

/// Reads the client IP from a trusted proxy header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpExtractor {
    header: ClientIpHeader,
}

impl IpExtractor {
    pub fn header_name(&self) -> &'static str {
        match self.header {
            ClientIpHeader::XForwardedFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
            ClientIpHeader::CfConnectingIp => "cf-connecting-ip",
        }
    }

    /// Parse the header value. For `X-Forwarded-For` the left-most entry is
    /// the original client.
    pub fn extract(&self, value: &str) -> Result<String, &'static str> {
        let candidate = match self.header {
            ClientIpHeader::XForwardedFor => value.split(',').next().unwrap_or_default(),
            _ => value,
        };
        candidate
            .trim()
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header does not contain a valid address")
    }
}

impl From<ClientIpHeader> for IpExtractor {
    fn from(header: ClientIpHeader) -> Self {
        Self { header }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Tollgate",
    about = "Authentication and session service with JWT access and refresh tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "TOLLGATE_PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "TOLLGATE_DATABASE", default_value = "tollgate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, env = "TOLLGATE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Access token lifetime in seconds
    #[arg(long, env = "TOLLGATE_ACCESS_TTL_SECS", default_value_t = 900)]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in days (7 to 30)
    #[arg(long, env = "TOLLGATE_REFRESH_TTL_DAYS", default_value_t = 7,
        value_parser = clap::value_parser!(u64).range(7..=30))]
    pub refresh_ttl_days: u64,

    /// Whether renewing an access token also replaces the refresh token
    #[arg(long, env = "TOLLGATE_REFRESH_ROTATION", default_value = "never")]
    pub refresh_rotation: RotationPolicy,

    /// Trusted proxy header for the client IP (default: socket address)
    #[arg(long, env = "TOLLGATE_CLIENT_IP_HEADER")]
    pub client_ip_header: Option<ClientIpHeader>,

    /// Minutes between purges of expired and revoked sessions
    #[arg(long, env = "TOLLGATE_CLEANUP_INTERVAL_MINS", default_value_t = 60)]
    pub cleanup_interval_mins: u64,

    /// Login attempts allowed per IP per minute
    #[arg(long, env = "TOLLGATE_LOGIN_RATE", default_value_t = 10)]
    pub login_rate_per_minute: u32,

    /// Registrations allowed per IP per minute
    #[arg(long, env = "TOLLGATE_REGISTER_RATE", default_value_t = 3)]
    pub register_rate_per_minute: u32,

    /// Create (or promote) an admin user with this username on startup.
    /// The password is read from TOLLGATE_ADMIN_PASSWORD
    #[arg(long)]
    pub create_admin: Option<String>,

    /// Email for the admin created by --create-admin
    #[arg(long, requires = "create_admin")]
    pub admin_email: Option<String>,
}

/// Initialize logging based on the specified format.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build and validate the runtime settings from arguments.
pub fn build_settings(args: &Args) -> Option<ServerSettings> {
    let settings = ServerSettings {
        access_ttl: args.access_ttl_secs,
        refresh_ttl: args.refresh_ttl_days * 24 * 60 * 60,
        rotation: args.refresh_rotation,
        ip_extractor: args.client_ip_header.map(IpExtractor::from),
        cleanup_interval: Duration::from_secs(args.cleanup_interval_mins * 60),
        rate_limits: RateLimitSettings {
            login_per_minute: args.login_rate_per_minute,
            register_per_minute: args.register_rate_per_minute,
        },
    };

    match settings.validate() {
        Ok(()) => Some(settings),
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            None
        }
    }
}

/// Handle the --create-admin flag: create the admin, or promote an existing
/// user of that name.
pub async fn handle_create_admin(
    db: &Database,
    username: &str,
    email: Option<&str>,
) -> Result<(), String> {
    let hierarchy = db
        .roles()
        .load_hierarchy()
        .await
        .map_err(|e| format!("Failed to load roles: {e}"))?;
    let admin = hierarchy
        .by_name(roles::ADMIN)
        .ok_or_else(|| "Admin role is missing".to_string())?;
    let users = db.users();
    let now = SystemClock.now() as i64;

    if let Some(existing) = users
        .get_by_username(username)
        .await
        .map_err(|e| format!("Failed to look up user: {e}"))?
    {
        if existing.role_id != admin.id {
            users
                .set_role(existing.id, admin.id)
                .await
                .map_err(|e| format!("Failed to promote user: {e}"))?;
            let revoked = db
                .tokens()
                .revoke_all_for_user(existing.id, now)
                .await
                .map_err(|e| format!("Failed to revoke sessions: {e}"))?;
            info!(username = %existing.username, revoked, "Existing user promoted to admin");
        } else {
            info!(username = %existing.username, "Admin already exists");
        }
        return Ok(());
    }

    let password = std::env::var(ADMIN_PASSWORD_ENV)
        .map_err(|_| format!("{ADMIN_PASSWORD_ENV} must be set to create an admin"))?;
    // SAFETY: single-threaded startup, nothing else reads this variable.
    unsafe { std::env::remove_var(ADMIN_PASSWORD_ENV) };
    validate_password(&password).map_err(|e| e.to_string())?;

    let password_hash = hash_password(&password).map_err(|e| e.to_string())?;
    let email = match email {
        Some(email) => email.to_string(),
        None => {
            warn!("No --admin-email given, using a placeholder address");
            format!("{username}@localhost")
        }
    };
    let created = users
        .create(NewIdentity {
            username: username.to_string(),
            email,
            password_hash,
            role_id: admin.id,
            created_at: now,
        })
        .await
        .map_err(|e| format!("Failed to create admin user: {e}"))?;

    println!();
    println!("Admin user created: {}", created.username);
    println!();
    Ok(())
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewRefreshSession;

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let extractor = IpExtractor::from(ClientIpHeader::XForwardedFor);
        assert_eq!(
            extractor.extract("203.0.113.9, 10.0.0.1"),
            Ok("203.0.113.9".to_string())
        );
        assert!(extractor.extract("not-an-ip").is_err());
    }

    #[test]
    fn test_single_value_headers() {
        let extractor = IpExtractor::from(ClientIpHeader::CfConnectingIp);
        assert_eq!(extractor.header_name(), "cf-connecting-ip");
        assert_eq!(extractor.extract(" ::1 "), Ok("::1".to_string()));
        // Only X-Forwarded-For is a list
        assert!(
            IpExtractor::from(ClientIpHeader::XRealIp)
                .extract("1.2.3.4, 5.6.7.8")
                .is_err()
        );
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["tollgate"]).unwrap();
        assert_eq!(args.access_ttl_secs, 900);
        assert_eq!(args.refresh_ttl_days, 7);
        assert_eq!(args.refresh_rotation, RotationPolicy::Never);

        let settings = build_settings(&args).unwrap();
        assert_eq!(settings.refresh_ttl, 7 * 24 * 60 * 60);
        assert!(settings.ip_extractor.is_none());
    }

    #[test]
    fn test_refresh_ttl_bounds() {
        assert!(Args::try_parse_from(["tollgate", "--refresh-ttl-days", "6"]).is_err());
        assert!(Args::try_parse_from(["tollgate", "--refresh-ttl-days", "31"]).is_err());
        assert!(Args::try_parse_from(["tollgate", "--refresh-ttl-days", "30"]).is_ok());
    }

    #[tokio::test]
    async fn test_create_admin_promotes_existing_user() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db
            .users()
            .create(NewIdentity {
                username: "root".into(),
                email: "root@example.com".into(),
                password_hash: "x".into(),
                role_id: 1,
                created_at: 0,
            })
            .await
            .unwrap();
        let session = db
            .tokens()
            .create(NewRefreshSession {
                user_id: user.id,
                token_hash: "hash".into(),
                user_agent: None,
                ip_address: None,
                expires_at: i64::MAX,
                created_at: 0,
            })
            .await
            .unwrap();

        handle_create_admin(&db, "root", None).await.unwrap();

        let user = db.users().get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.role_id, 3);
        let session = db.tokens().get(session.id).await.unwrap().unwrap();
        assert!(session.is_revoked);
    }
}
