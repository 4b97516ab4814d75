pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod error;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod roles;
pub mod server_config;
pub mod session;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use api::create_api_router;
use auth::AuthBackend;
use axum::Router;
use clock::{Clock, SystemClock};
use db::Database;
use jwt::JwtConfig;
use roles::RoleHierarchy;
use server_config::ServerSettings;
use session::SessionManager;
use store::{IdentityStore, SessionStore};
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Refresh session persistence
    pub sessions: Arc<dyn SessionStore>,
    /// User directory consulted at login, registration and explicit refresh
    pub identities: Arc<dyn IdentityStore>,
    /// Role hierarchy, loaded once at startup
    pub roles: RoleHierarchy,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    pub settings: ServerSettings,
    pub clock: Arc<dyn Clock>,
}

impl ServerConfig {
    /// Configuration backed by the SQLite database.
    pub async fn sqlite(
        db: &Database,
        jwt_secret: impl Into<Vec<u8>>,
        settings: ServerSettings,
    ) -> Result<Self, db::LoadRolesError> {
        let roles = db.roles().load_hierarchy().await?;
        Ok(Self {
            sessions: Arc::new(db.tokens()),
            identities: Arc::new(db.users()),
            roles,
            jwt_secret: jwt_secret.into(),
            settings,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the session manager shared by the router and the cleanup task.
    pub fn session_manager(&self) -> Arc<SessionManager> {
        let jwt = JwtConfig::new(&self.jwt_secret)
            .with_ttls(self.settings.access_ttl, self.settings.refresh_ttl)
            .with_clock(self.clock.clone());

        Arc::new(SessionManager::new(
            Arc::new(jwt),
            self.sessions.clone(),
            self.identities.clone(),
            Arc::new(self.roles.clone()),
            self.settings.rotation,
        ))
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    app_with_manager(config, config.session_manager())
}

fn app_with_manager(config: &ServerConfig, manager: Arc<SessionManager>) -> Router {
    let backend = AuthBackend::new(manager, Arc::new(config.settings.clone()));
    Router::new().nest("/api", create_api_router(backend))
}

/// Run cleanup once and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(
    manager: Arc<SessionManager>,
    settings: &ServerSettings,
) -> tokio::task::JoinHandle<()> {
    cleanup::run_cleanup(&manager).await;
    cleanup::spawn_cleanup_scheduler(manager, settings.cleanup_interval)
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Cleanup runs on startup and then periodically.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let manager = config.session_manager();
    let cleanup = init_cleanup(manager.clone(), &config.settings).await;

    let app = app_with_manager(&config, manager);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, make_service).await;

    cleanup.abort();
    result
}
