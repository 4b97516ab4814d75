//! Authentication state shared by the middleware and extractors.

use std::sync::Arc;

use crate::roles::RoleHierarchy;
use crate::server_config::ServerSettings;
use crate::session::SessionManager;

/// What the gatekeeper needs: the session manager and the settings.
#[derive(Clone)]
pub struct AuthBackend {
    pub manager: Arc<SessionManager>,
    pub settings: Arc<ServerSettings>,
}

impl AuthBackend {
    pub fn new(manager: Arc<SessionManager>, settings: Arc<ServerSettings>) -> Self {
        Self { manager, settings }
    }
}

/// Trait for state types that can authorize requests.
pub trait HasAuthBackend {
    fn manager(&self) -> &SessionManager;
    fn settings(&self) -> &ServerSettings;

    fn roles(&self) -> &RoleHierarchy {
        self.manager().roles()
    }
}

impl HasAuthBackend for AuthBackend {
    fn manager(&self) -> &SessionManager {
        &self.manager
    }
    fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}
