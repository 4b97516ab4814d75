//! Scheduled cleanup of expired and revoked sessions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::session::SessionManager;

/// Run the cleanup once. Returns the number of session rows removed.
pub async fn run_cleanup(manager: &SessionManager) -> u64 {
    match manager.cleanup().await {
        Ok(count) => {
            if count > 0 {
                info!("Cleaned up {} expired or revoked sessions", count);
            }
            count
        }
        Err(e) => {
            error!("Failed to clean up sessions: {}", e);
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    manager: Arc<SessionManager>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            run_cleanup(&manager).await;
        }
    })
}
