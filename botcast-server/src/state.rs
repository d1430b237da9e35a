//! Application state shared across all request handlers.

use crate::config::runtime::AdminConfig;
use botcast_core::bot::BotService;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Bot administration on top of the registry.
    pub bots: Arc<BotService>,
    /// Admin credentials (can be reloaded via SIGHUP).
    pub admin: Arc<RwLock<AdminConfig>>,
}

impl AppState {
    pub fn new(bots: Arc<BotService>, admin: AdminConfig) -> Self {
        Self {
            bots,
            admin: Arc::new(RwLock::new(admin)),
        }
    }

    /// Replace the admin credentials (used during SIGHUP reload).
    pub async fn update_admin(&self, admin: AdminConfig) {
        *self.admin.write().await = admin;
    }
}
