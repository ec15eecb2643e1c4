use std::sync::Arc;
use vidscope_core::{Config, SessionContext};

/// Shared application state
pub struct AppState {
    config: Config,
    sessions: Arc<SessionContext>,
}

impl AppState {
    pub fn new(config: Config, sessions: Arc<SessionContext>) -> Self {
        Self { config, sessions }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Collaborators shared by every WebSocket session.
    pub fn sessions(&self) -> Arc<SessionContext> {
        Arc::clone(&self.sessions)
    }
}
