pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod membership;
pub mod routes;

use std::sync::Arc;

use auth::TokenStore;
use config::Config;
use gateway::Gateway;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<dyn TokenStore>,
    pub gateway: Arc<Gateway>,
}
