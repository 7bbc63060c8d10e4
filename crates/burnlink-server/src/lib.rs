pub mod accounts;
pub mod api;
pub mod auth;
pub mod dirs;
pub mod handlers;
pub mod server;
pub mod store;

use std::sync::Arc;

/// Upload limits enforced at the HTTP boundary.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_ciphertext_bytes: usize,
    pub max_ttl_seconds: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_ciphertext_bytes: 16 * 1024 * 1024,
            max_ttl_seconds: 7 * 86_400,
        }
    }
}

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn store::SecretStore>,
    pub accounts: Arc<dyn accounts::Authenticator>,
    /// Clock used for `server_time` in responses; should match the store's.
    pub clock: Arc<dyn store::Clock>,
    /// Bearer key for operator endpoints. Those endpoints are closed when unset.
    pub admin_key: Option<String>,
    /// Require an account session to upload.
    pub require_login: bool,
    pub limits: Limits,
}

impl AppState {
    /// State with an open upload policy and default limits.
    pub fn new(store: Arc<dyn store::SecretStore>, clock: Arc<dyn store::Clock>) -> Self {
        Self {
            store,
            accounts: Arc::new(accounts::MemoryAuthenticator::new()),
            clock,
            admin_key: None,
            require_login: false,
            limits: Limits::default(),
        }
    }
}

pub use server::{build_router, run, serve, Backend, ServerConfig};
