//! Inbound HTTP: liveness and the OAuth redirect target.

mod callback;

pub use callback::{CallbackError, CallbackQuery};

use crate::credentials::CredentialStore;
use crate::oauth::TokenManager;
use crate::platform::GuildDirectory;
use axum::{routing::get, Router};
use std::sync::Arc;

/// Shared application state for the gateway router
#[derive(Clone)]
pub struct GatewayAppState {
    pub tokens: Arc<TokenManager>,
    pub store: Arc<CredentialStore>,
    pub directory: Arc<dyn GuildDirectory>,
    /// Must match the redirect URI used to build the authorize link
    pub redirect_uri: String,
}

/// Create the gateway router
pub fn create_gateway_router(state: GatewayAppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/callback", get(callback::oauth_callback))
        .with_state(Arc::new(state))
}

/// GET /
async fn health() -> &'static str {
    "Bot is running!"
}
