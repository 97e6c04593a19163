// Shared fixtures for the integration tests. One mockito server plays both
// the identity provider and the platform REST API.

#![allow(dead_code)]

use guildgate::api::{create_gateway_router, GatewayAppState};
use guildgate::credentials::{CredentialRecord, CredentialStore, StoreOptions};
use guildgate::oauth::{ProviderConfig, TokenManager, DEFAULT_HTTP_TIMEOUT};
use guildgate::platform::{DiscordApi, GuildDirectory};
use axum::Router;
use std::sync::Arc;

pub const REDIRECT_URI: &str = "http://localhost:8080/callback";

pub struct TestGateway {
    pub store: Arc<CredentialStore>,
    pub tokens: Arc<TokenManager>,
    pub directory: Arc<dyn GuildDirectory>,
}

impl TestGateway {
    pub fn new(api_base: &str) -> Self {
        let store = Arc::new(CredentialStore::open(&StoreOptions::in_memory()).unwrap());
        let provider = ProviderConfig::discord("cid", "secret").with_api_base(api_base);
        let tokens = Arc::new(
            TokenManager::new(provider, Arc::clone(&store), DEFAULT_HTTP_TIMEOUT).unwrap(),
        );
        let directory: Arc<dyn GuildDirectory> =
            Arc::new(DiscordApi::new(api_base, "bot-token", DEFAULT_HTTP_TIMEOUT).unwrap());

        Self {
            store,
            tokens,
            directory,
        }
    }

    pub fn router(&self) -> Router {
        create_gateway_router(GatewayAppState {
            tokens: Arc::clone(&self.tokens),
            store: Arc::clone(&self.store),
            directory: Arc::clone(&self.directory),
            redirect_uri: REDIRECT_URI.to_string(),
        })
    }
}

pub fn record(user_id: &str, expires_in: i64) -> CredentialRecord {
    CredentialRecord {
        user_id: user_id.to_string(),
        username: Some(format!("user-{}", user_id)),
        avatar_url: None,
        ip_address: Some("198.51.100.1".to_string()),
        access_token: format!("access-{}", user_id),
        refresh_token: format!("refresh-{}", user_id),
        expires_at: chrono::Utc::now().timestamp() + expires_in,
    }
}
