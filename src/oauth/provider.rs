//! Identity provider endpoints and client credentials.

use std::fmt;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
pub const DEFAULT_CDN_BASE: &str = "https://cdn.discordapp.com";

/// `identify` for the profile fetch, `guilds.join` for adding the user to
/// servers later without asking again.
pub const DEFAULT_SCOPES: [&str; 2] = ["identify", "guilds.join"];

/// OAuth provider configuration
#[derive(Clone)]
pub struct ProviderConfig {
    /// REST base; token and profile endpoints hang off it
    pub api_base: String,

    /// Browser-facing authorization endpoint
    pub authorize_url: String,

    /// Avatar image host
    pub cdn_base: String,

    pub scopes: Vec<String>,

    pub client_id: String,

    pub client_secret: String,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_base", &self.api_base)
            .field("authorize_url", &self.authorize_url)
            .field("scopes", &self.scopes)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl ProviderConfig {
    pub fn discord(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            cdn_base: DEFAULT_CDN_BASE.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_authorize_url(mut self, authorize_url: impl Into<String>) -> Self {
        self.authorize_url = authorize_url.into();
        self
    }

    /// `POST` target for both the `authorization_code` and `refresh_token` grants
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.api_base.trim_end_matches('/'))
    }

    /// `GET` target returning the token owner's profile
    pub fn current_user_url(&self) -> String {
        format!("{}/users/@me", self.api_base.trim_end_matches('/'))
    }

    /// Build authorization URL with state and redirect_uri
    pub fn build_auth_url(&self, state: &str, redirect_uri: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    /// Avatar image URL for a user's avatar hash
    pub fn avatar_url(&self, user_id: &str, avatar_hash: &str) -> String {
        format!(
            "{}/avatars/{}/{}.png",
            self.cdn_base.trim_end_matches('/'),
            user_id,
            avatar_hash
        )
    }
}
