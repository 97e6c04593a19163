use crate::credentials::StoreOptions;
use crate::oauth::{ProviderConfig, DEFAULT_API_BASE, DEFAULT_AUTHORIZE_URL};
use crate::platform::parse_snowflake;
use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::path::PathBuf;

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";
const DEFAULT_DATABASE_URL: &str = "guildgate.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Process configuration sourced from `GUILDGATE_*` environment variables.
///
/// Validated once at startup; a missing required variable is a fatal error.
#[derive(Clone)]
pub struct GatewayConfig {
    pub client_id: String,
    pub client_secret: String,
    pub bot_token: String,
    pub redirect_uri: String,
    /// Always privileged, never removable
    pub root_admin_id: Option<String>,
    pub database_url: String,
    pub database_auth_token: Option<String>,
    pub encryption_key: Option<String>,
    pub api_base: String,
    pub authorize_url: String,
    pub bind_addr: String,
    pub port: u16,
    /// Optional TOML tuning file
    pub tuning_path: Option<PathBuf>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| anyhow!("{} must be set", key));

        let root_admin_id = match get("GUILDGATE_ROOT_ADMIN_ID") {
            Some(id) if parse_snowflake(&id).is_some() => Some(id),
            Some(id) => bail!("GUILDGATE_ROOT_ADMIN_ID must be a numeric user id, got {:?}", id),
            None => None,
        };

        let port = match get("GUILDGATE_PORT").or_else(|| get("PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid port {:?}", raw))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            client_id: require("GUILDGATE_CLIENT_ID")?,
            client_secret: require("GUILDGATE_CLIENT_SECRET")?,
            bot_token: require("GUILDGATE_BOT_TOKEN")?,
            redirect_uri: get("GUILDGATE_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            root_admin_id,
            database_url: get("GUILDGATE_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            database_auth_token: get("GUILDGATE_DATABASE_AUTH_TOKEN"),
            encryption_key: get("GUILDGATE_ENCRYPTION_KEY"),
            api_base: get("GUILDGATE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            authorize_url: get("GUILDGATE_AUTHORIZE_URL")
                .unwrap_or_else(|| DEFAULT_AUTHORIZE_URL.to_string()),
            bind_addr: get("GUILDGATE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port,
            tuning_path: get("GUILDGATE_CONFIG").map(PathBuf::from),
        })
    }

    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig::discord(&self.client_id, &self.client_secret)
            .with_api_base(&self.api_base)
            .with_authorize_url(&self.authorize_url)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            url: self.database_url.clone(),
            auth_token: self.database_auth_token.clone(),
            encryption_key: self.encryption_key.clone(),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("bot_token", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("root_admin_id", &self.root_admin_id)
            .field("database_url", &self.database_url)
            .field("database_auth_token", &self.database_auth_token.as_ref().map(|_| "<redacted>"))
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("authorize_url", &self.authorize_url)
            .field("listen_addr", &self.listen_addr())
            .field("tuning_path", &self.tuning_path)
            .finish()
    }
}
