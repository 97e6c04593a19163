//! Provider token endpoint and profile calls.
//!
//! Handles the `authorization_code` and `refresh_token` grants and the
//! current-user lookup that follows a code exchange.

use super::provider::ProviderConfig;
use crate::error::TokenError;
use serde::Deserialize;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Tokens granted by a successful code exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of `access_token` in seconds, relative to the exchange
    pub expires_in: i64,
}

impl TryFrom<TokenResponse> for TokenBundle {
    type Error = TokenError;

    fn try_from(response: TokenResponse) -> Result<Self, Self::Error> {
        let refresh_token = response
            .refresh_token
            .ok_or_else(|| TokenError::Decode("token response has no refresh_token".to_string()))?;
        let expires_in = response
            .expires_in
            .ok_or_else(|| TokenError::Decode("token response has no expires_in".to_string()))?;

        Ok(TokenBundle {
            access_token: response.access_token,
            refresh_token,
            expires_in,
        })
    }
}

/// Profile returned by the provider's current-user endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    /// Avatar hash, not a URL
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Posts a form-encoded grant to the token endpoint.
///
/// Non-success statuses come back as [`TokenError::Provider`] carrying the
/// raw body.
pub(crate) async fn request_token(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    grant: &[(&str, &str)],
) -> Result<TokenResponse, TokenError> {
    let mut form: Vec<(&str, &str)> = vec![
        ("client_id", provider.client_id.as_str()),
        ("client_secret", provider.client_secret.as_str()),
    ];
    form.extend_from_slice(grant);

    let token_url = provider.token_url();
    tracing::debug!("Requesting token at {}", token_url);

    let response = client
        .post(&token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(TokenError::Provider { status, body });
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| TokenError::Decode(format!("failed to parse token response: {}", e)))
}

/// Exchange authorization code for access token
pub(crate) async fn exchange_code_for_token(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenBundle, TokenError> {
    let response = request_token(
        client,
        provider,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ],
    )
    .await?;

    tracing::debug!(
        "Token exchange successful, has_refresh_token={}, expires_in={:?}",
        response.refresh_token.is_some(),
        response.expires_in
    );

    TokenBundle::try_from(response)
}

/// Fetches the profile of the user who owns `access_token`.
pub(crate) async fn fetch_current_user(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    access_token: &str,
) -> Result<UserProfile, TokenError> {
    let response = client
        .get(provider.current_user_url())
        .bearer_auth(access_token)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(TokenError::Provider { status, body });
    }

    response
        .json::<UserProfile>()
        .await
        .map_err(|e| TokenError::Decode(format!("failed to parse user profile: {}", e)))
}
