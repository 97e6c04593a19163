//! `GET /callback`: the provider redirect target.
//!
//! One request walks these steps in order and stops at the first failure:
//! 1. Provider denial or missing `code`/`state` → 400
//! 2. Decode `state` into the target role → 400, no provider call
//! 3. Exchange the code → 502 with the provider's text
//! 4. Fetch the token owner's profile → 502
//! 5. Upsert the credential record (client IP from `X-Forwarded-For` first)
//! 6. Grant the role → HTML success page, or 404/403 when it can't be done

use super::GatewayAppState;
use crate::credentials::CredentialRecord;
use crate::error::PlatformError;
use crate::oauth::{AuthState, UserProfile};
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub(crate) const SHARE_A_SERVER: &str =
    "Could not find the server, member, or role. Please make sure you share a server with the bot.";

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Verification complete</title>
    <style>
        body { font-family: sans-serif; text-align: center; margin-top: 50px; background-color: #2c2f33; color: #ffffff; }
        h1 { color: #43b581; }
    </style>
</head>
<body>
    <h1>Verification complete</h1>
    <p>You can close this tab and return to Discord.</p>
</body>
</html>
"#;

/// Terminal failures of the callback, rendered as plain text.
#[derive(Debug)]
pub enum CallbackError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            CallbackError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            CallbackError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            CallbackError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            CallbackError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            CallbackError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        (status, format!("Error: {}", message)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub(super) async fn oauth_callback(
    State(state): State<Arc<GatewayAppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(callback): Query<CallbackQuery>,
) -> Result<Html<&'static str>, CallbackError> {
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "Authorization denied by user or provider");
        return Err(CallbackError::BadRequest(format!(
            "Authorization failed: {} - {}",
            error, description
        )));
    }

    let (Some(code), Some(raw_state)) = (callback.code, callback.state) else {
        return Err(CallbackError::BadRequest("Missing code or state.".to_string()));
    };

    let target: AuthState = raw_state.parse().map_err(|e| {
        debug!(state = %raw_state, error = %e, "Rejecting callback with bad state");
        CallbackError::BadRequest(format!("Invalid state format ({})", e))
    })?;

    let bundle = state
        .tokens
        .exchange_code(&code, &state.redirect_uri)
        .await
        .map_err(|e| {
            error!(error = %e, "Token exchange failed");
            CallbackError::BadGateway(format!("Failed to exchange authorization code: {}", e))
        })?;

    let profile = state
        .tokens
        .fetch_profile(&bundle.access_token)
        .await
        .map_err(|e| {
            error!(error = %e, "Profile fetch failed");
            CallbackError::BadGateway(format!("Failed to fetch user profile: {}", e))
        })?;

    let record = CredentialRecord {
        user_id: profile.id.clone(),
        username: Some(profile.username.clone()),
        avatar_url: avatar_url(&state, &profile),
        ip_address: client_ip(&headers, peer.map(|ConnectInfo(addr)| addr)),
        access_token: bundle.access_token,
        refresh_token: bundle.refresh_token,
        expires_at: Utc::now().timestamp().saturating_add(bundle.expires_in),
    };

    state.store.upsert(&record.user_id, &record).map_err(|e| {
        error!(user_id = %record.user_id, error = %e, "Failed to store credentials");
        CallbackError::ServerError("Failed to save authorization. Please try again.".to_string())
    })?;

    info!(
        user_id = %record.user_id,
        expires_at = record.expires_at,
        "Authorization stored"
    );

    grant_role(&state, &record.user_id, target).await?;

    Ok(Html(SUCCESS_PAGE))
}

fn avatar_url(state: &GatewayAppState, profile: &UserProfile) -> Option<String> {
    profile
        .avatar
        .as_deref()
        .map(|hash| state.tokens.provider().avatar_url(&profile.id, hash))
}

/// First `X-Forwarded-For` entry when present (reverse proxy or tunnel),
/// otherwise the TCP peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(ip) => Some(ip.to_string()),
        None => peer.map(|addr| addr.ip().to_string()),
    }
}

/// Finds where to grant `target.role_id` and grants it.
///
/// With a guild in the state only that guild is considered. Without one,
/// every guild the bot is in is searched for one that has the role and
/// already contains the user.
async fn grant_role(
    state: &GatewayAppState,
    user_id: &str,
    target: AuthState,
) -> Result<(), CallbackError> {
    let guild_id = match target.guild_id {
        Some(guild_id) => {
            if !guild_has_member_and_role(state, guild_id, user_id, target.role_id).await {
                return Err(CallbackError::NotFound(SHARE_A_SERVER.to_string()));
            }
            guild_id
        }
        None => find_guild(state, user_id, target.role_id)
            .await?
            .ok_or_else(|| CallbackError::NotFound(SHARE_A_SERVER.to_string()))?,
    };

    match state
        .directory
        .grant_role(guild_id, user_id, target.role_id)
        .await
    {
        Ok(()) => {
            info!(guild_id, role_id = target.role_id, user_id = %user_id, "Role granted after authorization");
            Ok(())
        }
        Err(PlatformError::Forbidden(body)) => {
            warn!(guild_id, role_id = target.role_id, body = %body, "Role grant forbidden");
            Err(CallbackError::Forbidden(
                "The bot lacks permission to grant this role. Check its role position.".to_string(),
            ))
        }
        Err(PlatformError::NotFound(_)) => Err(CallbackError::NotFound(SHARE_A_SERVER.to_string())),
        Err(e) => {
            error!(guild_id, role_id = target.role_id, error = %e, "Role grant failed");
            Err(CallbackError::BadGateway(format!("Role grant error: {}", e)))
        }
    }
}

async fn guild_has_member_and_role(
    state: &GatewayAppState,
    guild_id: u64,
    user_id: &str,
    role_id: u64,
) -> bool {
    match state.directory.role(guild_id, role_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return false,
        Err(e) => {
            warn!(guild_id, role_id, error = %e, "Role lookup failed");
            return false;
        }
    }

    match state.directory.is_member(guild_id, user_id).await {
        Ok(member) => member,
        Err(e) => {
            warn!(guild_id, user_id = %user_id, error = %e, "Membership lookup failed");
            false
        }
    }
}

async fn find_guild(
    state: &GatewayAppState,
    user_id: &str,
    role_id: u64,
) -> Result<Option<u64>, CallbackError> {
    let guilds = state.directory.guild_ids().await.map_err(|e| {
        error!(error = %e, "Failed to list bot guilds");
        CallbackError::BadGateway(format!("Failed to list servers: {}", e))
    })?;

    for guild_id in guilds {
        if guild_has_member_and_role(state, guild_id, user_id, role_id).await {
            return Ok(Some(guild_id));
        }
    }

    Ok(None)
}
