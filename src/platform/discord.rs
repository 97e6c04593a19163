//! [`GuildDirectory`] over the Discord REST API, authenticated as the bot.

use super::{parse_snowflake, GuildDirectory, Role};
use crate::error::PlatformError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Page size for `GET /users/@me/guilds` (the API maximum).
const GUILD_PAGE_LIMIT: usize = 200;

const AUDIT_LOG_REASON: &str = "guildgate OAuth verification";

#[derive(Deserialize)]
struct PartialGuild {
    id: String,
}

#[derive(Deserialize)]
struct RoleDto {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct AddMemberBody<'a> {
    access_token: &'a str,
}

pub struct DiscordApi {
    http: reqwest::Client,
    api_base: String,
    authorization: HeaderValue,
}

impl DiscordApi {
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> Result<Self> {
        let mut authorization = HeaderValue::from_str(&format!("Bot {}", bot_token))
            .context("Bot token contains invalid header characters")?;
        authorization.set_sensitive(true);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, self.authorization.clone())
    }
}

/// Maps non-success statuses onto [`PlatformError`], consuming the body.
async fn check(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::FORBIDDEN => PlatformError::Forbidden(body),
        StatusCode::NOT_FOUND => PlatformError::NotFound(body),
        _ => PlatformError::Api {
            status: status.as_u16(),
            body,
        },
    })
}

fn decode_error(what: &str, e: reqwest::Error) -> PlatformError {
    PlatformError::Api {
        status: 200,
        body: format!("failed to parse {}: {}", what, e),
    }
}

#[async_trait]
impl GuildDirectory for DiscordApi {
    async fn guild_ids(&self) -> Result<Vec<u64>, PlatformError> {
        let mut ids = Vec::new();
        let mut after: Option<u64> = None;

        loop {
            let mut query = vec![("limit", GUILD_PAGE_LIMIT.to_string())];
            if let Some(after) = after {
                query.push(("after", after.to_string()));
            }

            let response = self
                .authed(self.http.get(self.url("/users/@me/guilds")))
                .query(&query)
                .send()
                .await?;
            let page: Vec<PartialGuild> = check(response)
                .await?
                .json()
                .await
                .map_err(|e| decode_error("guild list", e))?;

            let page_len = page.len();
            ids.extend(page.iter().filter_map(|g| parse_snowflake(&g.id)));

            match ids.last() {
                Some(last) if page_len == GUILD_PAGE_LIMIT => after = Some(*last),
                _ => break,
            }
        }

        debug!(guilds = ids.len(), "Listed bot guilds");
        Ok(ids)
    }

    async fn role(&self, guild_id: u64, role_id: u64) -> Result<Option<Role>, PlatformError> {
        let response = self
            .authed(self.http.get(self.url(&format!("/guilds/{}/roles", guild_id))))
            .send()
            .await?;

        let roles: Vec<RoleDto> = match check(response).await {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| decode_error("role list", e))?,
            Err(PlatformError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let wanted = role_id.to_string();
        Ok(roles
            .into_iter()
            .find(|r| r.id == wanted)
            .map(|r| Role {
                id: role_id,
                name: r.name,
            }))
    }

    async fn is_member(&self, guild_id: u64, user_id: &str) -> Result<bool, PlatformError> {
        let response = self
            .authed(
                self.http
                    .get(self.url(&format!("/guilds/{}/members/{}", guild_id, user_id))),
            )
            .send()
            .await?;

        match check(response).await {
            Ok(_) => Ok(true),
            Err(PlatformError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn grant_role(
        &self,
        guild_id: u64,
        user_id: &str,
        role_id: u64,
    ) -> Result<(), PlatformError> {
        let path = format!("/guilds/{}/members/{}/roles/{}", guild_id, user_id, role_id);
        let response = self
            .authed(self.http.put(self.url(&path)))
            .header(CONTENT_LENGTH, 0)
            .header("X-Audit-Log-Reason", AUDIT_LOG_REASON)
            .send()
            .await?;

        check(response).await.map(|_| ())
    }

    async fn add_member(
        &self,
        guild_id: u64,
        user_id: &str,
        access_token: &str,
    ) -> Result<u16, PlatformError> {
        let path = format!("/guilds/{}/members/{}", guild_id, user_id);
        let response = self
            .authed(self.http.put(self.url(&path)))
            .json(&AddMemberBody { access_token })
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!(guild_id, user_id = %user_id, status, "Add-member call returned");
        Ok(status)
    }
}
