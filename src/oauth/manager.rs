//! Token lifecycle: code exchange, refresh and the proactive refresh sweep.

use super::exchange::{self, TokenBundle, UserProfile};
use super::provider::ProviderConfig;
use crate::credentials::CredentialStore;
use crate::error::TokenError;
use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Refresh anything expiring within this many seconds (6 hours).
pub const DEFAULT_SWEEP_HORIZON_SECS: i64 = 21_600;

/// Per-call timeout for provider requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome counts for one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Records inspected
    pub checked: usize,
    /// Records inside the horizon
    pub due: usize,
    pub refreshed: usize,
    pub failed: usize,
}

/// Owns every interaction with the provider's token endpoint.
///
/// Refreshes for the same user are serialized: the refresh token is
/// single-use on rotation, so two concurrent refreshes would otherwise
/// race and the loser would see `invalid_grant`.
pub struct TokenManager {
    http: reqwest::Client,
    provider: ProviderConfig,
    store: Arc<CredentialStore>,
    sweep_horizon: i64,
    refresh_guards: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenManager {
    pub fn new(
        provider: ProviderConfig,
        store: Arc<CredentialStore>,
        http_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            provider,
            store,
            sweep_horizon: DEFAULT_SWEEP_HORIZON_SECS,
            refresh_guards: DashMap::new(),
        })
    }

    pub fn with_sweep_horizon(mut self, seconds: i64) -> Self {
        self.sweep_horizon = seconds;
        self
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Trades an authorization code for tokens. Does not touch the store.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenBundle, TokenError> {
        exchange::exchange_code_for_token(&self.http, &self.provider, code, redirect_uri).await
    }

    /// Profile of the user owning `access_token`.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, TokenError> {
        exchange::fetch_current_user(&self.http, &self.provider, access_token).await
    }

    /// Refreshes `user_id`'s grant and persists the new tokens.
    ///
    /// Display metadata and IP are preserved; only the token fields and
    /// `expires_at` change. On any failure the stored record is left as it
    /// was so the next sweep or join can retry.
    pub async fn refresh(&self, user_id: &str, refresh_token: &str) -> Result<String, TokenError> {
        let guard = self
            .refresh_guards
            .entry(user_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _held = guard.lock().await;
            self.refresh_locked(user_id, refresh_token).await
        };

        // Last one out removes the guard; a waiter still holds a clone.
        drop(guard);
        self.refresh_guards
            .remove_if(user_id, |_, guard| Arc::strong_count(guard) == 1);

        result
    }

    async fn refresh_locked(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> Result<String, TokenError> {
        let current = self
            .store
            .get(user_id)
            .map_err(TokenError::store)?
            .ok_or_else(|| TokenError::NoCredential(user_id.to_string()))?;

        // Another task rotated the grant while we waited on the guard.
        if current.refresh_token != refresh_token
            && current.seconds_until_expiry(Utc::now().timestamp()) > 0
        {
            debug!(user_id = %user_id, "Refresh token already rotated, using stored token");
            return Ok(current.access_token);
        }

        info!(user_id = %user_id, "Refreshing OAuth token");

        // The stored grant is authoritative; the caller's copy may be stale.
        let response = exchange::request_token(
            &self.http,
            &self.provider,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
            ],
        )
        .await?;

        let expires_in = response
            .expires_in
            .ok_or_else(|| TokenError::Decode("refresh response has no expires_in".to_string()))?;

        // Re-read: a callback may have replaced or an admin removed the record
        // during the provider call. Removal is terminal, so don't resurrect it.
        let mut record = self
            .store
            .get(user_id)
            .map_err(TokenError::store)?
            .ok_or_else(|| TokenError::NoCredential(user_id.to_string()))?;

        record.access_token = response.access_token;
        // Keep the existing refresh token if the provider did not rotate it
        if let Some(rotated) = response.refresh_token {
            record.refresh_token = rotated;
        }
        record.expires_at = Utc::now().timestamp().saturating_add(expires_in);

        self.store
            .upsert(user_id, &record)
            .map_err(TokenError::store)?;

        info!(user_id = %user_id, expires_at = record.expires_at, "OAuth token refreshed");

        Ok(record.access_token)
    }

    /// One pass over every stored record, refreshing those expiring within
    /// the sweep horizon.
    ///
    /// Works from a snapshot and holds no lock across users; a failure for
    /// one user is logged and counted, never propagated.
    pub async fn sweep(&self) -> Result<SweepReport, TokenError> {
        let records = self.store.list_all().map_err(TokenError::store)?;
        let now = Utc::now().timestamp();

        let mut report = SweepReport {
            checked: records.len(),
            ..SweepReport::default()
        };

        for (user_id, record) in records {
            if record.seconds_until_expiry(now) >= self.sweep_horizon {
                continue;
            }
            report.due += 1;

            match self.refresh(&user_id, &record.refresh_token).await {
                Ok(_) => report.refreshed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(user_id = %user_id, error = %e, "Token refresh failed, will retry next cycle");
                }
            }
        }

        Ok(report)
    }
}
