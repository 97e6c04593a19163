//! Adding authorized users to a guild with their stored OAuth grant.
//!
//! The `guilds.join` scope lets the bot add a user to any guild it is in
//! without further interaction, as long as the user's access token is live.

use crate::credentials::CredentialStore;
use crate::error::PlatformError;
use crate::oauth::TokenManager;
use crate::platform::GuildDirectory;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Refresh just-in-time when the token has this little life left.
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;

/// Lower bound on the pause between bulk join attempts.
pub const MIN_JOIN_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Added to the guild (201/204)
    Success,
    /// Already in the guild, either per the membership check or a 200
    AlreadyMember,
    /// User never authorized or was removed
    NoCredential,
    /// Token was about to expire and could not be renewed
    RefreshFailed,
    /// Add-member call answered with an unexpected status
    ApiError(u16),
    /// Add-member call got no response
    Unreachable,
    /// Credential store could not be read
    StoreError,
}

impl JoinOutcome {
    /// Interprets the add-member HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            201 | 204 => JoinOutcome::Success,
            200 => JoinOutcome::AlreadyMember,
            other => JoinOutcome::ApiError(other),
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, JoinOutcome::Success | JoinOutcome::AlreadyMember)
    }
}

impl fmt::Display for JoinOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinOutcome::Success => write!(f, "success"),
            JoinOutcome::AlreadyMember => write!(f, "already_member"),
            JoinOutcome::NoCredential => write!(f, "no_credential"),
            JoinOutcome::RefreshFailed => write!(f, "token_refresh_failed"),
            JoinOutcome::ApiError(status) => write!(f, "api_error_{}", status),
            JoinOutcome::Unreachable => write!(f, "api_unreachable"),
            JoinOutcome::StoreError => write!(f, "store_error"),
        }
    }
}

/// Aggregated result of a bulk join.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JoinSummary {
    pub success: usize,
    pub already_member: usize,
    pub failed: usize,
    /// `(user_id, outcome)` for every failure, in processing order
    pub failures: Vec<(String, JoinOutcome)>,
}

impl JoinSummary {
    pub fn record(&mut self, user_id: &str, outcome: JoinOutcome) {
        match outcome {
            JoinOutcome::Success => self.success += 1,
            JoinOutcome::AlreadyMember => self.already_member += 1,
            failure => {
                self.failed += 1;
                self.failures.push((user_id.to_string(), failure));
            }
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.already_member + self.failed
    }
}

pub struct JoinOrchestrator {
    store: Arc<CredentialStore>,
    tokens: Arc<TokenManager>,
    directory: Arc<dyn GuildDirectory>,
    refresh_margin: i64,
    delay: Duration,
}

impl JoinOrchestrator {
    pub fn new(
        store: Arc<CredentialStore>,
        tokens: Arc<TokenManager>,
        directory: Arc<dyn GuildDirectory>,
    ) -> Self {
        Self {
            store,
            tokens,
            directory,
            refresh_margin: DEFAULT_REFRESH_MARGIN_SECS,
            delay: MIN_JOIN_DELAY,
        }
    }

    pub fn with_refresh_margin(mut self, seconds: i64) -> Self {
        self.refresh_margin = seconds;
        self
    }

    /// Pause between bulk attempts; never below [`MIN_JOIN_DELAY`].
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay.max(MIN_JOIN_DELAY);
        self
    }

    pub fn directory(&self) -> &Arc<dyn GuildDirectory> {
        &self.directory
    }

    /// Adds one user to `guild_id`.
    pub async fn join_one(&self, guild_id: u64, user_id: &str) -> JoinOutcome {
        match self.directory.is_member(guild_id, user_id).await {
            Ok(true) => return JoinOutcome::AlreadyMember,
            Ok(false) => {}
            // The add-member call reports existing members with a 200 anyway
            Err(e) => warn!(guild_id, user_id = %user_id, error = %e, "Membership check failed, attempting join"),
        }

        let record = match self.store.get(user_id) {
            Ok(Some(record)) => record,
            Ok(None) => return JoinOutcome::NoCredential,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read credentials");
                return JoinOutcome::StoreError;
            }
        };

        let mut access_token = record.access_token.clone();
        if record.seconds_until_expiry(Utc::now().timestamp()) <= self.refresh_margin {
            match self.tokens.refresh(user_id, &record.refresh_token).await {
                Ok(fresh) => access_token = fresh,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Token refresh before join failed");
                    return JoinOutcome::RefreshFailed;
                }
            }
        }

        match self.directory.add_member(guild_id, user_id, &access_token).await {
            Ok(status) => JoinOutcome::from_status(status),
            Err(PlatformError::Transport(e)) => {
                warn!(guild_id, user_id = %user_id, error = %e, "Add-member request failed");
                JoinOutcome::Unreachable
            }
            Err(PlatformError::Forbidden(_)) => JoinOutcome::ApiError(403),
            Err(PlatformError::NotFound(_)) => JoinOutcome::ApiError(404),
            Err(PlatformError::Api { status, .. }) => JoinOutcome::ApiError(status),
        }
    }

    /// Joins `user_ids`, or every stored user when `None`.
    ///
    /// Users are processed one at a time with a fixed pause between
    /// attempts; every attempt makes at least the membership call. Individual
    /// failures are counted, never fatal; only failing to enumerate users is
    /// an error.
    pub async fn join_many(
        &self,
        guild_id: u64,
        user_ids: Option<Vec<String>>,
    ) -> Result<JoinSummary> {
        let targets = match user_ids {
            Some(ids) => ids,
            None => self
                .store
                .list_all()
                .context("Failed to list stored users")?
                .into_keys()
                .collect(),
        };

        info!(guild_id, users = targets.len(), "Starting bulk join");

        let mut summary = JoinSummary::default();
        let last = targets.len().saturating_sub(1);

        for (index, user_id) in targets.iter().enumerate() {
            let outcome = self.join_one(guild_id, user_id).await;

            if outcome.is_failure() {
                warn!(guild_id, user_id = %user_id, outcome = %outcome, "Join failed");
            }
            summary.record(user_id, outcome);

            if index < last {
                tokio::time::sleep(self.delay).await;
            }
        }

        info!(
            guild_id,
            success = summary.success,
            already_member = summary.already_member,
            failed = summary.failed,
            "Bulk join complete"
        );

        Ok(summary)
    }
}
