//! Chat platform seam.
//!
//! Everything the gateway needs from the platform (membership checks,
//! role lookup and grant, add-member-with-token) goes through
//! [`GuildDirectory`], so the join and callback logic can run against the
//! REST client in production and an in-memory double in tests.

mod discord;
#[cfg(test)]
pub(crate) mod fake;

pub use discord::DiscordApi;

use crate::error::PlatformError;
use async_trait::async_trait;

/// A role in a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: u64,
    pub name: String,
}

#[async_trait]
pub trait GuildDirectory: Send + Sync {
    /// Guilds the bot is a member of.
    async fn guild_ids(&self) -> Result<Vec<u64>, PlatformError>;

    /// The role, or `None` if the guild has no such role.
    async fn role(&self, guild_id: u64, role_id: u64) -> Result<Option<Role>, PlatformError>;

    async fn is_member(&self, guild_id: u64, user_id: &str) -> Result<bool, PlatformError>;

    async fn grant_role(
        &self,
        guild_id: u64,
        user_id: &str,
        role_id: u64,
    ) -> Result<(), PlatformError>;

    /// Adds the user to the guild using their OAuth access token.
    ///
    /// Returns the raw HTTP status of the add-member call; interpreting it is
    /// the caller's job. `Err` means no response was received.
    async fn add_member(
        &self,
        guild_id: u64,
        user_id: &str,
        access_token: &str,
    ) -> Result<u16, PlatformError>;
}

/// Parses a platform id: ASCII digits only, non-zero, fits in `u64`.
pub fn parse_snowflake(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u64>().ok().filter(|id| *id != 0)
}
