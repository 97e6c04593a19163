//! The opaque `state` value carried through the provider redirect.
//!
//! Nothing is stored server-side: the browser hands the value back on the
//! callback and it is decoded here. Two forms are accepted:
//!
//! - `<role_id>`: role only; the callback searches every guild the bot is in
//! - `<guild_id>:<role_id>`: role pinned to one guild
//!
//! Panels always emit the second form so that a role id shared by two guilds
//! can't be granted in the wrong one.

use crate::platform::parse_snowflake;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("state is empty")]
    Empty,
    #[error("invalid state format: {0:?}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthState {
    pub guild_id: Option<u64>,
    pub role_id: u64,
}

impl AuthState {
    pub fn for_role(role_id: u64) -> Self {
        Self {
            guild_id: None,
            role_id,
        }
    }

    pub fn in_guild(guild_id: u64, role_id: u64) -> Self {
        Self {
            guild_id: Some(guild_id),
            role_id,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.guild_id {
            Some(guild_id) => write!(f, "{}:{}", guild_id, self.role_id),
            None => write!(f, "{}", self.role_id),
        }
    }
}

impl FromStr for AuthState {
    type Err = StateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StateError::Empty);
        }

        let malformed = || StateError::Malformed(raw.to_string());

        match raw.split_once(':') {
            None => parse_snowflake(raw).map(Self::for_role).ok_or_else(malformed),
            Some((guild, role)) => {
                let guild_id = parse_snowflake(guild).ok_or_else(malformed)?;
                let role_id = parse_snowflake(role).ok_or_else(malformed)?;
                Ok(Self::in_guild(guild_id, role_id))
            }
        }
    }
}
