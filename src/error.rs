//! Error types shared by the token lifecycle and platform seams.
//!
//! Storage and process wiring use `anyhow`; these enums exist where a caller
//! has to branch on the failure kind (refresh vs. provider rejection, missing
//! permission vs. missing member, ...).

use thiserror::Error;

/// Failures talking to the identity provider's token and profile endpoints.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Request never produced a response (DNS, connect, timeout).
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-success status. `body` is the raw
    /// response text, kept unparsed for diagnostics.
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    /// Provider answered 2xx but the payload was unusable.
    #[error("unexpected provider response: {0}")]
    Decode(String),

    /// No credential record exists for the user (never authorized or removed).
    #[error("no stored credential for user {0}")]
    NoCredential(String),

    #[error("credential store error: {0}")]
    Store(String),
}

impl TokenError {
    pub(crate) fn store(err: anyhow::Error) -> Self {
        TokenError::Store(format!("{:#}", err))
    }
}

/// Failures talking to the chat platform's REST API.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The bot lacks permission (role hierarchy, missing scope, ...).
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("platform returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("platform request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
