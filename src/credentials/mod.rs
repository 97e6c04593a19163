//! Per-user OAuth credential storage.
//!
//! Holds one [`CredentialRecord`] per authorized user plus the set of bot
//! admins, backed by SQLite.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                    │
//! │  - upsert / get / list_all / remove      │
//! │  - admin allowlist                       │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (serialize,          (deserialize,
//!     encrypt?)            decrypt?)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite Database                    │
//! │  users(user_id TEXT PK, data TEXT)       │
//! │  admins(user_id TEXT PK)                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use guildgate::credentials::{CredentialRecord, CredentialStore, StoreOptions};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = CredentialStore::open(&StoreOptions::local("guildgate.db"))?;
//!
//! let record = CredentialRecord {
//!     user_id: "42".to_string(),
//!     username: Some("alice".to_string()),
//!     avatar_url: None,
//!     ip_address: Some("203.0.113.7".to_string()),
//!     access_token: "access".to_string(),
//!     refresh_token: "refresh".to_string(),
//!     expires_at: chrono::Utc::now().timestamp() + 604_800,
//! };
//! store.upsert("42", &record)?;
//!
//! if let Some(found) = store.get("42")? {
//!     println!("token expires at {}", found.expires_at);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - When an encryption key is configured, the serialized record is sealed
//!   with AES-256-GCM before it reaches the `data` column
//! - Access tokens are only ever displayed through [`CredentialRecord::masked_access_token`]

use serde::{Deserialize, Deserializer, Serialize};

mod encryption;
mod storage;

pub use storage::{CredentialStore, StoreOptions};

pub use encryption::{decrypt, encrypt, is_sealed, validate_key};

/// Number of leading access-token characters shown in masked form.
const MASK_VISIBLE_CHARS: usize = 15;

/// Stored OAuth grant for one user.
///
/// A record is either absent or fully populated: both tokens and the
/// expiry are always present. Display metadata is best-effort and is
/// overwritten on every re-authorization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Platform user id. Kept as a string; snowflakes overflow some
    /// consumers' integer types.
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub avatar_url: Option<String>,

    /// Client IP at authorization time (audit only)
    #[serde(default)]
    pub ip_address: Option<String>,

    pub access_token: String,

    pub refresh_token: String,

    /// Unix timestamp (seconds) at which `access_token` stops working
    #[serde(deserialize_with = "epoch_seconds")]
    pub expires_at: i64,
}

impl CredentialRecord {
    /// Seconds left before the access token expires (negative once expired).
    pub fn seconds_until_expiry(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    /// Access token in the only form that may be shown to humans.
    pub fn masked_access_token(&self) -> String {
        if self.access_token.is_empty() {
            return "None".to_string();
        }
        let visible: String = self.access_token.chars().take(MASK_VISIBLE_CHARS).collect();
        format!("||{}...||", visible)
    }
}

/// Rows written by the earlier bot stored the id as a JSON number.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Accepts integer or fractional epoch seconds; fractions are truncated.
fn epoch_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Epoch {
        Whole(i64),
        Fractional(f64),
    }

    Ok(match Epoch::deserialize(deserializer)? {
        Epoch::Whole(n) => n,
        Epoch::Fractional(f) => f as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: &str) -> CredentialRecord {
        CredentialRecord {
            user_id: "42".to_string(),
            username: Some("alice".to_string()),
            avatar_url: None,
            ip_address: None,
            access_token: token.to_string(),
            refresh_token: "r".to_string(),
            expires_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_masked_access_token_truncates() {
        let rec = record("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(rec.masked_access_token(), "||abcdefghijklmno...||");
    }

    #[test]
    fn test_masked_access_token_short_and_empty() {
        assert_eq!(record("abc").masked_access_token(), "||abc...||");
        assert_eq!(record("").masked_access_token(), "None");
    }

    #[test]
    fn test_legacy_row_with_numeric_id_and_float_expiry() {
        let json = r#"{
            "user_id": 123456789012345678,
            "username": "bob",
            "avatar_url": null,
            "ip_address": "10.0.0.1",
            "access_token": "a",
            "refresh_token": "r",
            "expires_at": 1700000000.75
        }"#;

        let rec: CredentialRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.user_id, "123456789012345678");
        assert_eq!(rec.expires_at, 1_700_000_000);
        assert_eq!(rec.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_missing_refresh_token_is_rejected() {
        let json = r#"{"user_id": "1", "access_token": "a", "expires_at": 1}"#;
        assert!(serde_json::from_str::<CredentialRecord>(json).is_err());
    }

    #[test]
    fn test_seconds_until_expiry() {
        let rec = record("a");
        assert_eq!(rec.seconds_until_expiry(1_700_000_000 - 60), 60);
        assert!(rec.seconds_until_expiry(1_700_000_100) < 0);
    }
}
