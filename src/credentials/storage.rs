//! SQLite-backed credential and admin storage.
//!
//! Records are stored as one serialized [`CredentialRecord`] per user,
//! optionally sealed with AES-256-GCM.

use super::{encryption, CredentialRecord};
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// How to open a [`CredentialStore`].
#[derive(Clone, Debug, Default)]
pub struct StoreOptions {
    /// Path, `file:`/`sqlite:` URL, or `:memory:`
    pub url: String,
    /// Auth token for hosted stores. Only local SQLite is supported, so this
    /// is accepted and ignored.
    pub auth_token: Option<String>,
    /// Base64 32-byte key. When set, new writes are encrypted at rest.
    pub encryption_key: Option<String>,
}

impl StoreOptions {
    pub fn local(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::local(":memory:")
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }
}

enum Location {
    Memory,
    File(PathBuf),
}

fn resolve_location(url: &str) -> Result<Location> {
    let url = url.trim();
    if url.is_empty() {
        bail!("Database URL is empty");
    }
    if url == ":memory:" || url == "sqlite::memory:" {
        return Ok(Location::Memory);
    }

    for prefix in ["sqlite://", "sqlite:", "file://", "file:"] {
        if let Some(path) = url.strip_prefix(prefix) {
            return Ok(Location::File(PathBuf::from(path)));
        }
    }

    if let Some((scheme, _)) = url.split_once("://") {
        bail!(
            "Unsupported database scheme '{}': only local SQLite files are supported",
            scheme
        );
    }

    Ok(Location::File(PathBuf::from(url)))
}

/// Durable store of per-user OAuth credentials and the bot admin allowlist.
///
/// # Schema
/// ```sql
/// CREATE TABLE users  (user_id TEXT PRIMARY KEY, data TEXT);
/// CREATE TABLE admins (user_id TEXT PRIMARY KEY);
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in a Mutex; every operation is a single statement
///   under the lock, so callers never observe a half-written record
/// - Upserts are full-record replaces: concurrent writers resolve
///   last-writer-wins
pub struct CredentialStore {
    conn: Mutex<Connection>,
    encryption_key: Option<Vec<u8>>,
}

impl CredentialStore {
    /// Opens (or creates) the store and ensures the schema exists.
    pub fn open(options: &StoreOptions) -> Result<Self> {
        let encryption_key = options
            .encryption_key
            .as_deref()
            .map(encryption::validate_key)
            .transpose()
            .context("Invalid encryption key")?;

        let conn = match resolve_location(&options.url)? {
            Location::Memory => {
                Connection::open_in_memory().context("Failed to open in-memory database")?
            }
            Location::File(path) => Connection::open(&path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?,
        };

        if options.auth_token.is_some() {
            warn!("Database auth token is set but the store is a local file; ignoring it");
        }

        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        let store = Self {
            conn: Mutex::new(conn),
            encryption_key,
        };
        store.init()?;

        debug!(
            url = %options.url,
            encrypted = store.encryption_key.is_some(),
            "Credential store opened"
        );

        Ok(store)
    }

    /// Creates the tables if missing. Safe to call any number of times.
    pub fn init(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    user_id TEXT PRIMARY KEY,
                    data TEXT
                );
                CREATE TABLE IF NOT EXISTS admins (
                    user_id TEXT PRIMARY KEY
                );
                "#,
            )
            .context("Failed to create schema")
    }

    /// Replaces the whole record for `user_id`. Never merges fields.
    pub fn upsert(&self, user_id: &str, record: &CredentialRecord) -> Result<()> {
        let data = self.encode(record)?;

        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO users (user_id, data) VALUES (?1, ?2)",
                params![user_id, data],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    /// Returns the record for `user_id`, or `None` if never stored or removed.
    pub fn get(&self, user_id: &str) -> Result<Option<CredentialRecord>> {
        let data: Option<String> = self
            .conn()?
            .query_row(
                "SELECT data FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query credentials")?;

        data.map(|d| self.decode(&d)).transpose()
    }

    /// Point-in-time snapshot of every stored record, keyed by user id.
    ///
    /// Rows that fail to decode are skipped with a warning so one corrupt
    /// record cannot stall a sweep or bulk join.
    pub fn list_all(&self) -> Result<BTreeMap<String, CredentialRecord>> {
        let rows: Vec<(String, String)> = {
            let conn = self.conn()?;
            let mut stmt = conn
                .prepare("SELECT user_id, data FROM users ORDER BY user_id")
                .context("Failed to prepare query")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .context("Failed to execute query")?
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read results")?;
            rows
        };

        let mut records = BTreeMap::new();
        for (user_id, data) in rows {
            match self.decode(&data) {
                Ok(record) => {
                    records.insert(user_id, record);
                }
                Err(e) => warn!(user_id = %user_id, error = %e, "Skipping undecodable credential row"),
            }
        }

        Ok(records)
    }

    /// Deletes the record. Returns whether one existed.
    pub fn remove(&self, user_id: &str) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute("DELETE FROM users WHERE user_id = ?1", params![user_id])
            .context("Failed to delete credentials")?;

        Ok(rows_affected > 0)
    }

    /// True for the root admin (no lookup) or any allowlisted user.
    pub fn is_admin(&self, user_id: &str, root_id: Option<&str>) -> Result<bool> {
        if root_id == Some(user_id) {
            return Ok(true);
        }

        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM admins WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query admins")?;

        Ok(found.is_some())
    }

    pub fn add_admin(&self, user_id: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO admins (user_id) VALUES (?1)",
                params![user_id],
            )
            .context("Failed to add admin")?;
        Ok(())
    }

    /// Returns whether the user was an admin before the call.
    pub fn remove_admin(&self, user_id: &str) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute("DELETE FROM admins WHERE user_id = ?1", params![user_id])
            .context("Failed to remove admin")?;
        Ok(rows_affected > 0)
    }

    pub fn list_admins(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT user_id FROM admins ORDER BY user_id")
            .context("Failed to prepare query")?;

        let admins = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        Ok(admins)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))
    }

    fn encode(&self, record: &CredentialRecord) -> Result<String> {
        let json = serde_json::to_string(record).context("Failed to serialize credentials")?;
        match &self.encryption_key {
            Some(key) => encryption::encrypt(&json, key).context("Failed to encrypt credentials"),
            None => Ok(json),
        }
    }

    fn decode(&self, data: &str) -> Result<CredentialRecord> {
        let json = if encryption::is_sealed(data) {
            let key = self
                .encryption_key
                .as_ref()
                .ok_or_else(|| anyhow!("Record is encrypted but no encryption key is configured"))?;
            encryption::decrypt(data, key).context("Failed to decrypt credentials")?
        } else {
            data.to_string()
        };

        serde_json::from_str(&json).context("Failed to parse stored credentials")
    }
}
