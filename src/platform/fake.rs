//! In-memory [`GuildDirectory`] for unit tests.

use super::{GuildDirectory, Role};
use crate::error::PlatformError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct FakeDirectory {
    pub guilds: Vec<u64>,
    pub roles: HashMap<(u64, u64), String>,
    pub members: Mutex<HashSet<(u64, String)>>,
    /// Status returned by add-member per user; 201 when absent
    pub add_statuses: HashMap<String, u16>,
    pub forbid_grants: bool,
    pub fail_membership_checks: bool,
    pub add_calls: Mutex<Vec<(u64, String, String)>>,
    pub grants: Mutex<Vec<(u64, String, u64)>>,
}

impl FakeDirectory {
    pub fn with_guild(mut self, guild_id: u64) -> Self {
        self.guilds.push(guild_id);
        self
    }

    pub fn with_role(mut self, guild_id: u64, role_id: u64, name: &str) -> Self {
        self.roles.insert((guild_id, role_id), name.to_string());
        self
    }

    pub fn with_member(self, guild_id: u64, user_id: &str) -> Self {
        self.members
            .lock()
            .unwrap()
            .insert((guild_id, user_id.to_string()));
        self
    }

    pub fn with_add_status(mut self, user_id: &str, status: u16) -> Self {
        self.add_statuses.insert(user_id.to_string(), status);
        self
    }

    pub fn add_call_count(&self) -> usize {
        self.add_calls.lock().unwrap().len()
    }

    pub fn granted(&self) -> Vec<(u64, String, u64)> {
        self.grants.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuildDirectory for FakeDirectory {
    async fn guild_ids(&self) -> Result<Vec<u64>, PlatformError> {
        Ok(self.guilds.clone())
    }

    async fn role(&self, guild_id: u64, role_id: u64) -> Result<Option<Role>, PlatformError> {
        Ok(self.roles.get(&(guild_id, role_id)).map(|name| Role {
            id: role_id,
            name: name.clone(),
        }))
    }

    async fn is_member(&self, guild_id: u64, user_id: &str) -> Result<bool, PlatformError> {
        if self.fail_membership_checks {
            return Err(PlatformError::Api {
                status: 500,
                body: "membership lookup unavailable".to_string(),
            });
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .contains(&(guild_id, user_id.to_string())))
    }

    async fn grant_role(
        &self,
        guild_id: u64,
        user_id: &str,
        role_id: u64,
    ) -> Result<(), PlatformError> {
        if self.forbid_grants {
            return Err(PlatformError::Forbidden("Missing Permissions".to_string()));
        }
        self.grants
            .lock()
            .unwrap()
            .push((guild_id, user_id.to_string(), role_id));
        Ok(())
    }

    async fn add_member(
        &self,
        guild_id: u64,
        user_id: &str,
        access_token: &str,
    ) -> Result<u16, PlatformError> {
        self.add_calls.lock().unwrap().push((
            guild_id,
            user_id.to_string(),
            access_token.to_string(),
        ));
        Ok(self.add_statuses.get(user_id).copied().unwrap_or(201))
    }
}
