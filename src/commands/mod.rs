//! Command surface consumed by the chat dispatch layer.
//!
//! Each handler takes the invoking context plus already-resolved arguments
//! and returns a typed reply for the dispatch layer to render. Registration,
//! option parsing and embed styling live outside this crate.

mod custom_id;

pub use custom_id::{AuthMethod, ComponentId, ComponentIdError};

use crate::config::{GatewayConfig, QuizConfig, TuningConfig};
use crate::credentials::{CredentialRecord, CredentialStore};
use crate::error::PlatformError;
use crate::join::{JoinOrchestrator, JoinOutcome};
use crate::oauth::{AuthState, TokenManager};
use crate::platform::GuildDirectory;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Description length limit for the user list.
const LIST_LIMIT: usize = 4000;

const PERMISSION_DENIED: &str = "You do not have permission to run this command.";
const GUILD_ONLY: &str = "This command can only be used in a server.";
const STORE_FAILURE: &str = "Failed to read stored data. Check the logs.";

/// Who invoked a command, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub invoker_id: String,
    /// `None` for direct messages
    pub guild_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
    /// Visible to the invoker only
    pub ephemeral: bool,
    pub panel: Option<Panel>,
}

impl CommandReply {
    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
            panel: None,
        }
    }

    fn public_panel(panel: Panel) -> Self {
        Self {
            content: String::new(),
            ephemeral: false,
            panel: Some(panel),
        }
    }
}

/// An auth panel: a titled message with one button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    pub title: String,
    pub description: String,
    pub button: PanelButton,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelButton {
    pub label: String,
    pub target: ButtonTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    /// Interaction button; the value is an encoded [`ComponentId`]
    Custom(String),
    /// Link button opening a URL
    Link(String),
}

/// Response to a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentReply {
    Message(CommandReply),
    /// Show the quiz modal; the answer comes back through
    /// [`CommandHandler::submit_quiz`]
    OpenQuiz { role_id: u64, question: String },
    /// Component belongs to something else
    Ignored,
}

pub struct CommandHandler {
    store: Arc<CredentialStore>,
    tokens: Arc<TokenManager>,
    join: Arc<JoinOrchestrator>,
    root_admin: Option<String>,
    redirect_uri: String,
    quiz: QuizConfig,
}

impl CommandHandler {
    pub fn new(
        store: Arc<CredentialStore>,
        tokens: Arc<TokenManager>,
        join: Arc<JoinOrchestrator>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tokens,
            join,
            root_admin: None,
            redirect_uri: redirect_uri.into(),
            quiz: QuizConfig::default(),
        }
    }

    /// Wires a handler the way the running gateway is configured.
    pub fn from_config(
        config: &GatewayConfig,
        tuning: &TuningConfig,
        tokens: Arc<TokenManager>,
        directory: Arc<dyn GuildDirectory>,
    ) -> Self {
        let store = Arc::clone(tokens.store());
        let join = JoinOrchestrator::new(Arc::clone(&store), Arc::clone(&tokens), directory)
            .with_refresh_margin(tuning.join.refresh_margin_seconds)
            .with_delay(tuning.join.delay());

        Self::new(store, tokens, Arc::new(join), config.redirect_uri.clone())
            .with_root_admin(config.root_admin_id.clone())
            .with_quiz(tuning.quiz.clone())
    }

    pub fn with_root_admin(mut self, root_admin: Option<String>) -> Self {
        self.root_admin = root_admin;
        self
    }

    pub fn with_quiz(mut self, quiz: QuizConfig) -> Self {
        self.quiz = quiz;
        self
    }

    fn directory(&self) -> &Arc<dyn GuildDirectory> {
        self.join.directory()
    }

    /// `Err` carries the reply to send instead of running the command.
    fn ensure_admin(&self, ctx: &CommandContext) -> Result<(), CommandReply> {
        match self
            .store
            .is_admin(&ctx.invoker_id, self.root_admin.as_deref())
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(invoker = %ctx.invoker_id, "Privileged command denied");
                Err(CommandReply::private(PERMISSION_DENIED))
            }
            Err(e) => {
                error!(invoker = %ctx.invoker_id, error = %e, "Admin lookup failed");
                Err(CommandReply::private(STORE_FAILURE))
            }
        }
    }

    // ----- Panels -----

    /// Builds an auth panel granting `role_id` in the invoking guild.
    pub async fn create_panel(
        &self,
        ctx: &CommandContext,
        method: AuthMethod,
        role_id: u64,
    ) -> CommandReply {
        if let Err(reply) = self.ensure_admin(ctx) {
            return reply;
        }
        let Some(guild_id) = ctx.guild_id else {
            return CommandReply::private(GUILD_ONLY);
        };

        match self.directory().role(guild_id, role_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return CommandReply::private("That role does not exist in this server."),
            Err(e) => {
                warn!(guild_id, role_id, error = %e, "Role lookup failed");
                return CommandReply::private(format!("Failed to look up the role: {}", e));
            }
        }

        let (title, description) = match method {
            AuthMethod::Simple => (
                "Simple verification",
                "Press the button below to verify.",
            ),
            AuthMethod::Quiz => (
                "Quiz verification",
                "Press the button below and answer the question.",
            ),
            AuthMethod::OAuth => (
                "App authorization",
                "Press the button below and approve the authorization.",
            ),
        };

        let target = match method {
            AuthMethod::OAuth => {
                let state = AuthState::in_guild(guild_id, role_id).encode();
                ButtonTarget::Link(
                    self.tokens
                        .provider()
                        .build_auth_url(&state, &self.redirect_uri),
                )
            }
            _ => ButtonTarget::Custom(ComponentId::new(method, role_id).encode()),
        };

        info!(guild_id, role_id, method = method.tag(), "Auth panel created");

        CommandReply::public_panel(Panel {
            title: title.to_string(),
            description: description.to_string(),
            button: PanelButton {
                label: "Verify".to_string(),
                target,
            },
        })
    }

    // ----- Panel interactions -----

    pub async fn handle_component(&self, ctx: &CommandContext, custom_id: &str) -> ComponentReply {
        let component = match custom_id.parse::<ComponentId>() {
            Ok(component) => component,
            Err(ComponentIdError::Foreign) => return ComponentReply::Ignored,
            Err(e) => {
                debug!(custom_id = %custom_id, error = %e, "Ignoring malformed auth component");
                return ComponentReply::Ignored;
            }
        };

        match component {
            ComponentId::SimpleAuth { role_id } => ComponentReply::Message(
                self.grant_in_invoking_guild(ctx, role_id, |name| {
                    format!("Verified! You have been given the {} role.", name)
                })
                .await,
            ),
            ComponentId::QuizAuth { role_id } => ComponentReply::OpenQuiz {
                role_id,
                question: self.quiz.question.clone(),
            },
            // Link buttons never produce interactions; answer with the link
            ComponentId::OAuthLink { role_id } => {
                let state = match ctx.guild_id {
                    Some(guild_id) => AuthState::in_guild(guild_id, role_id),
                    None => AuthState::for_role(role_id),
                };
                let url = self
                    .tokens
                    .provider()
                    .build_auth_url(&state.encode(), &self.redirect_uri);
                ComponentReply::Message(CommandReply::private(format!(
                    "Authorize here: {}",
                    url
                )))
            }
        }
    }

    pub async fn submit_quiz(&self, ctx: &CommandContext, role_id: u64, answer: &str) -> CommandReply {
        if answer.trim() != self.quiz.answer.trim() {
            return CommandReply::private("Incorrect answer. Please try again.");
        }

        self.grant_in_invoking_guild(ctx, role_id, |name| {
            format!("Correct! You have been given the {} role.", name)
        })
        .await
    }

    async fn grant_in_invoking_guild(
        &self,
        ctx: &CommandContext,
        role_id: u64,
        success: impl FnOnce(&str) -> String,
    ) -> CommandReply {
        let Some(guild_id) = ctx.guild_id else {
            return CommandReply::private(GUILD_ONLY);
        };

        let role = match self.directory().role(guild_id, role_id).await {
            Ok(Some(role)) => role,
            Ok(None) => return CommandReply::private("Error: the configured role was not found."),
            Err(e) => {
                warn!(guild_id, role_id, error = %e, "Role lookup failed");
                return CommandReply::private(format!("Error: failed to look up the role: {}", e));
            }
        };

        match self
            .directory()
            .grant_role(guild_id, &ctx.invoker_id, role_id)
            .await
        {
            Ok(()) => {
                info!(guild_id, role_id, user_id = %ctx.invoker_id, "Role granted");
                CommandReply::private(success(&role.name))
            }
            Err(PlatformError::Forbidden(_)) => CommandReply::private(
                "Error: missing permissions to grant the role. Check the bot's role position.",
            ),
            Err(e) => {
                warn!(guild_id, role_id, user_id = %ctx.invoker_id, error = %e, "Role grant failed");
                CommandReply::private(format!("Error: failed to grant the role: {}", e))
            }
        }
    }

    // ----- User management -----

    pub async fn info(&self, ctx: &CommandContext, user_id: &str) -> CommandReply {
        if let Err(reply) = self.ensure_admin(ctx) {
            return reply;
        }

        match self.store.get(user_id) {
            Ok(Some(record)) => CommandReply::private(render_info(&record)),
            Ok(None) => CommandReply::private(format!("No data found for <@{}>.", user_id)),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to read credentials");
                CommandReply::private(STORE_FAILURE)
            }
        }
    }

    pub async fn list(&self, ctx: &CommandContext) -> CommandReply {
        if let Err(reply) = self.ensure_admin(ctx) {
            return reply;
        }

        let records = match self.store.list_all() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to list credentials");
                return CommandReply::private(STORE_FAILURE);
            }
        };
        if records.is_empty() {
            return CommandReply::private("No users are stored.");
        }

        let mut body = String::new();
        for (user_id, record) in &records {
            let line = format!(
                "• <@{}> (`{}`) - {}\n",
                user_id,
                user_id,
                record.username.as_deref().unwrap_or("unknown")
            );
            if body.len() + line.len() > LIST_LIMIT {
                body.push_str("...and more");
                break;
            }
            body.push_str(&line);
        }

        CommandReply::private(format!("**Stored users ({})**\n{}", records.len(), body))
    }

    pub async fn remove_user(&self, ctx: &CommandContext, user_id: &str) -> CommandReply {
        if let Err(reply) = self.ensure_admin(ctx) {
            return reply;
        }

        match self.store.remove(user_id) {
            Ok(true) => {
                info!(user_id = %user_id, invoker = %ctx.invoker_id, "Credentials removed");
                CommandReply::private(format!(
                    "Removed authorization data for <@{}>. They will no longer be targeted by `/join`.",
                    user_id
                ))
            }
            Ok(false) => CommandReply::private(format!("No data found for <@{}>.", user_id)),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to remove credentials");
                CommandReply::private(STORE_FAILURE)
            }
        }
    }

    // ----- Admin management -----

    pub async fn add_admin(&self, ctx: &CommandContext, user_id: &str) -> CommandReply {
        if let Err(reply) = self.ensure_admin(ctx) {
            return reply;
        }

        match self.store.add_admin(user_id) {
            Ok(()) => {
                info!(user_id = %user_id, invoker = %ctx.invoker_id, "Admin added");
                CommandReply::private(format!(
                    "<@{}> is now a bot admin and can use `/join`.",
                    user_id
                ))
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to add admin");
                CommandReply::private(STORE_FAILURE)
            }
        }
    }

    pub async fn remove_admin(&self, ctx: &CommandContext, user_id: &str) -> CommandReply {
        if let Err(reply) = self.ensure_admin(ctx) {
            return reply;
        }
        if self.root_admin.as_deref() == Some(user_id) {
            return CommandReply::private("The root admin cannot be removed.");
        }

        match self.store.remove_admin(user_id) {
            Ok(_) => {
                info!(user_id = %user_id, invoker = %ctx.invoker_id, "Admin removed");
                CommandReply::private(format!("Removed admin rights from <@{}>.", user_id))
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to remove admin");
                CommandReply::private(STORE_FAILURE)
            }
        }
    }

    // ----- Join -----

    /// Joins `target`, or every stored user when `None`, into the invoking
    /// guild. Returns the replies in send order: one for a single target, a
    /// start notice and a summary for bulk.
    pub async fn join(&self, ctx: &CommandContext, target: Option<&str>) -> Vec<CommandReply> {
        if let Err(reply) = self.ensure_admin(ctx) {
            return vec![reply];
        }
        let Some(guild_id) = ctx.guild_id else {
            return vec![CommandReply::private(GUILD_ONLY)];
        };

        if let Some(user_id) = target {
            let outcome = self.join.join_one(guild_id, user_id).await;
            return vec![CommandReply::private(describe_single_join(user_id, &outcome))];
        }

        let user_ids: Vec<String> = match self.store.list_all() {
            Ok(records) => records.into_keys().collect(),
            Err(e) => {
                error!(error = %e, "Failed to list credentials for bulk join");
                return vec![CommandReply::private(STORE_FAILURE)];
            }
        };
        if user_ids.is_empty() {
            return vec![CommandReply::private("No users are stored.")];
        }

        let mut replies = vec![CommandReply::private(format!(
            "Starting join for {} users...",
            user_ids.len()
        ))];

        match self.join.join_many(guild_id, Some(user_ids)).await {
            Ok(summary) => replies.push(CommandReply::private(format!(
                "Join complete.\n✅ Joined: {}\n🏠 Already in server: {}\n❌ Failed: {}",
                summary.success, summary.already_member, summary.failed
            ))),
            Err(e) => {
                error!(guild_id, error = %e, "Bulk join failed");
                replies.push(CommandReply::private(STORE_FAILURE));
            }
        }

        replies
    }
}

fn describe_single_join(user_id: &str, outcome: &JoinOutcome) -> String {
    match outcome {
        JoinOutcome::Success => format!("<@{}> has joined the server!", user_id),
        JoinOutcome::AlreadyMember => format!("<@{}> is already in the server.", user_id),
        JoinOutcome::NoCredential => format!("No authorization data found for <@{}>.", user_id),
        failure => format!(
            "Failed to add <@{}> to the server. Details: {}",
            user_id, failure
        ),
    }
}

fn ip_label(ip: &str) -> &'static str {
    if ip.contains(':') {
        "IP Address (IPv6)"
    } else if ip.contains('.') {
        "IP Address (IPv4)"
    } else {
        "IP Address"
    }
}

fn render_info(record: &CredentialRecord) -> String {
    let ip = record.ip_address.as_deref().unwrap_or("Unknown");
    let mut out = format!(
        "**User details: {}**\nUser ID: `{}`\n{}: `{}`\nAccess Token: {}\nExpires At: <t:{}:R> (<t:{}:f>)",
        record.username.as_deref().unwrap_or("unknown"),
        record.user_id,
        ip_label(ip),
        ip,
        record.masked_access_token(),
        record.expires_at,
        record.expires_at,
    );
    if let Some(avatar) = &record.avatar_url {
        out.push_str(&format!("\nAvatar: {}", avatar));
    }
    out
}

#[cfg(test)]
mod tests;
