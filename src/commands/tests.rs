use super::*;
use crate::credentials::StoreOptions;
use crate::oauth::{ProviderConfig, DEFAULT_HTTP_TIMEOUT};
use crate::platform::fake::FakeDirectory;
use chrono::Utc;

const GUILD: u64 = 10;
const ROLE: u64 = 555;
const ROOT: &str = "1";

struct Fixture {
    store: Arc<CredentialStore>,
    directory: Arc<FakeDirectory>,
    handler: CommandHandler,
}

fn fixture(directory: FakeDirectory) -> Fixture {
    let store = Arc::new(CredentialStore::open(&StoreOptions::in_memory()).unwrap());
    let provider = ProviderConfig::discord("cid", "secret").with_api_base("http://127.0.0.1:9");
    let tokens =
        Arc::new(TokenManager::new(provider, Arc::clone(&store), DEFAULT_HTTP_TIMEOUT).unwrap());
    let directory = Arc::new(directory);
    let dyn_directory: Arc<dyn GuildDirectory> = directory.clone();
    let join = Arc::new(JoinOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&tokens),
        dyn_directory,
    ));

    let handler = CommandHandler::new(
        Arc::clone(&store),
        tokens,
        join,
        "http://localhost:8080/callback",
    )
    .with_root_admin(Some(ROOT.to_string()));

    Fixture {
        store,
        directory,
        handler,
    }
}

fn ctx(invoker: &str) -> CommandContext {
    CommandContext {
        invoker_id: invoker.to_string(),
        guild_id: Some(GUILD),
    }
}

fn record(user_id: &str, username: &str) -> CredentialRecord {
    CredentialRecord {
        user_id: user_id.to_string(),
        username: Some(username.to_string()),
        avatar_url: None,
        ip_address: Some("203.0.113.9".to_string()),
        access_token: "abcdefghijklmnopqrstuvwxyz".to_string(),
        refresh_token: "refresh".to_string(),
        expires_at: Utc::now().timestamp() + 3600,
    }
}

#[tokio::test]
async fn test_privileged_commands_deny_non_admins() {
    let f = fixture(FakeDirectory::default());
    let stranger = ctx("99");

    let denied = CommandReply::private(PERMISSION_DENIED);
    assert_eq!(f.handler.info(&stranger, "42").await, denied);
    assert_eq!(f.handler.list(&stranger).await, denied);
    assert_eq!(f.handler.remove_user(&stranger, "42").await, denied);
    assert_eq!(f.handler.add_admin(&stranger, "99").await, denied);
    assert_eq!(f.handler.join(&stranger, None).await, vec![denied.clone()]);
    assert_eq!(
        f.handler.create_panel(&stranger, AuthMethod::Simple, ROLE).await,
        denied
    );
    assert!(!f.store.is_admin("99", Some(ROOT)).unwrap());
}

#[tokio::test]
async fn test_added_admin_gains_access() {
    let f = fixture(FakeDirectory::default());

    let reply = f.handler.add_admin(&ctx(ROOT), "7").await;
    assert!(reply.content.contains("<@7>"));
    assert_eq!(f.handler.list(&ctx("7")).await.content, "No users are stored.");

    f.handler.remove_admin(&ctx(ROOT), "7").await;
    assert_eq!(f.handler.list(&ctx("7")).await.content, PERMISSION_DENIED);
}

#[tokio::test]
async fn test_root_admin_cannot_be_removed() {
    let f = fixture(FakeDirectory::default());
    f.store.add_admin("7").unwrap();

    let reply = f.handler.remove_admin(&ctx("7"), ROOT).await;
    assert_eq!(reply.content, "The root admin cannot be removed.");
    assert!(f.store.is_admin(ROOT, Some(ROOT)).unwrap());
}

#[tokio::test]
async fn test_info_masks_token_and_labels_ip() {
    let f = fixture(FakeDirectory::default());
    let rec = record("42", "alice");
    f.store.upsert("42", &rec).unwrap();

    let reply = f.handler.info(&ctx(ROOT), "42").await;
    assert!(reply.ephemeral);
    assert!(reply.content.contains("alice"));
    assert!(reply.content.contains("IP Address (IPv4): `203.0.113.9`"));
    assert!(reply.content.contains("||abcdefghijklmno...||"));
    assert!(!reply.content.contains("abcdefghijklmnop"));
    assert!(reply
        .content
        .contains(&format!("<t:{}:R> (<t:{}:f>)", rec.expires_at, rec.expires_at)));

    let missing = f.handler.info(&ctx(ROOT), "43").await;
    assert_eq!(missing.content, "No data found for <@43>.");
}

#[test]
fn test_ip_label() {
    assert_eq!(ip_label("2001:db8::1"), "IP Address (IPv6)");
    assert_eq!(ip_label("10.0.0.1"), "IP Address (IPv4)");
    assert_eq!(ip_label("Unknown"), "IP Address");
}

#[tokio::test]
async fn test_list_truncates_long_output() {
    let f = fixture(FakeDirectory::default());
    for i in 0..200 {
        let id = format!("{:018}", 100_000_000_000_000_000u64 + i);
        f.store.upsert(&id, &record(&id, "someone")).unwrap();
    }

    let reply = f.handler.list(&ctx(ROOT)).await;
    assert!(reply.content.starts_with("**Stored users (200)**\n"));
    assert!(reply.content.ends_with("...and more"));
    let body = reply.content.split_once('\n').unwrap().1;
    assert!(body.len() <= LIST_LIMIT + "...and more".len());
}

#[tokio::test]
async fn test_remove_user_reports_existence() {
    let f = fixture(FakeDirectory::default());
    f.store.upsert("42", &record("42", "alice")).unwrap();

    let removed = f.handler.remove_user(&ctx(ROOT), "42").await;
    assert!(removed.content.starts_with("Removed authorization data for <@42>"));
    assert!(f.store.get("42").unwrap().is_none());

    let again = f.handler.remove_user(&ctx(ROOT), "42").await;
    assert_eq!(again.content, "No data found for <@42>.");
}

#[tokio::test]
async fn test_oauth_panel_links_to_provider_with_guild_state() {
    let f = fixture(FakeDirectory::default().with_role(GUILD, ROLE, "Verified"));

    let reply = f.handler.create_panel(&ctx(ROOT), AuthMethod::OAuth, ROLE).await;
    assert!(!reply.ephemeral);

    let panel = reply.panel.unwrap();
    let ButtonTarget::Link(url) = panel.button.target else {
        panic!("expected a link button");
    };
    let (base, query) = url.split_once('?').unwrap();
    assert_eq!(base, "https://discord.com/oauth2/authorize");
    assert!(url.contains("scope=identify%20guilds.join"));

    let params: std::collections::HashMap<String, String> =
        serde_urlencoded::from_str(query).unwrap();
    assert_eq!(params["state"], "10:555");
    assert_eq!(params["redirect_uri"], "http://localhost:8080/callback");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], "cid");
}

#[tokio::test]
async fn test_simple_panel_carries_component_id() {
    let f = fixture(FakeDirectory::default().with_role(GUILD, ROLE, "Verified"));

    let reply = f.handler.create_panel(&ctx(ROOT), AuthMethod::Simple, ROLE).await;
    assert_eq!(
        reply.panel.unwrap().button.target,
        ButtonTarget::Custom("auth:1:555".to_string())
    );

    let missing = f.handler.create_panel(&ctx(ROOT), AuthMethod::Quiz, 777).await;
    assert!(missing.panel.is_none());
}

#[tokio::test]
async fn test_simple_button_grants_role() {
    let f = fixture(FakeDirectory::default().with_role(GUILD, ROLE, "Verified"));

    let reply = f.handler.handle_component(&ctx("42"), "auth:1:555").await;
    assert_eq!(
        reply,
        ComponentReply::Message(CommandReply::private(
            "Verified! You have been given the Verified role."
        ))
    );
    assert_eq!(f.directory.granted(), vec![(GUILD, "42".to_string(), ROLE)]);
}

#[tokio::test]
async fn test_simple_button_reports_forbidden_grant() {
    let f = fixture(FakeDirectory {
        forbid_grants: true,
        ..FakeDirectory::default().with_role(GUILD, ROLE, "Verified")
    });

    let ComponentReply::Message(reply) = f.handler.handle_component(&ctx("42"), "auth:1:555").await
    else {
        panic!("expected a message");
    };
    assert!(reply.content.contains("missing permissions"));
}

#[tokio::test]
async fn test_foreign_and_malformed_components_are_ignored() {
    let f = fixture(FakeDirectory::default());

    assert_eq!(
        f.handler.handle_component(&ctx("42"), "poll:vote:3").await,
        ComponentReply::Ignored
    );
    assert_eq!(
        f.handler.handle_component(&ctx("42"), "auth:1:abc").await,
        ComponentReply::Ignored
    );
    assert!(f.directory.granted().is_empty());
}

#[tokio::test]
async fn test_quiz_flow() {
    let f = fixture(FakeDirectory::default().with_role(GUILD, ROLE, "Verified"));

    let opened = f.handler.handle_component(&ctx("42"), "auth:2:555").await;
    assert_eq!(
        opened,
        ComponentReply::OpenQuiz {
            role_id: ROLE,
            question: "2 + 2 = ?".to_string()
        }
    );

    let wrong = f.handler.submit_quiz(&ctx("42"), ROLE, "5").await;
    assert_eq!(wrong.content, "Incorrect answer. Please try again.");
    assert!(f.directory.granted().is_empty());

    let right = f.handler.submit_quiz(&ctx("42"), ROLE, " 4 ").await;
    assert!(right.content.starts_with("Correct!"));
    assert_eq!(f.directory.granted().len(), 1);
}

#[tokio::test]
async fn test_join_single_target_replies() {
    let f = fixture(FakeDirectory::default().with_member(GUILD, "5"));
    f.store.upsert("42", &record("42", "alice")).unwrap();

    let joined = f.handler.join(&ctx(ROOT), Some("42")).await;
    assert_eq!(joined[0].content, "<@42> has joined the server!");

    let member = f.handler.join(&ctx(ROOT), Some("5")).await;
    assert_eq!(member[0].content, "<@5> is already in the server.");

    let unknown = f.handler.join(&ctx(ROOT), Some("6")).await;
    assert_eq!(unknown[0].content, "No authorization data found for <@6>.");
}

#[tokio::test]
async fn test_join_bulk_reports_start_and_summary() {
    let f = fixture(FakeDirectory::default().with_member(GUILD, "a"));
    f.store.upsert("a", &record("a", "alice")).unwrap();
    f.store.upsert("b", &record("b", "bob")).unwrap();

    let replies = f.handler.join(&ctx(ROOT), None).await;
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].content, "Starting join for 2 users...");
    assert!(replies[1].content.contains("Joined: 1"));
    assert!(replies[1].content.contains("Already in server: 1"));
    assert!(replies[1].content.contains("Failed: 0"));
}

#[tokio::test]
async fn test_join_outside_guild() {
    let f = fixture(FakeDirectory::default());
    let dm = CommandContext {
        invoker_id: ROOT.to_string(),
        guild_id: None,
    };

    assert_eq!(
        f.handler.join(&dm, None).await,
        vec![CommandReply::private(GUILD_ONLY)]
    );
}

#[tokio::test]
async fn test_from_config_applies_root_admin_and_quiz() {
    let config = GatewayConfig::from_lookup(|key: &str| match key {
        "GUILDGATE_CLIENT_ID" => Some("cid".to_string()),
        "GUILDGATE_CLIENT_SECRET" => Some("secret".to_string()),
        "GUILDGATE_BOT_TOKEN" => Some("bot".to_string()),
        "GUILDGATE_ROOT_ADMIN_ID" => Some("77".to_string()),
        _ => None,
    })
    .unwrap();
    let tuning: TuningConfig = toml::from_str(
        r#"
            [quiz]
            question = "Capital of France?"
            answer = "Paris"
        "#,
    )
    .unwrap();

    let store = Arc::new(CredentialStore::open(&StoreOptions::in_memory()).unwrap());
    let provider = ProviderConfig::discord("cid", "secret").with_api_base("http://127.0.0.1:9");
    let tokens = Arc::new(TokenManager::new(provider, store, DEFAULT_HTTP_TIMEOUT).unwrap());
    let directory: Arc<dyn GuildDirectory> = Arc::new(FakeDirectory::default());

    let handler = CommandHandler::from_config(&config, &tuning, tokens, directory);

    assert_eq!(handler.list(&ctx("77")).await.content, "No users are stored.");
    assert_eq!(
        handler.handle_component(&ctx("42"), "auth:2:555").await,
        ComponentReply::OpenQuiz {
            role_id: ROLE,
            question: "Capital of France?".to_string()
        }
    );
}
