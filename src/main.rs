use anyhow::{Context, Result};
use guildgate::api::{create_gateway_router, GatewayAppState};
use guildgate::config::{load_tuning, GatewayConfig, TuningConfig};
use guildgate::credentials::CredentialStore;
use guildgate::oauth::{run_refresh_sweep, TokenManager};
use guildgate::platform::{DiscordApi, GuildDirectory};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guildgate=info".into()),
        )
        .init();

    info!("Guildgate starting...");

    let config = GatewayConfig::from_env().context("Invalid configuration")?;
    let tuning = match &config.tuning_path {
        Some(path) => load_tuning(path)?,
        None => TuningConfig::default(),
    };

    info!(
        redirect_uri = %config.redirect_uri,
        database_url = %config.database_url,
        listen_addr = %config.listen_addr(),
        root_admin = config.root_admin_id.is_some(),
        "Configuration loaded"
    );

    // Process-wide store shared by the callback handler and the sweep
    let store = Arc::new(
        CredentialStore::open(&config.store_options())
            .context("Failed to initialize credential store")?,
    );
    info!("Credential store initialized");

    let tokens = Arc::new(
        TokenManager::new(config.provider(), Arc::clone(&store), tuning.http.timeout())?
            .with_sweep_horizon(tuning.sweep.horizon_seconds),
    );

    let directory: Arc<dyn GuildDirectory> = Arc::new(DiscordApi::new(
        &config.api_base,
        &config.bot_token,
        tuning.http.timeout(),
    )?);

    // Background refresh sweep
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_handle = tokio::spawn(run_refresh_sweep(
        Arc::clone(&tokens),
        tuning.sweep.interval(),
        shutdown_rx,
    ));

    let router = create_gateway_router(GatewayAppState {
        tokens,
        store,
        directory,
        redirect_uri: config.redirect_uri.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr()))?;
    info!(addr = %config.listen_addr(), "Callback server listening");

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl_c signal");
        }
        info!("Shutdown signal received");
    });

    if let Err(e) = serve.await {
        error!(error = %e, "Callback server error");
    }

    // Graceful shutdown
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweep_handle.await {
        error!(error = %e, "Refresh sweep task panicked");
    }
    info!("Guildgate stopped");

    Ok(())
}
