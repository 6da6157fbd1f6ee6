use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use duel_core::{SystemClock, WordListSource, WordSource};
use duel_persistence::{SqlStore, connect_and_migrate};
use duel_server::{
    auth::AuthService, battle_service::BattleService, config::Config, create_routes,
    http_word_source::HttpWordSource, websocket, websocket::ConnectionManager,
};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting Word Duel server...");

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Loading words from {}", config.word_list_path);
    let word_list = WordListSource::from_file(&config.word_list_path).with_context(|| {
        format!(
            "Failed to load word list '{}'; set WORD_LIST_PATH to a word|hint|clue file",
            config.word_list_path
        )
    })?;

    let words: Arc<dyn WordSource> = match &config.word_service_url {
        Some(url) => {
            info!("Using word service at {} with local fallback", url);
            Arc::new(HttpWordSource::new(url.clone(), word_list)?)
        }
        None => Arc::new(word_list),
    };

    let db = connect_and_migrate(&config.database_url)
        .await
        .context("Failed to connect to database and run migrations")?;

    let auth_service = if config.auth_dev_mode {
        info!("Starting in development authentication mode - JWT validation disabled");
        Arc::new(AuthService::new_dev_mode())
    } else {
        let secret = config
            .jwt_secret
            .as_deref()
            .context("JWT_SECRET must be set")?;
        Arc::new(AuthService::new(secret))
    };

    let battle_service = Arc::new(
        BattleService::new(
            Arc::new(SqlStore::new(db)),
            words,
            Arc::new(SystemClock),
            config.battle_rules(),
        )
        .with_admin_token(config.admin_token.clone()),
    );
    let connection_manager = Arc::new(ConnectionManager::new());

    websocket::spawn_event_forwarder(battle_service.clone(), connection_manager.clone());

    let routes = create_routes(
        connection_manager.clone(),
        battle_service.clone(),
        auth_service,
    );

    let cleanup_connection_manager = connection_manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            cleanup_connection_manager
                .cleanup_inactive_connections(CONNECTION_TIMEOUT)
                .await;
        }
    });

    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST '{}'", config.host))?;

    info!("Server starting on {}:{}", config.host, config.port);

    let (addr, server) =
        warp::serve(routes).bind_with_graceful_shutdown((host, config.port), shutdown_signal());

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal as unix_signal};

        match (
            unix_signal(SignalKind::interrupt()),
            unix_signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
                }
                return;
            }
            _ => error!("Failed to install signal handlers, falling back to Ctrl+C"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Received Ctrl+C, shutting down gracefully...");
}
