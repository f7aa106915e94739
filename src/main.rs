//! Confmate - conference companion auth backend

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use confmate::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxSessionRepository, SqlxUsageRepository, SqlxUserRepository},
    },
    services::{
        spawn_cleanup_task, spawn_drain_task, AdminGate, FacebookOAuth, OAuthService,
        SessionService, UsageCounter,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confmate=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Confmate backend...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Repositories
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let usage_repo = SqlxUsageRepository::boxed(pool.clone());

    // Services
    let sessions = Arc::new(SessionService::new(session_repo, user_repo.clone()));
    let oauth = Arc::new(OAuthService::new(
        FacebookOAuth::boxed(config.oauth.clone()),
        sessions.clone(),
        user_repo.clone(),
        config.oauth.clone(),
    ));
    let admin = Arc::new(AdminGate::new(config.admin.password_hash.clone()));
    let usage = Arc::new(UsageCounter::new(usage_repo.clone()));

    // Background tasks, stopped through the shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let drain_task = spawn_drain_task(
        usage.clone(),
        Duration::from_secs(config.usage.drain_interval_secs),
        shutdown_rx.clone(),
    );
    // Hourly sweep of expired session rows
    let cleanup_task = spawn_cleanup_task(
        sessions.clone(),
        Duration::from_secs(60 * 60),
        shutdown_rx,
    );

    let state = AppState {
        sessions,
        oauth,
        admin,
        usage,
        users: user_repo,
        usage_repo,
    };

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    // Stop the background tasks whether serve exited cleanly or not; the
    // final drain must run before the error (if any) propagates
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = drain_task.await {
        tracing::warn!("Usage drain task ended abnormally: {}", e);
    }
    if let Err(e) = cleanup_task.await {
        tracing::warn!("Session cleanup task ended abnormally: {}", e);
    }

    pool.close().await;
    serve_result?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
