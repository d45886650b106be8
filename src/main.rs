//! Kibo Backend Server
//!
//! HTTP API for the Kibo peer-to-peer exchange: order lifecycle, realtime
//! order streams over SSE, rate quotes, and ally onboarding.

use anyhow::Context;
use axum::http::{header, HeaderName, HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use kibo_server::config::Config;
use kibo_server::db;
use kibo_server::middleware::{self, RateLimiter};
use kibo_server::orders::expiry_sweeper;
use kibo_server::realtime::{ChangeFeed, PgChangeListener};
use kibo_server::state::{AppState, Stores};
use kibo_server::storage::LocalBlobStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting Kibo server");

    let change_feed = ChangeFeed::new(config.change_feed_capacity);

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload dir {}", config.upload_dir))?;
    let blobs = Arc::new(LocalBlobStore::new(
        &config.upload_dir,
        config.public_base_url.clone(),
    ));

    let stores = match &config.database_url {
        Some(database_url) => {
            tracing::info!(
                database = ?config.database_url_masked(),
                "Connecting to database..."
            );
            let pool = db::create_pool(database_url, config.db_max_connections).await?;
            db::run_migrations(&pool).await?;

            let listener = PgChangeListener::new(pool.clone(), change_feed.clone());
            tokio::spawn(async move {
                listener.start().await;
            });

            Stores::postgres(pool, blobs)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores; data will not survive a restart");
            Stores::in_memory(&change_feed, blobs)
        }
    };

    let app_state =
        AppState::build(&config, stores, change_feed).context("Failed to build application state")?;
    let stream_shutdown = app_state.stream_settings.shutdown.clone();

    // Start expiry sweeper in background
    let sweep_service = app_state.order_service.clone();
    let sweep_interval = config.sweep_interval();
    tokio::spawn(async move {
        expiry_sweeper(sweep_service, sweep_interval).await;
        tracing::error!("Expiry sweeper task exited unexpectedly");
    });

    let rate_limiter = RateLimiter::new(config.rate_limit_rps);
    tokio::spawn(rate_limiter.clone().run_cleanup(Duration::from_secs(300)));

    let mut app = kibo_server::create_app(app_state, &config.upload_dir, rate_limiter)
        .layer(configure_cors(config.cors_allowed_origins.as_deref()));
    if config.environment.is_production() {
        app = app.layer(axum::middleware::from_fn(middleware::hsts_header));
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open SSE bodies would otherwise hold the drain forever
            stream_shutdown.cancel();
        })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let identity_headers = [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(middleware::auth::USER_ID_HEADER),
        HeaderName::from_static(middleware::auth::USER_ROLE_HEADER),
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(identity_headers)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
