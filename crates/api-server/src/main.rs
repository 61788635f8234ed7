//! Trustline API Server

mod error;
mod handlers;
mod rate_limiter;
mod state;

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trustline_auth::auth_middleware;
use trustline_core::TrustConfig;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "trustline", about = "Community URL trust scoring service")]
struct Args {
    /// Path to a JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrustConfig::from_file(path)?,
        None => TrustConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.server.bind_port = port;
    }

    info!("Starting Trustline API Server");
    let state = AppState::new(config).await?;

    let public = Router::new()
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/stats/batch", post(handlers::batch_stats))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_text));

    let authenticated = Router::new()
        .route("/api/ratings", post(handlers::submit_rating))
        .route("/admin/aggregate", post(handlers::run_aggregation))
        .route("/admin/domains/:domain/refresh", post(handlers::refresh_domain))
        .route("/admin/config/:key", put(handlers::update_config))
        .route("/admin/cache/stats", get(handlers::cache_stats))
        .route("/admin/errors", get(handlers::error_stats))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    let app = public
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server.bind_address, state.config.server.bind_port
    )
    .parse()?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state.clone()))
    .await?;

    Ok(())
}

async fn shutdown_signal(state: std::sync::Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
    state.scheduler.shutdown();
}
