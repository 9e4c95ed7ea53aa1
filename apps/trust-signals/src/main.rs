mod backend;
mod config;
mod errors;
mod models;
mod risk;
mod routes;
mod state;
mod votes;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend::{HttpBackend, StaticThreshold};
use crate::config::Config;
use crate::risk::monitor::RiskMonitor;
use crate::routes::build_router;
use crate::state::AppState;
use crate::votes::store::VoteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting trust-signals v{}", env!("CARGO_PKG_VERSION"));

    // Remote store client; the committer's outer timeout bounds every call
    let backend = Arc::new(HttpBackend::new(
        &config.store_url,
        config.store_api_key.clone(),
        config.vote_timings.write_timeout,
    )?);
    info!("Store client initialized ({})", config.store_url);

    let risk = RiskMonitor::new(
        backend.clone(),
        Arc::new(StaticThreshold(config.default_threshold)),
        config.risk,
    );
    info!(
        "Risk monitor: threshold {}, cut points {:?}",
        config.default_threshold, config.risk.thresholds
    );

    let votes = Arc::new(VoteStore::new(backend, config.vote_timings));
    info!(
        "Vote store: quiet period {:?}, write timeout {:?}",
        config.vote_timings.quiet_period, config.vote_timings.write_timeout
    );

    let state = AppState {
        risk,
        votes,
        mounts: Arc::new(Mutex::new(HashMap::new())),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // extension origins are not known ahead of time

    let addr: SocketAddr = format!("127.0.0.1:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
