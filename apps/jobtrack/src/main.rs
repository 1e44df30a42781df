use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobtrack::auth::GoTrueAuth;
use jobtrack::config::Config;
use jobtrack::notify;
use jobtrack::remote::RestRemote;
use jobtrack::routes::build_router;
use jobtrack::state::{AppState, Tracker};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting jobtrack v{}", env!("CARGO_PKG_VERSION"));

    let remote = Arc::new(RestRemote::new(&config.api_url, &config.anon_key));
    let auth = Arc::new(GoTrueAuth::new(&config.api_url, &config.anon_key));
    info!("Remote service at {}", config.api_url);

    let (notifier, notifications) = notify::channel(config.toast_durations);
    let tracker = Tracker::new(remote, auth, notifier);

    // Sessions are held in memory only, so a fresh process starts signed out.
    if let Err(e) = tracker.auth.initialize().await {
        warn!("Session restore failed: {e}");
    }

    let state = AppState::new(tracker, notifications);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
