//! Vision relay server.
//!
//! Accepts peer offers over HTTP, runs object detection on every inbound
//! video track and sends the annotated frames back on a paired track.

mod cli;
mod http;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use relay_detector::{create_detector, DetectorPool};
use relay_engine::SessionManager;
use relay_transport::LoopbackGateway;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::http::{router, AppState};

/// Initialize logging.
fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "vision_relay=debug,relay_engine=debug,relay_transport=debug,relay_detector=debug,relay_overlay=debug,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = cli.relay_config();
    config.validate()?;
    info!("Vision relay starting");

    let detector = create_detector(&cli.detector_config()).context("loading detector")?;
    let pool = DetectorPool::new(detector, config.detector_workers);
    info!(
        detector = pool.detector_name(),
        workers = pool.workers(),
        "Detector ready"
    );

    std::fs::create_dir_all(&config.metrics_dir).with_context(|| {
        format!(
            "creating metrics directory {}",
            config.metrics_dir.display()
        )
    })?;

    let gateway = Arc::new(LoopbackGateway::new());
    let sessions = Arc::new(SessionManager::new(gateway, pool.clone(), config));
    let app = router(AppState {
        sessions: Arc::clone(&sessions),
    });

    let addr = cli.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sessions.shutdown().await;
    pool.close();
    info!("Vision relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
