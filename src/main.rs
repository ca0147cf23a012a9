//! hostpulse - real-time host telemetry broadcast service
//!
//! Long-running process that:
//! - bootstraps a persistent shared secret used to admit subscribers
//! - samples host resource metrics on a fixed interval
//! - fans each snapshot out to every admitted WebSocket subscriber
//! - drains connections and exits cleanly on SIGINT/SIGTERM

use anyhow::{Context, Result};
use hostpulse::broadcast::BroadcastLoop;
use hostpulse::config::Config;
use hostpulse::credentials;
use hostpulse::http::{self, AppState};
use hostpulse::identity::HostIdentity;
use hostpulse::metrics::Sampler;
use hostpulse::registry::Registry;
use hostpulse::state::new_state;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hostpulse=info")),
        )
        .init();

    let cfg = Config::from_env().context("failed to load configuration")?;
    info!(
        port = cfg.port,
        interval_ms = cfg.interval.as_millis() as u64,
        token_path = %cfg.token_path.display(),
        "starting hostpulse"
    );

    // The credential must be usable before anything binds or samples.
    let token =
        credentials::ensure_credential(&cfg.token_path).context("credential bootstrap failed")?;

    let registry = Registry::new(token);
    let identity = Arc::new(HostIdentity::discover());
    let latest = new_state(None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let broadcast_loop = BroadcastLoop::new(
        Sampler::new(),
        registry.clone(),
        cfg.interval,
        latest.clone(),
    );
    let loop_handle = tokio::spawn(broadcast_loop.run(shutdown_rx.clone()));

    tokio::spawn(handle_signals(shutdown_tx));

    let app = http::build_router(AppState {
        registry,
        identity,
        latest,
        shutdown: shutdown_rx.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    let mut serve_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.changed().await;
        })
        .await
        .context("server error")?;

    // listener is closed; wait for any in-flight tick to settle
    if let Err(e) = loop_handle.await {
        warn!("broadcast loop ended abnormally: {e}");
    }
    info!("shutdown complete");
    Ok(())
}

/// Flip the shutdown channel on the first termination signal. Further
/// signals while shutdown is in progress are absorbed here.
async fn handle_signals(shutdown_tx: watch::Sender<bool>) {
    let mut stopping = false;
    loop {
        termination_signal().await;
        if stopping {
            info!("shutdown already in progress");
            continue;
        }
        info!("termination signal received, shutting down");
        let _ = shutdown_tx.send(true);
        stopping = true;
    }
}

#[cfg(unix)]
async fn termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
