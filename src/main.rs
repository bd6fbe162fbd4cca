use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use chairbook::clock::SystemClock;
use chairbook::config::Config;
use chairbook::engine::{Engine, Store};
use chairbook::http::{self, AppState};
use chairbook::notify::LogNotifier;
use chairbook::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    chairbook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(
        Arc::new(Store::new()),
        config.wal_path(),
        Arc::new(LogNotifier::new(config.public_url.clone())),
        Arc::new(SystemClock),
        config.engine_settings(),
    )?);

    let background = CancellationToken::new();
    let sweep = tokio::spawn(reaper::run_expiry_sweep(
        engine.clone(),
        config.sweep_interval,
        background.clone(),
    ));
    let cleanup = tokio::spawn(reaper::run_cleanup(
        engine.clone(),
        config.cleanup_interval,
        background.clone(),
    ));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("chairbook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  public_url: {}", config.public_url);
    info!("  confirmation window: {} min", config.token_ttl_minutes);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, let in-flight requests finish
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
        info!("shutdown signal received, draining requests");
    };

    axum::serve(listener, http::router(AppState::new(engine)))
        .with_graceful_shutdown(shutdown)
        .await?;

    background.cancel();
    let _ = tokio::join!(sweep, cleanup);
    info!("chairbook stopped");
    Ok(())
}
