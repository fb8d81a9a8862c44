use std::sync::Arc;

use tracing::info;

use roomres::compactor;
use roomres::config::Config;
use roomres::engine::Engine;
use roomres::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    roomres::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let wal_path = config.wal_path();
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(wal_path.clone(), config.engine.clone(), notify)?);

    info!("roomres engine ready");
    info!("  wal: {}", wal_path.display());
    info!("  timezone: {}", config.engine.timezone);
    info!(
        "  operating hours: {}-{}, max {} min",
        config.engine.window.opens_at,
        config.engine.window.closes_at,
        config.engine.window.max_duration_ms / roomres::model::MINUTE_MS
    );
    info!("  lock timeout: {:?}", config.engine.lock_timeout);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    let compactor = tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold).await;
    });

    shutdown_signal().await?;
    info!("shutdown signal received");
    compactor.abort();

    // Leave a compact log behind so the next start replays quickly.
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }

    info!("roomres stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = ctrl_c => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}
