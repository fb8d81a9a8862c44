use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation operations. Labels: op, outcome.
pub const RESERVATION_OPS_TOTAL: &str = "roomres_reservation_ops_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for a room's commit lock, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "roomres_lock_wait_seconds";

/// Counter: commit lock waits that hit the timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "roomres_lock_timeouts_total";

/// Gauge: rooms currently known to the engine.
pub const ROOMS_ACTIVE: &str = "roomres_rooms_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomres_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomres_wal_flush_batch_size";

/// Counter: background compactions run.
pub const WAL_COMPACTIONS_TOTAL: &str = "roomres_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for the result of a reservation operation.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(EngineError::Conflict(_)) => "conflict",
        Err(EngineError::RetryLater(_)) => "retry_later",
        Err(EngineError::InvalidWindow(_)) => "invalid_window",
        Err(EngineError::OccupancyOutOfRange { .. }) => "occupancy",
        Err(EngineError::RoomNotFound(_) | EngineError::NotFound(_)) => "not_found",
        Err(EngineError::NotOwner { .. }) => "not_owner",
        Err(EngineError::Internal(_)) => "internal",
        Err(_) => "rejected",
    }
}

pub fn record_op<T>(op: &'static str, result: &Result<T, EngineError>) {
    metrics::counter!(RESERVATION_OPS_TOTAL, "op" => op, "outcome" => outcome_label(result))
        .increment(1);
}
