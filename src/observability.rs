use std::net::SocketAddr;

// ── Admission metrics ───────────────────────────────────────────

/// Counter: admitted create/extend requests. Labels: op.
pub const ADMISSIONS_TOTAL: &str = "stayd_admissions_total";

/// Counter: rejected requests. Labels: op, reason.
pub const REJECTIONS_TOTAL: &str = "stayd_rejections_total";

/// Counter: requests failed by the store. Labels: op.
pub const REPOSITORY_FAILURES_TOTAL: &str = "stayd_repository_failures_total";

/// Counter: writes refused by the store's own constraint after the check passed.
pub const LATE_CONFLICTS_TOTAL: &str = "stayd_late_conflicts_total";

/// Histogram: end-to-end decision latency in seconds. Labels: op.
pub const DECISION_DURATION_SECONDS: &str = "stayd_decision_duration_seconds";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: booking log group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "stayd_wal_flush_duration_seconds";

/// Histogram: booking log group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "stayd_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
