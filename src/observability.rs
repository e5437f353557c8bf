use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total RPC operations handled. Labels: op, status.
pub const RPC_REQUESTS_TOTAL: &str = "courtbook_rpc_requests_total";

/// Histogram: RPC latency in seconds. Labels: op.
pub const RPC_DURATION_SECONDS: &str = "courtbook_rpc_duration_seconds";

/// Counter: reservations accepted as pending.
pub const RESERVATIONS_SUBMITTED_TOTAL: &str = "courtbook_reservations_submitted_total";

/// Counter: bearer credentials rejected at the admin HTTP boundary.
pub const AUTH_FAILURES_TOTAL: &str = "courtbook_auth_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: stale pending reservations removed by the janitor.
pub const JANITOR_SWEPT_TOTAL: &str = "courtbook_janitor_swept_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
