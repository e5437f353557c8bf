use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use courtbook::api::{self, AppState};
use courtbook::audit::AuditHub;
use courtbook::auth::{Identity, TokenRegistry};
use courtbook::clock::SystemClock;
use courtbook::engine::{DEFAULT_SKEW_GRACE_MS, Engine};
use courtbook::janitor::{self, DEFAULT_SWEEP_GRACE_MS, DEFAULT_SWEEP_INTERVAL};
use courtbook::model::Ms;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("COURTBOOK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    courtbook::observability::init(metrics_port);

    let port = std::env::var("COURTBOOK_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("COURTBOOK_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("COURTBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let sweep_interval = std::env::var("COURTBOOK_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SWEEP_INTERVAL);
    let sweep_grace_ms: Ms = std::env::var("COURTBOOK_SWEEP_GRACE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SWEEP_GRACE_MS);
    let skew_grace_ms: Ms = std::env::var("COURTBOOK_SKEW_GRACE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SKEW_GRACE_MS);
    let compact_threshold: u64 = std::env::var("COURTBOOK_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let allow_test_identity = std::env::var("COURTBOOK_ALLOW_TEST_IDENTITY")
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let audit = Arc::new(AuditHub::new());
    let engine = Arc::new(Engine::new(
        PathBuf::from(&data_dir).join("courtbook.wal"),
        audit,
        Arc::new(SystemClock),
        skew_grace_ms,
    )?);

    let registry = Arc::new(TokenRegistry::new());
    if let Ok(token) = std::env::var("COURTBOOK_ADMIN_TOKEN") {
        registry.grant_admin("admin@courtbook.local");
        registry.issue(
            token,
            Identity::new("admin", "admin@courtbook.local", true),
        );
        info!("seeded admin session from COURTBOOK_ADMIN_TOKEN");
    }

    tokio::spawn(janitor::run_janitor(
        engine.clone(),
        sweep_interval,
        sweep_grace_ms,
    ));
    tokio::spawn(janitor::run_compactor(engine.clone(), compact_threshold));

    let app = api::router(AppState {
        engine,
        registry,
        allow_test_identity,
    });

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("courtbook listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  sweep: every {sweep_interval:?}, grace {sweep_grace_ms}ms");
    info!("  test identity fallback: {allow_test_identity}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Graceful shutdown on SIGTERM/ctrl-c
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
        info!("shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("courtbook stopped");
    Ok(())
}
