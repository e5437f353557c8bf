use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;
use crate::model::{HOUR_MS, Ms};

/// How far in the past a pending reservation's start must be before the
/// janitor deletes it.
pub const DEFAULT_SWEEP_GRACE_MS: Ms = HOUR_MS;

/// Default sweep cadence.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Background task that periodically deletes stale pending reservations.
/// Spawned once per engine, so sweeps never overlap; each pass is
/// idempotent anyway since deletion re-checks under the store locks.
pub async fn run_janitor(engine: Arc<Engine>, interval: Duration, grace_ms: Ms) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let cutoff = engine.now_ms() - grace_ms;
        match engine.sweep_stale(cutoff).await {
            Ok(0) => {}
            Ok(n) => info!("janitor removed {n} stale pending reservations"),
            Err(e) => warn!("janitor sweep failed: {e}"),
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        ticker.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
