mod conflict;
mod error;
mod mutations;
mod queries;
mod store;
mod validate;

pub use conflict::{check_no_conflict, has_conflict};
pub use error::BookingError;
pub use store::{ReservationStore, SharedCourtState};
pub use validate::{DEFAULT_SKEW_GRACE_MS, MAX_DURATION_MS, MIN_DURATION_MS, validate_window};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::audit::AuditHub;
use crate::clock::Clock;
use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        /// Append count observed when the snapshot was taken. The writer
        /// refuses the swap if the counter has advanced since: an acked
        /// append would otherwise be dropped from the rewritten file.
        expected_appends: u64,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_with_metrics(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_with_metrics(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_with_metrics(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact {
            events,
            expected_appends,
            response,
        } => {
            let result = if wal.appends_since_compact() != expected_appends {
                Err(io::Error::other("appends raced the compaction snapshot"))
            } else {
                Wal::write_compact_file(wal.path(), &events)
                    .and_then(|()| wal.swap_compact_file())
            };
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: composes validator, conflict detector, store, WAL,
/// clock, and audit hooks behind the lifecycle operations.
pub struct Engine {
    pub(super) store: ReservationStore,
    wal_tx: mpsc::Sender<WalCommand>,
    pub audit: Arc<AuditHub>,
    clock: Arc<dyn Clock>,
    /// Tolerance applied to the future-start rule, absorbing client skew.
    pub(super) skew_grace_ms: Ms,
    /// Highest created_at handed out so far; keeps createdAt non-decreasing
    /// even if the wall clock steps backwards.
    created_at_watermark: AtomicI64,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        audit: Arc<AuditHub>,
        clock: Arc<dyn Clock>,
        skew_grace_ms: Ms,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: ReservationStore::new(),
            wal_tx,
            audit,
            clock,
            skew_grace_ms,
            created_at_watermark: AtomicI64::new(0),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::CourtAdded { id, name, metadata } => {
                    let court = CourtState::new(*id, name.clone(), metadata.clone());
                    engine.store.insert_court(*id, Arc::new(RwLock::new(court)));
                }
                Event::StaleSwept { removed } => {
                    for (reservation_id, court_id) in removed {
                        if let Some(court) = engine.store.get_court(court_id) {
                            let mut guard =
                                court.try_write().expect("replay: uncontended write");
                            guard.remove_reservation(*reservation_id);
                        }
                        engine.store.unindex_reservation(reservation_id);
                    }
                }
                other => {
                    if let Event::ReservationSubmitted { created_at, .. } = other {
                        engine
                            .created_at_watermark
                            .fetch_max(*created_at, Ordering::SeqCst);
                    }
                    if let Some(court_id) = event_court_id(other)
                        && let Some(court) = engine.store.get_court(&court_id)
                    {
                        let mut guard = court.try_write().expect("replay: uncontended write");
                        engine.store.apply_event(&mut guard, other);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Server time from the injected clock.
    pub fn now_ms(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Assign a creation timestamp that never goes backwards across the store.
    pub(super) fn next_created_at(&self, now: Ms) -> Ms {
        self.created_at_watermark
            .fetch_max(now, Ordering::SeqCst)
            .max(now)
    }

    /// Write an event to the WAL via the background group-commit writer.
    /// Infrastructure failures are logged and reclassified as `Internal`.
    async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| internal("WAL writer shut down"))?;
        rx.await
            .map_err(|_| internal("WAL writer dropped response"))?
            .map_err(|e| {
                tracing::error!("WAL append failed: {e}");
                BookingError::Internal(e.to_string())
            })
    }

    pub fn get_court(&self, id: &Ulid) -> Option<SharedCourtState> {
        self.store.get_court(id)
    }

    pub fn court_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.store.court_for_reservation(reservation_id)
    }

    /// WAL-append + apply + audit in one call: nothing becomes visible in the
    /// store before it is durable, and every committed transition is emitted.
    pub(super) async fn persist_and_apply(
        &self,
        court_id: Ulid,
        court: &mut CourtState,
        event: &Event,
    ) -> Result<(), BookingError> {
        self.wal_append(event).await?;
        self.store.apply_event(court, event);
        self.audit.send(court_id, event);
        Ok(())
    }

    /// Lookup reservation → court, get the court, acquire its write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<CourtState>), BookingError> {
        let court_id = self
            .store
            .court_for_reservation(reservation_id)
            .ok_or(BookingError::NotFound(*reservation_id))?;
        let court = self
            .store
            .get_court(&court_id)
            .ok_or(BookingError::NotFound(*reservation_id))?;
        let guard = court.write_owned().await;
        Ok((court_id, guard))
    }

    pub(super) fn wal_sender(&self) -> &mpsc::Sender<WalCommand> {
        &self.wal_tx
    }
}

fn internal(msg: &str) -> BookingError {
    tracing::error!("{msg}");
    BookingError::Internal(msg.to_string())
}

/// Extract the court id from a court-scoped event.
fn event_court_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ReservationSubmitted { court_id, .. }
        | Event::ReservationConfirmed { court_id, .. }
        | Event::ReservationCancelled { court_id, .. }
        | Event::ReservationCompleted { court_id, .. } => Some(*court_id),
        Event::CourtUpdated { id, .. } => Some(*id),
        Event::CourtAdded { .. } | Event::StaleSwept { .. } => None,
    }
}
