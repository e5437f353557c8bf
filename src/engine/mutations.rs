use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::auth::Identity;
use crate::limits::*;
use crate::model::*;

use super::conflict::check_no_conflict;
use super::validate::validate_window;
use super::{BookingError, Engine, WalCommand};

/// A confirmed reservation may be cancelled by its owner only up to this
/// long before it starts; admins are exempt.
pub const CANCEL_CUTOFF_MS: Ms = 24 * HOUR_MS;

impl Engine {
    /// Administrative "add court". Courts are never deleted.
    pub async fn add_court(
        &self,
        identity: &Identity,
        id: Ulid,
        name: String,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), BookingError> {
        if !identity.is_admin {
            return Err(BookingError::PermissionDenied);
        }
        check_court_shape(&name, &metadata)?;
        if self.store.court_count() >= MAX_COURTS {
            return Err(BookingError::MalformedInput("too many courts".into()));
        }
        if self.store.contains_court(&id) {
            return Err(BookingError::CourtExists(id));
        }

        let event = Event::CourtAdded {
            id,
            name: name.clone(),
            metadata: metadata.clone(),
        };
        self.wal_append(&event).await?;
        let court = CourtState::new(id, name, metadata);
        self.store.insert_court(id, Arc::new(RwLock::new(court)));
        self.audit.send(id, &event);
        Ok(())
    }

    /// Administrative rename / metadata edit.
    pub async fn update_court(
        &self,
        identity: &Identity,
        id: Ulid,
        name: String,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), BookingError> {
        if !identity.is_admin {
            return Err(BookingError::PermissionDenied);
        }
        check_court_shape(&name, &metadata)?;
        let court = self
            .store
            .get_court(&id)
            .ok_or(BookingError::CourtNotFound(id))?;
        let mut guard = court.write().await;

        let event = Event::CourtUpdated { id, name, metadata };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Submit a reservation request. Validation, conflict check, and the
    /// pending insert all happen under the court's write lock, so two
    /// concurrent submits for overlapping slots cannot both pass the check.
    pub async fn submit(
        &self,
        identity: &Identity,
        court_id: Ulid,
        span: Span,
    ) -> Result<Reservation, BookingError> {
        let court = self
            .store
            .get_court(&court_id)
            .ok_or(BookingError::CourtNotFound(court_id))?;
        let mut guard = court.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_COURT {
            return Err(BookingError::MalformedInput(
                "too many reservations on court".into(),
            ));
        }

        let now = self.now_ms();
        validate_window(&span, now, self.skew_grace_ms)?;
        check_no_conflict(&guard, &span, None)?;

        let id = Ulid::new();
        let created_at = self.next_created_at(now);
        let event = Event::ReservationSubmitted {
            id,
            court_id,
            court_name: guard.name.clone(),
            owner_uid: identity.uid.clone(),
            owner_contact: identity.email.clone(),
            span,
            created_at,
        };
        self.persist_and_apply(court_id, &mut guard, &event).await?;

        metrics::counter!(crate::observability::RESERVATIONS_SUBMITTED_TOTAL).increment(1);
        guard
            .find(&id)
            .cloned()
            .ok_or_else(|| BookingError::Internal("reservation missing after apply".into()))
    }

    /// Administrative confirmation. Allowed from any non-terminal status;
    /// confirming an already-confirmed reservation is a no-op.
    pub async fn confirm(&self, identity: &Identity, id: Ulid) -> Result<(), BookingError> {
        if !identity.is_admin {
            return Err(BookingError::PermissionDenied);
        }
        let (court_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard.find(&id).ok_or(BookingError::NotFound(id))?;
        if reservation.status.is_terminal() {
            return Err(BookingError::InvalidState(reservation.status));
        }
        if reservation.status == ReservationStatus::Confirmed {
            return Ok(());
        }

        let event = Event::ReservationConfirmed { id, court_id };
        self.persist_and_apply(court_id, &mut guard, &event).await
    }

    /// Cancellation by the owner (subject to the 24h cutoff on confirmed
    /// reservations) or by an admin (no cutoff).
    pub async fn cancel(&self, identity: &Identity, id: Ulid) -> Result<(), BookingError> {
        let (court_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard.find(&id).ok_or(BookingError::NotFound(id))?;

        if reservation.owner_uid != identity.uid && !identity.is_admin {
            return Err(BookingError::PermissionDenied);
        }
        if reservation.status.is_terminal() {
            return Err(BookingError::InvalidState(reservation.status));
        }
        let now = self.now_ms();
        if reservation.status == ReservationStatus::Confirmed
            && !identity.is_admin
            && reservation.span.start - now < CANCEL_CUTOFF_MS
        {
            return Err(BookingError::CancellationWindowClosed);
        }

        let event = Event::ReservationCancelled {
            id,
            court_id,
            cancelled_at: now,
        };
        self.persist_and_apply(court_id, &mut guard, &event).await
    }

    /// Completion is driven by an external process once a confirmed
    /// reservation's time has passed; the engine only records the transition.
    pub async fn complete(&self, id: Ulid) -> Result<(), BookingError> {
        let (court_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard.find(&id).ok_or(BookingError::NotFound(id))?;
        if reservation.status != ReservationStatus::Confirmed {
            return Err(BookingError::InvalidState(reservation.status));
        }

        let event = Event::ReservationCompleted { id, court_id };
        self.persist_and_apply(court_id, &mut guard, &event).await
    }

    /// First janitor phase: snapshot pending reservations whose start is
    /// before `cutoff`. Lock-free (try_read), so a busy court is skipped
    /// and picked up on the next pass.
    pub fn collect_stale_pending(&self, cutoff: Ms) -> Vec<(Ulid, Ulid)> {
        let mut stale = Vec::new();
        for court_id in self.store.court_ids() {
            if let Some(court) = self.store.get_court(&court_id)
                && let Ok(guard) = court.try_read()
            {
                for r in &guard.reservations {
                    if r.status == ReservationStatus::Pending && r.span.start < cutoff {
                        stale.push((r.id, court_id));
                    }
                }
            }
        }
        stale
    }

    /// Second janitor phase: delete the stale batch. All-or-nothing — one
    /// WAL record covers every removal, applied under sorted per-court write
    /// locks. Idempotent: candidates that changed since collection are
    /// re-checked and skipped. Returns the number removed.
    pub async fn sweep_stale(&self, cutoff: Ms) -> Result<usize, BookingError> {
        let candidates = self.collect_stale_pending(cutoff);
        if candidates.is_empty() {
            return Ok(0);
        }

        // Acquire write locks in sorted order to prevent deadlocks.
        let mut court_ids: Vec<Ulid> = candidates.iter().map(|(_, cid)| *cid).collect();
        court_ids.sort();
        court_ids.dedup();

        let mut guards = HashMap::new();
        for cid in &court_ids {
            if let Some(court) = self.store.get_court(cid) {
                guards.insert(*cid, court.write_owned().await);
            }
        }

        // Re-check under the locks: a candidate may have been confirmed or
        // cancelled since collection.
        let mut removed = Vec::new();
        for (rid, cid) in candidates {
            if let Some(guard) = guards.get(&cid)
                && let Some(r) = guard.find(&rid)
                && r.status == ReservationStatus::Pending
                && r.span.start < cutoff
            {
                removed.push((rid, cid));
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        let event = Event::StaleSwept {
            removed: removed.clone(),
        };
        self.wal_append(&event).await?;
        for (rid, cid) in &removed {
            if let Some(guard) = guards.get_mut(cid) {
                guard.remove_reservation(*rid);
            }
            self.store.unindex_reservation(rid);
        }
        // Each court's audit channel only sees its own removals.
        for cid in guards.keys() {
            let scoped: Vec<(Ulid, Ulid)> = removed
                .iter()
                .filter(|(_, court)| court == cid)
                .copied()
                .collect();
            if !scoped.is_empty() {
                self.audit.send(*cid, &Event::StaleSwept { removed: scoped });
            }
        }

        metrics::counter!(crate::observability::JANITOR_SWEPT_TOTAL)
            .increment(removed.len() as u64);
        Ok(removed.len())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. The append counter is captured before the
    /// snapshot; the writer aborts the swap if any append lands in between,
    /// so an acked write can never be dropped from the rewritten file. The
    /// caller (the compactor task) simply retries on its next tick.
    pub async fn compact_wal(&self) -> Result<(), BookingError> {
        let expected_appends = self.wal_appends_since_compact().await;
        let mut events = Vec::new();
        for court_id in self.store.court_ids() {
            let Some(court) = self.store.get_court(&court_id) else {
                continue;
            };
            let guard = court.read().await;
            events.push(Event::CourtAdded {
                id: guard.id,
                name: guard.name.clone(),
                metadata: guard.metadata.clone(),
            });
            for r in &guard.reservations {
                events.push(Event::ReservationSubmitted {
                    id: r.id,
                    court_id: guard.id,
                    court_name: r.court_name.clone(),
                    owner_uid: r.owner_uid.clone(),
                    owner_contact: r.owner_contact.clone(),
                    span: r.span,
                    created_at: r.created_at,
                });
                match r.status {
                    ReservationStatus::Pending => {}
                    ReservationStatus::Confirmed => events.push(Event::ReservationConfirmed {
                        id: r.id,
                        court_id: guard.id,
                    }),
                    ReservationStatus::Cancelled => events.push(Event::ReservationCancelled {
                        id: r.id,
                        court_id: guard.id,
                        cancelled_at: r.cancelled_at.unwrap_or(r.created_at),
                    }),
                    ReservationStatus::Completed => events.push(Event::ReservationCompleted {
                        id: r.id,
                        court_id: guard.id,
                    }),
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_sender()
            .send(WalCommand::Compact {
                events,
                expected_appends,
                response: tx,
            })
            .await
            .map_err(|_| BookingError::Internal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::Internal("WAL writer dropped response".into()))?
            .map_err(|e| {
                // Includes the benign snapshot-raced-appends abort; the
                // compactor retries on its next tick.
                tracing::warn!("WAL compaction not applied: {e}");
                BookingError::Internal(e.to_string())
            })
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_sender()
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn check_court_shape(
    name: &str,
    metadata: &BTreeMap<String, String>,
) -> Result<(), BookingError> {
    if name.is_empty() {
        return Err(BookingError::MalformedInput("court name is empty".into()));
    }
    if name.len() > MAX_COURT_NAME_LEN {
        return Err(BookingError::MalformedInput("court name too long".into()));
    }
    if metadata.len() > MAX_METADATA_ENTRIES {
        return Err(BookingError::MalformedInput(
            "too many metadata entries".into(),
        ));
    }
    if metadata
        .values()
        .any(|v| v.len() > MAX_METADATA_VALUE_LEN)
    {
        return Err(BookingError::MalformedInput(
            "metadata value too long".into(),
        ));
    }
    Ok(())
}
