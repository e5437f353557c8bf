use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedCourtState = Arc<RwLock<CourtState>>;

/// Authoritative in-memory store: per-court shared state keyed by court id, plus
/// a reservation → court index for O(1) lifecycle lookups. Durability comes
/// from the WAL; this structure is rebuilt by replay at startup.
pub struct ReservationStore {
    courts: DashMap<Ulid, SharedCourtState>,
    /// Reverse lookup: reservation id → court id.
    reservation_index: DashMap<Ulid, Ulid>,
}

impl Default for ReservationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationStore {
    pub fn new() -> Self {
        Self {
            courts: DashMap::new(),
            reservation_index: DashMap::new(),
        }
    }

    // ── Courts ───────────────────────────────────────────────

    pub fn court_count(&self) -> usize {
        self.courts.len()
    }

    pub fn contains_court(&self, id: &Ulid) -> bool {
        self.courts.contains_key(id)
    }

    pub fn get_court(&self, id: &Ulid) -> Option<SharedCourtState> {
        self.courts.get(id).map(|e| e.value().clone())
    }

    pub fn insert_court(&self, id: Ulid, state: SharedCourtState) {
        self.courts.insert(id, state);
    }

    pub fn court_ids(&self) -> Vec<Ulid> {
        self.courts.iter().map(|e| *e.key()).collect()
    }

    // ── Reservation index ────────────────────────────────────

    pub fn court_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_index
            .get(reservation_id)
            .map(|e| *e.value())
    }

    pub fn index_reservation(&self, reservation_id: Ulid, court_id: Ulid) {
        self.reservation_index.insert(reservation_id, court_id);
    }

    pub fn unindex_reservation(&self, reservation_id: &Ulid) {
        self.reservation_index.remove(reservation_id);
    }

    // ── Event application ────────────────────────────────────

    /// Apply a court-scoped event to a locked `CourtState`, maintaining the
    /// reservation index. `CourtAdded` and `StaleSwept` operate on the court
    /// map itself and are handled at the engine level.
    pub fn apply_event(&self, court: &mut CourtState, event: &Event) {
        match event {
            Event::CourtUpdated { name, metadata, .. } => {
                court.name = name.clone();
                court.metadata = metadata.clone();
            }
            Event::ReservationSubmitted {
                id,
                court_id,
                court_name,
                owner_uid,
                owner_contact,
                span,
                created_at,
            } => {
                court.insert_reservation(Reservation {
                    id: *id,
                    court_id: *court_id,
                    court_name: court_name.clone(),
                    owner_uid: owner_uid.clone(),
                    owner_contact: owner_contact.clone(),
                    span: *span,
                    status: ReservationStatus::Pending,
                    created_at: *created_at,
                    cancelled_at: None,
                });
                self.index_reservation(*id, *court_id);
            }
            Event::ReservationConfirmed { id, .. } => {
                if let Some(r) = court.find_mut(id) {
                    r.status = ReservationStatus::Confirmed;
                }
            }
            Event::ReservationCancelled {
                id, cancelled_at, ..
            } => {
                if let Some(r) = court.find_mut(id) {
                    r.status = ReservationStatus::Cancelled;
                    r.cancelled_at = Some(*cancelled_at);
                }
            }
            Event::ReservationCompleted { id, .. } => {
                if let Some(r) = court.find_mut(id) {
                    r.status = ReservationStatus::Completed;
                }
            }
            Event::CourtAdded { .. } | Event::StaleSwept { .. } => {}
        }
    }
}
