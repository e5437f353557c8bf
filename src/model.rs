use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 3_600_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Half-open overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Active reservations count toward conflict detection.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    /// Terminal states permit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Cancelled | ReservationStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub court_id: Ulid,
    /// Court name denormalized at creation time.
    pub court_name: String,
    pub owner_uid: String,
    /// Contact (email) denormalized at creation time.
    pub owner_contact: String,
    pub span: Span,
    pub status: ReservationStatus,
    /// Server-assigned, monotonically non-decreasing across the store.
    pub created_at: Ms,
    pub cancelled_at: Option<Ms>,
}

/// Per-court state: identity, free-form metadata, and all reservations
/// sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct CourtState {
    pub id: Ulid,
    pub name: String,
    pub metadata: BTreeMap<String, String>,
    pub reservations: Vec<Reservation>,
}

impl CourtState {
    pub fn new(id: Ulid, name: String, metadata: BTreeMap<String, String>) -> Self {
        Self {
            id,
            name,
            metadata,
            reservations: Vec::new(),
        }
    }

    /// Insert a reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        if let Some(pos) = self.reservations.iter().position(|r| r.id == id) {
            Some(self.reservations.remove(pos))
        } else {
            None
        }
    }

    pub fn find(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn find_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Return only reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CourtAdded {
        id: Ulid,
        name: String,
        metadata: BTreeMap<String, String>,
    },
    CourtUpdated {
        id: Ulid,
        name: String,
        metadata: BTreeMap<String, String>,
    },
    ReservationSubmitted {
        id: Ulid,
        court_id: Ulid,
        court_name: String,
        owner_uid: String,
        owner_contact: String,
        span: Span,
        created_at: Ms,
    },
    ReservationConfirmed {
        id: Ulid,
        court_id: Ulid,
    },
    ReservationCancelled {
        id: Ulid,
        court_id: Ulid,
        cancelled_at: Ms,
    },
    ReservationCompleted {
        id: Ulid,
        court_id: Ulid,
    },
    /// One janitor pass. Carries every removed (reservation, court) pair so
    /// the whole batch replays as a unit.
    StaleSwept {
        removed: Vec<(Ulid, Ulid)>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtInfo {
    pub id: Ulid,
    pub name: String,
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(start: Ms, end: Ms, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            court_id: Ulid::new(),
            court_name: "Center Court".into(),
            owner_uid: "u1".into(),
            owner_contact: "u1@example.com".into(),
            span: Span::new(start, end),
            status,
            created_at: 0,
            cancelled_at: None,
        }
    }

    #[test]
    fn span_overlap_half_open() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn status_classification() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(!ReservationStatus::Cancelled.is_active());
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::Completed.is_terminal());
        assert!(!ReservationStatus::Pending.is_terminal());
    }

    #[test]
    fn reservations_kept_sorted() {
        let mut court = CourtState::new(Ulid::new(), "C1".into(), BTreeMap::new());
        court.insert_reservation(reservation(300, 400, ReservationStatus::Pending));
        court.insert_reservation(reservation(100, 200, ReservationStatus::Confirmed));
        court.insert_reservation(reservation(200, 300, ReservationStatus::Pending));
        let starts: Vec<Ms> = court.reservations.iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut court = CourtState::new(Ulid::new(), "C1".into(), BTreeMap::new());
        court.insert_reservation(reservation(100, 200, ReservationStatus::Pending));
        court.insert_reservation(reservation(450, 600, ReservationStatus::Pending));
        court.insert_reservation(reservation(1000, 1100, ReservationStatus::Pending));

        let hits: Vec<_> = court.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // A reservation ending exactly at query.start is NOT overlapping (half-open).
        let mut court = CourtState::new(Ulid::new(), "C1".into(), BTreeMap::new());
        court.insert_reservation(reservation(100, 200, ReservationStatus::Pending));
        assert!(court.overlapping(&Span::new(200, 300)).next().is_none());
    }

    #[test]
    fn remove_preserves_order() {
        let mut court = CourtState::new(Ulid::new(), "C1".into(), BTreeMap::new());
        let mut ids = Vec::new();
        for i in 0..3 {
            let r = reservation(i * 100, i * 100 + 50, ReservationStatus::Pending);
            ids.push(r.id);
            court.insert_reservation(r);
        }
        court.remove_reservation(ids[1]);
        assert_eq!(court.reservations.len(), 2);
        assert_eq!(court.reservations[0].id, ids[0]);
        assert_eq!(court.reservations[1].id, ids[2]);
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut court = CourtState::new(Ulid::new(), "C1".into(), BTreeMap::new());
        court.insert_reservation(reservation(100, 200, ReservationStatus::Pending));
        assert!(court.remove_reservation(Ulid::new()).is_none());
        assert_eq!(court.reservations.len(), 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationSubmitted {
            id: Ulid::new(),
            court_id: Ulid::new(),
            court_name: "Court 1".into(),
            owner_uid: "user-1".into(),
            owner_contact: "user-1@example.com".into(),
            span: Span::new(1000, 4000),
            created_at: 500,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
