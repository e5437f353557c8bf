use ulid::Ulid;

use crate::model::{CourtState, Span};

use super::BookingError;

/// Reject the span if any active reservation on the court overlaps it.
///
/// Half-open semantics: a reservation ending exactly at `span.start` (or
/// starting exactly at `span.end`) does not conflict. `exclude` skips the
/// reservation being re-evaluated, for edit flows that replace their own slot.
///
/// The caller must hold the court's write lock through the subsequent
/// insert so that conflict-check-then-write is linearizable per court.
pub fn check_no_conflict(
    court: &CourtState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), BookingError> {
    for existing in court.overlapping(span) {
        if Some(existing.id) == exclude {
            continue;
        }
        if existing.status.is_active() {
            return Err(BookingError::SlotUnavailable(existing.id));
        }
    }
    Ok(())
}

/// Boolean view of the same check.
pub fn has_conflict(court: &CourtState, span: &Span, exclude: Option<Ulid>) -> bool {
    check_no_conflict(court, span, exclude).is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Ms, Reservation, ReservationStatus};
    use std::collections::BTreeMap;

    fn court_with(reservations: Vec<Reservation>) -> CourtState {
        let mut court = CourtState::new(Ulid::new(), "C1".into(), BTreeMap::new());
        for r in reservations {
            court.insert_reservation(r);
        }
        court
    }

    fn reservation(start: Ms, end: Ms, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            court_id: Ulid::new(),
            court_name: "C1".into(),
            owner_uid: "owner".into(),
            owner_contact: "owner@example.com".into(),
            span: Span::new(start, end),
            status,
            created_at: 0,
            cancelled_at: None,
        }
    }

    #[test]
    fn overlap_with_pending_conflicts() {
        let court = court_with(vec![reservation(1000, 2000, ReservationStatus::Pending)]);
        assert!(has_conflict(&court, &Span::new(1500, 2500), None));
    }

    #[test]
    fn overlap_with_confirmed_conflicts() {
        let court = court_with(vec![reservation(1000, 2000, ReservationStatus::Confirmed)]);
        assert!(has_conflict(&court, &Span::new(0, 1001), None));
    }

    #[test]
    fn cancelled_and_completed_do_not_conflict() {
        let court = court_with(vec![
            reservation(1000, 2000, ReservationStatus::Cancelled),
            reservation(1000, 2000, ReservationStatus::Completed),
        ]);
        assert_eq!(check_no_conflict(&court, &Span::new(1000, 2000), None), Ok(()));
    }

    #[test]
    fn touching_endpoints_do_not_conflict() {
        let court = court_with(vec![reservation(1000, 2000, ReservationStatus::Confirmed)]);
        assert_eq!(check_no_conflict(&court, &Span::new(2000, 3000), None), Ok(()));
        assert_eq!(check_no_conflict(&court, &Span::new(0, 1000), None), Ok(()));
    }

    #[test]
    fn containment_conflicts_both_ways() {
        let court = court_with(vec![reservation(1000, 2000, ReservationStatus::Pending)]);
        // Query inside the existing reservation
        assert!(has_conflict(&court, &Span::new(1200, 1800), None));
        // Query spanning the existing reservation
        assert!(has_conflict(&court, &Span::new(500, 2500), None));
    }

    #[test]
    fn exclude_skips_own_reservation() {
        let existing = reservation(1000, 2000, ReservationStatus::Confirmed);
        let id = existing.id;
        let court = court_with(vec![existing]);
        assert_eq!(
            check_no_conflict(&court, &Span::new(1000, 2000), Some(id)),
            Ok(())
        );
        assert!(has_conflict(&court, &Span::new(1000, 2000), Some(Ulid::new())));
    }

    #[test]
    fn reports_conflicting_reservation_id() {
        let existing = reservation(1000, 2000, ReservationStatus::Pending);
        let id = existing.id;
        let court = court_with(vec![existing]);
        assert_eq!(
            check_no_conflict(&court, &Span::new(1500, 2500), None),
            Err(BookingError::SlotUnavailable(id))
        );
    }
}
