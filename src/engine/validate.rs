use crate::model::{HOUR_MS, MINUTE_MS, Ms, Span};

use super::BookingError;

pub const MIN_DURATION_MS: Ms = 30 * MINUTE_MS;
pub const MAX_DURATION_MS: Ms = 2 * HOUR_MS;

/// Default tolerance for client/server clock skew when checking that a
/// reservation starts in the future.
pub const DEFAULT_SKEW_GRACE_MS: Ms = 5 * MINUTE_MS;

/// Time-window rules for a proposed reservation. Pure: no store access,
/// `now` comes from the injected clock. Checks run in order and
/// short-circuit on the first failure.
pub fn validate_window(span: &Span, now: Ms, skew_grace_ms: Ms) -> Result<(), BookingError> {
    if span.end <= span.start {
        return Err(BookingError::InvalidRange);
    }
    if span.start < now - skew_grace_ms {
        return Err(BookingError::NotInFuture);
    }
    let duration = span.duration_ms();
    if !(MIN_DURATION_MS..=MAX_DURATION_MS).contains(&duration) {
        return Err(BookingError::DurationOutOfBounds);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Ms = 1_000 * HOUR_MS;

    fn span_at(offset: Ms, duration: Ms) -> Span {
        Span {
            start: NOW + offset,
            end: NOW + offset + duration,
        }
    }

    #[test]
    fn rejects_inverted_range() {
        let span = Span { start: NOW + HOUR_MS, end: NOW + HOUR_MS - 1 };
        assert_eq!(validate_window(&span, NOW, 0), Err(BookingError::InvalidRange));
    }

    #[test]
    fn rejects_empty_range() {
        let span = Span { start: NOW + HOUR_MS, end: NOW + HOUR_MS };
        assert_eq!(validate_window(&span, NOW, 0), Err(BookingError::InvalidRange));
    }

    #[test]
    fn range_check_runs_before_future_check() {
        // Both rules violated; the range rule wins because checks short-circuit in order.
        let span = Span { start: NOW - 2 * HOUR_MS, end: NOW - 3 * HOUR_MS };
        assert_eq!(validate_window(&span, NOW, 0), Err(BookingError::InvalidRange));
    }

    #[test]
    fn rejects_past_start() {
        let span = span_at(-HOUR_MS, HOUR_MS);
        assert_eq!(validate_window(&span, NOW, 0), Err(BookingError::NotInFuture));
    }

    #[test]
    fn skew_grace_absorbs_slightly_past_start() {
        let span = span_at(-4 * MINUTE_MS, HOUR_MS);
        assert_eq!(validate_window(&span, NOW, DEFAULT_SKEW_GRACE_MS), Ok(()));
        assert_eq!(
            validate_window(&span, NOW, 0),
            Err(BookingError::NotInFuture)
        );
    }

    #[test]
    fn rejects_too_short() {
        let span = span_at(HOUR_MS, MIN_DURATION_MS - 1);
        assert_eq!(
            validate_window(&span, NOW, 0),
            Err(BookingError::DurationOutOfBounds)
        );
    }

    #[test]
    fn rejects_too_long() {
        let span = span_at(HOUR_MS, MAX_DURATION_MS + 1);
        assert_eq!(
            validate_window(&span, NOW, 0),
            Err(BookingError::DurationOutOfBounds)
        );
    }

    #[test]
    fn accepts_duration_bounds_inclusive() {
        assert_eq!(validate_window(&span_at(HOUR_MS, MIN_DURATION_MS), NOW, 0), Ok(()));
        assert_eq!(validate_window(&span_at(HOUR_MS, MAX_DURATION_MS), NOW, 0), Ok(()));
    }

    #[test]
    fn accepts_start_exactly_now() {
        assert_eq!(validate_window(&span_at(0, HOUR_MS), NOW, 0), Ok(()));
    }
}
