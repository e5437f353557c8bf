use ulid::Ulid;

use crate::model::ReservationStatus;

/// Typed booking errors. Every variant except `Internal` is a user-facing
/// business outcome with a stable code; `Internal` hides infrastructure
/// detail behind a generic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    MalformedInput(String),
    InvalidRange,
    NotInFuture,
    DurationOutOfBounds,
    CourtNotFound(Ulid),
    CourtExists(Ulid),
    SlotUnavailable(Ulid),
    NotFound(Ulid),
    PermissionDenied,
    Unauthenticated,
    InvalidState(ReservationStatus),
    CancellationWindowClosed,
    Internal(String),
}

impl BookingError {
    /// Stable machine-readable code, independent of the display message.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::MalformedInput(_) => "malformed_input",
            BookingError::InvalidRange => "invalid_range",
            BookingError::NotInFuture => "not_in_future",
            BookingError::DurationOutOfBounds => "duration_out_of_bounds",
            BookingError::CourtNotFound(_) => "court_not_found",
            BookingError::CourtExists(_) => "court_exists",
            BookingError::SlotUnavailable(_) => "slot_unavailable",
            BookingError::NotFound(_) => "not_found",
            BookingError::PermissionDenied => "permission_denied",
            BookingError::Unauthenticated => "unauthenticated",
            BookingError::InvalidState(_) => "invalid_state",
            BookingError::CancellationWindowClosed => "cancellation_window_closed",
            BookingError::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::MalformedInput(msg) => write!(f, "malformed input: {msg}"),
            BookingError::InvalidRange => write!(f, "end time must be after start time"),
            BookingError::NotInFuture => write!(f, "reservation must be in the future"),
            BookingError::DurationOutOfBounds => {
                write!(f, "duration must be between 30 minutes and 2 hours")
            }
            BookingError::CourtNotFound(id) => write!(f, "court not found: {id}"),
            BookingError::CourtExists(id) => write!(f, "court already exists: {id}"),
            BookingError::SlotUnavailable(id) => {
                write!(f, "court is already booked for that time (conflict with {id})")
            }
            BookingError::NotFound(id) => write!(f, "reservation not found: {id}"),
            BookingError::PermissionDenied => write!(f, "permission denied"),
            BookingError::Unauthenticated => write!(f, "authentication required"),
            BookingError::InvalidState(status) => {
                write!(f, "reservation is already {status}")
            }
            BookingError::CancellationWindowClosed => {
                write!(f, "confirmed reservations cannot be cancelled less than 24h before start")
            }
            BookingError::Internal(_) => write!(f, "internal server error"),
        }
    }
}

impl std::error::Error for BookingError {}
