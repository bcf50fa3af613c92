use serde::Serialize;

use crate::model::BookingId;
use crate::repository::{Overlap, RepositoryError};

/// Machine-readable code attached to every rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RejectionReason {
    UnitOccupied,
    GuestDoubleBooked,
    NotFound,
    InvalidInput,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::UnitOccupied => "UnitOccupied",
            RejectionReason::GuestDoubleBooked => "GuestDoubleBooked",
            RejectionReason::NotFound => "NotFound",
            RejectionReason::InvalidInput => "InvalidInput",
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    InvalidInput(&'static str),
    UnitOccupied(String),
    GuestDoubleBooked(String),
    NoBookingFor { unit_id: String, guest_name: String },
    UnknownBooking(BookingId),
    RepositoryUnavailable(String),
}

impl EngineError {
    /// `None` for storage faults, which are retryable rather than rejections.
    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            EngineError::InvalidInput(_) => Some(RejectionReason::InvalidInput),
            EngineError::UnitOccupied(_) => Some(RejectionReason::UnitOccupied),
            EngineError::GuestDoubleBooked(_) => Some(RejectionReason::GuestDoubleBooked),
            EngineError::NoBookingFor { .. } | EngineError::UnknownBooking(_) => {
                Some(RejectionReason::NotFound)
            }
            EngineError::RepositoryUnavailable(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::RepositoryUnavailable(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::UnitOccupied(unit) => {
                write!(f, "unit {unit} is already occupied for the requested dates")
            }
            EngineError::GuestDoubleBooked(guest) => {
                write!(f, "guest {guest} already holds another unit for the requested dates")
            }
            EngineError::NoBookingFor { unit_id, guest_name } => {
                write!(f, "no booking found for guest {guest_name} on unit {unit_id}")
            }
            EngineError::UnknownBooking(id) => write!(f, "booking not found: {id}"),
            EngineError::RepositoryUnavailable(e) => write!(f, "repository unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Write-path conflicts are converted by the service, which knows the candidate;
/// this mapping only covers errors surfacing from reads.
impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        match e {
            // A late refusal is the same business rejection the check would have given.
            RepositoryError::Conflict { overlap: Overlap::Unit(unit), .. } => EngineError::UnitOccupied(unit),
            RepositoryError::Conflict { overlap: Overlap::Guest(guest), .. } => {
                EngineError::GuestDoubleBooked(guest)
            }
            RepositoryError::NotFound(id) => EngineError::UnknownBooking(id),
            RepositoryError::Unavailable(msg) => EngineError::RepositoryUnavailable(msg),
        }
    }
}
