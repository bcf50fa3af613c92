use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::repository::{BookingRepository, RepositoryError};

use super::{EngineError, RejectionReason};

/// Result of checking a candidate stay against the stored bookings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    UnitOccupied { conflicting: Option<BookingId> },
    GuestDoubleBooked { conflicting: Option<BookingId> },
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Verdict::Admit)
    }

    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            Verdict::Admit => None,
            Verdict::UnitOccupied { .. } => Some(RejectionReason::UnitOccupied),
            Verdict::GuestDoubleBooked { .. } => Some(RejectionReason::GuestDoubleBooked),
        }
    }
}

/// Decide whether `candidate` may be stored.
///
/// Every booking on the candidate's unit and every booking held by the guest is
/// tested for stay overlap; `excluding` drops the booking being extended so it
/// is never compared against itself. A guest overlapping their own stay on the
/// same unit is already caught by the unit pass.
pub async fn check_availability(
    repo: &dyn BookingRepository,
    candidate: &Booking,
    excluding: Option<BookingId>,
) -> Result<Verdict, RepositoryError> {
    let stay = candidate.stay();

    let on_unit = repo
        .find(&BookingQuery::by_unit(&candidate.unit_id).excluding(excluding))
        .await?;
    if let Some(existing) = on_unit.iter().find(|b| b.stay().overlaps(&stay)) {
        debug!(
            "unit {} occupied {}..{} by {:?}",
            candidate.unit_id,
            existing.check_in,
            existing.check_out(),
            existing.id
        );
        return Ok(Verdict::UnitOccupied {
            conflicting: existing.id,
        });
    }

    let by_guest = repo
        .find(&BookingQuery::by_guest(&candidate.guest_name).excluding(excluding))
        .await?;
    if let Some(existing) = by_guest
        .iter()
        .find(|b| b.unit_id != candidate.unit_id && b.stay().overlaps(&stay))
    {
        debug!(
            "guest {} already on unit {} {}..{}",
            candidate.guest_name,
            existing.unit_id,
            existing.check_in,
            existing.check_out()
        );
        return Ok(Verdict::GuestDoubleBooked {
            conflicting: existing.id,
        });
    }

    Ok(Verdict::Admit)
}

// ── Input validation ─────────────────────────────────────────────

pub(crate) fn validate_guest_name(raw: &str) -> Result<String, EngineError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput("guest name is empty"));
    }
    if name.len() > MAX_GUEST_NAME_LEN {
        return Err(EngineError::InvalidInput("guest name too long"));
    }
    Ok(name.to_string())
}

pub(crate) fn validate_unit_id(raw: &str) -> Result<String, EngineError> {
    let unit = raw.trim();
    if unit.is_empty() {
        return Err(EngineError::InvalidInput("unit id is empty"));
    }
    if unit.len() > MAX_UNIT_ID_LEN {
        return Err(EngineError::InvalidInput("unit id too long"));
    }
    Ok(unit.to_string())
}

pub(crate) fn validate_nights(nights: i64) -> Result<u32, EngineError> {
    if nights < 1 {
        return Err(EngineError::InvalidInput("number of nights must be at least 1"));
    }
    if nights > MAX_NIGHTS {
        return Err(EngineError::InvalidInput("stay too long"));
    }
    u32::try_from(nights).map_err(|_| EngineError::InvalidInput("stay too long"))
}

pub(crate) fn validate_check_in(check_in: Day) -> Result<(), EngineError> {
    use chrono::Datelike;
    if !(MIN_CHECK_IN_YEAR..=MAX_CHECK_IN_YEAR).contains(&check_in.year()) {
        return Err(EngineError::InvalidInput("check-in date out of range"));
    }
    Ok(())
}

/// Turn a create request into a proposed booking, or say why it is malformed.
pub(crate) fn validate_new(request: NewBooking) -> Result<Booking, EngineError> {
    let guest_name = validate_guest_name(&request.guest_name)?;
    let unit_id = validate_unit_id(&request.unit_id)?;
    let nights = validate_nights(request.nights)?;
    validate_check_in(request.check_in)?;
    Ok(Booking::proposed(guest_name, unit_id, request.check_in, nights))
}
