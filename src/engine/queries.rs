use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::conflict::{
    check_availability, validate_check_in, validate_guest_name, validate_nights, validate_unit_id,
};
use super::{Engine, EngineError, Verdict};

impl Engine {
    pub async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, EngineError> {
        Ok(self.repo.get(id).await?)
    }

    /// Bookings on a unit, ordered by check-in.
    pub async fn bookings_for_unit(&self, unit_id: &str) -> Result<Vec<Booking>, EngineError> {
        let unit_id = validate_unit_id(unit_id)?;
        let mut bookings = self.repo.find_by_unit(&unit_id).await?;
        bookings.sort_by_key(Booking::sort_key);
        Ok(bookings)
    }

    /// Bookings held by a guest across all units, ordered by check-in.
    pub async fn bookings_for_guest(&self, guest_name: &str) -> Result<Vec<Booking>, EngineError> {
        let guest_name = validate_guest_name(guest_name)?;
        let mut bookings = self.repo.find_by_guest(&guest_name).await?;
        bookings.sort_by_key(Booking::sort_key);
        Ok(bookings)
    }

    /// Dry-run admission check. Takes no locks and writes nothing, so the
    /// answer may be stale by the time a create or extend runs.
    pub async fn check_availability(
        &self,
        candidate: &Booking,
        excluding: Option<BookingId>,
    ) -> Result<Verdict, EngineError> {
        let candidate = Booking {
            guest_name: validate_guest_name(&candidate.guest_name)?,
            unit_id: validate_unit_id(&candidate.unit_id)?,
            nights: validate_nights(i64::from(candidate.nights))?,
            ..candidate.clone()
        };
        validate_check_in(candidate.check_in)?;
        Ok(check_availability(self.repo.as_ref(), &candidate, excluding).await?)
    }

    /// Free windows of a unit within `[from, to)`.
    pub async fn unit_availability(
        &self,
        unit_id: &str,
        from: Day,
        to: Day,
    ) -> Result<Vec<Span>, EngineError> {
        let unit_id = validate_unit_id(unit_id)?;
        if from >= to {
            return Err(EngineError::InvalidInput("query window is empty"));
        }
        if (to - from).num_days() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::InvalidInput("query window too wide"));
        }
        let window = Span::new(from, to);
        let booked: Vec<Span> = self
            .repo
            .find_by_unit(&unit_id)
            .await?
            .iter()
            .map(Booking::stay)
            .collect();
        Ok(free_windows(window, &booked))
    }
}
