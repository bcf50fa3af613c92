use std::time::Instant;

use tracing::{debug, info};

use crate::model::*;

use super::conflict::{check_availability, validate_guest_name, validate_new, validate_nights, validate_unit_id};
use super::{record_decision, Engine, EngineError, PendingWrite};

impl Engine {
    /// Admit and store a new booking.
    ///
    /// Rejections carry the checker's reason unchanged; nothing is written
    /// unless the booking is admitted.
    pub async fn create_booking(&self, request: NewBooking) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.admit_new(request).await;
        record_decision("create", &result, started);
        result
    }

    /// Change the stay length of the guest's booking on `unit_id`.
    ///
    /// `extended_nights` is the new total, counted from the original check-in.
    /// If the guest holds several bookings on the unit, the one with the earliest
    /// check-in (then lowest id) is extended.
    pub async fn extend_booking(
        &self,
        unit_id: &str,
        guest_name: &str,
        extended_nights: i64,
    ) -> Result<Booking, EngineError> {
        let started = Instant::now();
        let result = self.admit_extension(unit_id, guest_name, extended_nights).await;
        record_decision("extend", &result, started);
        result
    }

    async fn admit_new(&self, request: NewBooking) -> Result<Booking, EngineError> {
        let candidate = validate_new(request)?;
        let locks = self.lock_for(&candidate.unit_id, &candidate.guest_name).await;

        let verdict = check_availability(self.repo.as_ref(), &candidate, None).await?;
        if !verdict.is_admitted() {
            debug!(
                "create rejected: guest {} unit {} from {} ({:?})",
                candidate.guest_name, candidate.unit_id, candidate.check_in, verdict
            );
        }
        Self::rejection(&candidate, verdict)?;

        let stored = self.commit(locks, PendingWrite::Insert(candidate)).await?;
        info!(
            "booking {:?} confirmed: guest {} unit {} {}..{}",
            stored.id,
            stored.guest_name,
            stored.unit_id,
            stored.check_in,
            stored.check_out()
        );
        Ok(stored)
    }

    async fn admit_extension(
        &self,
        unit_id: &str,
        guest_name: &str,
        extended_nights: i64,
    ) -> Result<Booking, EngineError> {
        let unit_id = validate_unit_id(unit_id)?;
        let guest_name = validate_guest_name(guest_name)?;
        let nights = validate_nights(extended_nights)?;
        let locks = self.lock_for(&unit_id, &guest_name).await;

        let existing = self
            .repo
            .find(&BookingQuery::by_unit_and_guest(&unit_id, &guest_name))
            .await?
            .into_iter()
            .min_by_key(Booking::sort_key)
            .ok_or_else(|| EngineError::NoBookingFor {
                unit_id: unit_id.clone(),
                guest_name: guest_name.clone(),
            })?;
        let Some(id) = existing.id else {
            return Err(EngineError::RepositoryUnavailable(
                "store returned a booking without id".into(),
            ));
        };

        let candidate = Booking {
            nights,
            ..existing.clone()
        };
        let verdict = check_availability(self.repo.as_ref(), &candidate, Some(id)).await?;
        if !verdict.is_admitted() {
            debug!(
                "extend rejected: booking {id} to {nights} nights ({:?})",
                verdict
            );
        }
        Self::rejection(&candidate, verdict)?;

        let stored = self.commit(locks, PendingWrite::Update(id, candidate)).await?;
        info!(
            "booking {id} extended: {} -> {} nights, check-out {}",
            existing.nights,
            stored.nights,
            stored.check_out()
        );
        Ok(stored)
    }
}
