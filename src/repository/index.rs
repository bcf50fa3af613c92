use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::{Overlap, RepositoryError};

/// In-memory booking indexes shared by the stores: per-unit ledgers,
/// booking → unit reverse lookup, guest → bookings.
///
/// `prepare_*` validate a write and turn it into an [`Event`]; `apply` makes it
/// visible. Callers hold the unit and guest locks across both so the check
/// stays valid. Readers take no locks, so `apply` never lets a booking it is
/// rewriting drop out of view.
#[derive(Default)]
pub struct BookingIndex {
    units: DashMap<String, UnitLedger>,
    booking_to_unit: DashMap<BookingId, String>,
    guests: DashMap<String, Vec<BookingId>>,
}

impl BookingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.booking_to_unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.booking_to_unit.is_empty()
    }

    pub fn get(&self, id: BookingId) -> Option<Booking> {
        loop {
            let unit = self.booking_to_unit.get(&id)?.value().clone();
            if let Some(booking) = self.units.get(&unit).and_then(|ledger| ledger.get(id).cloned()) {
                return Some(booking);
            }
            // Moved to another unit between the two lookups: follow it.
            let moved = self
                .booking_to_unit
                .get(&id)
                .is_some_and(|current| *current.value() != unit);
            if !moved {
                return None;
            }
        }
    }

    /// Matching bookings ordered by check-in, then id.
    pub fn find(&self, query: &BookingQuery) -> Vec<Booking> {
        let mut found: Vec<Booking> = match query {
            BookingQuery::ByUnit { unit_id, .. } | BookingQuery::ByUnitAndGuest { unit_id, .. } => self
                .units
                .get(unit_id)
                .map(|ledger| ledger.stays.iter().filter(|b| query.matches(b)).cloned().collect())
                .unwrap_or_default(),
            BookingQuery::ByGuest { guest_name, .. } => self
                .guest_bookings(guest_name)
                .into_iter()
                .filter(|b| query.matches(b))
                .collect(),
        };
        found.sort_by_key(Booking::sort_key);
        found
    }

    fn guest_bookings(&self, guest_name: &str) -> Vec<Booking> {
        let ids = self
            .guests
            .get(guest_name)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// First booking that the candidate's stay collides with: on its unit, or
    /// held by its guest on another unit. The candidate's own id is ignored.
    pub fn conflict(&self, candidate: &Booking) -> Option<(Overlap, BookingId)> {
        let stay = candidate.stay();
        let is_other = |b: &Booking| candidate.id.is_none() || b.id != candidate.id;

        if let Some(ledger) = self.units.get(&candidate.unit_id)
            && let Some(existing) = ledger.overlapping(&stay).filter(|&b| is_other(b)).find_map(|b| b.id)
        {
            return Some((Overlap::Unit(candidate.unit_id.clone()), existing));
        }

        self.guest_bookings(&candidate.guest_name)
            .into_iter()
            .filter(|b| is_other(b) && b.unit_id != candidate.unit_id && b.stay().overlaps(&stay))
            .find_map(|b| b.id)
            .map(|existing| (Overlap::Guest(candidate.guest_name.clone()), existing))
    }

    pub fn prepare_insert(&self, mut booking: Booking) -> Result<Event, RepositoryError> {
        if let Some((overlap, existing)) = self.conflict(&booking) {
            return Err(RepositoryError::Conflict { overlap, existing });
        }
        booking.id = Some(Ulid::new());
        Ok(Event::BookingCreated { booking })
    }

    pub fn prepare_update(&self, id: BookingId, mut booking: Booking) -> Result<Event, RepositoryError> {
        if !self.booking_to_unit.contains_key(&id) {
            return Err(RepositoryError::NotFound(id));
        }
        booking.id = Some(id);
        if let Some((overlap, existing)) = self.conflict(&booking) {
            return Err(RepositoryError::Conflict { overlap, existing });
        }
        Ok(Event::BookingUpdated { booking })
    }

    pub fn apply(&self, event: &Event) {
        match event {
            Event::BookingCreated { booking } => self.insert(booking.clone()),
            Event::BookingUpdated { booking } => self.replace(booking.clone()),
        }
    }

    /// One `BookingCreated` per live booking: the minimal log that rebuilds this index.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.len());
        for ledger in self.units.iter() {
            for booking in &ledger.stays {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }
        events
    }

    fn insert(&self, booking: Booking) {
        let Some(id) = booking.id else {
            tracing::warn!("index: ignoring booking without id for unit {}", booking.unit_id);
            return;
        };
        self.guests
            .entry(booking.guest_name.clone())
            .or_default()
            .push(id);
        let unit = booking.unit_id.clone();
        self.units.entry(unit.clone()).or_default().insert(booking);
        self.booking_to_unit.insert(id, unit);
    }

    /// Swap in the new version of a stored booking. At every step a reader
    /// finds either the old or the new version, never neither.
    fn replace(&self, booking: Booking) {
        let Some(id) = booking.id else {
            tracing::warn!("index: ignoring update without id for unit {}", booking.unit_id);
            return;
        };
        let Some(old_unit) = self.booking_to_unit.get(&id).map(|u| u.value().clone()) else {
            self.insert(booking);
            return;
        };

        let previous = if old_unit == booking.unit_id {
            self.units
                .get_mut(&old_unit)
                .and_then(|mut ledger| ledger.replace(booking.clone()))
        } else {
            // New unit first, then repoint, then drop from the old unit.
            self.units
                .entry(booking.unit_id.clone())
                .or_default()
                .insert(booking.clone());
            self.booking_to_unit.insert(id, booking.unit_id.clone());
            let previous = self
                .units
                .get_mut(&old_unit)
                .and_then(|mut ledger| ledger.remove(id));
            self.units.remove_if(&old_unit, |_, ledger| ledger.is_empty());
            previous
        };

        match previous {
            Some(previous) if previous.guest_name != booking.guest_name => {
                self.guests
                    .entry(booking.guest_name.clone())
                    .or_default()
                    .push(id);
                self.forget_guest_booking(&previous.guest_name, id);
            }
            Some(_) => {}
            None => {
                tracing::warn!("index: booking {id} missing from unit {old_unit}, reinserting");
                self.booking_to_unit.remove(&id);
                self.forget_guest_booking(&booking.guest_name, id);
                self.insert(booking);
            }
        }
    }

    fn forget_guest_booking(&self, guest_name: &str, id: BookingId) {
        if let Some(mut ids) = self.guests.get_mut(guest_name) {
            ids.retain(|b| *b != id);
        }
        self.guests.remove_if(guest_name, |_, ids| ids.is_empty());
    }
}
