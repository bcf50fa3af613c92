use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Calendar day. Stays carry no time-of-day.
pub type Day = NaiveDate;

/// Booking identifier, assigned by the repository on insert.
pub type BookingId = Ulid;

/// Half-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Day,
    pub end: Day,
}

impl Span {
    pub fn new(start: Day, end: Day) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A reservation of one unit by one guest.
///
/// `id` is `None` while the booking is only a proposal; the repository
/// assigns it when the booking is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Option<BookingId>,
    pub guest_name: String,
    pub unit_id: String,
    pub check_in: Day,
    pub nights: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingState {
    Proposed,
    Confirmed,
}

impl Booking {
    pub fn proposed(guest_name: impl Into<String>, unit_id: impl Into<String>, check_in: Day, nights: u32) -> Self {
        Self {
            id: None,
            guest_name: guest_name.into(),
            unit_id: unit_id.into(),
            check_in,
            nights,
        }
    }

    pub fn state(&self) -> BookingState {
        if self.id.is_some() {
            BookingState::Confirmed
        } else {
            BookingState::Proposed
        }
    }

    /// Exclusive end of the stay. Saturates at the calendar limit.
    pub fn check_out(&self) -> Day {
        self.check_in
            .checked_add_days(Days::new(u64::from(self.nights)))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn stay(&self) -> Span {
        Span::new(self.check_in, self.check_out())
    }

    /// Ordering key used whenever one booking has to be picked out of several.
    pub fn sort_key(&self) -> (Day, Option<BookingId>) {
        (self.check_in, self.id)
    }
}

/// Typed filter handed to the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingQuery {
    ByUnit {
        unit_id: String,
        excluding: Option<BookingId>,
    },
    ByGuest {
        guest_name: String,
        excluding: Option<BookingId>,
    },
    ByUnitAndGuest {
        unit_id: String,
        guest_name: String,
    },
}

impl BookingQuery {
    pub fn by_unit(unit_id: impl Into<String>) -> Self {
        BookingQuery::ByUnit {
            unit_id: unit_id.into(),
            excluding: None,
        }
    }

    pub fn by_guest(guest_name: impl Into<String>) -> Self {
        BookingQuery::ByGuest {
            guest_name: guest_name.into(),
            excluding: None,
        }
    }

    pub fn by_unit_and_guest(unit_id: impl Into<String>, guest_name: impl Into<String>) -> Self {
        BookingQuery::ByUnitAndGuest {
            unit_id: unit_id.into(),
            guest_name: guest_name.into(),
        }
    }

    /// Drop one booking from the result set. No effect on `ByUnitAndGuest`.
    pub fn excluding(self, id: Option<BookingId>) -> Self {
        match self {
            BookingQuery::ByUnit { unit_id, .. } => BookingQuery::ByUnit { unit_id, excluding: id },
            BookingQuery::ByGuest { guest_name, .. } => BookingQuery::ByGuest { guest_name, excluding: id },
            other => other,
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        match self {
            BookingQuery::ByUnit { unit_id, excluding } => {
                booking.unit_id == *unit_id && !is_excluded(booking, *excluding)
            }
            BookingQuery::ByGuest { guest_name, excluding } => {
                booking.guest_name == *guest_name && !is_excluded(booking, *excluding)
            }
            BookingQuery::ByUnitAndGuest { unit_id, guest_name } => {
                booking.unit_id == *unit_id && booking.guest_name == *guest_name
            }
        }
    }
}

fn is_excluded(booking: &Booking, excluding: Option<BookingId>) -> bool {
    excluding.is_some() && booking.id == excluding
}

/// All confirmed stays of a single unit, sorted by check-in.
#[derive(Debug, Clone, Default)]
pub struct UnitLedger {
    pub stays: Vec<Booking>,
}

impl UnitLedger {
    /// Insert maintaining sort order by check-in.
    pub fn insert(&mut self, booking: Booking) {
        let pos = self
            .stays
            .binary_search_by_key(&booking.check_in, |b| b.check_in)
            .unwrap_or_else(|e| e);
        self.stays.insert(pos, booking);
    }

    pub fn remove(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.stays.iter().position(|b| b.id == Some(id))?;
        Some(self.stays.remove(pos))
    }

    pub fn get(&self, id: BookingId) -> Option<&Booking> {
        self.stays.iter().find(|b| b.id == Some(id))
    }

    /// Overwrite the stored stay with the same id, re-sorting if check-in moved.
    /// Returns the previous version, or `None` if no stay has that id.
    pub fn replace(&mut self, booking: Booking) -> Option<Booking> {
        let id = booking.id?;
        let pos = self.stays.iter().position(|b| b.id == Some(id))?;
        let previous = std::mem::replace(&mut self.stays[pos], booking);
        if previous.check_in != self.stays[pos].check_in {
            let moved = self.stays.remove(pos);
            self.insert(moved);
        }
        Some(previous)
    }

    /// Stays whose interval overlaps `query`.
    /// Binary search skips stays checking in at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.stays.partition_point(|b| b.check_in < query.end);
        let start = query.start;
        self.stays[..right_bound]
            .iter()
            .filter(move |b| b.check_out() > start)
    }

    pub fn is_empty(&self) -> bool {
        self.stays.is_empty()
    }
}

/// Durable log record. Each record carries the full booking as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated { booking: Booking },
    BookingUpdated { booking: Booking },
}

impl Event {
    pub fn booking(&self) -> &Booking {
        match self {
            Event::BookingCreated { booking } | Event::BookingUpdated { booking } => booking,
        }
    }
}

/// Inbound request for a new booking.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewBooking {
    #[serde(rename = "guestName")]
    pub guest_name: String,
    #[serde(rename = "unitID")]
    pub unit_id: String,
    #[serde(rename = "checkInDate")]
    pub check_in: Day,
    #[serde(rename = "numberOfNights")]
    pub nights: i64,
}

/// Inbound request to change the length of an existing stay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtendRequest {
    #[serde(rename = "unitID")]
    pub unit_id: String,
    #[serde(rename = "guestName")]
    pub guest_name: String,
    /// Total nights after the extension, not nights added.
    #[serde(rename = "extendedNumberOfNights")]
    pub extended_nights: i64,
}
