mod durable;
mod index;
mod memory;

pub use durable::WalRepository;
pub use index::BookingIndex;
pub use memory::InMemoryRepository;

use async_trait::async_trait;

use crate::locks::LockKey;
use crate::model::{Booking, BookingId, BookingQuery};

/// Which non-overlap constraint a refused write ran into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlap {
    /// Another stay on this unit.
    Unit(String),
    /// Another stay of this guest, on a different unit.
    Guest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The store's own non-overlap constraint rejected the write.
    Conflict { overlap: Overlap, existing: BookingId },
    NotFound(BookingId),
    /// Storage or transport fault. Retryable.
    Unavailable(String),
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::Conflict { overlap: Overlap::Unit(unit), existing } => {
                write!(f, "write conflicts with booking {existing} on unit {unit}")
            }
            RepositoryError::Conflict { overlap: Overlap::Guest(guest), existing } => {
                write!(f, "write conflicts with booking {existing} held by guest {guest}")
            }
            RepositoryError::NotFound(id) => write!(f, "booking not found: {id}"),
            RepositoryError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

impl From<std::io::Error> for RepositoryError {
    fn from(e: std::io::Error) -> Self {
        RepositoryError::Unavailable(e.to_string())
    }
}

/// Read/write access to stored bookings.
///
/// Implementations must be strongly consistent per unit and per guest. They
/// must reject an insert or update whose stay overlaps another booking on the
/// same unit, or another booking of the same guest on a different unit.
#[async_trait]
pub trait BookingRepository: Send + Sync + 'static {
    async fn find(&self, query: &BookingQuery) -> Result<Vec<Booking>, RepositoryError>;

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, RepositoryError>;

    /// Persist a proposed booking and return it with its assigned id.
    async fn insert(&self, booking: Booking) -> Result<Booking, RepositoryError>;

    /// Replace the stored booking `id`.
    async fn update(&self, id: BookingId, booking: Booking) -> Result<Booking, RepositoryError>;

    async fn find_by_unit(&self, unit_id: &str) -> Result<Vec<Booking>, RepositoryError> {
        self.find(&BookingQuery::by_unit(unit_id)).await
    }

    async fn find_by_guest(&self, guest_name: &str) -> Result<Vec<Booking>, RepositoryError> {
        self.find(&BookingQuery::by_guest(guest_name)).await
    }
}

/// Keys a store write is serialized on: the unit and guest of the new version
/// and, for an update, of the version it replaces.
pub(crate) fn write_keys(booking: &Booking, current: Option<&Booking>) -> Vec<LockKey> {
    let mut keys = vec![
        LockKey::Unit(booking.unit_id.clone()),
        LockKey::Guest(booking.guest_name.clone()),
    ];
    if let Some(current) = current {
        keys.push(LockKey::Unit(current.unit_id.clone()));
        keys.push(LockKey::Guest(current.guest_name.clone()));
    }
    keys
}
