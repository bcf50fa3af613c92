use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::locks::{KeyedLocks, LockKey};
use crate::model::*;

use super::{write_keys, BookingIndex, BookingRepository, RepositoryError};

/// Volatile store. Same constraints as the durable one, nothing survives a restart.
pub struct InMemoryRepository {
    index: BookingIndex,
    write_locks: Arc<KeyedLocks<LockKey>>,
    offline: AtomicBool,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            index: BookingIndex::new(),
            write_locks: KeyedLocks::new(),
            offline: AtomicBool::new(false),
        }
    }

    /// While offline every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn ensure_online(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for InMemoryRepository {
    async fn find(&self, query: &BookingQuery) -> Result<Vec<Booking>, RepositoryError> {
        self.ensure_online()?;
        Ok(self.index.find(query))
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        self.ensure_online()?;
        Ok(self.index.get(id))
    }

    async fn insert(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        self.ensure_online()?;
        let _locks = self.write_locks.acquire(write_keys(&booking, None)).await;
        let event = self.index.prepare_insert(booking)?;
        self.index.apply(&event);
        Ok(event.booking().clone())
    }

    async fn update(&self, id: BookingId, booking: Booking) -> Result<Booking, RepositoryError> {
        self.ensure_online()?;
        let current = self.index.get(id);
        let _locks = self.write_locks.acquire(write_keys(&booking, current.as_ref())).await;
        let event = self.index.prepare_update(id, booking)?;
        self.index.apply(&event);
        Ok(event.booking().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn proposed(unit: &str, guest: &str, check_in: &str, nights: u32) -> Booking {
        Booking::proposed(guest, unit, check_in.parse().unwrap(), nights)
    }

    #[tokio::test]
    async fn insert_then_find_by_unit_and_guest() {
        let repo = InMemoryRepository::new();
        let stored = assert_ok!(repo.insert(proposed("U1", "G1", "2024-01-01", 3)).await);
        assert!(stored.id.is_some());

        assert_eq!(repo.find_by_unit("U1").await.unwrap(), vec![stored.clone()]);
        assert_eq!(repo.find_by_guest("G1").await.unwrap(), vec![stored.clone()]);
        assert_eq!(repo.get(stored.id.unwrap()).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn insert_enforces_unit_non_overlap() {
        let repo = InMemoryRepository::new();
        repo.insert(proposed("U1", "G1", "2024-01-01", 4)).await.unwrap();
        let err = assert_err!(repo.insert(proposed("U1", "G2", "2024-01-03", 1)).await);
        assert!(matches!(err, RepositoryError::Conflict { .. }));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let repo = InMemoryRepository::new();
        let id = ulid::Ulid::new();
        let err = assert_err!(repo.update(id, proposed("U1", "G1", "2024-01-01", 1)).await);
        assert_eq!(err, RepositoryError::NotFound(id));
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let repo = InMemoryRepository::new();
        repo.set_offline(true);
        assert!(matches!(
            repo.find_by_unit("U1").await,
            Err(RepositoryError::Unavailable(_))
        ));
        assert!(matches!(
            repo.insert(proposed("U1", "G1", "2024-01-01", 1)).await,
            Err(RepositoryError::Unavailable(_))
        ));
        repo.set_offline(false);
        assert_ok!(repo.find_by_unit("U1").await);
    }
}
