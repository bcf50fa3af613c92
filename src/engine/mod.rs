mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{free_windows, merge_overlapping, subtract_intervals};
pub use conflict::{check_availability, Verdict};
pub use error::{EngineError, RejectionReason};

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, warn};

use crate::locks::{KeyedLocks, LockKey, LockSet};
use crate::model::*;
use crate::observability::*;
use crate::repository::{BookingRepository, RepositoryError};

/// A write that passed the availability check and is ready to hand to the store.
pub(super) enum PendingWrite {
    Insert(Booking),
    Update(BookingId, Booking),
}

/// The booking service: validates requests, checks availability and writes
/// admitted bookings through the injected repository.
///
/// Nothing is cached between calls; each decision reads the repository while
/// holding the locks of the unit and guest involved.
pub struct Engine {
    repo: Arc<dyn BookingRepository>,
    locks: Arc<KeyedLocks<LockKey>>,
}

impl Engine {
    pub fn new(repo: Arc<dyn BookingRepository>) -> Self {
        Self {
            repo,
            locks: KeyedLocks::new(),
        }
    }

    /// Admission is serialized per unit and per guest.
    pub(super) async fn lock_for(&self, unit_id: &str, guest_name: &str) -> LockSet<LockKey> {
        self.locks
            .acquire([
                LockKey::Unit(unit_id.to_string()),
                LockKey::Guest(guest_name.to_string()),
            ])
            .await
    }

    /// Map a negative verdict onto the error returned to the caller.
    pub(super) fn rejection(candidate: &Booking, verdict: Verdict) -> Result<(), EngineError> {
        match verdict {
            Verdict::Admit => Ok(()),
            Verdict::UnitOccupied { .. } => Err(EngineError::UnitOccupied(candidate.unit_id.clone())),
            Verdict::GuestDoubleBooked { .. } => {
                Err(EngineError::GuestDoubleBooked(candidate.guest_name.clone()))
            }
        }
    }

    /// Run the write on its own task. The task owns the locks, so once the write
    /// is issued it finishes (and the locks stay held) even if the caller is dropped.
    pub(super) async fn commit(
        &self,
        locks: LockSet<LockKey>,
        write: PendingWrite,
    ) -> Result<Booking, EngineError> {
        let repo = self.repo.clone();
        let task = tokio::spawn(async move {
            let _locks = locks;
            match write {
                PendingWrite::Insert(booking) => repo.insert(booking).await,
                PendingWrite::Update(id, booking) => repo.update(id, booking).await,
            }
        });

        match task.await {
            Ok(Ok(stored)) => Ok(stored),
            Ok(Err(e @ RepositoryError::Conflict { .. })) => {
                warn!("store refused admitted write: {e}");
                metrics::counter!(LATE_CONFLICTS_TOTAL).increment(1);
                Err(e.into())
            }
            Ok(Err(e)) => {
                error!("booking write failed: {e}");
                Err(e.into())
            }
            Err(e) => {
                error!("booking write task failed: {e}");
                Err(EngineError::RepositoryUnavailable(format!("write task failed: {e}")))
            }
        }
    }
}

/// Count and time one create/extend decision.
pub(super) fn record_decision(op: &'static str, result: &Result<Booking, EngineError>, started: Instant) {
    metrics::histogram!(DECISION_DURATION_SECONDS, "op" => op).record(started.elapsed().as_secs_f64());
    match result {
        Ok(_) => metrics::counter!(ADMISSIONS_TOTAL, "op" => op).increment(1),
        Err(e) => match e.reason() {
            Some(reason) => {
                metrics::counter!(REJECTIONS_TOTAL, "op" => op, "reason" => reason.as_str()).increment(1)
            }
            None => metrics::counter!(REPOSITORY_FAILURES_TOTAL, "op" => op).increment(1),
        },
    }
}
