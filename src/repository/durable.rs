use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::locks::{KeyedLocks, LockKey};
use crate::model::*;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

use super::{write_keys, BookingIndex, BookingRepository, RepositoryError};

enum LogCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the log and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One fsync for the whole batch.
/// 4. Apply the batch to the index, then answer every sender.
///
/// Applying here rather than in the caller means an acknowledged record is
/// always visible, even if the caller went away while waiting.
async fn log_writer_loop(mut wal: Wal, index: Arc<BookingIndex>, mut rx: mpsc::Receiver<LogCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            LogCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                while let Ok(next) = rx.try_recv() {
                    match next {
                        LogCommand::Append { event, response } => batch.push((event, response)),
                        other => {
                            deferred = Some(other);
                            break;
                        }
                    }
                }
                commit_batch(&mut wal, &index, batch);
                if let Some(other) = deferred {
                    handle_control(&mut wal, &index, other);
                }
            }
            other => handle_control(&mut wal, &index, other),
        }
    }
    debug!("booking log writer stopped: {}", wal.path().display());
}

fn commit_batch(wal: &mut Wal, index: &BookingIndex, batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = write_batch(wal, &batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(flush_start.elapsed().as_secs_f64());

    if result.is_ok() {
        for (event, _) in &batch {
            index.apply(event);
        }
    }
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn write_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes
    // do not leak into the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn handle_control(wal: &mut Wal, index: &BookingIndex, cmd: LogCommand) {
    match cmd {
        LogCommand::Compact { response } => {
            let events = index.snapshot();
            let result = wal.compact(&events);
            if result.is_ok() {
                info!("compacted booking log to {} records", events.len());
            }
            let _ = response.send(result);
        }
        LogCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        LogCommand::Append { event, response } => commit_batch(wal, index, vec![(event, response)]),
    }
}

/// Store backed by an append-only log on local disk.
///
/// The log is replayed into memory on open; reads are served from memory,
/// writes return once their record is fsynced.
pub struct WalRepository {
    index: Arc<BookingIndex>,
    write_locks: Arc<KeyedLocks<LockKey>>,
    log_tx: mpsc::Sender<LogCommand>,
}

impl WalRepository {
    /// Replay the log at `path` and start its writer. Must run inside a Tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let index = Arc::new(BookingIndex::new());
        for event in &events {
            index.apply(event);
        }
        info!(
            "replayed {} log records into {} bookings from {}",
            events.len(),
            index.len(),
            path.display()
        );

        let (log_tx, log_rx) = mpsc::channel(4096);
        tokio::spawn(log_writer_loop(wal, index.clone(), log_rx));

        Ok(Self {
            index,
            write_locks: KeyedLocks::new(),
            log_tx,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    async fn append(&self, event: Event) -> Result<(), RepositoryError> {
        let (tx, rx) = oneshot::channel();
        self.log_tx
            .send(LogCommand::Append { event, response: tx })
            .await
            .map_err(|_| RepositoryError::Unavailable("log writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Unavailable("log writer dropped response".into()))??;
        Ok(())
    }

    /// Rewrite the log as the minimal record set for the current bookings.
    pub async fn compact(&self) -> Result<(), RepositoryError> {
        let (tx, rx) = oneshot::channel();
        self.log_tx
            .send(LogCommand::Compact { response: tx })
            .await
            .map_err(|_| RepositoryError::Unavailable("log writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Unavailable("log writer dropped response".into()))??;
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .log_tx
            .send(LogCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl BookingRepository for WalRepository {
    async fn find(&self, query: &BookingQuery) -> Result<Vec<Booking>, RepositoryError> {
        Ok(self.index.find(query))
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.index.get(id))
    }

    async fn insert(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        let _locks = self.write_locks.acquire(write_keys(&booking, None)).await;
        let event = self.index.prepare_insert(booking)?;
        let stored = event.booking().clone();
        self.append(event).await?;
        Ok(stored)
    }

    async fn update(&self, id: BookingId, booking: Booking) -> Result<Booking, RepositoryError> {
        let current = self.index.get(id);
        let _locks = self.write_locks.acquire(write_keys(&booking, current.as_ref())).await;
        let event = self.index.prepare_update(id, booking)?;
        let stored = event.booking().clone();
        self.append(event).await?;
        Ok(stored)
    }
}
