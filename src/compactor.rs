use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::repository::WalRepository;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that compacts the booking log once enough appends piled up.
pub async fn run_compactor(repo: Arc<WalRepository>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&repo, threshold).await;
    }
}

/// Compact when `threshold` appends happened since the last compaction.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(repo: &WalRepository, threshold: u64) -> bool {
    let appends = repo.appends_since_compact().await;
    if appends < threshold.max(1) {
        return false;
    }
    match repo.compact().await {
        Ok(()) => {
            debug!("compacted booking log after {appends} appends");
            true
        }
        Err(e) => {
            error!("booking log compaction failed: {e}");
            false
        }
    }
}
