use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        maybe_compact(&engine, threshold).await;
    }
}

/// Compact if more than `threshold` appends happened since the last
/// compaction. Returns whether a compaction ran.
pub async fn maybe_compact(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends <= threshold {
        debug!(appends, threshold, "compaction not needed");
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!(appends, "compacted WAL");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}
