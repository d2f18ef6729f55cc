mod capacity;
mod error;
mod ledger;
mod matching;
mod queries;
mod reporting;
mod store;
#[cfg(test)]
mod tests;

pub use capacity::{admit, committed_capacity, load_profile};
pub use error::EngineError;
pub use matching::{evaluate, rank};
pub use reporting::{classify, utilization_percentage};
pub use store::{LedgerStore, SharedPersonState, SharedProject};

use std::io;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::config::EngineConfig;
use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush what we have before compaction/stat commands.
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(batch = batch.len(), "WAL flush failed: {e}");
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even after an append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// The capacity allocation engine: ledger, validator, matcher and reporter
/// over one durable store.
pub struct Engine {
    pub(super) store: LedgerStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) config: EngineConfig,
    /// Serialises creation of people and projects so duplicate ids cannot race.
    pub(super) catalog_lock: Mutex<()>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must be called
    /// from within a Tokio runtime.
    pub fn new(wal_path: PathBuf, config: EngineConfig) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = LedgerStore::new();
        for event in &events {
            store.apply_replayed(event);
        }
        tracing::info!(
            path = %wal_path.display(),
            events = events.len(),
            people = store.person_count(),
            projects = store.project_count(),
            "ledger replayed"
        );

        Ok(Self {
            store,
            wal_tx,
            config,
            catalog_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply to the locked person.
    pub(super) async fn persist_and_apply(
        &self,
        ps: &mut PersonState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_person(ps, event);
        Ok(())
    }

    pub(super) fn person_handle(
        &self,
        person_id: &ulid::Ulid,
    ) -> Result<SharedPersonState, EngineError> {
        self.store
            .get_person(person_id)
            .ok_or(EngineError::NotFound(*person_id))
    }

    pub(super) fn project_handle(
        &self,
        project_id: &ulid::Ulid,
    ) -> Result<SharedProject, EngineError> {
        self.store
            .get_project(project_id)
            .ok_or(EngineError::NotFound(*project_id))
    }
}
