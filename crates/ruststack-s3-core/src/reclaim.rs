//! Background reclamation of superseded object data.
//!
//! Data blocks that no metadata record owns anymore are handed to a
//! [`DataReclaimer`], which deletes them on a background task so that the
//! request that superseded them does not wait for the data store. Failures
//! are logged and counted; they never surface to the client.
//!
//! [`OrphanGuard`] covers the window between writing new data and committing
//! the record that owns it: if the request future is dropped in between, the
//! guard schedules the fresh blocks for deletion.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::S3ServiceResult;
use crate::state::DataLocation;
use crate::storage::{DataContext, DataStore};

enum ReclaimCommand {
    Delete {
        locations: Vec<DataLocation>,
        ctx: DataContext,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Counters {
    pending: AtomicU64,
    scheduled: AtomicU64,
    reclaimed: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of reclaimer activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Batches accepted but not processed yet.
    pub pending: u64,
    /// Batches accepted so far.
    pub scheduled: u64,
    /// Blocks handed to the data store successfully.
    pub reclaimed: u64,
    /// Batches whose deletion failed.
    pub failed: u64,
}

/// Handle to the background deletion task. Cheap to clone.
#[derive(Clone)]
pub struct DataReclaimer {
    sender: mpsc::Sender<ReclaimCommand>,
    data: Arc<dyn DataStore>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for DataReclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReclaimer")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl DataReclaimer {
    /// Spawn the background task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    #[must_use]
    pub fn spawn(data: Arc<dyn DataStore>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        tokio::spawn(run(receiver, Arc::clone(&data), Arc::clone(&counters)));
        Self {
            sender,
            data,
            counters,
        }
    }

    /// Queue `locations` for deletion. Never blocks.
    pub fn schedule(&self, locations: Vec<DataLocation>, ctx: DataContext) {
        if locations.is_empty() {
            return;
        }
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        trace!(bucket = %ctx.bucket, key = %ctx.key, blocks = locations.len(), "scheduling reclaim");

        let command = ReclaimCommand::Delete { locations, ctx };
        match self.sender.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                let Ok(handle) = tokio::runtime::Handle::try_current() else {
                    self.abandon(&command, "queue full outside of a runtime");
                    return;
                };
                let sender = self.sender.clone();
                let counters = Arc::clone(&self.counters);
                handle.spawn(async move {
                    if let Err(mpsc::error::SendError(command)) = sender.send(command).await {
                        counters.pending.fetch_sub(1, Ordering::SeqCst);
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        if let ReclaimCommand::Delete { locations, ctx } = command {
                            warn!(
                                bucket = %ctx.bucket,
                                key = %ctx.key,
                                blocks = locations.len(),
                                "reclaimer stopped, leaking data"
                            );
                        }
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                self.abandon(&command, "reclaimer stopped");
            }
        }
    }

    /// Delete `locations` right away, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Whatever the data store reports.
    pub async fn delete_now(&self, locations: &[DataLocation], ctx: &DataContext) -> S3ServiceResult<()> {
        if locations.is_empty() {
            return Ok(());
        }
        self.data.batch_delete(locations, ctx).await?;
        self.counters
            .reclaimed
            .fetch_add(locations.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Wait until every batch scheduled before this call has been processed.
    pub async fn flush(&self) {
        loop {
            let (tx, rx) = oneshot::channel();
            if self.sender.send(ReclaimCommand::Flush(tx)).await.is_err() {
                return;
            }
            if rx.await.is_err() {
                return;
            }
            if self.counters.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            pending: self.counters.pending.load(Ordering::SeqCst),
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    fn abandon(&self, command: &ReclaimCommand, reason: &'static str) {
        self.counters.pending.fetch_sub(1, Ordering::SeqCst);
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        if let ReclaimCommand::Delete { locations, ctx } = command {
            warn!(
                bucket = %ctx.bucket,
                key = %ctx.key,
                blocks = locations.len(),
                reason,
                "could not schedule reclaim, leaking data"
            );
        }
    }
}

async fn run(
    mut receiver: mpsc::Receiver<ReclaimCommand>,
    data: Arc<dyn DataStore>,
    counters: Arc<Counters>,
) {
    debug!("reclaimer started");
    while let Some(command) = receiver.recv().await {
        match command {
            ReclaimCommand::Delete { locations, ctx } => {
                match data.batch_delete(&locations, &ctx).await {
                    Ok(()) => {
                        counters
                            .reclaimed
                            .fetch_add(locations.len() as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            bucket = %ctx.bucket,
                            key = %ctx.key,
                            operation = ctx.operation,
                            blocks = locations.len(),
                            error = %e,
                            "failed to reclaim data"
                        );
                    }
                }
                counters.pending.fetch_sub(1, Ordering::SeqCst);
            }
            ReclaimCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("reclaimer stopped");
}

// ---------------------------------------------------------------------------
// OrphanGuard
// ---------------------------------------------------------------------------

/// Schedules freshly written blocks for deletion unless disarmed.
#[derive(Debug)]
pub struct OrphanGuard {
    reclaimer: DataReclaimer,
    armed: Option<(Vec<DataLocation>, DataContext)>,
}

impl OrphanGuard {
    /// Guard `locations`, which no record owns yet.
    #[must_use]
    pub fn new(reclaimer: DataReclaimer, locations: Vec<DataLocation>, ctx: DataContext) -> Self {
        let armed = (!locations.is_empty()).then_some((locations, ctx));
        Self { reclaimer, armed }
    }

    /// The guarded locations.
    #[must_use]
    pub fn locations(&self) -> &[DataLocation] {
        self.armed.as_ref().map_or(&[], |(locations, _)| locations)
    }

    /// Release ownership: the blocks now belong to a committed record or
    /// have been cleaned up.
    pub fn disarm(&mut self) {
        self.armed = None;
    }
}

impl Drop for OrphanGuard {
    fn drop(&mut self) {
        if let Some((locations, ctx)) = self.armed.take() {
            debug!(bucket = %ctx.bucket, key = %ctx.key, "request abandoned, reclaiming new data");
            self.reclaimer.schedule(locations, ctx);
        }
    }
}
