//! Background writer for dialog persistence
//!
//! Observers queue store operations from whichever thread fired them, after
//! the bucket lock is gone, so the queue order is not the order of the
//! changes. Every operation carries the version of the snapshot it was built
//! from. The writer drops a save older than the last operation it applied to
//! the same dialog, and drops any save for a dialog that is no longer linked.
//! The removal queued on destruction is final.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

use super::record::DialogRecord;
use super::store::DialogStore;
use super::{PersistenceConfig, PersistenceMode};
use crate::dialog::DialogKey;
use crate::errors::{RegistryError, RegistryResult};
use crate::events::{CallbackTypes, DialogNotification};
use crate::introspection::DialogSnapshot;
use crate::table::DialogTable;

#[derive(Debug)]
enum StoreOp {
    Save {
        record: DialogRecord,
        version: u64,
    },
    Remove {
        key: DialogKey,
        version: u64,
        /// Queued by destruction rather than by a DELETED state
        destroyed: bool,
    },
}

impl StoreOp {
    fn save(dialog: &DialogSnapshot) -> Self {
        StoreOp::Save {
            record: DialogRecord::from(dialog),
            version: dialog.version,
        }
    }

    fn remove(dialog: &DialogSnapshot, destroyed: bool) -> Self {
        StoreOp::Remove {
            key: dialog.key(),
            version: dialog.version,
            destroyed,
        }
    }
}

/// Spawns the persistence task for a table
pub struct PersistenceWorker;

impl PersistenceWorker {
    /// Hook the table's observers for `config.mode` and spawn the writer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        table: Arc<DialogTable>,
        store: Arc<dyn DialogStore>,
        config: &PersistenceConfig,
    ) -> RegistryResult<PersistenceHandle> {
        config.validate()?;

        let mode = config.mode;
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        if mode.removes_on_destroy() {
            let realtime = mode == PersistenceMode::Realtime;
            table.callbacks().register_fn(
                CallbackTypes::CREATED | CallbackTypes::STATE_CHANGED | CallbackTypes::DESTROYED,
                move |dialog, notification| {
                    let op = match notification {
                        DialogNotification::Created if realtime => Some(StoreOp::save(dialog)),
                        DialogNotification::StateChanged { new, .. } if realtime => {
                            if new.is_deleted() {
                                Some(StoreOp::remove(dialog, false))
                            } else {
                                Some(StoreOp::save(dialog))
                            }
                        }
                        DialogNotification::Destroyed => Some(StoreOp::remove(dialog, true)),
                        _ => None,
                    };
                    if let Some(op) = op {
                        if ops_tx.send(op).is_err() {
                            debug!(dialog = %dialog.key(), "persistence worker stopped, dropping store operation");
                        }
                    }
                    Ok(())
                },
            );
        }

        let period = Duration::from_secs(u64::from(config.update_period.max(1)));
        let writer = Writer::new(table, store);
        let task = tokio::spawn(run(writer, mode, period, ops_rx, shutdown_rx));

        info!(?mode, period_secs = period.as_secs(), "dialog persistence started");
        Ok(PersistenceHandle {
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Handle on a running persistence task
pub struct PersistenceHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PersistenceHandle {
    /// Write out queued operations, run the shutdown flush and wait for the
    /// task to finish.
    pub async fn shutdown(self) -> RegistryResult<()> {
        let _ = self.shutdown.send(());
        self.task
            .await
            .map_err(|e| RegistryError::persistence(format!("persistence worker failed: {}", e)))
    }
}

async fn run(
    mut writer: Writer,
    mode: PersistenceMode,
    period: Duration,
    mut ops: mpsc::UnboundedReceiver<StoreOp>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            Some(op) = ops.recv() => writer.apply(op).await,
            _ = ticker.tick(), if mode == PersistenceMode::Delayed => writer.flush_dirty().await,
            _ = &mut shutdown => break,
        }
    }

    while let Ok(op) = ops.try_recv() {
        writer.apply(op).await;
    }

    match mode {
        PersistenceMode::Delayed => writer.flush_dirty().await,
        PersistenceMode::Shutdown => writer.save_all().await,
        PersistenceMode::None | PersistenceMode::Realtime => {}
    }

    info!(?mode, "dialog persistence stopped");
}

/// Applies store operations in version order per dialog
struct Writer {
    table: Arc<DialogTable>,
    store: Arc<dyn DialogStore>,
    /// Version of the last operation applied, per linked dialog
    applied: HashMap<DialogKey, u64>,
}

impl Writer {
    fn new(table: Arc<DialogTable>, store: Arc<dyn DialogStore>) -> Self {
        Self {
            table,
            store,
            applied: HashMap::new(),
        }
    }

    fn is_stale(&self, key: DialogKey, version: u64) -> bool {
        self.applied.get(&key).is_some_and(|&last| last > version)
    }

    async fn apply(&mut self, op: StoreOp) {
        match op {
            StoreOp::Save { record, version } => {
                let key = record.key();
                if !self.table.is_linked(key) {
                    self.applied.remove(&key);
                    debug!(dialog = %key, version, "dropping save of a destroyed dialog");
                    return;
                }
                if self.is_stale(key, version) {
                    debug!(dialog = %key, version, "dropping out of order save");
                    return;
                }
                self.applied.insert(key, version);

                match self.store.save(&record).await {
                    Ok(()) => trace!(dialog = %key, version, "dialog saved"),
                    Err(e) => error!(dialog = %key, "failed to save dialog: {:#}", e),
                }
            }
            StoreOp::Remove {
                key,
                version,
                destroyed,
            } => {
                if destroyed {
                    self.applied.remove(&key);
                } else if self.is_stale(key, version) {
                    debug!(dialog = %key, version, "dropping out of order removal");
                    return;
                } else {
                    self.applied.insert(key, version);
                }

                match self.store.remove(key).await {
                    Ok(()) => trace!(dialog = %key, version, "dialog removed from storage"),
                    Err(e) => error!(dialog = %key, "failed to remove dialog: {:#}", e),
                }
            }
        }
    }

    async fn flush_dirty(&mut self) {
        let dirty = self.table.take_dirty();
        if dirty.is_empty() {
            return;
        }
        debug!(count = dirty.len(), "flushing changed dialogs");
        for snapshot in &dirty {
            self.apply(StoreOp::save(snapshot)).await;
        }
    }

    async fn save_all(&mut self) {
        let live: Vec<_> = self
            .table
            .snapshot_all(false)
            .into_iter()
            .filter(|snapshot| !snapshot.state.is_deleted())
            .collect();
        debug!(count = live.len(), "saving all dialogs");
        for snapshot in &live {
            self.apply(StoreOp::save(snapshot)).await;
        }
    }
}
