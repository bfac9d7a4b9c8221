//! The expiry reaper task.
//!
//! A periodic sweep that retires transactions that outlived the pool's
//! expiry window. Each tick runs after the previous one has fully drained,
//! so a slow sweep never stacks; stopping waits for an in-flight sweep to
//! finish.

use std::{sync::Weak, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::sleep,
};
use tracing::debug;

use crate::storage::MemoryStorage;

/// Control handle of a running reaper task.
pub(crate) struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signals shutdown and waits for the in-flight sweep to drain.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// The periodic expiry sweep over the transaction pool.
pub(crate) struct Reaper;

impl Reaper {
    /// Spawns the reaper over a pool it holds only weakly, so dropping the
    /// pool ends the task.
    pub fn spawn(storage: Weak<MemoryStorage>, interval: Duration) -> ReaperHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(Self::run(storage, interval, shutdown_rx));
        ReaperHandle { shutdown, task }
    }

    async fn run(
        storage: Weak<MemoryStorage>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!(?interval, "initializing transaction pool reaper task");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(interval) => {}
            }

            let Some(storage) = storage.upgrade() else {
                break;
            };
            storage.clean_up_expired_transactions();
        }

        debug!("transaction pool reaper task exited");
    }
}
