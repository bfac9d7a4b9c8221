//! Pool-to-node notification plumbing.
//!
//! Two mechanisms live here:
//!
//! - [`NotifyChannel`]: the pool reports the number of unsealed resident
//!   transactions to a higher layer (typically the sealer's scheduler) after
//!   every mutation that can change it. Notifications ride a bounded
//!   channel; when the channel is momentarily full, delivery is retried a
//!   fixed number of times from a background task that recomputes the count
//!   on each attempt, holding only a weak reference to the pool so teardown
//!   aborts the retry chain.
//! - [`ResultNotifierPool`]: the workers that fan out submit-result
//!   callbacks. Removing a committed batch can resolve many pending
//!   submissions at once; the workers take that dispatch off the consensus
//!   thread.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use basalt_chain::transaction::SubmitResult;

use crate::storage::PoolEntry;

/// How many times a failed notification is retried before being dropped.
pub const MAX_RETRY_NOTIFY_TIME: usize = 3;

/// The pause between notification retries.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// The pool-side handle of the unsealed-count pipe.
#[derive(Clone, Debug)]
pub struct NotifyChannel {
    sender: mpsc::Sender<usize>,
}

impl NotifyChannel {
    /// Creates the pipe, returning the pool-side handle and the receiver the
    /// higher layer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<usize>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Sends the current unsealed count.
    ///
    /// On a full channel the delivery is retried up to
    /// [`MAX_RETRY_NOTIFY_TIME`] times; `recount` is called before each
    /// retry and returning `None` (the pool is being torn down) aborts the
    /// chain. A closed channel drops the notification with a warning.
    pub fn notify(&self, count: usize, recount: impl Fn() -> Option<usize> + Send + 'static) {
        match self.sender.try_send(count) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("unsealed-count receiver is gone, dropping notification");
                return;
            }
            Err(mpsc::error::TrySendError::Full(_)) => {}
        }

        // Retries need a timer, so they run on the runtime. Outside a
        // runtime (pure unit tests driving the storage synchronously) the
        // notification is dropped instead of panicking.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime for notification retry, dropping");
            return;
        };

        let sender = self.sender.clone();
        runtime.spawn(async move {
            for _attempt in 0..MAX_RETRY_NOTIFY_TIME {
                tokio::time::sleep(RETRY_DELAY).await;

                let Some(count) = recount() else {
                    trace!("pool dropped, aborting notification retries");
                    return;
                };
                match sender.try_send(count) {
                    Ok(()) => return,
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!("unsealed-count receiver is gone, dropping notification");
                        return;
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {}
                }
            }
            warn!("dropping unsealed-count notification after retries");
        });
    }
}

/// A terminal submit result awaiting delivery to its submitter.
pub(crate) type ResultNotification = (Arc<PoolEntry>, SubmitResult);

/// The submit-result fan-out workers.
///
/// Worker tasks share one queue; each delivery consumes the entry's
/// callback slot, so a result reaches its submitter at most once no matter
/// which worker picks it up.
pub(crate) struct ResultNotifierPool {
    sender: mpsc::UnboundedSender<ResultNotification>,
    workers: Vec<JoinHandle<()>>,
}

impl ResultNotifierPool {
    /// Spawns `worker_count` notifier tasks sharing one queue. Must be
    /// called from within a tokio runtime.
    pub fn spawn(worker_count: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<ResultNotification>();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..worker_count.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    debug!(worker, "initializing submit-result notifier worker");
                    loop {
                        // The guard is released as soon as recv resolves, so
                        // the other workers deliver concurrently while this
                        // one fires its callback.
                        let notification = receiver.lock().await.recv().await;
                        let Some((entry, result)) = notification else {
                            break;
                        };
                        entry.notify_result(Ok(result));
                    }
                    debug!(worker, "submit-result notifier worker exited");
                })
            })
            .collect();
        Self { sender, workers }
    }

    /// Queues a notification, handing it back if the workers are gone.
    pub fn dispatch(&self, notification: ResultNotification) -> Result<(), ResultNotification> {
        self.sender.send(notification).map_err(|rejected| rejected.0)
    }

    /// Stops accepting notifications and waits for the workers to drain the
    /// queue.
    pub async fn stop(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
