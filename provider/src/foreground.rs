//! Serial execution context for caller callbacks.

use ello_core::environment::{Foreground, Job};
use std::panic::{self, AssertUnwindSafe};
use tokio::sync::mpsc;

/// Runs caller jobs one at a time, in submission order, on a dedicated task.
///
/// Must be created inside a tokio runtime. A job that panics is logged and
/// the next job still runs. The task ends once every clone of the queue is
/// dropped and the remaining jobs have run.
#[derive(Debug, Clone)]
pub struct ForegroundQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl ForegroundQueue {
    /// Spawn the draining task.
    #[must_use]
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                // A panicking caller callback must not take the queue down.
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("Foreground job panicked");
                }
            }
            tracing::trace!("Foreground queue closed");
        });

        Self { sender }
    }
}

impl Foreground for ForegroundQueue {
    fn deliver(&self, job: Job) {
        if self.sender.send(job).is_err() {
            tracing::warn!("Foreground queue closed, dropping job");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let queue = ForegroundQueue::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..5 {
            let seen = Arc::clone(&seen);
            queue.deliver(Box::new(move || seen.lock().unwrap().push(n)));
        }

        let (done_tx, done_rx) = oneshot::channel();
        queue.deliver(Box::new(move || {
            let _ = done_tx.send(());
        }));
        done_rx.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    #[allow(clippy::panic)]
    async fn test_panicking_job_does_not_stop_the_queue() {
        let queue = ForegroundQueue::spawn();

        queue.deliver(Box::new(|| panic!("callback failed")));

        let (done_tx, done_rx) = oneshot::channel();
        queue.deliver(Box::new(move || {
            let _ = done_tx.send(42);
        }));

        assert_eq!(done_rx.await.unwrap(), 42);
    }
}
