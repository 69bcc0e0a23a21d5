use tokio::sync::{mpsc, oneshot};

use crate::internal::common::error::PoolError;

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Handle that enqueues closures onto the single task owning `S`.
///
/// Jobs run one after another in the order in which they were submitted, so two
/// submissions from the same thread are always applied in that order.
pub struct MainThreadExecutor<S> {
    sender: mpsc::UnboundedSender<Job<S>>,
}

impl<S> Clone for MainThreadExecutor<S> {
    fn clone(&self) -> Self {
        MainThreadExecutor {
            sender: self.sender.clone(),
        }
    }
}

impl<S: 'static> MainThreadExecutor<S> {
    pub fn new() -> (MainThreadExecutor<S>, MainThreadLoop<S>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (MainThreadExecutor { sender }, MainThreadLoop { receiver })
    }

    /// Fire and forget.
    pub fn execute<F>(&self, job: F) -> crate::Result<()>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.sender
            .send(Box::new(job))
            .map_err(|_| PoolError::PoolClosed)
    }

    /// Runs `job` on the main thread and waits for its result.
    pub async fn call<F, R>(&self, job: F) -> crate::Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.execute(move |state| {
            let _ = sender.send(job(state));
        })?;
        receiver.await.map_err(|_| PoolError::PoolClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving side of [`MainThreadExecutor`]; driven by exactly one task.
pub struct MainThreadLoop<S> {
    receiver: mpsc::UnboundedReceiver<Job<S>>,
}

impl<S> MainThreadLoop<S> {
    /// Waits for the next job; `None` once every executor is gone.
    pub async fn next_job(&mut self) -> Option<Job<S>> {
        self.receiver.recv().await
    }

    /// Runs jobs until every executor is dropped or `stop` says so.
    pub async fn run(mut self, state: &mut S, stop: impl Fn(&S) -> bool) {
        while let Some(job) = self.next_job().await {
            job(state);
            if stop(state) {
                break;
            }
        }
    }

    /// Rejects everything still queued; their `call`s resolve with `PoolClosed`.
    pub fn close(&mut self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}
