//! Cancellable periodic task driving generation advances.

use futures::FutureExt;
use life_core::{Error, Result};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How a life cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Stopped on request
    Cancelled,
    /// A tick failed while the cycle was still wanted
    Failed(Error),
    /// A tick panicked, or the runtime aborted the task
    Aborted(String),
}

/// Handle to a running life cycle.
///
/// Dropping the handle detaches the task; it keeps running until cancelled.
#[derive(Debug)]
pub struct LifeCycle {
    token: CancellationToken,
    task: JoinHandle<CycleOutcome>,
}

impl LifeCycle {
    /// Spawn a task that waits `interval`, calls `tick`, and repeats.
    ///
    /// The wait is the only suspension point. Cancelling `token` ends the task
    /// at its next wait; an error or a panic from `tick` ends it immediately.
    /// In every case `on_exit` runs once with the outcome and may rewrite it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T, E>(interval: Duration, token: CancellationToken, mut tick: T, on_exit: E) -> Self
    where
        T: FnMut() -> Result<()> + Send + 'static,
        E: FnOnce(CycleOutcome) -> CycleOutcome + Send + 'static,
    {
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let ticking = async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = task_token.cancelled() => break CycleOutcome::Cancelled,
                        _ = tokio::time::sleep(interval) => {}
                    }

                    if let Err(err) = tick() {
                        break CycleOutcome::Failed(err);
                    }
                }
            };

            let outcome = AssertUnwindSafe(ticking)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| CycleOutcome::Aborted(panic_message(payload.as_ref())));

            on_exit(outcome)
        });

        Self { token, task }
    }

    /// Request cancellation; the task notices at its next wait
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end
    pub async fn join(self) -> CycleOutcome {
        self.task
            .await
            .unwrap_or_else(|err| CycleOutcome::Aborted(err.to_string()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
