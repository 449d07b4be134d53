//! Cancellable background tasks.
//!
//! Every timer or loop the engine starts is wrapped in a [`TaskHandle`]. The
//! handle cancels its task when dropped, so a task can only outlive its owner
//! by being explicitly detached.

use std::fmt;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owner of a spawned task.
#[must_use = "dropping a TaskHandle cancels the task"]
pub struct TaskHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawns `task` on the current runtime, passing it the token it must
    /// observe at every suspension point.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(task(token.clone()));
        Self { token, join }
    }

    /// Stops the task at its next suspension point. On the current-thread
    /// runtime nothing else runs before that; on a multi-thread runtime a poll
    /// already in progress on another worker completes first, so tasks that
    /// must not act after cancellation check the token under their own lock.
    pub fn cancel(&self) {
        self.token.cancel();
        self.join.abort();
    }

    /// Whether the task ran to completion or was cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::TaskHandle;

    fn ticking(counter: Arc<AtomicUsize>) -> TaskHandle {
        TaskHandle::spawn(move |token| async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(Duration::from_millis(10)) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = ticking(Arc::clone(&counter));

        tokio::time::sleep(Duration::from_millis(35)).await;
        let ticks = counter.load(Ordering::SeqCst);
        assert_eq!(ticks, 3);

        drop(handle);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_observable() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = ticking(counter);

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(handle.is_cancelled());
        assert!(handle.is_finished());
    }
}
