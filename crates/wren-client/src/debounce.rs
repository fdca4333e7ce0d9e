use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A single cancellable scheduled action.
///
/// Arming replaces any pending action, so at most one can fire, and only
/// the most recently armed one.
pub(crate) struct Debounce {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Debounce {
    pub(crate) fn new() -> Self {
        Self {
            task: Mutex::new(None),
        }
    }

    /// Schedule `action` to run after `delay`, replacing any pending one.
    pub(crate) fn arm<F>(&self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        let previous = self
            .task
            .lock()
            .expect("debounce lock poisoned")
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending action without running it.
    pub(crate) fn cancel(&self) {
        let pending = self.task.lock().expect("debounce lock poisoned").take();
        if let Some(task) = pending {
            task.abort();
        }
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.cancel();
    }
}
