//! Debouncer: a cancellable timer that only fires for the last event in a
//! quiet window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Each [`Debouncer::schedule`] cancels the pending timer (if any) and arms a
/// new one. The action runs on the Tokio runtime the debouncer was created
/// on, so `schedule` may be called from any thread.
pub struct Debouncer {
    delay: Duration,
    runtime: Handle,
    pending: Arc<Mutex<Option<Pending>>>,
    next_id: AtomicU64,
}

struct Pending {
    id: u64,
    task: JoinHandle<()>,
}

impl Debouncer {
    /// Create a debouncer bound to the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn new(delay: Duration) -> Self {
        Self::with_handle(delay, Handle::current())
    }

    pub fn with_handle(delay: Duration, runtime: Handle) -> Self {
        Self {
            delay,
            runtime,
            pending: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the timer; `action` runs once `delay` passes without another
    /// `schedule` or `cancel`.
    pub fn schedule(&self, action: impl FnOnce() + Send + 'static) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock();
        if let Some(prev) = pending.take() {
            prev.task.abort();
        }

        let delay = self.delay;
        let slot = Arc::clone(&self.pending);
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = slot.lock();
                // A newer schedule() that raced the abort owns the slot now.
                if slot.as_ref().map(|p| p.id) != Some(id) {
                    return;
                }
                *slot = None;
            }
            action();
        });
        *pending = Some(Pending { id, task });
    }

    /// Drop the pending action, if any.
    pub fn cancel(&self) {
        if let Some(prev) = self.pending.lock().take() {
            prev.task.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
