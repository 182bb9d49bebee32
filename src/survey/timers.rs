//! Auto-advance timers: cancellable delayed actions keyed by step id.
//!
//! At most one pending action per key. Scheduling again for the same key
//! aborts the earlier action, and navigation cancels everything.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
pub struct AutoAdvance {
    pending: HashMap<String, JoinHandle<()>>,
}

impl AutoAdvance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay`, replacing any action pending for `key`.
    pub fn schedule_after<F>(&mut self, key: &str, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule(key, async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
    }

    /// Run `task` now, replacing any action pending for `key`. The task does
    /// its own sleeping.
    pub fn schedule<F>(&mut self, key: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel(key);
        self.pending.retain(|_, handle| !handle.is_finished());
        self.pending.insert(key.to_string(), tokio::spawn(task));
        debug!(key, "Auto-advance scheduled");
    }

    /// Abort the action pending for `key`. Returns whether one was running.
    pub fn cancel(&mut self, key: &str) -> bool {
        match self.pending.remove(key) {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                if running {
                    debug!(key, "Auto-advance cancelled");
                }
                running
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.get(key).is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AutoAdvance {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
