//! Single cancellable auto-lock task.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Holder of at most one armed auto-lock task.
#[derive(Default)]
pub struct AutoLockTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoLockTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` as the armed timer, aborting any previous one first.
    pub fn arm<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(task));
    }

    /// Abort the armed task. Returns `false` if none was armed.
    pub fn cancel(&self) -> bool {
        match self.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the armed task without aborting it.
    ///
    /// Used by the task itself right before it locks the session, so the
    /// lock path does not abort the task that is running it.
    pub fn release(&self) {
        drop(self.take());
    }

    pub fn is_armed(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn take(&self) -> Option<JoinHandle<()>> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for AutoLockTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
