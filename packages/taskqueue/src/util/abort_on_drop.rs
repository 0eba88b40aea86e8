//! Tokio utility.

use std::future::Future;
use tokio::{
    runtime::Handle,
    task::{
        spawn,
        AbortHandle,
    },
};


/// Wrapper around a tokio task that aborts it if dropped.
///
/// Used for background tasks whose lifetime is tied to some owning value, such as the watchdog
/// of a [`DeadlockMonitor`](crate::monitor::DeadlockMonitor).
#[derive(Debug)]
pub struct AbortOnDrop(AbortHandle);

impl AbortOnDrop {
    /// Spawn a tokio task on the current runtime and wrap with self.
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn spawn<F>(f: F) -> Self
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        AbortOnDrop(spawn(f).abort_handle())
    }

    /// Spawn a tokio task on the given runtime and wrap with self.
    pub fn spawn_on<F>(runtime: &Handle, f: F) -> Self
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        AbortOnDrop(runtime.spawn(f).abort_handle())
    }

    /// Whether the task has stopped, by finishing or being aborted.
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
