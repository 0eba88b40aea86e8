//! Observing the lifecycle of queued work.
//!
//! A [`TaskQueue`](crate::TaskQueue) tells its monitor when each admitted item starts and when it
//! finishes. An item that starts and never finishes stalls every item behind it, and a monitor is
//! how that gets noticed from the outside. [`DeadlockMonitor`] is a ready-made monitor that does
//! exactly that.

use crate::util::AbortOnDrop;
use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    runtime::{Handle, TryCurrentError},
    time::{interval_at, Instant, MissedTickBehavior},
};


/// Observer of work items' execution, used to detect items that start but never complete
///
/// For every admitted item that begins executing, the queue calls `task_started` exactly once
/// before invoking it and `task_completed` exactly once after it finishes, whether it succeeded,
/// failed, or panicked. Both are called inline in the queue's chain, so implementations must not
/// block. A panic from either is treated as a failure of the item being run. If `task_started`
/// panics, the item never begins executing, so no `task_completed` follows for it.
pub trait TaskMonitor: Send + Sync {
    /// An item is about to start executing
    fn task_started(&self);

    /// The item that most recently started has finished executing
    fn task_completed(&self);
}

// calls task_completed when dropped, so that it also happens if the item panics or its task is
// dropped.
pub(crate) struct RunningTask<'a>(&'a dyn TaskMonitor);

impl<'a> RunningTask<'a> {
    pub(crate) fn start(monitor: &'a dyn TaskMonitor) -> Self {
        monitor.task_started();
        RunningTask(monitor)
    }
}

impl<'a> Drop for RunningTask<'a> {
    fn drop(&mut self) {
        self.0.task_completed();
    }
}


/// Error reported by a [`DeadlockMonitor`] for an item that has been running for too long
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[error("task has been running for {elapsed:?} (limit {timeout:?}), possible deadlock")]
pub struct SuspectedDeadlockError {
    /// How long the item had been running when it was reported
    pub elapsed: Duration,
    /// The configured limit
    pub timeout: Duration,
}

/// Error for constructing a [`DeadlockMonitor`] with a zero timeout
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[error("deadlock monitor timeout must be non-zero")]
pub struct ZeroTimeoutError;

/// Error for trying to construct a [`DeadlockMonitor`]
#[derive(Error, Debug)]
pub enum DeadlockMonitorError {
    /// The timeout was zero
    #[error(transparent)]
    ZeroTimeout(#[from] ZeroTimeoutError),
    /// No runtime was given and there is no current tokio runtime
    #[error(transparent)]
    NoRuntime(#[from] TryCurrentError),
}

/// [`TaskMonitor`] that reports items which run for longer than a timeout
///
/// A watchdog task checks once per `timeout` whether an item is running and has been for at least
/// `timeout`. If so, it logs a warning and calls the supplied callback, once per item. Reports
/// are diagnostics only: the slow item keeps running and the queue is unaffected.
///
/// The watchdog runs on the tokio runtime the monitor was created in (or the one passed to
/// [`new_on`](Self::new_on)), and stops when the monitor is dropped. A monitor is meant to
/// observe a single queue.
pub struct DeadlockMonitor {
    watch: Arc<Watch>,
    _watchdog: AbortOnDrop,
}

// state shared between the monitor and its watchdog task.
struct Watch {
    timeout: Duration,
    running: Mutex<Running>,
    on_suspected: Box<dyn Fn(SuspectedDeadlockError) + Send + Sync>,
}

#[derive(Default)]
struct Running {
    // incremented every time an item starts.
    generation: u64,
    // start instant of the running item, if any.
    since: Option<Instant>,
    // generation of the last item that was reported.
    reported: Option<u64>,
}

impl DeadlockMonitor {
    /// Construct and start the watchdog on the current tokio runtime
    ///
    /// Panics if `timeout` is zero, or if called outside of a tokio runtime. See
    /// [`try_new`](Self::try_new) for the fallible version.
    pub fn new<F>(timeout: Duration, on_suspected: F) -> Self
    where
        F: Fn(SuspectedDeadlockError) + Send + Sync + 'static,
    {
        match Self::try_new(timeout, on_suspected) {
            Ok(monitor) => monitor,
            Err(e) => panic!("{}", e),
        }
    }

    /// Construct and start the watchdog on the current tokio runtime, or fail if `timeout` is zero
    /// or this is called outside of a tokio runtime
    pub fn try_new<F>(timeout: Duration, on_suspected: F) -> Result<Self, DeadlockMonitorError>
    where
        F: Fn(SuspectedDeadlockError) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()?;
        Self::new_on(&runtime, timeout, on_suspected)
    }

    /// Construct and start the watchdog on the given runtime, or fail if `timeout` is zero
    pub fn new_on<F>(
        runtime: &Handle,
        timeout: Duration,
        on_suspected: F,
    ) -> Result<Self, DeadlockMonitorError>
    where
        F: Fn(SuspectedDeadlockError) + Send + Sync + 'static,
    {
        if timeout.is_zero() {
            return Err(ZeroTimeoutError.into());
        }
        let watch = Arc::new(Watch {
            timeout,
            running: Mutex::new(Running::default()),
            on_suspected: Box::new(on_suspected),
        });
        let watchdog = AbortOnDrop::spawn_on(runtime, {
            let watch = Arc::clone(&watch);
            async move {
                let mut ticks = interval_at(Instant::now() + timeout, timeout);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    watch.check(Instant::now());
                }
            }
        });
        Ok(DeadlockMonitor { watch, _watchdog: watchdog })
    }

    /// The configured timeout
    pub fn timeout(&self) -> Duration {
        self.watch.timeout
    }

    /// How long the currently running item has been running, if any
    pub fn running_for(&self) -> Option<Duration> {
        self.watch.lock().since.map(|since| since.elapsed())
    }
}

impl Watch {
    fn lock(&self) -> std::sync::MutexGuard<'_, Running> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // report the running item if it's overdue and not yet reported.
    fn check(&self, now: Instant) {
        let suspected = {
            let mut running = self.lock();
            let Some(since) = running.since else { return };
            let elapsed = now.saturating_duration_since(since);
            if elapsed < self.timeout || running.reported == Some(running.generation) {
                return;
            }
            running.reported = Some(running.generation);
            SuspectedDeadlockError { elapsed, timeout: self.timeout }
        };
        // callback runs without the lock held so it may freely use the queue.
        warn!(%suspected, "suspected deadlock in queued task");
        (self.on_suspected)(suspected);
    }
}

impl TaskMonitor for DeadlockMonitor {
    fn task_started(&self) {
        let mut running = self.watch.lock();
        running.generation += 1;
        running.since = Some(Instant::now());
    }

    fn task_completed(&self) {
        self.watch.lock().since = None;
    }
}

impl Debug for DeadlockMonitor {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("DeadlockMonitor")
            .field("timeout", &self.watch.timeout)
            .field("running_for", &self.running_for())
            .finish()
    }
}
