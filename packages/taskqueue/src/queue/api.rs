// exposed API of the queue

use super::{
    completion::Completion,
    core,
    error::*,
};
use crate::monitor::TaskMonitor;
use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    sync::Arc,
};
use tokio::runtime::{Handle, TryCurrentError};


/// Queue that runs asynchronous units of work one at a time, in the order they were admitted
///
/// Each admitted item is chained after the item admitted before it: its body does not begin until
/// the previous item's body has finished, whether that succeeded, failed, or panicked. Items are
/// driven by tasks spawned on a tokio runtime, so they run whether or not anyone awaits their
/// [`Completion`]s. The queue only serializes items admitted through it; the runtime stays free
/// to run unrelated work concurrently.
///
/// Enqueueing never blocks and never waits for other items. It only holds an internal lock for
/// the bookkeeping of chaining, so it may be called freely from any thread, including from inside
/// a queued item. Awaiting, from inside a queued item, the completion of an item admitted later
/// into the same queue deadlocks the queue; a [`DeadlockMonitor`](crate::monitor::DeadlockMonitor)
/// helps detect that.
///
/// Cloning a `TaskQueue` creates another handle to the same queue.
#[derive(Clone)]
pub struct TaskQueue(core::Queue);

impl TaskQueue {
    /// Construct an unbounded queue on the current tokio runtime
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new() -> Self {
        TaskQueueBuilder::new().build()
    }

    /// Construct a queue that admits at most `capacity` items which have not yet completed
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_capacity(capacity: usize) -> Self {
        TaskQueueBuilder::new().capacity(capacity).build()
    }

    /// Construct an unbounded queue that reports to `monitor`
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_monitor(monitor: Arc<dyn TaskMonitor>) -> Self {
        TaskQueueBuilder::new().monitor(monitor).build()
    }

    /// Start configuring a queue
    pub fn builder() -> TaskQueueBuilder {
        TaskQueueBuilder::new()
    }

    /// Admit a unit of work which will be called with `state`
    ///
    /// On success, returns the completion of the work. `work` is not called until every item
    /// admitted before it has finished. If `work` returns an error or panics, that is reported on
    /// the returned completion and the queue carries on with the next item.
    ///
    /// Fails without blocking and without affecting the queue if:
    ///
    /// - The queue has been [drained](Self::drain), with [`DrainedError`].
    /// - The queue is bounded and as many items as its capacity have been admitted and have not
    ///   yet completed, with [`QueueFullError`].
    ///
    /// Either way, `state` is handed back in the error.
    pub fn enqueue_with<S, F, Fut, E>(
        &self,
        state: S,
        work: F,
    ) -> Result<Completion, EnqueueError<S>>
    where
        S: Send + 'static,
        F: FnOnce(S) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        if self.0.is_drained() {
            debug!("rejecting task, queue is drained");
            return Err(EnqueueError { state, cause: DrainedError.into() });
        }
        let result = self.0.lock().enqueue(state, work);
        match result {
            Ok(completion) => {
                trace!("admitted task");
                Ok(completion)
            }
            Err((cause, state)) => {
                debug!(%cause, "rejecting task");
                Err(EnqueueError { state, cause })
            }
        }
    }

    /// Admit a unit of work which takes no state
    ///
    /// Same as [`enqueue_with`](Self::enqueue_with), with `work` itself serving as the state. On
    /// rejection, `work` is handed back in the error.
    pub fn enqueue<F, Fut, E>(&self, work: F) -> Result<Completion, EnqueueError<F>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        self.enqueue_with(work, |work| work())
    }

    /// Permanently stop admitting work, and get the completion of the last admitted item
    ///
    /// The returned completion resolves once every item admitted before the drain has finished,
    /// to the outcome of the last of them. Items already admitted are not cancelled.
    ///
    /// Idempotent: calling this again returns the same completion, and never re-opens the queue.
    pub fn drain(&self) -> Completion {
        let mut lock = self.0.lock();
        if lock.drain() {
            debug!("draining task queue");
        }
        lock.tail()
    }

    /// Whether [`drain`](Self::drain) has been called on any handle to this queue
    ///
    /// Once this returns true, it always returns true. It is guaranteed to return true if called
    /// after a call to `drain` that it is synchronized with, such as an earlier call on the same
    /// thread.
    pub fn is_drained(&self) -> bool {
        self.0.is_drained()
    }

    /// Completion of the most recently admitted item, without draining
    ///
    /// If no item has been admitted, this is the queue's initial completion.
    pub fn tail(&self) -> Completion {
        self.0.lock().tail()
    }

    /// The capacity limit, if this queue is bounded
    pub fn capacity(&self) -> Option<usize> {
        self.0.capacity()
    }

    /// Number of admitted items that have not yet completed, if this queue is bounded
    ///
    /// Always 0 if this queue is unbounded. The value may be stale by the time it is used.
    pub fn in_flight(&self) -> usize {
        self.0.in_flight()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        TaskQueue::new()
    }
}

impl Debug for TaskQueue {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("capacity", &self.capacity())
            .field("in_flight", &self.in_flight())
            .field("is_drained", &self.is_drained())
            .finish()
    }
}


/// Builder for configuring a [`TaskQueue`]
pub struct TaskQueueBuilder {
    tail: Completion,
    capacity: Option<usize>,
    monitor: Option<Arc<dyn TaskMonitor>>,
    runtime: Option<Handle>,
}

impl TaskQueueBuilder {
    /// Start with an unbounded, unmonitored queue
    pub fn new() -> Self {
        TaskQueueBuilder {
            tail: Completion::ready(),
            capacity: None,
            monitor: None,
            runtime: None,
        }
    }

    /// Bound the number of admitted items which have not yet completed
    ///
    /// This counts both items waiting for their turn and the item currently running. A capacity
    /// of 0 rejects everything.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Report the execution of every admitted item to `monitor`
    pub fn monitor(mut self, monitor: Arc<dyn TaskMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Make the first admitted item wait for `completion`
    ///
    /// Useful for continuing the order of some earlier queue, such as by passing in the
    /// completion it returned from [`drain`](TaskQueue::drain).
    pub fn after(mut self, completion: Completion) -> Self {
        self.tail = completion;
        self
    }

    /// Drive admitted items on the given runtime rather than the current one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the queue
    ///
    /// Panics if no runtime was configured and this is called outside of a tokio runtime.
    pub fn build(self) -> TaskQueue {
        let runtime = self.runtime.clone().unwrap_or_else(Handle::current);
        self.build_on(runtime)
    }

    /// Build the queue, or fail if no runtime was configured and this is called outside of a
    /// tokio runtime
    pub fn try_build(self) -> Result<TaskQueue, TryCurrentError> {
        let runtime = match self.runtime.clone() {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };
        Ok(self.build_on(runtime))
    }

    fn build_on(self, runtime: Handle) -> TaskQueue {
        TaskQueue(core::Queue::new(self.tail, self.capacity, self.monitor, runtime))
    }
}

impl Default for TaskQueueBuilder {
    fn default() -> Self {
        TaskQueueBuilder::new()
    }
}

impl Debug for TaskQueueBuilder {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("TaskQueueBuilder")
            .field("capacity", &self.capacity)
            .field("monitor", &self.monitor.is_some())
            .field("runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}


// ==== tests ====
