// minimal safe core of the queue. the exposed API is a convenience wrapper around this.

use super::{
    completion::{Completion, Outcome},
    error::{DrainedError, EnqueueErrorCause, QueueFullError, TaskError},
};
use crate::monitor::{RunningTask, TaskMonitor};
use futures::FutureExt;
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{
            Ordering::{Acquire, Relaxed, Release},
            AtomicBool,
            AtomicUsize,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tokio::{runtime::Handle, sync::oneshot};


// handle to a queue.
#[derive(Clone)]
pub(crate) struct Queue(Arc<Shared>);

// queue shared state.
struct Shared {
    // mutex around lockable state.
    lockable: Mutex<Lockable>,

    // mirror of Lockable.drained.
    //
    // - only ever written while the lock is held, and only from false to true.
    // - written with release ordering and read with acquire ordering, so a reader that sees
    //   false may still race with a drain, but a reader that happens-after a drain sees true.
    drained: AtomicBool,

    // number of admitted items that have not yet finished. only maintained if capacity is some.
    //
    // - incremented under the lock, when admitting.
    // - decremented without the lock, when an item finishes.
    // - never observably exceeds capacity.
    in_flight: AtomicUsize,
    // maximum value of in_flight.
    capacity: Option<usize>,

    // told about every admitted item's execution.
    monitor: Option<Arc<dyn TaskMonitor>>,
    // runtime which drives admitted items.
    runtime: Handle,
}

// queue lockable state.
struct Lockable {
    // completion of the most recently admitted item, or of the initial tail.
    tail: Completion,
    // once true, never becomes false again.
    drained: bool,
}

impl Queue {
    // construct a queue whose first item waits for `tail`.
    pub(crate) fn new(
        tail: Completion,
        capacity: Option<usize>,
        monitor: Option<Arc<dyn TaskMonitor>>,
        runtime: Handle,
    ) -> Self {
        Queue(Arc::new(Shared {
            lockable: Mutex::new(Lockable { tail, drained: false }),
            drained: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            capacity,
            monitor,
            runtime,
        }))
    }

    // atomic-read the drained flag.
    pub(crate) fn is_drained(&self) -> bool {
        self.0.drained.load(Acquire)
    }

    pub(crate) fn capacity(&self) -> Option<usize> {
        self.0.capacity
    }

    // atomic-read the in-flight count. always 0 if unbounded.
    pub(crate) fn in_flight(&self) -> usize {
        self.0.in_flight.load(Relaxed)
    }

    // lock the queue.
    pub(crate) fn lock(&self) -> Lock<'_> {
        Lock {
            shared: &self.0,
            // nothing in the critical sections can panic midway through an update, so a poisoned
            // lock still guards consistent state.
            lock: self.0.lockable.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

// lock on a queue.
pub(crate) struct Lock<'a> {
    shared: &'a Arc<Shared>,
    lock: MutexGuard<'a, Lockable>,
}

impl<'a> Lock<'a> {
    // current tail.
    pub(crate) fn tail(&self) -> Completion {
        self.lock.tail.clone()
    }

    // set the drained flag. returns whether it was previously unset.
    pub(crate) fn drain(&mut self) -> bool {
        let newly = !self.lock.drained;
        self.lock.drained = true;
        self.shared.drained.store(true, Release);
        newly
    }

    // admit a unit of work, chaining it after the current tail, and return its completion.
    //
    // on error, nothing is modified and the state is returned.
    pub(crate) fn enqueue<S, F, Fut, E>(
        &mut self,
        state: S,
        work: F,
    ) -> Result<Completion, (EnqueueErrorCause, S)>
    where
        S: Send + 'static,
        F: FnOnce(S) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        if self.lock.drained {
            return Err((DrainedError.into(), state));
        }

        let admission = match Admission::acquire(self.shared) {
            Some(admission) => admission,
            None => return Err((QueueFullError.into(), state)),
        };

        let (send, completion) = Completion::pending();
        let prev = std::mem::replace(&mut self.lock.tail, completion.clone());
        self.shared.runtime.spawn(run(Arc::clone(self.shared), prev, admission, state, work, send));

        Ok(completion)
    }
}

// claim on a unit of capacity, released when dropped. a no-op if unbounded.
struct Admission(Option<Arc<Shared>>);

impl Admission {
    // try to claim a unit of capacity, or return none if the queue is full.
    fn acquire(shared: &Arc<Shared>) -> Option<Self> {
        let Some(capacity) = shared.capacity else { return Some(Admission(None)) };
        // never stores a value above capacity, not even transiently.
        shared.in_flight
            .fetch_update(Relaxed, Relaxed, |n| (n < capacity).then_some(n + 1))
            .ok()?;
        Some(Admission(Some(Arc::clone(shared))))
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if let Some(shared) = self.0.take() {
            shared.in_flight.fetch_sub(1, Relaxed);
        }
    }
}

// driver task for an admitted item.
//
// dropping this future (runtime shutdown) at any point releases the admission, calls
// task_completed if task_started was called, and resolves the item's completion to abandoned.
async fn run<S, F, Fut, E>(
    shared: Arc<Shared>,
    prev: Completion,
    admission: Admission,
    state: S,
    work: F,
    send: oneshot::Sender<Outcome>,
)
where
    F: FnOnce(S) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Into<anyhow::Error>,
{
    // the previous item's outcome is its own business
    let _ = prev.await;

    trace!("starting queued task");
    let monitor = shared.monitor.as_deref();
    let outcome = AssertUnwindSafe(async move {
        let _running = monitor.map(|monitor| RunningTask::start(monitor));
        work(state).await
    })
        .catch_unwind()
        .await;

    // release capacity before resolving, so that whoever awaits this completion can immediately
    // enqueue again.
    drop(admission);

    let outcome = match outcome {
        Ok(Ok(())) => {
            trace!("queued task completed");
            Ok(())
        }
        Ok(Err(e)) => {
            let e = TaskError::failed(e.into());
            debug!(%e, "queued task failed");
            Err(e)
        }
        Err(payload) => {
            let e = TaskError::panicked(payload);
            error!(%e, "queued task panicked");
            Err(e)
        }
    };

    // fine if nobody is listening
    let _ = send.send(outcome);
}
