// queue error types.

use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};
use thiserror::Error;


// ==== admission error types ====


/// Error for trying to enqueue into a queue whose capacity is already used up by admitted items
/// that have not yet completed
///
/// This is an expected outcome of a bounded queue, comparable to a full send buffer. It never
/// affects items that were already admitted.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("task queue is full")]
pub struct QueueFullError;

/// Error for trying to enqueue into a queue that has been drained
///
/// Items admitted before the drain still run. Wait for them with
/// [`TaskQueue::drain`](crate::TaskQueue::drain) or [`TaskQueue::tail`](crate::TaskQueue::tail).
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("task queue is drained")]
pub struct DrainedError;

macro_rules! compound_from {
    ($compound:ident {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl From<$inner> for $compound {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
}

/// Reason a unit of work was not admitted into a queue
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum EnqueueErrorCause {
    /// The capacity limit was reached
    #[error(transparent)]
    QueueFull(QueueFullError),
    /// The queue no longer admits work
    #[error(transparent)]
    Drained(DrainedError),
}

compound_from!(EnqueueErrorCause {
    QueueFull(QueueFullError),
    Drained(DrainedError),
});

/// Error for trying to enqueue a unit of work
///
/// The rejected item was not scheduled and contributed nothing to the queue's ordering. Its state
/// is handed back so the caller can retry, drop it, or report it upwards.
#[derive(Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("task not admitted: {cause}")]
pub struct EnqueueError<S> {
    /// The state that was submitted along with the rejected work
    pub state: S,
    /// The reason the work was not admitted
    pub cause: EnqueueErrorCause,
}

impl<S> EnqueueError<S> {
    /// Whether the work was rejected because the queue was full
    pub fn is_full(&self) -> bool {
        matches!(self.cause, EnqueueErrorCause::QueueFull(_))
    }

    /// Whether the work was rejected because the queue was drained
    pub fn is_drained(&self) -> bool {
        matches!(self.cause, EnqueueErrorCause::Drained(_))
    }

    /// Discard the returned state, keeping only the cause
    pub fn into_cause(self) -> EnqueueErrorCause {
        self.cause
    }
}

// the state is frequently a closure, so it's left out.
impl<S> Debug for EnqueueError<S> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("EnqueueError")
            .field("cause", &self.cause)
            .finish_non_exhaustive()
    }
}


// ==== execution error types ====


/// Way in which an admitted unit of work failed to complete successfully
///
/// Reported on that item's own [`Completion`](crate::future::Completion). It does not affect
/// the items after it, which still run once it has finished.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The work resolved to an error
    #[error("task failed: {0}")]
    Failed(Arc<anyhow::Error>),
    /// The work panicked, either when invoked or while running
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The work was dropped before finishing, e.g. because its runtime shut down
    #[error("task abandoned before completing")]
    Abandoned,
}

impl TaskError {
    // wrap an error returned by a unit of work.
    pub(crate) fn failed(error: anyhow::Error) -> Self {
        TaskError::Failed(Arc::new(error))
    }

    // convert a caught panic payload.
    pub(crate) fn panicked(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(&s) = payload.downcast_ref::<&'static str>() {
            s.to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_owned()
        };
        TaskError::Panicked(msg)
    }
}
