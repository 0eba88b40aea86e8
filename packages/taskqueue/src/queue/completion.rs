// completion signal for admitted work.

use super::error::TaskError;
use futures::future::{FusedFuture, FutureExt, Shared};
use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;


// outcome of a single admitted unit of work.
pub(crate) type Outcome = Result<(), TaskError>;

/// Completion signal for a unit of work admitted into a [`TaskQueue`](crate::TaskQueue)
///
/// Resolves once the work has finished, to `Ok(())` if it succeeded or to the [`TaskError`]
/// it failed with. Completions are cheaply cloneable and every clone resolves to the same
/// outcome. Awaiting a completion is optional: admitted work runs whether or not anyone waits
/// for it.
///
/// The completion returned by [`TaskQueue::drain`](crate::TaskQueue::drain) belongs to the last
/// admitted item, so it resolves once all admitted work has finished.
#[derive(Clone)]
pub struct Completion(Shared<oneshot::Receiver<Outcome>>);

impl Completion {
    /// Construct a completion that has already resolved successfully
    pub fn ready() -> Self {
        let (send, completion) = Completion::pending();
        // the receiver is held by the completion, so this can't fail
        let _ = send.send(Ok(()));
        completion
    }

    // construct an unresolved completion along with the sender that resolves it.
    //
    // dropping the sender without sending resolves the completion to TaskError::Abandoned.
    pub(crate) fn pending() -> (oneshot::Sender<Outcome>, Self) {
        let (send, recv) = oneshot::channel();
        (send, Completion(recv.shared()))
    }

    /// If this completion has resolved and some clone of it has observed that, get the outcome
    pub fn peek(&self) -> Option<Result<(), TaskError>> {
        self.0.peek().map(flatten)
    }
}

fn flatten(result: &Result<Outcome, oneshot::error::RecvError>) -> Outcome {
    match result {
        Ok(outcome) => outcome.clone(),
        Err(_) => Err(TaskError::Abandoned),
    }
}

impl Future for Completion {
    type Output = Result<(), TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        self.get_mut().0.poll_unpin(cx).map(|result| flatten(&result))
    }
}

impl FusedFuture for Completion {
    fn is_terminated(&self) -> bool {
        self.0.is_terminated()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Completion::ready()
    }
}

impl Debug for Completion {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("Completion").field(&self.peek()).finish()
    }
}
