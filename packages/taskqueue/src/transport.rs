//! Ordered delivery of transport events to application code.
//!
//! A transport such as a WebSocket client may report that the connection opened, that a message
//! arrived, that it closed, or that it failed, from whichever context it happens to be running
//! in. [`OrderedEvents`] forwards each of those notifications through a [`TaskQueue`], so that
//! the application's [`EventHandler`] sees them strictly one at a time and in the order they were
//! reported. Framing, handshakes and reconnecting are the transport's business.

use crate::{
    error::EnqueueError,
    future::Completion,
    TaskQueue,
};
use futures::future::BoxFuture;
use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};


/// Notification from a transport connection
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection was established
    Opened,
    /// A message was received
    Message(String),
    /// The connection was closed. No further events follow
    Closed,
    /// The transport encountered an error
    Error(Arc<anyhow::Error>),
}

/// Application-level receiver of transport events
///
/// The future returned by `handle` is run to completion before the next event is handed over. If
/// it fails, the failure is reported on that event's [`Completion`] and the next event is still
/// delivered.
pub trait EventHandler: Send + Sync + 'static {
    /// Process one event
    fn handle(&self, event: TransportEvent) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Adapter that forwards transport events to an [`EventHandler`] one at a time, in order
///
/// Every forwarding method returns without waiting for the handler. The returned [`Completion`]
/// resolves once the handler has processed that event.
pub struct OrderedEvents<H> {
    handler: Arc<H>,
    queue: TaskQueue,
}

impl<H: EventHandler> OrderedEvents<H> {
    /// Forward events to `handler` through `queue`
    ///
    /// A bounded queue bounds the number of events that may be pending at once. Events beyond
    /// that are rejected with [`QueueFullError`](crate::error::QueueFullError).
    pub fn new(handler: Arc<H>, queue: TaskQueue) -> Self {
        OrderedEvents { handler, queue }
    }

    /// Forward an arbitrary event
    ///
    /// On rejection the event is handed back in the error.
    pub fn forward(&self, event: TransportEvent) -> Result<Completion, EnqueueError<TransportEvent>> {
        trace!(?event, "forwarding transport event");
        let handler = Arc::clone(&self.handler);
        self.queue.enqueue_with(event, move |event| handler.handle(event))
    }

    /// The connection was established
    pub fn on_open(&self) -> Result<Completion, EnqueueError<TransportEvent>> {
        self.forward(TransportEvent::Opened)
    }

    /// A message was received
    pub fn on_message(
        &self,
        message: impl Into<String>,
    ) -> Result<Completion, EnqueueError<TransportEvent>> {
        self.forward(TransportEvent::Message(message.into()))
    }

    /// The transport encountered an error
    pub fn on_error(
        &self,
        error: impl Into<anyhow::Error>,
    ) -> Result<Completion, EnqueueError<TransportEvent>> {
        self.forward(TransportEvent::Error(Arc::new(error.into())))
    }

    /// The connection was closed
    ///
    /// Forwards the close event and then drains the queue, so any event reported afterwards is
    /// rejected with [`DrainedError`](crate::error::DrainedError). Returns the drain completion,
    /// which resolves once the handler has processed every event up to and including the close.
    ///
    /// If the close event itself cannot be admitted because the queue is full, the queue is still
    /// drained, and the close is handed back in the error. The handler then never sees the close
    /// through this adapter: callers that need it must deliver the returned event to the handler
    /// themselves, after waiting for the queue's [`drain`](TaskQueue::drain) completion.
    pub fn on_close(&self) -> Result<Completion, EnqueueError<TransportEvent>> {
        let result = self.forward(TransportEvent::Closed);
        let drained = self.queue.drain();
        result.map(|_| drained)
    }

    /// Whether the connection has been closed, or the queue otherwise drained
    pub fn is_closed(&self) -> bool {
        self.queue.is_drained()
    }

    /// The queue events are forwarded through
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }
}

impl<H> Debug for OrderedEvents<H> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("OrderedEvents")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
