//! Serial task queue: runs asynchronous units of work one at a time, in submission order.
//!
//! A [`TaskQueue`] admits work items and chains each one after the previously admitted item, so
//! item bodies never overlap and begin in the order their admission completed. The queue can be
//! bounded (admission fails fast when full), observed by a [`TaskMonitor`], and permanently
//! drained.
//!
//! [`OrderedEvents`](transport::OrderedEvents) shows the intended use: funnelling a transport's
//! open / message / close / error notifications into application code strictly in order.

#[macro_use]
extern crate tracing;

mod queue;
pub mod monitor;
pub mod transport;
pub mod util;

pub use crate::{
    queue::api::*,
    monitor::TaskMonitor,
};

/// Error types
pub mod error {
    pub use crate::queue::error::*;
}

/// Future types
pub mod future {
    pub use crate::queue::completion::Completion;
}
