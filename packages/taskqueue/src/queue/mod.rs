// implementation of the serial task queue.
//
// there is no explicit container of pending items. instead, the queue threads a single "tail"
// completion through the items it admits:
//
// queue handles wrap around Arc<Shared>
//                              |
//          /-------------------/
//          v
//       shared state
//          |
//          |------ a mutex around the tail completion and the drained flag. this is only held for
//          |       the bookkeeping of one enqueue or drain call, never across the execution of an
//          |       item.
//          |
//          |------ an atomic mirror of the drained flag, for lock-free reads.
//          |
//          \------ an atomic in-flight counter, checked against the optional capacity. it is
//                  incremented under the lock on admission, but decremented without the lock
//                  when an item finishes.
//
// each admitted item is driven by its own spawned task, which first waits for the completion
// that was the tail when the item was admitted, then runs the item's body, then resolves its own
// completion. since each item's completion becomes the next item's predecessor, bodies run one
// at a time in admission order, and a failing body does not stop the chain.
//
// the organization of these modules is as such:
//
//      completion<----core: owns the shared state and the per-item driver task. safe, but
//                     ^     low-level and unopinionated about the exposed API.
//                     |
//                     api: the builder and the TaskQueue handle. the crate re-exports this API
//                          publically.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod completion;

mod core;
