//! Embedded key-value `Store` and the `AsyncQueue` that serializes mutations
//! over it through a single worker (spec §4.1, §4.2).

pub mod containers;
pub mod queue;
pub mod store;

pub use queue::{AsyncQueue, AsyncQueueHandle, OperationPayload};
pub use store::Store;
