//! Query lifecycle: cache lookup, submission, polling and cancellation.

mod backoff;
mod controller;
mod handle;

pub use backoff::Backoff;
pub use controller::{PreparedQuery, QueryController};
pub use handle::{Origin, QueryHandle};
