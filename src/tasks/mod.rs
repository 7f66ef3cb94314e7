//! Server-owned task state: history, live snapshots and the poll loops that
//! keep them current.

pub mod history;
pub mod progress;
pub mod store;
pub mod sync;

pub use progress::{format_bytes, format_duration, ProgressAxis, ProgressView};
pub use store::{Pagination, TaskStore};
pub use sync::{reconcile, PollCadence, Reconciliation, SyncEvent, SyncState, TaskSynchronizer};
