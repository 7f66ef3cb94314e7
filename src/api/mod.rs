pub mod client;
pub mod retry;
pub mod types;

pub use client::{decode_envelope, HttpGateway, MigrationApi};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use types::{
    Credentials, DiscoveredDevice, MigrationOptions, MigrationOptionsPatch, MigrationTask,
    ScanResult, StorageKind, StorageTarget, TaskPage, TaskState, TaskStatus,
};
