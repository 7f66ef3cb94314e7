//! The wizard: what the user selected, where it goes, and which step they
//! are on.

pub mod actions;
pub mod path_resolver;
pub mod persistence;
pub mod store;

pub use path_resolver::{normalize_sub_path, resolve_base_path, validate_sub_path, PathError};
pub use persistence::{FileSessionStorage, MemorySessionStorage, SessionStorage, WORKFLOW_STORAGE_KEY};
pub use store::{DestinationConfig, DestinationPatch, WorkflowState, WorkflowStep, WorkflowStore};
