pub mod backend;
pub mod store;

pub use backend::{BackendError, InMemoryBackend, JsonFileBackend, SnapshotBackend};
pub use store::{MemoryStore, StoreError};
