pub mod provider;
pub mod storage;
pub mod task;

pub use provider::EmbeddingProvider;
pub use storage::{BackendHealth, StorageBackend};
pub use task::{Task, TaskOutput, WorkItemStream};
