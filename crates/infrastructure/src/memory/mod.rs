pub mod store;
pub mod task_store;

pub use store::MemoryStore;
pub use task_store::MemoryTaskStore;
