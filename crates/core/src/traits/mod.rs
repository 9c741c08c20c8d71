pub mod notifier;
pub mod store;
pub mod task_store;

pub use notifier::*;
pub use store::*;
pub use task_store::*;
