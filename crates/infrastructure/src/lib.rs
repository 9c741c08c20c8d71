//! 存储与通知的具体实现
//!
//! - [`redis_store`]：基于Redis的任务队列与带TTL的键值存储
//! - [`memory`]：单进程内存实现，用于嵌入式部署和测试
//! - [`database`]：基于SQLite的任务记录存储
//! - [`notify`]：完成通知的投递方式

pub mod database;
pub mod factory;
pub mod memory;
pub mod notify;
pub mod redis_store;

pub use database::SqliteTaskStore;
pub use factory::{build_notifier, build_stores, StoreBundle};
pub use memory::{MemoryStore, MemoryTaskStore};
pub use notify::{LogNotifier, WebhookNotifier};
pub use redis_store::{RedisConnectionManager, RedisStore};
