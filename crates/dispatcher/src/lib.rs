//! # Recon Dispatcher
//!
//! 调度子系统：任务队列、拉取式派发、任务生命周期、进度聚合、
//! Worker心跳与控制通道，以及已认领任务的恢复。
//!
//! 所有跨轮询周期的状态都保存在存储中，多个调度器实例可以同时
//! 对同一个队列派发，认领的正确性只依赖队列的精确删除。

pub mod aggregator;
pub mod dispatcher;
pub mod heartbeat;
pub mod keys;
pub mod lifecycle;
pub mod recovery;
pub mod service;
pub mod task_queue;

pub use aggregator::ProgressAggregator;
pub use dispatcher::{Dispatcher, STOP_FLAG};
pub use heartbeat::HeartbeatChannel;
pub use keys::StoreKeys;
pub use lifecycle::TaskLifecycle;
pub use recovery::{ExecutionTracker, RecoveryReport, RecoveryService};
pub use service::{SchedulerDeps, SchedulerService};
pub use task_queue::TaskQueue;
