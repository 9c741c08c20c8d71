//! # Recon Core
//!
//! 侦察平台调度子系统的核心类型：错误定义、任务与Worker数据模型、
//! 任务状态机、存储抽象以及应用配置。
//!
//! 调度器本身不持有任何跨轮询周期的进程内状态，所有共享状态都经由
//! [`traits`] 中定义的存储接口落到外部持久化存储中，因此多个调度器实例
//! 可以同时对同一个队列进行调度。

pub mod clock;
pub mod config;
pub mod errors;
pub mod models;
pub mod task_id;
pub mod traits;

pub use clock::ScoreClock;
pub use config::AppConfig;
pub use errors::*;
pub use models::{
    CompletionReport, ControlCommand, ExecutionInfo, ExecutorTask, ExecutorTaskPatch,
    HeartbeatResponse, MainTask, MainTaskPatch, PollResult, ReportOutcome, TaskDescriptor,
    TaskKind, TaskMeta, TaskStatus, WorkerRecord, WorkerStatusSnapshot,
};
pub use task_id::root_task_id;
