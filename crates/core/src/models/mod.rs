pub mod execution;
pub mod protocol;
pub mod task;
pub mod worker;

pub use execution::ExecutionInfo;
pub use protocol::{
    CompletionReport, CreateMainTaskRequest, HeartbeatRequest, PollRequest, PollResult,
    ReportOutcome, SubmitRequest,
};
pub use task::{
    aggregate_progress, ExecutorTask, ExecutorTaskPatch, MainTask, MainTaskPatch, TaskDescriptor,
    TaskKind, TaskMeta, TaskStatus,
};
pub use worker::{
    ControlCommand, HeartbeatResponse, WorkerRecord, WorkerStatusSnapshot, WorkerView,
};
