use serde::{Deserialize, Serialize};

use super::task::{TaskDescriptor, TaskStatus};
use super::worker::WorkerStatusSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRequest {
    pub worker_name: String,
}

/// 轮询结果。队列为空和"没有适合该Worker的任务"对Worker来说是同一个结果。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub found: bool,
    pub task_id: String,
    pub main_task_id: String,
    pub workspace_id: String,
    pub task_name: String,
    pub config: String,
}

impl PollResult {
    pub fn none() -> Self {
        Self::default()
    }
}

impl From<TaskDescriptor> for PollResult {
    fn from(descriptor: TaskDescriptor) -> Self {
        Self {
            found: true,
            task_id: descriptor.task_id,
            main_task_id: descriptor.main_task_id,
            workspace_id: descriptor.workspace_id,
            task_name: descriptor.task_name,
            config: descriptor.config,
        }
    }
}

/// Worker上报的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub task_id: String,
    #[serde(default)]
    pub main_task_id: String,
    #[serde(default)]
    pub worker: String,
    pub state: TaskStatus,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub success: bool,
    pub sub_task_done: i32,
    pub sub_task_count: i32,
    pub all_done: bool,
}

impl ReportOutcome {
    /// 元数据和主任务都找不到时的结果，不视为错误
    pub fn untracked() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub worker_name: String,
    #[serde(default)]
    pub status: WorkerStatusSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub task_id: String,
    #[serde(default)]
    pub main_task_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub task_name: String,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub workers: Option<Vec<String>>,
    /// 数值越大越先被认领，默认0
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMainTaskRequest {
    pub workspace_id: String,
    pub task_id: String,
    pub name: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub config: String,
    #[serde(default = "default_sub_task_count")]
    pub sub_task_count: i32,
}

fn default_sub_task_count() -> i32 {
    1
}
