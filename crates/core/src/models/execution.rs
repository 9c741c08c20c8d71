use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskDescriptor;

/// 已认领任务的执行跟踪信息，供任务恢复判断Worker是否失联
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    pub task_id: String,
    pub worker_name: String,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub phase: Option<String>,
    pub progress: i32,
    pub retry_count: u32,
    pub descriptor: TaskDescriptor,
}

impl ExecutionInfo {
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now - self.last_update > timeout
    }
}
