use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MainTask, TaskStatus};
use crate::SchedulerResult;

/// 主任务进入终态时的通知内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub task_id: String,
    pub task_name: String,
    pub workspace_id: String,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<String>,
    pub asset_count: u64,
    pub vul_count: u64,
}

impl CompletionEvent {
    pub fn from_task(task: &MainTask, asset_count: u64, vul_count: u64) -> Self {
        let duration = match (task.start_time, task.end_time) {
            (Some(start), Some(end)) => Some(format_duration(end - start)),
            _ => None,
        };
        Self {
            task_id: task.task_id.clone(),
            task_name: task.name.clone(),
            workspace_id: task.workspace_id.clone(),
            status: task.status,
            start_time: task.start_time,
            end_time: task.end_time,
            duration,
            asset_count,
            vul_count,
        }
    }
}

/// 按量级取整的耗时描述：一小时以上精确到分钟，一分钟以上精确到秒，否则精确到毫秒
pub fn format_duration(d: chrono::Duration) -> String {
    let total_ms = d.num_milliseconds().max(0);
    let total_secs = total_ms / 1000;
    if total_secs >= 3600 {
        let minutes = (total_ms + 30_000) / 60_000;
        format!("{}h{}m", minutes / 60, minutes % 60)
    } else if total_secs >= 60 {
        let secs = (total_ms + 500) / 1000;
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:03}s", total_secs, total_ms % 1000)
    }
}

/// 完成通知的投递方，失败只记录日志，不会回滚状态
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, event: &CompletionEvent) -> SchedulerResult<()>;
}

/// 资产与漏洞统计（外部协作方）
#[async_trait]
pub trait FindingCounter: Send + Sync {
    async fn count_assets(&self, workspace_id: &str, task_id: &str) -> SchedulerResult<u64>;

    async fn count_vulnerabilities(&self, workspace_id: &str, task_id: &str)
        -> SchedulerResult<u64>;
}

/// 未接入资产存储时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFindingCounter;

#[async_trait]
impl FindingCounter for NoopFindingCounter {
    async fn count_assets(&self, _workspace_id: &str, _task_id: &str) -> SchedulerResult<u64> {
        Ok(0)
    }

    async fn count_vulnerabilities(
        &self,
        _workspace_id: &str,
        _task_id: &str,
    ) -> SchedulerResult<u64> {
        Ok(0)
    }
}
