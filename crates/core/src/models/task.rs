use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SchedulerError;
use crate::task_id::root_task_id;

/// 任务状态
///
/// 状态流转图：
///
/// ```text
/// CREATED → PENDING → STARTED ⇄ PAUSED → {SUCCESS | FAILURE | STOPPED | REVOKED}
/// ```
///
/// `CREATED` 与 `REVOKED` 只能由外部任务管理动作进入，其余状态由调度子系统驱动。
/// 终态之后不允许任何转换，`STARTED` 也不会回退到 `PENDING`/`CREATED`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Created,
    Pending,
    Started,
    Paused,
    Success,
    Failure,
    Revoked,
    Stopped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "CREATED",
            TaskStatus::Pending => "PENDING",
            TaskStatus::Started => "STARTED",
            TaskStatus::Paused => "PAUSED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
            TaskStatus::Revoked => "REVOKED",
            TaskStatus::Stopped => "STOPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failure | TaskStatus::Revoked | TaskStatus::Stopped
        )
    }

    /// 检查状态转换是否合法。相同状态之间的"转换"不算合法转换，
    /// 调用方需要自行处理幂等写入。
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Created, Created) => false,
            (Created, _) => true,
            (Pending, Created | Pending) => false,
            (Pending, _) => true,
            (Started, Paused | Success | Failure | Stopped | Revoked) => true,
            (Paused, Started | Success | Failure | Stopped | Revoked) => true,
            _ => false,
        }
    }

    /// 单单元任务的派生进度
    pub fn single_unit_progress(&self) -> i32 {
        match self {
            TaskStatus::Started => 10,
            TaskStatus::Paused => 50,
            s if s.is_terminal() => 100,
            _ => 0,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(TaskStatus::Created),
            "PENDING" => Ok(TaskStatus::Pending),
            "STARTED" => Ok(TaskStatus::Started),
            "PAUSED" => Ok(TaskStatus::Paused),
            "SUCCESS" => Ok(TaskStatus::Success),
            "FAILURE" => Ok(TaskStatus::Failure),
            "REVOKED" => Ok(TaskStatus::Revoked),
            "STOPPED" => Ok(TaskStatus::Stopped),
            other => Err(SchedulerError::invalid_params(format!(
                "未知的任务状态: {other}"
            ))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TaskStatus>().map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务形态，在提交时确定一次，之后不再从任务ID后缀反推
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    /// 没有子单元，完成报告直接驱动主任务状态
    Standalone,
    /// 主任务的一个子单元，完成报告参与扇入聚合
    SubUnit,
}

impl TaskKind {
    /// 只看子任务数量：大于1时所有报告都来自子单元，包括ID与主任务相同的那一个
    pub fn from_sub_task_count(sub_task_count: i32) -> Self {
        if sub_task_count > 1 {
            TaskKind::SubUnit
        } else {
            TaskKind::Standalone
        }
    }
}

/// 队列中的任务描述
///
/// 序列化后的JSON字符串就是有序集合中的成员，认领时必须用读取到的
/// 原始字符串做精确删除，不能重新序列化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub task_id: String,
    #[serde(default)]
    pub main_task_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub task_name: String,
    #[serde(default)]
    pub config: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<Vec<String>>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub enqueue_time: i64,
}

impl TaskDescriptor {
    /// Worker亲和性检查，名单为空表示任意Worker都可以认领
    pub fn accepts(&self, worker_name: &str) -> bool {
        match &self.workers {
            Some(workers) if !workers.is_empty() => workers
                .iter()
                .any(|w| w.eq_ignore_ascii_case(worker_name)),
            _ => true,
        }
    }

    pub fn root_task_id(&self) -> &str {
        root_task_id(&self.task_id)
    }

    /// 需要检查停止标记的根任务ID。
    ///
    /// 先按 `"{root}-{数字}"` 的约定推导，描述中显式携带的主任务ID不同时一并返回。
    pub fn stop_roots(&self) -> Vec<&str> {
        let derived = self.root_task_id();
        let mut roots = vec![derived];
        if !self.main_task_id.is_empty() && self.main_task_id != derived {
            roots.push(self.main_task_id.as_str());
        }
        roots
    }
}

/// 主任务（持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainTask {
    pub workspace_id: String,
    pub task_id: String,
    pub name: String,
    pub target: String,
    pub profile_id: String,
    pub org_id: String,
    pub status: TaskStatus,
    pub progress: i32,
    pub sub_task_count: i32,
    pub sub_task_done: i32,
    pub current_phase: Option<String>,
    /// 仅在 `PAUSED` 期间有意义的可恢复快照
    pub task_state: Option<String>,
    pub result: Option<String>,
    pub config: String,
    pub worker: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl MainTask {
    pub fn kind(&self) -> TaskKind {
        TaskKind::from_sub_task_count(self.sub_task_count)
    }

    pub fn all_done(&self) -> bool {
        self.sub_task_count > 0 && self.sub_task_done >= self.sub_task_count
    }
}

/// 多单元任务的进度，结果截断到100
pub fn aggregate_progress(done: i32, total: i32) -> i32 {
    if total <= 0 {
        return 0;
    }
    (done.saturating_mul(100) / total).clamp(0, 100)
}

/// 主任务字段更新，未设置的字段保持不变（非计数字段后写者胜）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MainTaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<i32>,
    pub result: Option<String>,
    pub task_state: Option<String>,
    pub current_phase: Option<String>,
    pub worker: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl MainTaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == MainTaskPatch::default()
    }

    pub fn apply_to(&self, task: &mut MainTask) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(progress) = self.progress {
            task.progress = progress;
        }
        if let Some(result) = &self.result {
            task.result = Some(result.clone());
        }
        if let Some(state) = &self.task_state {
            task.task_state = Some(state.clone());
        }
        if let Some(phase) = &self.current_phase {
            task.current_phase = Some(phase.clone());
        }
        if let Some(worker) = &self.worker {
            task.worker = Some(worker.clone());
        }
        if let Some(start) = self.start_time {
            task.start_time = Some(start);
        }
        if let Some(end) = self.end_time {
            task.end_time = Some(end);
        }
    }
}

/// 执行任务（每个被派发的执行单元一条记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorTask {
    pub workspace_id: String,
    pub task_id: String,
    pub main_task_id: String,
    pub task_name: String,
    pub config: String,
    pub status: TaskStatus,
    pub worker: Option<String>,
    pub result: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorTaskPatch {
    pub status: Option<TaskStatus>,
    pub worker: Option<String>,
    pub result: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ExecutorTaskPatch {
    pub fn apply_to(&self, task: &mut ExecutorTask) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(worker) = &self.worker {
            task.worker = Some(worker.clone());
        }
        if let Some(result) = &self.result {
            task.result = Some(result.clone());
        }
        if let Some(end) = self.end_time {
            task.end_time = Some(end);
        }
    }
}

/// 提交时写入的任务元数据，完成报告通过它快速定位所属工作空间和主任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMeta {
    pub task_id: String,
    pub main_task_id: String,
    pub workspace_id: String,
    pub sub_task_count: i32,
    pub kind: TaskKind,
    pub descriptor: TaskDescriptor,
}
