use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ExecutorTask, ExecutorTaskPatch, MainTask, MainTaskPatch, TaskStatus};
use crate::SchedulerResult;

/// 主任务计数器原子递增的结果
#[derive(Debug, Clone, PartialEq)]
pub struct CounterUpdate {
    /// 递增之后重新读取的主任务
    pub task: MainTask,
    /// 计数器已达上限时为 `false`
    pub incremented: bool,
}

/// 任务记录的持久化存储，按工作空间分区
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_main_task(&self, task: &MainTask) -> SchedulerResult<()>;

    async fn find_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<MainTask>>;

    /// 按字段更新主任务，返回记录是否存在
    async fn update_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &MainTaskPatch,
    ) -> SchedulerResult<bool>;

    /// 与 `update_main_task` 相同，但只在主任务尚未进入终态时写入，
    /// 返回是否真的写入。用于可能与终态转换并发的进度更新。
    async fn update_active_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &MainTaskPatch,
    ) -> SchedulerResult<bool>;

    /// 在存储层原子递增 `sub_task_done`，不会超过 `sub_task_count`。
    /// 主任务不存在时返回 `None`。
    async fn increment_sub_task_done(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<CounterUpdate>>;

    /// 条件转换到终态：只有当前状态不是终态时才写入 `status`、`progress = 100`
    /// 和 `end_time`，返回是否真的发生了转换
    async fn mark_terminal(
        &self,
        workspace_id: &str,
        task_id: &str,
        status: TaskStatus,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<bool>;

    async fn upsert_executor_task(&self, task: &ExecutorTask) -> SchedulerResult<()>;

    async fn find_executor_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<ExecutorTask>>;

    async fn update_executor_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &ExecutorTaskPatch,
    ) -> SchedulerResult<bool>;

    /// 已知的工作空间，最多返回 `limit` 个
    async fn list_workspaces(&self, limit: usize) -> SchedulerResult<Vec<String>>;
}
