use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::models::{
    ExecutorTask, ExecutorTaskPatch, MainTask, MainTaskPatch, TaskStatus,
};
use recon_core::traits::{CounterUpdate, TaskStore};
use recon_core::{SchedulerError, SchedulerResult};
use tokio::sync::RwLock;

type RecordKey = (String, String);

fn record_key(workspace_id: &str, task_id: &str) -> RecordKey {
    (workspace_id.to_string(), task_id.to_string())
}

/// 内存实现的任务记录存储
///
/// 计数器递增与终态转换都在写锁内完成，语义与数据库实现的条件更新一致。
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    main_tasks: RwLock<HashMap<RecordKey, MainTask>>,
    executor_tasks: RwLock<HashMap<RecordKey, ExecutorTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert_main_task(&self, task: &MainTask) -> SchedulerResult<()> {
        let mut tasks = self.main_tasks.write().await;
        let key = record_key(&task.workspace_id, &task.task_id);
        if tasks.contains_key(&key) {
            return Err(SchedulerError::invalid_params(format!(
                "主任务已存在: {}",
                task.task_id
            )));
        }
        tasks.insert(key, task.clone());
        Ok(())
    }

    async fn find_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<MainTask>> {
        let tasks = self.main_tasks.read().await;
        Ok(tasks.get(&record_key(workspace_id, task_id)).cloned())
    }

    async fn update_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &MainTaskPatch,
    ) -> SchedulerResult<bool> {
        let mut tasks = self.main_tasks.write().await;
        match tasks.get_mut(&record_key(workspace_id, task_id)) {
            Some(task) => {
                patch.apply_to(task);
                task.update_time = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_active_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &MainTaskPatch,
    ) -> SchedulerResult<bool> {
        let mut tasks = self.main_tasks.write().await;
        match tasks.get_mut(&record_key(workspace_id, task_id)) {
            Some(task) if !task.status.is_terminal() => {
                patch.apply_to(task);
                task.update_time = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_sub_task_done(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<CounterUpdate>> {
        let mut tasks = self.main_tasks.write().await;
        let Some(task) = tasks.get_mut(&record_key(workspace_id, task_id)) else {
            return Ok(None);
        };
        let incremented = task.sub_task_done < task.sub_task_count;
        if incremented {
            task.sub_task_done += 1;
            task.update_time = Utc::now();
        }
        Ok(Some(CounterUpdate {
            task: task.clone(),
            incremented,
        }))
    }

    async fn mark_terminal(
        &self,
        workspace_id: &str,
        task_id: &str,
        status: TaskStatus,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let mut tasks = self.main_tasks.write().await;
        match tasks.get_mut(&record_key(workspace_id, task_id)) {
            Some(task) if !task.status.is_terminal() => {
                task.status = status;
                task.progress = 100;
                task.end_time = Some(end_time);
                task.update_time = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_executor_task(&self, task: &ExecutorTask) -> SchedulerResult<()> {
        let mut tasks = self.executor_tasks.write().await;
        let key = record_key(&task.workspace_id, &task.task_id);
        let create_time = tasks.get(&key).map(|existing| existing.create_time);
        let mut record = task.clone();
        if let Some(create_time) = create_time {
            record.create_time = create_time;
        }
        tasks.insert(key, record);
        Ok(())
    }

    async fn find_executor_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<ExecutorTask>> {
        let tasks = self.executor_tasks.read().await;
        Ok(tasks.get(&record_key(workspace_id, task_id)).cloned())
    }

    async fn update_executor_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &ExecutorTaskPatch,
    ) -> SchedulerResult<bool> {
        let mut tasks = self.executor_tasks.write().await;
        match tasks.get_mut(&record_key(workspace_id, task_id)) {
            Some(task) => {
                patch.apply_to(task);
                task.update_time = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_workspaces(&self, limit: usize) -> SchedulerResult<Vec<String>> {
        let tasks = self.main_tasks.read().await;
        let workspaces: BTreeSet<&String> = tasks.keys().map(|(ws, _)| ws).collect();
        Ok(workspaces.into_iter().take(limit).cloned().collect())
    }
}
