use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::config::DatabaseConfig;
use recon_core::models::{
    ExecutorTask, ExecutorTaskPatch, MainTask, MainTaskPatch, TaskStatus,
};
use recon_core::traits::{CounterUpdate, TaskStore};
use recon_core::{SchedulerError, SchedulerResult};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info};

const MAIN_TASK_COLUMNS: &str = "workspace_id, task_id, name, target, profile_id, org_id, status, \
     progress, sub_task_count, sub_task_done, current_phase, task_state, result, config, worker, \
     create_time, update_time, start_time, end_time";

const TERMINAL_STATUSES: &str = "('SUCCESS', 'FAILURE', 'STOPPED', 'REVOKED')";

const EXECUTOR_TASK_COLUMNS: &str = "workspace_id, task_id, main_task_id, task_name, config, \
     status, worker, result, create_time, update_time, start_time, end_time";

/// SQLite实现的任务记录存储
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 按配置创建连接池并初始化表结构
    pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(SchedulerError::Database)?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!("任务记录数据库已就绪: {}", config.url);
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS main_tasks (
                workspace_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                name TEXT NOT NULL,
                target TEXT NOT NULL DEFAULT '',
                profile_id TEXT NOT NULL DEFAULT '',
                org_id TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                sub_task_count INTEGER NOT NULL DEFAULT 1,
                sub_task_done INTEGER NOT NULL DEFAULT 0,
                current_phase TEXT,
                task_state TEXT,
                result TEXT,
                config TEXT NOT NULL DEFAULT '',
                worker TEXT,
                create_time TEXT NOT NULL,
                update_time TEXT NOT NULL,
                start_time TEXT,
                end_time TEXT,
                PRIMARY KEY (workspace_id, task_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executor_tasks (
                workspace_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                main_task_id TEXT NOT NULL,
                task_name TEXT NOT NULL DEFAULT '',
                config TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                worker TEXT,
                result TEXT,
                create_time TEXT NOT NULL,
                update_time TEXT NOT NULL,
                start_time TEXT,
                end_time TEXT,
                PRIMARY KEY (workspace_id, task_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_executor_tasks_main ON executor_tasks (workspace_id, main_task_id)",
        )
        .execute(&self.pool)
        .await?;

        debug!("任务记录表结构初始化完成");
        Ok(())
    }

    fn row_to_main_task(row: &SqliteRow) -> SchedulerResult<MainTask> {
        Ok(MainTask {
            workspace_id: row.try_get("workspace_id")?,
            task_id: row.try_get("task_id")?,
            name: row.try_get("name")?,
            target: row.try_get("target")?,
            profile_id: row.try_get("profile_id")?,
            org_id: row.try_get("org_id")?,
            status: row.try_get("status")?,
            progress: row.try_get("progress")?,
            sub_task_count: row.try_get("sub_task_count")?,
            sub_task_done: row.try_get("sub_task_done")?,
            current_phase: row.try_get("current_phase")?,
            task_state: row.try_get("task_state")?,
            result: row.try_get("result")?,
            config: row.try_get("config")?,
            worker: row.try_get("worker")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
        })
    }

    fn row_to_executor_task(row: &SqliteRow) -> SchedulerResult<ExecutorTask> {
        Ok(ExecutorTask {
            workspace_id: row.try_get("workspace_id")?,
            task_id: row.try_get("task_id")?,
            main_task_id: row.try_get("main_task_id")?,
            task_name: row.try_get("task_name")?,
            config: row.try_get("config")?,
            status: row.try_get("status")?,
            worker: row.try_get("worker")?,
            result: row.try_get("result")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
        })
    }

    async fn apply_main_task_patch(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &MainTaskPatch,
        only_active: bool,
    ) -> SchedulerResult<bool> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE main_tasks SET update_time = ");
        builder.push_bind(Utc::now());
        if let Some(status) = patch.status {
            builder.push(", status = ").push_bind(status);
        }
        if let Some(progress) = patch.progress {
            builder.push(", progress = ").push_bind(progress);
        }
        if let Some(result) = &patch.result {
            builder.push(", result = ").push_bind(result.clone());
        }
        if let Some(state) = &patch.task_state {
            builder.push(", task_state = ").push_bind(state.clone());
        }
        if let Some(phase) = &patch.current_phase {
            builder.push(", current_phase = ").push_bind(phase.clone());
        }
        if let Some(worker) = &patch.worker {
            builder.push(", worker = ").push_bind(worker.clone());
        }
        if let Some(start) = patch.start_time {
            builder.push(", start_time = ").push_bind(start);
        }
        if let Some(end) = patch.end_time {
            builder.push(", end_time = ").push_bind(end);
        }
        builder
            .push(" WHERE workspace_id = ")
            .push_bind(workspace_id.to_string())
            .push(" AND task_id = ")
            .push_bind(task_id.to_string());
        if only_active {
            builder.push(" AND status NOT IN ").push(TERMINAL_STATUSES);
        }

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert_main_task(&self, task: &MainTask) -> SchedulerResult<()> {
        let sql = format!(
            "INSERT INTO main_tasks ({MAIN_TASK_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let result = sqlx::query(&sql)
            .bind(&task.workspace_id)
            .bind(&task.task_id)
            .bind(&task.name)
            .bind(&task.target)
            .bind(&task.profile_id)
            .bind(&task.org_id)
            .bind(task.status)
            .bind(task.progress)
            .bind(task.sub_task_count)
            .bind(task.sub_task_done)
            .bind(&task.current_phase)
            .bind(&task.task_state)
            .bind(&task.result)
            .bind(&task.config)
            .bind(&task.worker)
            .bind(task.create_time)
            .bind(task.update_time)
            .bind(task.start_time)
            .bind(task.end_time)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                debug!("创建主任务成功: {}/{}", task.workspace_id, task.task_id);
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                SchedulerError::invalid_params(format!("主任务已存在: {}", task.task_id)),
            ),
            Err(e) => Err(SchedulerError::Database(e)),
        }
    }

    async fn find_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<MainTask>> {
        let sql = format!(
            "SELECT {MAIN_TASK_COLUMNS} FROM main_tasks WHERE workspace_id = ? AND task_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(workspace_id)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_main_task).transpose()
    }

    async fn update_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &MainTaskPatch,
    ) -> SchedulerResult<bool> {
        self.apply_main_task_patch(workspace_id, task_id, patch, false)
            .await
    }

    async fn update_active_main_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &MainTaskPatch,
    ) -> SchedulerResult<bool> {
        self.apply_main_task_patch(workspace_id, task_id, patch, true)
            .await
    }

    async fn increment_sub_task_done(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<CounterUpdate>> {
        let result = sqlx::query(
            "UPDATE main_tasks SET sub_task_done = sub_task_done + 1, update_time = ? \
             WHERE workspace_id = ? AND task_id = ? AND sub_task_done < sub_task_count",
        )
        .bind(Utc::now())
        .bind(workspace_id)
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        let incremented = result.rows_affected() > 0;
        let task = self.find_main_task(workspace_id, task_id).await?;
        Ok(task.map(|task| CounterUpdate { task, incremented }))
    }

    async fn mark_terminal(
        &self,
        workspace_id: &str,
        task_id: &str,
        status: TaskStatus,
        end_time: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE main_tasks SET status = ?, progress = 100, end_time = ?, update_time = ? \
             WHERE workspace_id = ? AND task_id = ? \
             AND status NOT IN ('SUCCESS', 'FAILURE', 'STOPPED', 'REVOKED')",
        )
        .bind(status)
        .bind(end_time)
        .bind(Utc::now())
        .bind(workspace_id)
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_executor_task(&self, task: &ExecutorTask) -> SchedulerResult<()> {
        let sql = format!(
            "INSERT INTO executor_tasks ({EXECUTOR_TASK_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(workspace_id, task_id) DO UPDATE SET \
                main_task_id = excluded.main_task_id, \
                task_name = excluded.task_name, \
                config = excluded.config, \
                status = excluded.status, \
                worker = excluded.worker, \
                result = excluded.result, \
                update_time = excluded.update_time, \
                start_time = excluded.start_time, \
                end_time = excluded.end_time"
        );
        sqlx::query(&sql)
            .bind(&task.workspace_id)
            .bind(&task.task_id)
            .bind(&task.main_task_id)
            .bind(&task.task_name)
            .bind(&task.config)
            .bind(task.status)
            .bind(&task.worker)
            .bind(&task.result)
            .bind(task.create_time)
            .bind(task.update_time)
            .bind(task.start_time)
            .bind(task.end_time)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_executor_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> SchedulerResult<Option<ExecutorTask>> {
        let sql = format!(
            "SELECT {EXECUTOR_TASK_COLUMNS} FROM executor_tasks WHERE workspace_id = ? AND task_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(workspace_id)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_executor_task).transpose()
    }

    async fn update_executor_task(
        &self,
        workspace_id: &str,
        task_id: &str,
        patch: &ExecutorTaskPatch,
    ) -> SchedulerResult<bool> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE executor_tasks SET update_time = ");
        builder.push_bind(Utc::now());
        if let Some(status) = patch.status {
            builder.push(", status = ").push_bind(status);
        }
        if let Some(worker) = &patch.worker {
            builder.push(", worker = ").push_bind(worker.clone());
        }
        if let Some(result) = &patch.result {
            builder.push(", result = ").push_bind(result.clone());
        }
        if let Some(end) = patch.end_time {
            builder.push(", end_time = ").push_bind(end);
        }
        builder
            .push(" WHERE workspace_id = ")
            .push_bind(workspace_id.to_string())
            .push(" AND task_id = ")
            .push_bind(task_id.to_string());

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_workspaces(&self, limit: usize) -> SchedulerResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT workspace_id FROM main_tasks ORDER BY workspace_id LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("workspace_id").map_err(Into::into))
            .collect()
    }
}
