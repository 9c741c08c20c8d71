use std::sync::Arc;

use chrono::Utc;
use recon_core::models::{
    aggregate_progress, CompletionReport, CreateMainTaskRequest, ExecutorTask, ExecutorTaskPatch,
    MainTask, MainTaskPatch, TaskDescriptor, TaskStatus,
};
use recon_core::root_task_id;
use recon_core::traits::TaskStore;
use recon_core::{SchedulerError, SchedulerResult};
use tracing::{debug, info, warn};

/// 任务生命周期
///
/// 所有状态写入都经过 [`TaskStatus::can_transition_to`] 检查，非法转换只记录
/// 日志后忽略；进入终态统一走存储层的条件写入，保证只发生一次。
pub struct TaskLifecycle {
    tasks: Arc<dyn TaskStore>,
}

impl TaskLifecycle {
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self { tasks }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    pub async fn create_main_task(&self, request: CreateMainTaskRequest) -> SchedulerResult<MainTask> {
        if request.workspace_id.trim().is_empty() {
            return Err(SchedulerError::invalid_params("workspaceId不能为空"));
        }
        if request.task_id.trim().is_empty() {
            return Err(SchedulerError::invalid_params("taskId不能为空"));
        }
        if request.sub_task_count < 0 {
            return Err(SchedulerError::invalid_params(format!(
                "子任务数量不能为负数: {}",
                request.sub_task_count
            )));
        }

        let now = Utc::now();
        let task = MainTask {
            workspace_id: request.workspace_id,
            task_id: request.task_id,
            name: request.name,
            target: request.target,
            profile_id: request.profile_id,
            org_id: request.org_id,
            status: TaskStatus::Created,
            progress: 0,
            sub_task_count: request.sub_task_count,
            sub_task_done: 0,
            current_phase: None,
            task_state: None,
            result: None,
            config: request.config,
            worker: None,
            create_time: now,
            update_time: now,
            start_time: None,
            end_time: None,
        };
        self.tasks.insert_main_task(&task).await?;

        info!(
            task_id = %task.task_id,
            workspace_id = %task.workspace_id,
            sub_task_count = task.sub_task_count,
            "创建主任务"
        );
        Ok(task)
    }

    /// 入队后 `CREATED -> PENDING`，其他状态一律不动
    pub async fn mark_pending(&self, workspace_id: &str, task_id: &str) -> SchedulerResult<bool> {
        let Some(task) = self.tasks.find_main_task(workspace_id, task_id).await? else {
            return Ok(false);
        };
        if task.status != TaskStatus::Created {
            debug!(task_id, status = %task.status, "主任务已离开CREATED状态，跳过PENDING");
            return Ok(false);
        }

        let patch = MainTaskPatch {
            status: Some(TaskStatus::Pending),
            ..Default::default()
        };
        self.tasks.update_active_main_task(workspace_id, task_id, &patch).await
    }

    /// 认领成功后写入执行任务，并把主任务推进到 `STARTED`（已是STARTED时跳过）
    pub async fn mark_claimed(
        &self,
        descriptor: &TaskDescriptor,
        worker_name: &str,
    ) -> SchedulerResult<()> {
        let now = Utc::now();
        let main_task_id = if descriptor.main_task_id.is_empty() {
            root_task_id(&descriptor.task_id).to_string()
        } else {
            descriptor.main_task_id.clone()
        };

        let executor = ExecutorTask {
            workspace_id: descriptor.workspace_id.clone(),
            task_id: descriptor.task_id.clone(),
            main_task_id: main_task_id.clone(),
            task_name: descriptor.task_name.clone(),
            config: descriptor.config.clone(),
            status: TaskStatus::Started,
            worker: Some(worker_name.to_string()),
            result: None,
            create_time: now,
            update_time: now,
            start_time: Some(now),
            end_time: None,
        };
        self.tasks.upsert_executor_task(&executor).await?;

        let Some(main) = self
            .tasks
            .find_main_task(&descriptor.workspace_id, &main_task_id)
            .await?
        else {
            debug!(task_id = %descriptor.task_id, %main_task_id, "认领的任务没有主任务记录");
            return Ok(());
        };

        if main.status == TaskStatus::Started {
            return Ok(());
        }
        if !main.status.can_transition_to(TaskStatus::Started) {
            debug!(
                task_id = %main.task_id,
                status = %main.status,
                "主任务状态不允许回到STARTED"
            );
            return Ok(());
        }

        let standalone = main.sub_task_count <= 1;
        let patch = MainTaskPatch {
            status: Some(TaskStatus::Started),
            progress: standalone.then(|| TaskStatus::Started.single_unit_progress()),
            worker: standalone.then(|| worker_name.to_string()),
            start_time: main.start_time.is_none().then_some(now),
            ..Default::default()
        };
        self.tasks
            .update_active_main_task(&main.workspace_id, &main.task_id, &patch)
            .await?;
        Ok(())
    }

    /// 按完成报告更新执行任务，终态之后的报告被忽略
    pub async fn apply_executor_report(
        &self,
        workspace_id: &str,
        report: &CompletionReport,
    ) -> SchedulerResult<bool> {
        let Some(executor) = self
            .tasks
            .find_executor_task(workspace_id, &report.task_id)
            .await?
        else {
            debug!(task_id = %report.task_id, "没有对应的执行任务记录");
            return Ok(false);
        };

        if executor.status.is_terminal() {
            debug!(task_id = %report.task_id, status = %executor.status, "执行任务已结束");
            return Ok(false);
        }
        if executor.status != report.state && !executor.status.can_transition_to(report.state) {
            warn!(
                task_id = %report.task_id,
                from = %executor.status,
                to = %report.state,
                "忽略执行任务的非法状态转换"
            );
            return Ok(false);
        }

        let patch = ExecutorTaskPatch {
            status: Some(report.state),
            worker: non_empty(&report.worker),
            result: non_empty(&report.result),
            end_time: report.state.is_terminal().then(Utc::now),
        };
        self.tasks
            .update_executor_task(workspace_id, &report.task_id, &patch)
            .await
    }

    /// 单单元任务：报告直接驱动主任务状态。返回主任务是否因本次报告进入终态。
    pub async fn apply_standalone_report(
        &self,
        task: &MainTask,
        report: &CompletionReport,
    ) -> SchedulerResult<bool> {
        let state = report.state;

        if state.is_terminal() {
            let changed = self
                .tasks
                .mark_terminal(&task.workspace_id, &task.task_id, state, Utc::now())
                .await?;
            if !changed {
                debug!(task_id = %task.task_id, "主任务已是终态，忽略重复的结束报告");
                return Ok(false);
            }

            let patch = MainTaskPatch {
                result: non_empty(&report.result),
                worker: non_empty(&report.worker),
                current_phase: report.phase.clone(),
                ..Default::default()
            };
            if !patch.is_empty() {
                self.tasks
                    .update_main_task(&task.workspace_id, &task.task_id, &patch)
                    .await?;
            }
            info!(task_id = %task.task_id, status = %state, "主任务结束");
            return Ok(true);
        }

        if task.status != state && !task.status.can_transition_to(state) {
            warn!(
                task_id = %task.task_id,
                from = %task.status,
                to = %state,
                "忽略主任务的非法状态转换"
            );
            return Ok(false);
        }

        let mut patch = MainTaskPatch {
            status: Some(state),
            progress: Some(state.single_unit_progress()),
            worker: non_empty(&report.worker),
            current_phase: report.phase.clone(),
            ..Default::default()
        };
        match state {
            // 暂停时的结果是可恢复的执行快照
            TaskStatus::Paused => patch.task_state = Some(report.result.clone()),
            _ => patch.result = non_empty(&report.result),
        }
        if state == TaskStatus::Started && task.start_time.is_none() {
            patch.start_time = Some(Utc::now());
        }

        self.tasks
            .update_active_main_task(&task.workspace_id, &task.task_id, &patch)
            .await?;
        Ok(false)
    }

    /// 多单元任务在计数之后、尚未全部完成时的进度与状态
    pub async fn record_sub_unit_progress(
        &self,
        task: &MainTask,
        phase: Option<&str>,
    ) -> SchedulerResult<()> {
        if task.status.is_terminal() {
            return Ok(());
        }

        let mut patch = MainTaskPatch {
            progress: Some(aggregate_progress(task.sub_task_done, task.sub_task_count)),
            current_phase: phase.map(str::to_string),
            ..Default::default()
        };
        if task.status.can_transition_to(TaskStatus::Started) {
            patch.status = Some(TaskStatus::Started);
            if task.start_time.is_none() {
                patch.start_time = Some(Utc::now());
            }
        }

        self.tasks
            .update_active_main_task(&task.workspace_id, &task.task_id, &patch)
            .await?;
        Ok(())
    }

    /// 条件进入终态，返回是否由本次调用完成了转换
    pub async fn finish(
        &self,
        workspace_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> SchedulerResult<bool> {
        self.tasks
            .mark_terminal(workspace_id, task_id, status, Utc::now())
            .await
    }

    /// 外部停止请求：非终态主任务置为 `STOPPED`
    pub async fn mark_stopped(&self, workspace_id: &str, task_id: &str) -> SchedulerResult<bool> {
        let Some(task) = self.tasks.find_main_task(workspace_id, task_id).await? else {
            warn!(task_id, workspace_id, "停止任务时未找到主任务");
            return Ok(false);
        };
        if task.status.is_terminal() {
            debug!(task_id, status = %task.status, "主任务已结束，无需停止");
            return Ok(false);
        }
        self.finish(workspace_id, task_id, TaskStatus::Stopped).await
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
