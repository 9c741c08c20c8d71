use std::sync::Arc;

use recon_core::config::AppConfig;
use recon_core::models::{
    CompletionReport, ControlCommand, CreateMainTaskRequest, HeartbeatRequest, HeartbeatResponse,
    MainTask, PollResult, ReportOutcome, SubmitRequest, TaskDescriptor, TaskKind, TaskMeta,
    WorkerView,
};
use recon_core::root_task_id;
use recon_core::traits::{
    CompletionNotifier, FindingCounter, KeyValueStore, NoopFindingCounter, QueueStore, TaskStore,
};
use recon_core::{SchedulerError, SchedulerResult};
use tracing::{info, warn};

use crate::aggregator::ProgressAggregator;
use crate::dispatcher::{Dispatcher, STOP_FLAG};
use crate::heartbeat::HeartbeatChannel;
use crate::keys::StoreKeys;
use crate::lifecycle::TaskLifecycle;
use crate::recovery::{ExecutionTracker, RecoveryService};
use crate::task_queue::TaskQueue;

/// 调度服务的外部依赖
pub struct SchedulerDeps {
    pub queue: Arc<dyn QueueStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub notifier: Arc<dyn CompletionNotifier>,
    pub findings: Arc<dyn FindingCounter>,
}

impl SchedulerDeps {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        kv: Arc<dyn KeyValueStore>,
        tasks: Arc<dyn TaskStore>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            queue,
            kv,
            tasks,
            notifier,
            findings: Arc::new(NoopFindingCounter),
        }
    }

    pub fn with_findings(mut self, findings: Arc<dyn FindingCounter>) -> Self {
        self.findings = findings;
        self
    }
}

/// Worker协议与任务管理操作的统一入口
pub struct SchedulerService {
    queue: Arc<TaskQueue>,
    kv: Arc<dyn KeyValueStore>,
    keys: StoreKeys,
    lifecycle: Arc<TaskLifecycle>,
    dispatcher: Dispatcher,
    aggregator: Arc<ProgressAggregator>,
    heartbeat: Arc<HeartbeatChannel>,
    recovery: Arc<RecoveryService>,
    config: AppConfig,
}

impl SchedulerService {
    pub fn new(config: AppConfig, deps: SchedulerDeps) -> Self {
        let keys = StoreKeys::new(config.redis.key_prefix.clone());
        let queue = Arc::new(TaskQueue::new(deps.queue, &keys));
        let lifecycle = Arc::new(TaskLifecycle::new(deps.tasks));
        let tracker = Arc::new(ExecutionTracker::new(
            Arc::clone(&deps.kv),
            keys.clone(),
            std::time::Duration::from_secs(config.recovery.execution_ttl_seconds),
        ));
        let heartbeat = Arc::new(HeartbeatChannel::new(
            Arc::clone(&deps.kv),
            keys.clone(),
            config.heartbeat.worker_ttl(),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&deps.kv),
            Arc::clone(&lifecycle),
            Arc::clone(&tracker),
            keys.clone(),
            config.dispatcher.max_skip,
        );
        let aggregator = Arc::new(ProgressAggregator::new(
            Arc::clone(&deps.kv),
            Arc::clone(&lifecycle),
            Arc::clone(&tracker),
            deps.notifier,
            deps.findings,
            keys.clone(),
            config.dispatcher.clone(),
        ));
        let recovery = Arc::new(RecoveryService::new(
            tracker,
            Arc::clone(&heartbeat),
            Arc::clone(&queue),
            Arc::clone(&aggregator),
            config.recovery.clone(),
        ));

        Self {
            queue,
            kv: deps.kv,
            keys,
            lifecycle,
            dispatcher,
            aggregator,
            heartbeat,
            recovery,
            config,
        }
    }

    pub async fn poll(&self, worker_name: &str) -> SchedulerResult<PollResult> {
        Ok(self
            .dispatcher
            .poll(worker_name)
            .await?
            .map(PollResult::from)
            .unwrap_or_else(PollResult::none))
    }

    pub async fn report(&self, report: &CompletionReport) -> SchedulerResult<ReportOutcome> {
        self.aggregator.report(report).await
    }

    pub async fn heartbeat(&self, request: &HeartbeatRequest) -> SchedulerResult<HeartbeatResponse> {
        self.heartbeat
            .keep_alive(&request.worker_name, &request.status)
            .await
    }

    /// 提交任务：写入元数据、入队，并把主任务从 `CREATED` 推进到 `PENDING`
    pub async fn submit(&self, request: SubmitRequest) -> SchedulerResult<TaskDescriptor> {
        validate_submit(&request)?;
        self.submit_validated(request).await
    }

    /// 批量提交：先整体校验，再按请求顺序逐个入队，同优先级内保持批内顺序
    pub async fn submit_batch(
        &self,
        requests: Vec<SubmitRequest>,
    ) -> SchedulerResult<Vec<TaskDescriptor>> {
        if requests.is_empty() {
            return Err(SchedulerError::invalid_params("批量提交的任务列表不能为空"));
        }
        for request in &requests {
            validate_submit(request)?;
        }

        let mut queued = Vec::with_capacity(requests.len());
        for request in requests {
            queued.push(self.submit_validated(request).await?);
        }
        info!(count = queued.len(), "批量提交完成");
        Ok(queued)
    }

    async fn submit_validated(&self, request: SubmitRequest) -> SchedulerResult<TaskDescriptor> {
        let main_task_id = if request.main_task_id.is_empty() {
            root_task_id(&request.task_id).to_string()
        } else {
            request.main_task_id
        };

        let sub_task_count = match self
            .lifecycle
            .store()
            .find_main_task(&request.workspace_id, &main_task_id)
            .await?
        {
            Some(main) => main.sub_task_count,
            None => {
                warn!(
                    task_id = %request.task_id,
                    %main_task_id,
                    "提交任务时未找到主任务，按单单元任务处理"
                );
                0
            }
        };

        let descriptor = TaskDescriptor {
            task_id: request.task_id,
            main_task_id: main_task_id.clone(),
            workspace_id: request.workspace_id,
            task_name: request.task_name,
            config: request.config,
            workers: request.workers,
            priority: request.priority,
            enqueue_time: 0,
        };
        let meta = TaskMeta {
            task_id: descriptor.task_id.clone(),
            main_task_id: main_task_id.clone(),
            workspace_id: descriptor.workspace_id.clone(),
            sub_task_count,
            kind: TaskKind::from_sub_task_count(sub_task_count),
            descriptor: descriptor.clone(),
        };
        self.kv
            .set(
                &self.keys.task_info(&descriptor.task_id),
                &serde_json::to_string(&meta)?,
                Some(self.config.dispatcher.task_info_ttl()),
            )
            .await?;

        let queued = self.queue.enqueue(&descriptor).await?;
        self.lifecycle
            .mark_pending(&queued.workspace_id, &main_task_id)
            .await?;

        info!(
            task_id = %queued.task_id,
            %main_task_id,
            kind = ?meta.kind,
            priority = queued.priority,
            "任务已提交"
        );
        Ok(queued)
    }

    pub async fn create_main_task(&self, request: CreateMainTaskRequest) -> SchedulerResult<MainTask> {
        self.lifecycle.create_main_task(request).await
    }

    pub async fn get_main_task(&self, workspace_id: &str, task_id: &str) -> SchedulerResult<MainTask> {
        self.lifecycle
            .store()
            .find_main_task(workspace_id, task_id)
            .await?
            .ok_or_else(|| SchedulerError::task_not_found(task_id))
    }

    /// 写入停止标记并把主任务置为 `STOPPED`。
    ///
    /// 返回主任务是否由本次调用停止；排队中的子任务会在下次轮询时被丢弃，
    /// 已在执行的任务需要通过Worker控制指令另行处理。
    pub async fn stop_task(&self, workspace_id: &str, task_id: &str) -> SchedulerResult<bool> {
        if task_id.trim().is_empty() {
            return Err(SchedulerError::invalid_params("taskId不能为空"));
        }
        self.kv
            .set(&self.keys.task_control(task_id), STOP_FLAG, None)
            .await?;
        info!(task_id, workspace_id, "已设置停止标记");

        self.lifecycle.mark_stopped(workspace_id, task_id).await
    }

    pub async fn send_control(&self, worker_name: &str, command: ControlCommand) -> SchedulerResult<()> {
        self.heartbeat.send_control(worker_name, command).await
    }

    pub async fn list_workers(&self) -> SchedulerResult<Vec<WorkerView>> {
        self.heartbeat.list_workers().await
    }

    pub async fn queue_len(&self) -> SchedulerResult<u64> {
        self.queue.len().await
    }

    pub fn recovery(&self) -> Arc<RecoveryService> {
        Arc::clone(&self.recovery)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

fn validate_submit(request: &SubmitRequest) -> SchedulerResult<()> {
    if request.task_id.trim().is_empty() {
        return Err(SchedulerError::invalid_params("taskId不能为空"));
    }
    if request.workspace_id.trim().is_empty() {
        return Err(SchedulerError::invalid_params("workspaceId不能为空"));
    }
    Ok(())
}
