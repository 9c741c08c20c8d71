use std::sync::Arc;

use metrics::counter;
use recon_core::config::DispatcherConfig;
use recon_core::models::{
    CompletionReport, MainTask, ReportOutcome, TaskKind, TaskMeta, TaskStatus,
};
use recon_core::root_task_id;
use recon_core::traits::{CompletionEvent, CompletionNotifier, FindingCounter, KeyValueStore};
use recon_core::{SchedulerError, SchedulerResult};
use tracing::{debug, error, info, warn};

use crate::keys::StoreKeys;
use crate::lifecycle::TaskLifecycle;
use crate::recovery::ExecutionTracker;

/// 完成报告对应的主任务
struct ReportTarget {
    workspace_id: String,
    kind: TaskKind,
    main: MainTask,
}

/// 进度聚合器
///
/// 单单元任务的报告直接驱动主任务状态；子单元的终态报告在存储层原子递增
/// `sub_task_done`，计数达到 `sub_task_count` 时主任务进入 `SUCCESS`。
/// 主任务真正进入 `SUCCESS`/`FAILURE` 的那一次会异步发送完成通知，
/// 通知失败不影响状态。
pub struct ProgressAggregator {
    kv: Arc<dyn KeyValueStore>,
    lifecycle: Arc<TaskLifecycle>,
    tracker: Arc<ExecutionTracker>,
    notifier: Arc<dyn CompletionNotifier>,
    findings: Arc<dyn FindingCounter>,
    keys: StoreKeys,
    config: DispatcherConfig,
}

impl ProgressAggregator {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        lifecycle: Arc<TaskLifecycle>,
        tracker: Arc<ExecutionTracker>,
        notifier: Arc<dyn CompletionNotifier>,
        findings: Arc<dyn FindingCounter>,
        keys: StoreKeys,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            kv,
            lifecycle,
            tracker,
            notifier,
            findings,
            keys,
            config,
        }
    }

    pub async fn report(&self, report: &CompletionReport) -> SchedulerResult<ReportOutcome> {
        if report.task_id.trim().is_empty() {
            return Err(SchedulerError::invalid_params("taskId不能为空"));
        }
        counter!("recon_report_total", "state" => report.state.as_str()).increment(1);
        debug!(
            task_id = %report.task_id,
            worker = %report.worker,
            state = %report.state,
            "收到任务报告"
        );

        self.track(report).await;

        let Some(target) = self.resolve(report).await? else {
            warn!(task_id = %report.task_id, "找不到任务所属的主任务，忽略报告");
            return Ok(ReportOutcome::untracked());
        };

        self.lifecycle
            .apply_executor_report(&target.workspace_id, report)
            .await?;

        match target.kind {
            TaskKind::Standalone => self.apply_standalone(target, report).await,
            TaskKind::SubUnit => self.apply_sub_unit(target, report).await,
        }
    }

    async fn track(&self, report: &CompletionReport) {
        let result = if report.state.is_terminal() {
            self.tracker.finish(&report.task_id).await
        } else {
            self.tracker
                .touch(&report.task_id, report.phase.as_deref())
                .await
        };
        if let Err(e) = result {
            warn!(task_id = %report.task_id, "更新执行跟踪信息失败: {}", e);
        }
    }

    async fn apply_standalone(
        &self,
        target: ReportTarget,
        report: &CompletionReport,
    ) -> SchedulerResult<ReportOutcome> {
        let terminated = self
            .lifecycle
            .apply_standalone_report(&target.main, report)
            .await?;

        let task = self
            .lifecycle
            .store()
            .find_main_task(&target.workspace_id, &target.main.task_id)
            .await?
            .unwrap_or(target.main);
        if terminated {
            self.spawn_notification(task.clone());
        }

        Ok(ReportOutcome {
            success: true,
            sub_task_done: task.sub_task_done,
            sub_task_count: task.sub_task_count,
            all_done: task.status.is_terminal(),
        })
    }

    async fn apply_sub_unit(
        &self,
        target: ReportTarget,
        report: &CompletionReport,
    ) -> SchedulerResult<ReportOutcome> {
        let workspace_id = target.workspace_id.as_str();
        let main_task_id = target.main.task_id.as_str();

        // 非终态报告不计数，只记录阶段
        if !report.state.is_terminal() {
            self.lifecycle
                .record_sub_unit_progress(&target.main, report.phase.as_deref())
                .await?;
            return Ok(ReportOutcome {
                success: true,
                sub_task_done: target.main.sub_task_done,
                sub_task_count: target.main.sub_task_count,
                all_done: target.main.all_done(),
            });
        }

        let Some(update) = self
            .lifecycle
            .store()
            .increment_sub_task_done(workspace_id, main_task_id)
            .await?
        else {
            warn!(%main_task_id, "递增子任务计数时主任务已不存在");
            return Ok(ReportOutcome::untracked());
        };
        if !update.incremented {
            warn!(
                %main_task_id,
                task_id = %report.task_id,
                done = update.task.sub_task_done,
                count = update.task.sub_task_count,
                "子任务计数已达上限，忽略多余的报告"
            );
        }

        let task = update.task;
        let all_done = task.all_done();
        if all_done {
            if self
                .lifecycle
                .finish(workspace_id, main_task_id, TaskStatus::Success)
                .await?
            {
                info!(%main_task_id, count = task.sub_task_count, "全部子任务完成");
                if let Some(finished) = self
                    .lifecycle
                    .store()
                    .find_main_task(workspace_id, main_task_id)
                    .await?
                {
                    self.spawn_notification(finished);
                }
            }
        } else {
            self.lifecycle
                .record_sub_unit_progress(&task, report.phase.as_deref())
                .await?;
        }

        Ok(ReportOutcome {
            success: true,
            sub_task_done: task.sub_task_done,
            sub_task_count: task.sub_task_count,
            all_done,
        })
    }

    /// 先查提交时写入的元数据，查不到再有限地遍历工作空间
    async fn resolve(&self, report: &CompletionReport) -> SchedulerResult<Option<ReportTarget>> {
        if let Some(meta) = self.load_meta(&report.task_id).await? {
            if let Some(main) = self
                .lifecycle
                .store()
                .find_main_task(&meta.workspace_id, &meta.main_task_id)
                .await?
            {
                return Ok(Some(ReportTarget {
                    workspace_id: meta.workspace_id,
                    kind: meta.kind,
                    main,
                }));
            }
            warn!(
                task_id = %report.task_id,
                main_task_id = %meta.main_task_id,
                "任务元数据存在但主任务记录缺失"
            );
        }
        self.scan_workspaces(report).await
    }

    async fn load_meta(&self, task_id: &str) -> SchedulerResult<Option<TaskMeta>> {
        let Some(raw) = self.kv.get(&self.keys.task_info(task_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(task_id, "任务元数据无法解析: {}", e);
                Ok(None)
            }
        }
    }

    async fn scan_workspaces(
        &self,
        report: &CompletionReport,
    ) -> SchedulerResult<Option<ReportTarget>> {
        let main_task_id = if report.main_task_id.is_empty() {
            root_task_id(&report.task_id)
        } else {
            report.main_task_id.as_str()
        };

        let store = self.lifecycle.store();
        let mut workspaces = match store
            .list_workspaces(self.config.fallback_workspace_limit)
            .await
        {
            Ok(workspaces) => workspaces,
            Err(e) => {
                warn!("列出工作空间失败: {}", e);
                Vec::new()
            }
        };
        if !workspaces.contains(&self.config.default_workspace) {
            workspaces.push(self.config.default_workspace.clone());
        }

        for workspace_id in workspaces {
            if let Some(main) = store.find_main_task(&workspace_id, main_task_id).await? {
                warn!(
                    task_id = %report.task_id,
                    %main_task_id,
                    %workspace_id,
                    "通过遍历工作空间找到主任务"
                );
                return Ok(Some(ReportTarget {
                    workspace_id,
                    kind: main.kind(),
                    main,
                }));
            }
        }
        Ok(None)
    }

    fn spawn_notification(&self, task: MainTask) {
        if !matches!(task.status, TaskStatus::Success | TaskStatus::Failure) {
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        let findings = Arc::clone(&self.findings);

        tokio::spawn(async move {
            let assets = findings
                .count_assets(&task.workspace_id, &task.task_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(task_id = %task.task_id, "统计资产数量失败: {}", e);
                    0
                });
            let vulns = findings
                .count_vulnerabilities(&task.workspace_id, &task.task_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(task_id = %task.task_id, "统计漏洞数量失败: {}", e);
                    0
                });

            let event = CompletionEvent::from_task(&task, assets, vulns);
            if let Err(e) = notifier.notify(&event).await {
                error!(task_id = %task.task_id, "发送完成通知失败: {}", e);
            }
        });
    }
}
