use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use recon_core::config::RecoveryConfig;
use recon_core::models::{CompletionReport, ExecutionInfo, TaskDescriptor, TaskStatus};
use recon_core::traits::KeyValueStore;
use recon_core::SchedulerResult;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::aggregator::ProgressAggregator;
use crate::heartbeat::HeartbeatChannel;
use crate::keys::StoreKeys;
use crate::task_queue::TaskQueue;

/// 已认领任务的执行跟踪
///
/// 认领时写入执行信息并加入处理中集合，报告时刷新，终态报告时移除。
pub struct ExecutionTracker {
    kv: Arc<dyn KeyValueStore>,
    keys: StoreKeys,
    ttl: Duration,
}

impl ExecutionTracker {
    pub fn new(kv: Arc<dyn KeyValueStore>, keys: StoreKeys, ttl: Duration) -> Self {
        Self { kv, keys, ttl }
    }

    /// 记录认领。重新派发的任务沿用之前的重试次数。
    pub async fn track_claim(
        &self,
        descriptor: &TaskDescriptor,
        worker_name: &str,
    ) -> SchedulerResult<()> {
        let retry_count = self
            .load(&descriptor.task_id)
            .await?
            .map(|info| info.retry_count)
            .unwrap_or(0);

        let now = Utc::now();
        let info = ExecutionInfo {
            task_id: descriptor.task_id.clone(),
            worker_name: worker_name.to_string(),
            start_time: now,
            last_update: now,
            phase: None,
            progress: 0,
            retry_count,
            descriptor: descriptor.clone(),
        };
        self.save(&info).await?;
        self.kv
            .set_add(&self.keys.processing(), &descriptor.task_id)
            .await?;
        Ok(())
    }

    pub async fn touch(&self, task_id: &str, phase: Option<&str>) -> SchedulerResult<()> {
        let Some(mut info) = self.load(task_id).await? else {
            return Ok(());
        };
        info.last_update = Utc::now();
        if let Some(phase) = phase {
            info.phase = Some(phase.to_string());
        }
        self.save(&info).await
    }

    pub async fn finish(&self, task_id: &str) -> SchedulerResult<()> {
        self.kv.set_remove(&self.keys.processing(), task_id).await?;
        self.kv.delete(&self.keys.execution(task_id)).await?;
        Ok(())
    }

    /// 重新入队后移出处理中集合，执行信息保留下来用于累计重试次数
    pub async fn mark_requeued(&self, mut info: ExecutionInfo) -> SchedulerResult<()> {
        info.retry_count += 1;
        info.last_update = Utc::now();
        self.save(&info).await?;
        self.kv
            .set_remove(&self.keys.processing(), &info.task_id)
            .await?;
        Ok(())
    }

    pub async fn load(&self, task_id: &str) -> SchedulerResult<Option<ExecutionInfo>> {
        let Some(raw) = self.kv.get(&self.keys.execution(task_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                warn!(task_id, "执行信息无法解析: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn in_flight(&self) -> SchedulerResult<Vec<String>> {
        self.kv.set_members(&self.keys.processing()).await
    }

    async fn forget(&self, task_id: &str) -> SchedulerResult<()> {
        self.kv.set_remove(&self.keys.processing(), task_id).await?;
        Ok(())
    }

    async fn save(&self, info: &ExecutionInfo) -> SchedulerResult<()> {
        let payload = serde_json::to_string(info)?;
        self.kv
            .set(&self.keys.execution(&info.task_id), &payload, Some(self.ttl))
            .await
    }
}

/// 一轮恢复检查的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// 重新入队的任务
    pub requeued: Vec<String>,
    /// 超过重试次数被判定失败的任务
    pub failed: Vec<String>,
    /// 没有执行信息、直接移出处理中集合的任务
    pub stale: Vec<String>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty() && self.stale.is_empty()
    }
}

/// 任务恢复服务
///
/// 定期检查处理中的任务：Worker记录已过期或执行信息长时间未刷新的任务，
/// 在重试次数以内重新入队，否则按失败处理。重新入队意味着任务可能被执行多次。
pub struct RecoveryService {
    tracker: Arc<ExecutionTracker>,
    heartbeat: Arc<HeartbeatChannel>,
    queue: Arc<TaskQueue>,
    aggregator: Arc<ProgressAggregator>,
    config: RecoveryConfig,
    running: Arc<RwLock<bool>>,
}

impl RecoveryService {
    pub fn new(
        tracker: Arc<ExecutionTracker>,
        heartbeat: Arc<HeartbeatChannel>,
        queue: Arc<TaskQueue>,
        aggregator: Arc<ProgressAggregator>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            tracker,
            heartbeat,
            queue,
            aggregator,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// 运行检查循环，直到调用 [`RecoveryService::stop`]
    pub async fn start(&self) -> SchedulerResult<()> {
        if !self.config.enabled {
            info!("任务恢复已禁用");
            return Ok(());
        }
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!(
            interval = self.config.check_interval_seconds,
            timeout = self.config.task_timeout_seconds,
            "启动任务恢复循环"
        );

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.check_interval_seconds));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !*self.running.read().await {
                info!("收到停止信号，退出任务恢复循环");
                break;
            }

            match self.check_once().await {
                Ok(report) if !report.is_empty() => info!(
                    requeued = report.requeued.len(),
                    failed = report.failed.len(),
                    stale = report.stale.len(),
                    "任务恢复检查完成"
                ),
                Ok(_) => debug!("没有需要恢复的任务"),
                Err(e) => error!("任务恢复检查失败: {}", e),
            }
        }
        Ok(())
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 执行一轮检查
    pub async fn check_once(&self) -> SchedulerResult<RecoveryReport> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(self.config.task_timeout_seconds as i64);
        let mut report = RecoveryReport::default();

        for task_id in self.tracker.in_flight().await? {
            let Some(info) = self.tracker.load(&task_id).await? else {
                debug!(%task_id, "处理中的任务没有执行信息，移出集合");
                self.tracker.forget(&task_id).await?;
                report.stale.push(task_id);
                continue;
            };

            let worker_online = self.heartbeat.is_online(&info.worker_name).await?;
            if worker_online && !info.is_stale(now, timeout) {
                continue;
            }
            let reason = if worker_online {
                "执行信息超时未更新"
            } else {
                "Worker已离线"
            };

            if let Err(e) = self.recover(info, reason, &mut report).await {
                error!(%task_id, "恢复任务失败: {}", e);
            }
        }
        Ok(report)
    }

    async fn recover(
        &self,
        info: ExecutionInfo,
        reason: &str,
        report: &mut RecoveryReport,
    ) -> SchedulerResult<()> {
        let task_id = info.task_id.clone();

        if info.retry_count < self.config.max_retries {
            warn!(
                %task_id,
                worker = %info.worker_name,
                retry = info.retry_count + 1,
                max_retries = self.config.max_retries,
                "{}，任务重新入队",
                reason
            );
            self.queue.enqueue(&info.descriptor).await?;
            self.tracker.mark_requeued(info).await?;
            counter!("recon_recovery_requeued_total").increment(1);
            report.requeued.push(task_id);
            return Ok(());
        }

        warn!(
            %task_id,
            worker = %info.worker_name,
            retries = info.retry_count,
            "{}，已达到最大重试次数，任务失败",
            reason
        );
        let failure = CompletionReport {
            task_id: task_id.clone(),
            main_task_id: info.descriptor.main_task_id.clone(),
            worker: info.worker_name.clone(),
            state: TaskStatus::Failure,
            result: format!("{reason}，重试{}次后放弃", info.retry_count),
            phase: None,
        };
        self.aggregator.report(&failure).await?;
        report.failed.push(task_id);
        Ok(())
    }
}
