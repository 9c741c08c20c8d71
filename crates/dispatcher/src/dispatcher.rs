use std::sync::Arc;

use metrics::counter;
use recon_core::models::TaskDescriptor;
use recon_core::traits::KeyValueStore;
use recon_core::{SchedulerError, SchedulerResult};
use tracing::{debug, error, info, warn};

use crate::keys::StoreKeys;
use crate::lifecycle::TaskLifecycle;
use crate::recovery::ExecutionTracker;
use crate::task_queue::TaskQueue;

/// 停止标记的取值
pub const STOP_FLAG: &str = "STOP";

/// 拉取式派发
///
/// 每次轮询最多检查 `max_skip` 个候选。唯一的同步手段是队列的精确删除：
/// 只有删除返回成功的轮询方才算认领到任务，失败的一方继续看下一个候选。
pub struct Dispatcher {
    queue: Arc<TaskQueue>,
    kv: Arc<dyn KeyValueStore>,
    lifecycle: Arc<TaskLifecycle>,
    tracker: Arc<ExecutionTracker>,
    keys: StoreKeys,
    max_skip: usize,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<TaskQueue>,
        kv: Arc<dyn KeyValueStore>,
        lifecycle: Arc<TaskLifecycle>,
        tracker: Arc<ExecutionTracker>,
        keys: StoreKeys,
        max_skip: usize,
    ) -> Self {
        Self {
            queue,
            kv,
            lifecycle,
            tracker,
            keys,
            max_skip,
        }
    }

    /// 为轮询的Worker认领一个任务。队列为空和没有可认领的任务都返回 `None`。
    pub async fn poll(&self, worker_name: &str) -> SchedulerResult<Option<TaskDescriptor>> {
        if worker_name.trim().is_empty() {
            return Err(SchedulerError::invalid_params("workerName不能为空"));
        }

        let mut offset = 0;
        for _ in 0..self.max_skip {
            let Some((member, _score)) = self.queue.peek_range(offset, 1).await?.into_iter().next()
            else {
                return Ok(None);
            };

            let descriptor = match serde_json::from_str::<TaskDescriptor>(&member) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("丢弃无法解析的队列条目: {}", e);
                    self.queue.remove_exact(&member).await?;
                    counter!("recon_dispatch_poison_dropped_total").increment(1);
                    continue;
                }
            };

            // 留在队列里给其他Worker
            if !descriptor.accepts(worker_name) {
                offset += 1;
                continue;
            }

            if self.is_stopped(&descriptor).await? {
                if self.queue.remove_exact(&member).await? {
                    info!(task_id = %descriptor.task_id, "根任务已停止，丢弃排队中的任务");
                    counter!("recon_dispatch_stop_dropped_total").increment(1);
                }
                continue;
            }

            if !self.queue.remove_exact(&member).await? {
                debug!(task_id = %descriptor.task_id, worker = worker_name, "认领竞争失败");
                counter!("recon_dispatch_race_lost_total").increment(1);
                continue;
            }

            counter!("recon_dispatch_claimed_total").increment(1);
            info!(
                task_id = %descriptor.task_id,
                workspace_id = %descriptor.workspace_id,
                worker = worker_name,
                "任务已派发"
            );
            self.on_claimed(&descriptor, worker_name).await;
            return Ok(Some(descriptor));
        }

        debug!(worker = worker_name, max_skip = self.max_skip, "扫描达到上限，没有可认领的任务");
        Ok(None)
    }

    async fn is_stopped(&self, descriptor: &TaskDescriptor) -> SchedulerResult<bool> {
        for root in descriptor.stop_roots() {
            let flag = self.kv.get(&self.keys.task_control(root)).await?;
            if flag.as_deref() == Some(STOP_FLAG) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 认领已经生效，后续记录失败只记日志
    async fn on_claimed(&self, descriptor: &TaskDescriptor, worker_name: &str) {
        if let Err(e) = self.lifecycle.mark_claimed(descriptor, worker_name).await {
            error!(task_id = %descriptor.task_id, "更新任务状态为STARTED失败: {}", e);
        }
        if let Err(e) = self.tracker.track_claim(descriptor, worker_name).await {
            error!(task_id = %descriptor.task_id, "记录执行信息失败: {}", e);
        }
    }
}
