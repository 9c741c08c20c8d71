use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use recon_core::models::{
    ControlCommand, HeartbeatResponse, WorkerRecord, WorkerStatusSnapshot, WorkerView,
};
use recon_core::traits::KeyValueStore;
use recon_core::{SchedulerError, SchedulerResult};
use tracing::{debug, info, warn};

use crate::keys::StoreKeys;

/// Worker心跳与控制指令通道
///
/// 在线状态只由带TTL的Worker记录是否存在决定；注册集合只增不减，
/// 用于列出见过的全部Worker。控制指令邮箱只有一个槽位，后写覆盖先写，
/// 被下一次心跳取走后立即删除，最多投递一次。
pub struct HeartbeatChannel {
    kv: Arc<dyn KeyValueStore>,
    keys: StoreKeys,
    worker_ttl: Duration,
}

impl HeartbeatChannel {
    pub fn new(kv: Arc<dyn KeyValueStore>, keys: StoreKeys, worker_ttl: Duration) -> Self {
        Self {
            kv,
            keys,
            worker_ttl,
        }
    }

    /// 处理一次心跳：刷新Worker记录并取走待执行的控制指令
    pub async fn keep_alive(
        &self,
        worker_name: &str,
        status: &WorkerStatusSnapshot,
    ) -> SchedulerResult<HeartbeatResponse> {
        ensure_worker_name(worker_name)?;

        let record = WorkerRecord::from_snapshot(worker_name, status, Utc::now());
        let payload = serde_json::to_string(&record)?;
        self.kv
            .set(&self.keys.worker(worker_name), &payload, Some(self.worker_ttl))
            .await?;
        if self.kv.set_add(&self.keys.workers(), worker_name).await? {
            info!(worker = worker_name, ip = %status.ip, "新Worker上线");
        }
        counter!("recon_heartbeat_total").increment(1);

        let command = self.take_control(worker_name).await?;
        debug!(worker = worker_name, "心跳已刷新");
        Ok(HeartbeatResponse::from(command))
    }

    /// 原子地取走控制指令，取走之后才写入的新指令留给下一次心跳
    async fn take_control(&self, worker_name: &str) -> SchedulerResult<ControlCommand> {
        let key = self.keys.worker_control(worker_name);
        let Some(raw) = self.kv.take(&key).await? else {
            return Ok(ControlCommand::default());
        };

        match serde_json::from_str::<ControlCommand>(&raw) {
            Ok(command) => {
                info!(worker = worker_name, ?command, "下发控制指令");
                Ok(command)
            }
            Err(e) => {
                warn!(worker = worker_name, "丢弃无法解析的控制指令: {}", e);
                Ok(ControlCommand::default())
            }
        }
    }

    /// 写入控制指令邮箱，未被领取的旧指令会被覆盖
    pub async fn send_control(
        &self,
        worker_name: &str,
        command: ControlCommand,
    ) -> SchedulerResult<()> {
        ensure_worker_name(worker_name)?;

        let key = self.keys.worker_control(worker_name);
        if self.kv.get(&key).await?.is_some() {
            warn!(worker = worker_name, "覆盖尚未被领取的控制指令");
        }
        let payload = serde_json::to_string(&command)?;
        self.kv.set(&key, &payload, None).await?;

        info!(worker = worker_name, ?command, "控制指令已写入");
        Ok(())
    }

    pub async fn get_worker(&self, worker_name: &str) -> SchedulerResult<Option<WorkerRecord>> {
        let Some(raw) = self.kv.get(&self.keys.worker(worker_name)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub async fn is_online(&self, worker_name: &str) -> SchedulerResult<bool> {
        Ok(self.kv.get(&self.keys.worker(worker_name)).await?.is_some())
    }

    /// 注册集合中的全部Worker，记录已过期的视为离线
    pub async fn list_workers(&self) -> SchedulerResult<Vec<WorkerView>> {
        let names = self.kv.set_members(&self.keys.workers()).await?;
        let mut workers = Vec::with_capacity(names.len());
        for name in names {
            let record = match self.get_worker(&name).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(worker = %name, "读取Worker记录失败: {}", e);
                    None
                }
            };
            workers.push(WorkerView {
                online: record.is_some(),
                name,
                record,
            });
        }
        Ok(workers)
    }
}

fn ensure_worker_name(worker_name: &str) -> SchedulerResult<()> {
    if worker_name.trim().is_empty() {
        return Err(SchedulerError::invalid_params("workerName不能为空"));
    }
    Ok(())
}
