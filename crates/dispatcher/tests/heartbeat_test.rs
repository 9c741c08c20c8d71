mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recon_core::models::{ControlCommand, HeartbeatRequest, WorkerStatusSnapshot};
use recon_core::traits::KeyValueStore;
use recon_core::{SchedulerError, SchedulerResult};
use recon_dispatcher::{HeartbeatChannel, StoreKeys};
use recon_infrastructure::MemoryStore;
use tokio::sync::Mutex;

use common::harness;

fn heartbeat(worker_name: &str) -> HeartbeatRequest {
    HeartbeatRequest {
        worker_name: worker_name.to_string(),
        status: WorkerStatusSnapshot {
            ip: "10.0.0.7".to_string(),
            cpu_load: 12.5,
            mem_used: 40.0,
            task_started_number: 3,
            task_executed_number: 2,
            is_daemon: true,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn test_worker_record_expires_after_ttl() {
    let h = harness();
    h.service.heartbeat(&heartbeat("w1")).await.unwrap();

    tokio::time::advance(Duration::from_secs(59)).await;
    let workers = h.service.list_workers().await.unwrap();
    assert_eq!(workers.len(), 1);
    assert!(workers[0].online);
    let record = workers[0].record.as_ref().unwrap();
    assert_eq!(record.ip, "10.0.0.7");
    assert_eq!(record.task_executed_number, 2);

    tokio::time::advance(Duration::from_secs(2)).await;
    let workers = h.service.list_workers().await.unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].name, "w1");
    assert!(!workers[0].online);
    assert!(workers[0].record.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_refreshes_ttl() {
    let h = harness();
    h.service.heartbeat(&heartbeat("w1")).await.unwrap();
    tokio::time::advance(Duration::from_secs(50)).await;
    h.service.heartbeat(&heartbeat("w1")).await.unwrap();
    tokio::time::advance(Duration::from_secs(50)).await;

    assert!(h.service.list_workers().await.unwrap()[0].online);
}

#[tokio::test]
async fn test_control_delivered_at_most_once() {
    let h = harness();
    h.service
        .send_control(
            "w1",
            ControlCommand {
                stop: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.service
        .send_control(
            "w1",
            ControlCommand {
                reload: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = h.service.heartbeat(&heartbeat("w1")).await.unwrap();
    assert!(response.reload_flag);
    assert!(!response.stop_flag);
    assert!(!response.init_env_flag);
    assert!(!response.sync_flag);

    let response = h.service.heartbeat(&heartbeat("w1")).await.unwrap();
    assert!(response.command().is_empty());
    assert!(h.store.get("recon:worker:control:w1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_control_is_per_worker() {
    let h = harness();
    h.service
        .send_control(
            "w2",
            ControlCommand {
                sync: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(h
        .service
        .heartbeat(&heartbeat("w1"))
        .await
        .unwrap()
        .command()
        .is_empty());
    assert!(h.service.heartbeat(&heartbeat("w2")).await.unwrap().sync_flag);
}

#[tokio::test]
async fn test_malformed_control_is_discarded() {
    let h = harness();
    h.store
        .set("recon:worker:control:w1", "stop please", None)
        .await
        .unwrap();

    let response = h.service.heartbeat(&heartbeat("w1")).await.unwrap();
    assert!(response.command().is_empty());
    assert!(h.store.get("recon:worker:control:w1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_worker_name_is_rejected() {
    let h = harness();
    let result = h.service.heartbeat(&heartbeat("")).await;
    assert!(matches!(result, Err(SchedulerError::InvalidTaskParams(_))));

    let result = h.service.send_control("", ControlCommand::default()).await;
    assert!(matches!(result, Err(SchedulerError::InvalidTaskParams(_))));
}

/// 读到某个键之后立刻再写入一个新值，模拟运维在心跳处理期间下发指令
struct LateWriteStore {
    inner: MemoryStore,
    late_write: Mutex<Option<(String, String)>>,
}

impl LateWriteStore {
    async fn after_read(&self, key: &str) -> SchedulerResult<()> {
        let pending = {
            let mut late_write = self.late_write.lock().await;
            match late_write.as_ref() {
                Some((target, _)) if target == key => late_write.take(),
                _ => None,
            }
        };
        if let Some((key, value)) = pending {
            self.inner.set(&key, &value, None).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for LateWriteStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SchedulerResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        let value = self.inner.get(key).await?;
        self.after_read(key).await?;
        Ok(value)
    }

    async fn take(&self, key: &str) -> SchedulerResult<Option<String>> {
        let value = self.inner.take(key).await?;
        self.after_read(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> SchedulerResult<bool> {
        self.inner.delete(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> SchedulerResult<bool> {
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> SchedulerResult<bool> {
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> SchedulerResult<Vec<String>> {
        self.inner.set_members(key).await
    }
}

#[tokio::test]
async fn test_control_written_during_pickup_is_kept_for_next_heartbeat() {
    let keys = StoreKeys::default();
    let store = Arc::new(LateWriteStore {
        inner: MemoryStore::new(),
        late_write: Mutex::new(None),
    });
    let channel = HeartbeatChannel::new(store.clone(), keys.clone(), Duration::from_secs(60));
    let status = heartbeat("w1").status;

    channel
        .send_control(
            "w1",
            ControlCommand {
                reload: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let newer = serde_json::to_string(&ControlCommand {
        stop: true,
        ..Default::default()
    })
    .unwrap();
    *store.late_write.lock().await = Some((keys.worker_control("w1"), newer));

    let first = channel.keep_alive("w1", &status).await.unwrap();
    assert!(first.reload_flag);
    assert!(!first.stop_flag);

    let second = channel.keep_alive("w1", &status).await.unwrap();
    assert!(second.stop_flag);
    assert!(!second.reload_flag);

    let third = channel.keep_alive("w1", &status).await.unwrap();
    assert!(third.command().is_empty());
}
