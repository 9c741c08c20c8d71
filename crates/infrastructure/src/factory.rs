use std::sync::Arc;
use std::time::Duration;

use recon_core::config::{AppConfig, NotifyConfig, StorageBackend};
use recon_core::traits::{CompletionNotifier, KeyValueStore, QueueStore, TaskStore};
use recon_core::SchedulerResult;
use tracing::{info, warn};

use crate::database::SqliteTaskStore;
use crate::memory::MemoryStore;
use crate::notify::{LogNotifier, WebhookNotifier};
use crate::redis_store::{RedisConnectionManager, RedisStore};

/// 调度服务依赖的全部存储
#[derive(Clone)]
pub struct StoreBundle {
    pub queue: Arc<dyn QueueStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub tasks: Arc<dyn TaskStore>,
}

/// 按配置创建存储：临时状态走Redis或内存，任务记录走SQLite
pub async fn build_stores(config: &AppConfig) -> SchedulerResult<StoreBundle> {
    let (queue, kv) = match config.storage.backend {
        StorageBackend::Redis => {
            let manager = Arc::new(RedisConnectionManager::new(config.redis.clone()).await?);
            let store = Arc::new(RedisStore::new(manager));
            info!(
                "使用Redis存储: {}:{}",
                config.redis.host, config.redis.port
            );
            let queue: Arc<dyn QueueStore> = store.clone();
            let kv: Arc<dyn KeyValueStore> = store;
            (queue, kv)
        }
        StorageBackend::Memory => {
            warn!("使用内存存储，调度状态不会跨进程共享");
            let store = Arc::new(MemoryStore::new());
            let queue: Arc<dyn QueueStore> = store.clone();
            let kv: Arc<dyn KeyValueStore> = store;
            (queue, kv)
        }
    };

    let tasks = Arc::new(SqliteTaskStore::connect(&config.database).await?);

    Ok(StoreBundle { queue, kv, tasks })
}

pub fn build_notifier(config: &NotifyConfig) -> SchedulerResult<Arc<dyn CompletionNotifier>> {
    match &config.webhook_url {
        Some(url) => {
            info!("完成通知将推送到Webhook: {}", url);
            Ok(Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_secs(config.timeout_seconds),
            )?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}
