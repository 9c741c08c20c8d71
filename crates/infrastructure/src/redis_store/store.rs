use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recon_core::traits::{KeyValueStore, QueueStore};
use recon_core::SchedulerResult;

use super::connection_manager::RedisConnectionManager;

/// Redis实现的队列与键值存储
///
/// 队列使用有序集合：`ZADD` 入队，`ZRANGE ... WITHSCORES` 只读扫描，
/// `ZREM` 作为条件删除，返回值为1时才算认领成功。
#[derive(Clone)]
pub struct RedisStore {
    manager: Arc<RedisConnectionManager>,
}

impl RedisStore {
    pub fn new(manager: Arc<RedisConnectionManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn enqueue(&self, key: &str, member: &str, score: i64) -> SchedulerResult<()> {
        let _: i64 = self
            .manager
            .execute_command(redis::cmd("ZADD").arg(key).arg(score).arg(member))
            .await?;
        Ok(())
    }

    async fn range(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> SchedulerResult<Vec<(String, i64)>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let stop = offset + count - 1;
        let entries: Vec<(String, f64)> = self
            .manager
            .execute_command(
                redis::cmd("ZRANGE")
                    .arg(key)
                    .arg(offset)
                    .arg(stop)
                    .arg("WITHSCORES"),
            )
            .await?;
        Ok(entries
            .into_iter()
            .map(|(member, score)| (member, score as i64))
            .collect())
    }

    async fn remove_exact(&self, key: &str, member: &str) -> SchedulerResult<u64> {
        self.manager
            .execute_command(redis::cmd("ZREM").arg(key).arg(member))
            .await
    }

    async fn len(&self, key: &str) -> SchedulerResult<u64> {
        self.manager
            .execute_command(redis::cmd("ZCARD").arg(key))
            .await
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SchedulerResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = self.manager.execute_command(&cmd).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        self.manager
            .execute_command(redis::cmd("GET").arg(key))
            .await
    }

    /// 需要 Redis 6.2 及以上版本
    async fn take(&self, key: &str) -> SchedulerResult<Option<String>> {
        self.manager
            .execute_command(redis::cmd("GETDEL").arg(key))
            .await
    }

    async fn delete(&self, key: &str) -> SchedulerResult<bool> {
        let removed: i64 = self
            .manager
            .execute_command(redis::cmd("DEL").arg(key))
            .await?;
        Ok(removed > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> SchedulerResult<bool> {
        let added: i64 = self
            .manager
            .execute_command(redis::cmd("SADD").arg(key).arg(member))
            .await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> SchedulerResult<bool> {
        let removed: i64 = self
            .manager
            .execute_command(redis::cmd("SREM").arg(key).arg(member))
            .await?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> SchedulerResult<Vec<String>> {
        let mut members: Vec<String> = self
            .manager
            .execute_command(redis::cmd("SMEMBERS").arg(key))
            .await?;
        members.sort();
        Ok(members)
    }
}
