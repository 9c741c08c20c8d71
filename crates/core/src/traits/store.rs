use std::time::Duration;

use async_trait::async_trait;

use crate::SchedulerResult;

/// 有序集合形式的任务队列存储
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// 插入成员，分数相同时按成员字典序排列
    async fn enqueue(&self, key: &str, member: &str, score: i64) -> SchedulerResult<()>;

    /// 按分数升序读取 `[offset, offset + count)` 区间，不修改队列
    async fn range(&self, key: &str, offset: usize, count: usize)
        -> SchedulerResult<Vec<(String, i64)>>;

    /// 条件删除：只有字节级完全相同的成员仍在队列中时才会删除，返回删除数量（0或1）
    async fn remove_exact(&self, key: &str, member: &str) -> SchedulerResult<u64>;

    /// 队列长度
    async fn len(&self, key: &str) -> SchedulerResult<u64>;
}

/// 带TTL的键值存储与集合操作
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 写入键值，`ttl` 为空表示永不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SchedulerResult<()>;

    async fn get(&self, key: &str) -> SchedulerResult<Option<String>>;

    /// 原子地读取并删除键，同一个值只会被一个调用方取到
    async fn take(&self, key: &str) -> SchedulerResult<Option<String>>;

    /// 删除键，返回键是否存在
    async fn delete(&self, key: &str) -> SchedulerResult<bool>;

    /// 向集合添加成员，返回是否为新成员
    async fn set_add(&self, key: &str, member: &str) -> SchedulerResult<bool>;

    async fn set_remove(&self, key: &str, member: &str) -> SchedulerResult<bool>;

    async fn set_members(&self, key: &str) -> SchedulerResult<Vec<String>>;
}
