use std::sync::Arc;

use recon_core::models::TaskDescriptor;
use recon_core::traits::QueueStore;
use recon_core::{ScoreClock, SchedulerResult};
use tracing::debug;

use crate::keys::StoreKeys;

/// 每级优先级折算的分数（微秒），相当于提前1000秒入队
pub const PRIORITY_STEP_MICROS: i64 = 1_000_000_000;

/// 按优先级和入队时间排序的任务队列
///
/// 成员是序列化后的 [`TaskDescriptor`]，分数为 [`ScoreClock`] 的时间减去
/// 优先级折算值：优先级高的排在前面，同一优先级内按入队顺序。
/// 队列本身不做任务ID去重，由提交方保证唯一。
pub struct TaskQueue {
    store: Arc<dyn QueueStore>,
    key: String,
    clock: ScoreClock,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn QueueStore>, keys: &StoreKeys) -> Self {
        Self {
            store,
            key: keys.task_queue(),
            clock: ScoreClock::new(),
        }
    }

    /// 入队并返回实际写入的描述（`enqueue_time` 已填入时钟值）
    pub async fn enqueue(&self, descriptor: &TaskDescriptor) -> SchedulerResult<TaskDescriptor> {
        let enqueue_time = self.clock.next_score();
        let score = priority_score(enqueue_time, descriptor.priority);
        let mut queued = descriptor.clone();
        queued.enqueue_time = enqueue_time;

        let member = serde_json::to_string(&queued)?;
        self.store.enqueue(&self.key, &member, score).await?;

        debug!(task_id = %queued.task_id, priority = queued.priority, score, "任务已入队");
        Ok(queued)
    }

    /// 只读扫描，不修改队列
    pub async fn peek_range(
        &self,
        offset: usize,
        count: usize,
    ) -> SchedulerResult<Vec<(String, i64)>> {
        self.store.range(&self.key, offset, count).await
    }

    /// 精确删除读到的原始成员，只有真正删掉时才返回 `true`
    pub async fn remove_exact(&self, member: &str) -> SchedulerResult<bool> {
        Ok(self.store.remove_exact(&self.key, member).await? > 0)
    }

    pub async fn len(&self) -> SchedulerResult<u64> {
        self.store.len(&self.key).await
    }
}

fn priority_score(enqueue_time: i64, priority: i32) -> i64 {
    enqueue_time.saturating_sub(i64::from(priority).saturating_mul(PRIORITY_STEP_MICROS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_infrastructure::MemoryStore;

    fn descriptor(task_id: &str) -> TaskDescriptor {
        TaskDescriptor {
            task_id: task_id.to_string(),
            main_task_id: String::new(),
            workspace_id: "ws".to_string(),
            task_name: "portscan".to_string(),
            config: "{}".to_string(),
            workers: None,
            priority: 0,
            enqueue_time: 0,
        }
    }

    #[tokio::test]
    async fn test_fifo_by_enqueue_time() {
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), &StoreKeys::default());
        let first = queue.enqueue(&descriptor("b")).await.unwrap();
        let second = queue.enqueue(&descriptor("a")).await.unwrap();
        assert!(second.enqueue_time > first.enqueue_time);

        let head = queue.peek_range(0, 2).await.unwrap();
        let ids: Vec<String> = head
            .iter()
            .map(|(member, _)| {
                serde_json::from_str::<TaskDescriptor>(member)
                    .unwrap()
                    .task_id
            })
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(head[0].1, first.enqueue_time);
    }

    #[tokio::test]
    async fn test_higher_priority_jumps_ahead() {
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), &StoreKeys::default());
        queue.enqueue(&descriptor("low")).await.unwrap();
        let urgent = TaskDescriptor {
            priority: 2,
            ..descriptor("urgent")
        };
        let queued = queue.enqueue(&urgent).await.unwrap();
        queue.enqueue(&descriptor("low-2")).await.unwrap();

        let head = queue.peek_range(0, 3).await.unwrap();
        let ids: Vec<String> = head
            .iter()
            .map(|(member, _)| {
                serde_json::from_str::<TaskDescriptor>(member)
                    .unwrap()
                    .task_id
            })
            .collect();
        assert_eq!(ids, vec!["urgent", "low", "low-2"]);
        assert_eq!(head[0].1, queued.enqueue_time - 2 * PRIORITY_STEP_MICROS);
    }

    #[test]
    fn test_priority_score_saturates() {
        assert_eq!(priority_score(100, 0), 100);
        assert_eq!(priority_score(100, -1), 100 + PRIORITY_STEP_MICROS);
        assert_eq!(priority_score(i64::MIN + 1, i32::MAX), i64::MIN);
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), &StoreKeys::default());
        queue.enqueue(&descriptor("t1")).await.unwrap();

        queue.peek_range(0, 1).await.unwrap();
        queue.peek_range(0, 1).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_exact_succeeds_once() {
        let queue = TaskQueue::new(Arc::new(MemoryStore::new()), &StoreKeys::default());
        queue.enqueue(&descriptor("t1")).await.unwrap();
        let (member, _) = queue.peek_range(0, 1).await.unwrap().remove(0);

        assert!(queue.remove_exact(&member).await.unwrap());
        assert!(!queue.remove_exact(&member).await.unwrap());
        assert_eq!(queue.len().await.unwrap(), 0);
    }
}
