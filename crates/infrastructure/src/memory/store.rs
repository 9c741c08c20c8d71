use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use recon_core::traits::{KeyValueStore, QueueStore};
use recon_core::SchedulerResult;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct SortedQueue {
    order: BTreeSet<(i64, String)>,
    scores: HashMap<String, i64>,
}

impl SortedQueue {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.order.remove(&(old, member.to_string()));
        }
        self.order.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => self.order.remove(&(score, member.to_string())),
            None => false,
        }
    }
}

#[derive(Debug)]
struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ValueEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    queues: HashMap<String, SortedQueue>,
    values: HashMap<String, ValueEntry>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// 内存实现的队列与键值存储
///
/// 所有操作在同一把锁内完成，因此条件删除天然是原子的。过期判断使用
/// `tokio::time::Instant`，测试中可以通过暂停时钟精确控制TTL。
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn enqueue(&self, key: &str, member: &str, score: i64) -> SchedulerResult<()> {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(key.to_string())
            .or_default()
            .insert(member, score);
        Ok(())
    }

    async fn range(
        &self,
        key: &str,
        offset: usize,
        count: usize,
    ) -> SchedulerResult<Vec<(String, i64)>> {
        let state = self.state.lock().await;
        Ok(state
            .queues
            .get(key)
            .map(|queue| {
                queue
                    .order
                    .iter()
                    .skip(offset)
                    .take(count)
                    .map(|(score, member)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove_exact(&self, key: &str, member: &str) -> SchedulerResult<u64> {
        let mut state = self.state.lock().await;
        let removed = state
            .queues
            .get_mut(key)
            .is_some_and(|queue| queue.remove(member));
        Ok(u64::from(removed))
    }

    async fn len(&self, key: &str) -> SchedulerResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .queues
            .get(key)
            .map_or(0, |queue| queue.order.len() as u64))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> SchedulerResult<()> {
        let mut state = self.state.lock().await;
        state.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let expired = match state.values.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return Ok(None),
        };
        if expired {
            state.values.remove(key);
            return Ok(None);
        }
        Ok(state.values.get(key).map(|entry| entry.value.clone()))
    }

    async fn take(&self, key: &str) -> SchedulerResult<Option<String>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        Ok(state
            .values
            .remove(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value))
    }

    async fn delete(&self, key: &str) -> SchedulerResult<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        Ok(state
            .values
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn set_add(&self, key: &str, member: &str) -> SchedulerResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> SchedulerResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state
            .sets
            .get_mut(key)
            .is_some_and(|set| set.remove(member)))
    }

    async fn set_members(&self, key: &str) -> SchedulerResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_orders_by_score_then_member() {
        let store = MemoryStore::new();
        store.enqueue("q", "b", 2).await.unwrap();
        store.enqueue("q", "a", 1).await.unwrap();
        store.enqueue("q", "c", 2).await.unwrap();

        let all = store.range("q", 0, 10).await.unwrap();
        let members: Vec<_> = all.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["a", "b", "c"]);

        let window = store.range("q", 1, 1).await.unwrap();
        assert_eq!(window, vec![("b".to_string(), 2)]);
        assert!(store.range("missing", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_re_enqueue_updates_score() {
        let store = MemoryStore::new();
        store.enqueue("q", "a", 1).await.unwrap();
        store.enqueue("q", "b", 2).await.unwrap();
        store.enqueue("q", "a", 3).await.unwrap();

        assert_eq!(store.len("q").await.unwrap(), 2);
        let head = store.range("q", 0, 1).await.unwrap();
        assert_eq!(head[0].0, "b");
    }

    #[tokio::test]
    async fn test_remove_exact_is_conditional() {
        let store = MemoryStore::new();
        store.enqueue("q", "{\"taskId\":\"t1\"}", 1).await.unwrap();

        assert_eq!(store.remove_exact("q", "{\"taskId\": \"t1\"}").await.unwrap(), 0);
        assert_eq!(store.remove_exact("q", "{\"taskId\":\"t1\"}").await.unwrap(), 1);
        assert_eq!(store.remove_exact("q", "{\"taskId\":\"t1\"}").await.unwrap(), 0);
        assert_eq!(store.len("q").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();
        store.set("forever", "v", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get("forever").await.unwrap().as_deref(), Some("v"));
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_returns_value_once() {
        let store = MemoryStore::new();
        store.set("a", "1", Some(Duration::from_secs(1))).await.unwrap();
        store.set("b", "2", Some(Duration::from_secs(5))).await.unwrap();

        assert_eq!(store.take("b").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.take("b").await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.take("a").await.unwrap(), None);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryStore::new();
        assert!(store.set_add("s", "w2").await.unwrap());
        assert!(store.set_add("s", "w1").await.unwrap());
        assert!(!store.set_add("s", "w1").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap(), vec!["w1", "w2"]);
        assert!(store.set_remove("s", "w1").await.unwrap());
        assert!(!store.set_remove("s", "w1").await.unwrap());
        assert_eq!(store.set_members("s").await.unwrap(), vec!["w2"]);
    }
}
