use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// 入队分数时钟
///
/// 以微秒时间戳作为有序集合的分数，同一进程内严格递增，
/// 即使系统时间回拨也不会产生更小的分数。
#[derive(Debug, Default)]
pub struct ScoreClock {
    last: AtomicI64,
}

impl ScoreClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_score(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = if now > prev { now } else { prev + 1 };
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_scores_strictly_increase() {
        let clock = ScoreClock::new();
        let mut last = clock.next_score();
        for _ in 0..1000 {
            let next = clock.next_score();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn test_scores_unique_across_threads() {
        let clock = Arc::new(ScoreClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..250).map(|_| clock.next_score()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
