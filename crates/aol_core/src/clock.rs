//! Lamport 逻辑时钟
//!
//! 为日志条目分配全序时间戳, 不依赖墙钟。时钟是显式对象,
//! 通过 `Arc` 交给各个生产者, 自增为原子操作。

use std::sync::atomic::{AtomicU64, Ordering};

/// 逻辑时钟
#[derive(Debug, Default)]
pub struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    /// 创建新时钟, 首次 `next()` 返回 1
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// 自增并返回新的时间戳
    ///
    /// 并发调用时每个返回值都唯一且单调递增。
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// 读取最近一次分配的时间戳, 不自增
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// 见证外部时间戳, 保证下一次 `next()` 大于 `remote`
    ///
    /// 只会前进, 从不回退。
    pub fn observe(&self, remote: u64) {
        self.counter.fetch_max(remote, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_sequential_ticks() {
        let clock = LogicalClock::new();
        let ticks: Vec<u64> = (0..5).map(|_| clock.next()).collect();
        assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
        assert_eq!(clock.current(), 5);
    }

    #[test]
    fn test_concurrent_ticks_are_unique() {
        let clock = Arc::new(LogicalClock::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..250).map(|_| clock.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for ts in handle.join().unwrap() {
                assert!(seen.insert(ts), "duplicate timestamp {ts}");
            }
        }
        assert_eq!(seen.len(), 2000);
        assert_eq!(seen.iter().copied().max(), Some(2000));
        assert_eq!(seen.iter().copied().min(), Some(1));
    }

    #[test]
    fn test_observe_never_rolls_back() {
        let clock = LogicalClock::new();
        clock.observe(41);
        assert_eq!(clock.next(), 42);

        clock.observe(10);
        assert_eq!(clock.next(), 43);
    }
}
