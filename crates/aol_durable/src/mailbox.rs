//! 有界邮箱
//!
//! 固定槽位的环形缓冲区, `head`/`tail` 索引对 `capacity` 取模。
//! 永远保留一个空槽区分 "空" (`head == tail`) 与 "满" (`(tail + 1) % capacity == head`),
//! 因此可用容量为 `capacity - 1`。
//!
//! 互斥区只覆盖 O(1) 的索引与槽位更新, 等待发生在锁外 (`Notify`)。

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use aol_core::{AolError, LogEntry, Result};
use tokio::sync::Notify;

/// 环形缓冲区状态, 只在持有锁时访问
struct Ring {
    slots: Vec<Option<LogEntry>>,
    head: usize,
    tail: usize,
    closed: bool,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn is_full(&self) -> bool {
        (self.tail + 1) % self.capacity() == self.head
    }

    fn len(&self) -> usize {
        (self.tail + self.capacity() - self.head) % self.capacity()
    }

    fn push(&mut self, entry: LogEntry) {
        debug_assert!(!self.is_full());
        self.slots[self.tail] = Some(entry);
        self.tail = (self.tail + 1) % self.capacity();
    }

    fn pop(&mut self) -> Option<LogEntry> {
        if self.is_empty() {
            return None;
        }
        let entry = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        entry
    }
}

/// 有界阻塞 FIFO 邮箱
pub struct BoundedMailbox {
    ring: Mutex<Ring>,
    /// 有新条目时唤醒一个接收者
    not_empty: Notify,
    /// 有空槽时唤醒一个发送者
    not_full: Notify,
}

impl BoundedMailbox {
    /// 创建 `capacity` 个槽位的邮箱, `capacity` 必须大于 1
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity <= 1 {
            return Err(AolError::Config(format!(
                "mailbox capacity must be greater than 1, got {capacity}"
            )));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|e| AolError::Allocation(format!("mailbox with {capacity} slots: {e}")))?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // 临界区内没有会 panic 的操作, 中毒状态可以直接接管
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 发送条目, 邮箱满时挂起直到有空槽
    ///
    /// 邮箱关闭后返回 `MailboxClosed`。
    pub async fn send(&self, entry: LogEntry) -> Result<()> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            // 先登记等待, 再检查状态, 避免丢失唤醒
            notified.as_mut().enable();

            {
                let mut ring = self.lock();
                if ring.closed {
                    return Err(AolError::MailboxClosed);
                }
                if !ring.is_full() {
                    ring.push(entry);
                    drop(ring);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// 接收条目, 邮箱空时挂起
    ///
    /// 关闭后仍会先取完已入队的条目, 空且已关闭时返回 `MailboxClosed`。
    pub async fn receive(&self) -> Result<LogEntry> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut ring = self.lock();
                if let Some(entry) = ring.pop() {
                    drop(ring);
                    self.not_full.notify_one();
                    return Ok(entry);
                }
                if ring.closed {
                    return Err(AolError::MailboxClosed);
                }
            }

            notified.await;
        }
    }

    /// 带截止时间的发送, 超时返回 `Timeout`, 条目不会入队
    pub async fn send_timeout(&self, entry: LogEntry, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.send(entry))
            .await
            .map_err(|_| AolError::Timeout(timeout))?
    }

    /// 带截止时间的接收
    pub async fn receive_timeout(&self, timeout: Duration) -> Result<LogEntry> {
        tokio::time::timeout(timeout, self.receive())
            .await
            .map_err(|_| AolError::Timeout(timeout))?
    }

    /// 关闭邮箱并唤醒所有等待者
    pub fn close(&self) {
        let mut ring = self.lock();
        if ring.closed {
            return;
        }
        ring.closed = true;
        drop(ring);

        tracing::debug!("mailbox closed");
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// 当前排队条目数
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().is_full()
    }

    /// 槽位总数
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// 可用容量 (`capacity - 1`)
    pub fn usable_capacity(&self) -> usize {
        self.capacity() - 1
    }
}

impl std::fmt::Debug for BoundedMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.lock();
        f.debug_struct("BoundedMailbox")
            .field("capacity", &ring.capacity())
            .field("len", &ring.len())
            .field("head", &ring.head)
            .field("tail", &ring.tail)
            .field("closed", &ring.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    fn entry(text: &str, ts: u64) -> LogEntry {
        LogEntry::new(text, ts, 255)
    }

    #[test]
    fn test_rejects_tiny_capacity() {
        assert!(matches!(BoundedMailbox::new(0), Err(AolError::Config(_))));
        assert!(matches!(BoundedMailbox::new(1), Err(AolError::Config(_))));
        assert!(BoundedMailbox::new(2).is_ok());
    }

    #[tokio::test]
    async fn test_fifo_single_producer() {
        let mailbox = BoundedMailbox::new(4).unwrap();
        mailbox.send(entry("a", 1)).await.unwrap();
        mailbox.send(entry("b", 2)).await.unwrap();
        mailbox.send(entry("c", 3)).await.unwrap();

        assert_eq!(mailbox.receive().await.unwrap().text(), "a");
        assert_eq!(mailbox.receive().await.unwrap().text(), "b");
        assert_eq!(mailbox.receive().await.unwrap().text(), "c");
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn test_one_slot_is_kept_free() {
        let mailbox = BoundedMailbox::new(4).unwrap();
        assert_eq!(mailbox.usable_capacity(), 3);

        for i in 0..3 {
            mailbox.send(entry("x", i)).await.unwrap();
        }
        assert!(mailbox.is_full());
        assert_eq!(mailbox.len(), 3);

        let mut blocked = task::spawn(mailbox.send(entry("overflow", 99)));
        assert_pending!(blocked.poll());

        assert_eq!(mailbox.receive().await.unwrap().timestamp(), 0);
        assert!(blocked.is_woken());
        assert_ready!(blocked.poll()).unwrap();
        assert_eq!(mailbox.len(), 3);
    }

    #[tokio::test]
    async fn test_receive_waits_for_send() {
        let mailbox = BoundedMailbox::new(2).unwrap();
        let mut waiting = task::spawn(mailbox.receive());
        assert_pending!(waiting.poll());

        mailbox.send(entry("late", 5)).await.unwrap();
        assert!(waiting.is_woken());
        let received = assert_ready!(waiting.poll()).unwrap();
        assert_eq!(received.text(), "late");
    }

    #[tokio::test]
    async fn test_wraparound_preserves_order() {
        let mailbox = BoundedMailbox::new(3).unwrap();
        for round in 0..10u64 {
            mailbox.send(entry("p", round * 2)).await.unwrap();
            mailbox.send(entry("q", round * 2 + 1)).await.unwrap();
            assert_eq!(mailbox.receive().await.unwrap().timestamp(), round * 2);
            assert_eq!(mailbox.receive().await.unwrap().timestamp(), round * 2 + 1);
        }
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_receiver() {
        let mailbox = BoundedMailbox::new(2).unwrap();
        let mut waiting = task::spawn(mailbox.receive());
        assert_pending!(waiting.poll());

        mailbox.close();
        assert!(waiting.is_woken());
        assert!(matches!(assert_ready!(waiting.poll()), Err(AolError::MailboxClosed)));
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_sender() {
        let mailbox = BoundedMailbox::new(2).unwrap();
        mailbox.send(entry("fill", 1)).await.unwrap();

        let mut blocked = task::spawn(mailbox.send(entry("stuck", 2)));
        assert_pending!(blocked.poll());

        mailbox.close();
        assert!(matches!(assert_ready!(blocked.poll()), Err(AolError::MailboxClosed)));
    }

    #[tokio::test]
    async fn test_closed_mailbox_drains_before_failing() {
        let mailbox = BoundedMailbox::new(4).unwrap();
        mailbox.send(entry("a", 1)).await.unwrap();
        mailbox.send(entry("b", 2)).await.unwrap();
        mailbox.close();

        assert!(matches!(
            mailbox.send(entry("c", 3)).await,
            Err(AolError::MailboxClosed)
        ));
        assert_eq!(mailbox.receive().await.unwrap().text(), "a");
        assert_eq!(mailbox.receive().await.unwrap().text(), "b");
        assert!(matches!(mailbox.receive().await, Err(AolError::MailboxClosed)));
    }

    #[tokio::test]
    async fn test_timeouts() {
        let mailbox = BoundedMailbox::new(2).unwrap();
        let wait = Duration::from_millis(20);

        assert!(matches!(
            mailbox.receive_timeout(wait).await,
            Err(AolError::Timeout(d)) if d == wait
        ));

        mailbox.send_timeout(entry("one", 1), wait).await.unwrap();
        assert!(matches!(
            mailbox.send_timeout(entry("two", 2), wait).await,
            Err(AolError::Timeout(_))
        ));
        assert_eq!(mailbox.len(), 1);
        assert_eq!(mailbox.receive_timeout(wait).await.unwrap().text(), "one");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_no_loss_no_duplication() {
        let mailbox = Arc::new(BoundedMailbox::new(3).unwrap());
        let producers = 4u64;
        let per_producer = 200u64;

        let mut handles = Vec::new();
        for p in 0..producers {
            let mailbox = Arc::clone(&mailbox);
            handles.push(tokio::spawn(async move {
                for i in 0..per_producer {
                    mailbox.send(entry(&format!("p{p}"), p * 1000 + i)).await.unwrap();
                }
            }));
        }

        let mut last_seen = vec![None::<u64>; producers as usize];
        for _ in 0..producers * per_producer {
            let received = mailbox.receive().await.unwrap();
            let p = (received.timestamp() / 1000) as usize;
            // 同一生产者的条目保持发送顺序
            if let Some(prev) = last_seen[p] {
                assert!(received.timestamp() > prev);
            }
            last_seen[p] = Some(received.timestamp());
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(mailbox.is_empty());
        for (p, last) in last_seen.iter().enumerate() {
            assert_eq!(*last, Some(p as u64 * 1000 + per_producer - 1));
        }
    }
}
