//! 生产者接口
//!
//! 外部协作方只能通过 `submit` 写日志, 不能绕过邮箱直接写文件。

use std::sync::Arc;
use std::time::Duration;

use aol_core::{LogEntry, LogicalClock, Result};

use crate::mailbox::BoundedMailbox;

/// 日志生产者
///
/// 克隆开销很小, 每个生产任务持有一份。
#[derive(Debug, Clone)]
pub struct LogProducer {
    clock: Arc<LogicalClock>,
    mailbox: Arc<BoundedMailbox>,
    entry_max_len: usize,
}

impl LogProducer {
    pub fn new(clock: Arc<LogicalClock>, mailbox: Arc<BoundedMailbox>, entry_max_len: usize) -> Self {
        Self {
            clock,
            mailbox,
            entry_max_len,
        }
    }

    /// 取时间戳并投递, 邮箱满时挂起; 返回分配的时间戳
    pub async fn submit(&self, text: impl Into<String>) -> Result<u64> {
        let entry = self.stamp(text);
        let timestamp = entry.timestamp();
        self.mailbox.send(entry).await?;
        Ok(timestamp)
    }

    /// 带截止时间的投递
    ///
    /// 超时后时间戳已被消耗, 文件中会出现对应的空缺。
    pub async fn submit_timeout(&self, text: impl Into<String>, timeout: Duration) -> Result<u64> {
        let entry = self.stamp(text);
        let timestamp = entry.timestamp();
        self.mailbox.send_timeout(entry, timeout).await?;
        Ok(timestamp)
    }

    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    fn stamp(&self, text: impl Into<String>) -> LogEntry {
        LogEntry::new(text, self.clock.next(), self.entry_max_len)
    }
}
