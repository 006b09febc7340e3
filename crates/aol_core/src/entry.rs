//! 日志条目定义

use serde::{Deserialize, Serialize};

use crate::error::{AolError, Result};

/// 日志条目
///
/// 创建后不可变。序列化字段顺序即落盘顺序: `timestamp` 在前, `log_entry` 在后。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 逻辑时间戳
    timestamp: u64,
    /// 日志文本 (不超过 entry_max_len 字节)
    #[serde(rename = "log_entry")]
    text: String,
}

impl LogEntry {
    /// 创建条目, 超长文本被静默截断到 `max_len` 字节
    ///
    /// 截断点落在 `max_len` 之内最近的 UTF-8 字符边界上, ASCII 文本恰好保留 `max_len` 字节。
    pub fn new(text: impl Into<String>, timestamp: u64, max_len: usize) -> Self {
        let mut text = text.into();
        if text.len() > max_len {
            let original = text.len();
            text.truncate(floor_char_boundary(&text, max_len));
            tracing::debug!(timestamp, original, kept = text.len(), "log entry truncated");
        }
        Self { timestamp, text }
    }

    /// 严格创建, 超长时返回 `EntryTooLong`
    pub fn try_new(text: impl Into<String>, timestamp: u64, max_len: usize) -> Result<Self> {
        let text = text.into();
        if text.len() > max_len {
            return Err(AolError::EntryTooLong {
                len: text.len(),
                max: max_len,
            });
        }
        Ok(Self { timestamp, text })
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
