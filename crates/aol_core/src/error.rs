//! 全局错误处理机制

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// AOL 统一错误类型
#[derive(Error, Debug)]
pub enum AolError {
    /// 邮箱槽位无法分配, 不可恢复
    #[error("Allocation failure: {0}")]
    Allocation(String),

    #[error("Failed to open log file {path:?}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to acquire exclusive lock on {path:?}: {source}")]
    LockAcquisition {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write log file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 非空文件不以 `]` 结尾, 拒绝拼接
    #[error("Log file {path:?} is not a JSON array: {reason}")]
    CorruptLog { path: PathBuf, reason: String },

    #[error("Entry too long: {len} bytes exceeds limit of {max}")]
    EntryTooLong { len: usize, max: usize },

    #[error("Mailbox closed")]
    MailboxClosed,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AolError {
    /// 是否为可重试的瞬时存储错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AolError::FileOpen { .. }
                | AolError::LockAcquisition { .. }
                | AolError::Write { .. }
                | AolError::Io(_)
        )
    }
}

/// 统一 Result 类型别名
pub type Result<T> = std::result::Result<T, AolError>;
