//! 日志 Actor 配置
//!
//! 由宿主提供 (JSON 文件或直接构造), 不是命令行界面。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AolError, Result};

/// 落盘格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// 单个 JSON 数组, 每次追加拼接闭合括号
    #[default]
    JsonArray,
    /// 每行一个 JSON 对象, 无需回写
    JsonLines,
}

/// 存储失败重试配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 每个条目最多尝试次数 (含首次)
    pub max_attempts: u32,
    /// 首次退避 (毫秒)
    pub initial_backoff_ms: u64,
    /// 退避上限 (毫秒)
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 邮箱槽位数 (可用容量为 capacity - 1)
    pub capacity: usize,
    /// 日志文件路径
    pub log_path: PathBuf,
    /// 单条文本最大字节数
    pub entry_max_len: usize,
    /// 落盘格式
    pub format: LogFormat,
    /// 重试策略
    pub retry: RetryConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            log_path: PathBuf::from("log.json"),
            entry_max_len: 255,
            format: LogFormat::JsonArray,
            retry: RetryConfig::default(),
        }
    }
}

impl LogConfig {
    /// 从 JSON 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 应用环境变量覆盖: `AOL_LOG_PATH`, `AOL_CAPACITY`, `AOL_ENTRY_MAX_LEN`
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(path) = std::env::var("AOL_LOG_PATH") {
            self.log_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var("AOL_CAPACITY") {
            self.capacity = parse_env("AOL_CAPACITY", &raw)?;
        }
        if let Ok(raw) = std::env::var("AOL_ENTRY_MAX_LEN") {
            self.entry_max_len = parse_env("AOL_ENTRY_MAX_LEN", &raw)?;
        }
        Ok(self)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.capacity <= 1 {
            return Err(AolError::Config(format!(
                "capacity must be greater than 1, got {}",
                self.capacity
            )));
        }
        if self.entry_max_len == 0 {
            return Err(AolError::Config("entry_max_len must be positive".to_string()));
        }
        if self.log_path.as_os_str().is_empty() {
            return Err(AolError::Config("log_path must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(AolError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_env(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|e| AolError::Config(format!("{name}={raw:?} is not a valid number: {e}")))
}
