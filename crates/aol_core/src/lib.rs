//! # aol_core - AOL Core Primitives
//!
//! 核心原语层，定义日志条目、逻辑时钟、配置与全局错误处理机制。
//! 此 crate 是整个项目的基础依赖，不依赖其他业务 crate。

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;

pub use clock::LogicalClock;
pub use config::{LogConfig, LogFormat, RetryConfig};
pub use entry::LogEntry;
pub use error::{AolError, Result};
