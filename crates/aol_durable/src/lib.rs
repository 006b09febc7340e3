//! # aol_durable - AOL Durable Logging
//!
//! 持久化底座: 有界邮箱解耦多个生产者与唯一的日志写入 Actor,
//! 追加写存储在独占文件锁保护下维护一个始终合法的 JSON 数组。

pub mod actor;
pub mod log_store;
pub mod mailbox;
pub mod producer;
pub mod retry;

pub use actor::{spawn_actor, ActorHandle, ActorReport, ActorState, LogActor};
pub use log_store::{DurableLogStore, LogReader, LogSink};
pub use mailbox::BoundedMailbox;
pub use producer::LogProducer;
pub use retry::RetryPolicy;

pub use aol_core::{AolError, LogConfig, LogEntry, LogicalClock, Result};
