//! 日志 Actor - 唯一的日志写入者
//!
//! 状态机: `Running → (每轮) receive → append → Running`, 终态 `Stopped` / `Failed`。
//! 关闭信号只在两轮之间生效: 已取出的条目一定完整写入 (含重试) 后才会停止,
//! 仍在邮箱中的条目整体丢弃, 不存在写到一半的情况。

use std::sync::Arc;

use aol_core::{AolError, LogEntry, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::log_store::LogSink;
use crate::mailbox::BoundedMailbox;
use crate::retry::RetryPolicy;

/// Actor 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorState {
    /// 正在运行
    Running,
    /// 已按关闭信号或邮箱关闭停止
    Stopped,
    /// 存储致命错误后停止
    Failed,
}

/// Actor 退出报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorReport {
    /// 成功写入的条目数
    pub appended: u64,
    /// 停止时仍留在邮箱中被丢弃的条目数
    pub discarded: usize,
}

/// 日志 Actor
pub struct LogActor<S: LogSink> {
    mailbox: Arc<BoundedMailbox>,
    sink: Arc<S>,
    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<ActorState>,
    appended: u64,
}

impl<S: LogSink> LogActor<S> {
    pub fn new(
        mailbox: Arc<BoundedMailbox>,
        sink: Arc<S>,
        retry: RetryPolicy,
        shutdown: watch::Receiver<bool>,
        state: watch::Sender<ActorState>,
    ) -> Self {
        Self {
            mailbox,
            sink,
            retry,
            shutdown,
            state,
            appended: 0,
        }
    }

    /// 运行消息循环直到关闭或致命错误
    ///
    /// 退出时总会关闭邮箱, 阻塞中的生产者会收到 `MailboxClosed` 而不是永久挂起。
    pub async fn run(mut self) -> Result<ActorReport> {
        info!(capacity = self.mailbox.capacity(), "log actor started");
        self.state.send_replace(ActorState::Running);

        let result = self.process().await;
        self.mailbox.close();

        match result {
            Ok(()) => {
                let report = ActorReport {
                    appended: self.appended,
                    discarded: self.mailbox.len(),
                };
                self.state.send_replace(ActorState::Stopped);
                info!(
                    appended = report.appended,
                    discarded = report.discarded,
                    "log actor stopped"
                );
                Ok(report)
            }
            Err(e) => {
                self.state.send_replace(ActorState::Failed);
                error!(appended = self.appended, error = %e, "log actor failed");
                Err(e)
            }
        }
    }

    async fn process(&mut self) -> Result<()> {
        loop {
            // 两轮之间检查关闭信号
            if *self.shutdown.borrow() {
                return Ok(());
            }

            let entry = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => return Ok(()),
                received = self.mailbox.receive() => match received {
                    Ok(entry) => entry,
                    Err(AolError::MailboxClosed) => return Ok(()),
                    Err(e) => return Err(e),
                },
            };

            // 从这里开始不再响应关闭, 直到条目写入或确认失败
            self.append_with_retry(&entry).await?;
            self.appended += 1;
        }
    }

    async fn append_with_retry(&self, entry: &LogEntry) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sink.append(entry).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        timestamp = entry.timestamp(),
                        attempt,
                        ?backoff,
                        error = %e,
                        "log append failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(
                        timestamp = entry.timestamp(),
                        attempt,
                        error = %e,
                        "log append failed permanently"
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// 等待关闭信号; 发送端被丢弃时永远挂起, 交由邮箱关闭来终止
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Actor 句柄
pub struct ActorHandle {
    mailbox: Arc<BoundedMailbox>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ActorState>,
    task: JoinHandle<Result<ActorReport>>,
}

impl ActorHandle {
    pub fn mailbox(&self) -> &Arc<BoundedMailbox> {
        &self.mailbox
    }

    /// 当前状态
    pub fn state(&self) -> ActorState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 协作式关闭: 正在写的条目写完后停止, 邮箱中剩余条目丢弃
    pub async fn shutdown(self) -> Result<ActorReport> {
        self.shutdown.send_replace(true);
        self.join().await
    }

    /// 排空关闭: 拒绝新条目, 写完邮箱中已有条目后停止
    pub async fn drain(self) -> Result<ActorReport> {
        self.mailbox.close();
        self.join().await
    }

    /// 等待 Actor 自行结束 (通常因为致命错误)
    pub async fn join(self) -> Result<ActorReport> {
        self.task
            .await
            .map_err(|e| AolError::Io(std::io::Error::other(e)))?
    }
}

/// 在当前 tokio 运行时上启动日志 Actor
pub fn spawn_actor<S: LogSink>(
    mailbox: Arc<BoundedMailbox>,
    sink: Arc<S>,
    retry: RetryPolicy,
) -> ActorHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(ActorState::Running);

    let actor = LogActor::new(Arc::clone(&mailbox), sink, retry, shutdown_rx, state_tx);
    let task = tokio::spawn(actor.run());

    ActorHandle {
        mailbox,
        shutdown: shutdown_tx,
        state: state_rx,
        task,
    }
}
