//! AOL Daemon - 日志 Actor 驱动器
//!
//! 启动日志 Actor, 模拟生产者投递日志, 排空后回读日志文件。
//! 用法: `aol-daemon [config.json]`

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use aol_core::LogConfig;
use aol_durable::{
    spawn_actor, ActorReport, BoundedMailbox, DurableLogStore, LogProducer, LogReader,
    LogicalClock, RetryPolicy,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 模拟请求数
const SIMULATED_ENTRIES: usize = 5;
/// 模拟请求间隔
const REQUEST_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aol_daemon=info,aol_durable=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    tracing::info!(
        path = %config.log_path.display(),
        capacity = config.capacity,
        format = ?config.format,
        "AOL Daemon starting..."
    );

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let report = run(&config, SIMULATED_ENTRIES, REQUEST_INTERVAL, interrupt).await?;
    tracing::info!(
        appended = report.appended,
        discarded = report.discarded,
        "Log actor stopped"
    );

    println!("Reading the log:");
    for line in LogReader::new(&config.log_path).read()? {
        println!("{line}");
    }

    Ok(())
}

fn load_config() -> anyhow::Result<LogConfig> {
    let config = match std::env::args().nth(1) {
        Some(path) => LogConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => LogConfig::default(),
    };
    let config = config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// 启动 Actor, 投递 `entries` 条日志后排空
///
/// `interrupt` 完成时改为协作式关闭: 正在写的条目写完, 邮箱中剩余条目丢弃。
/// 存储致命错误会作为错误返回, 进程以非零状态退出。
async fn run(
    config: &LogConfig,
    entries: usize,
    interval: Duration,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<ActorReport> {
    let mailbox = Arc::new(BoundedMailbox::new(config.capacity)?);
    let store = Arc::new(DurableLogStore::from_config(config));
    let handle = spawn_actor(Arc::clone(&mailbox), store, RetryPolicy::from(&config.retry));
    tracing::info!("Log actor spawned");

    let producer = LogProducer::new(
        Arc::new(LogicalClock::new()),
        Arc::clone(&mailbox),
        config.entry_max_len,
    );

    let completed = tokio::select! {
        biased;
        _ = interrupt => false,
        _ = produce(&producer, entries, interval) => true,
    };

    let report = if completed {
        handle.drain().await
    } else {
        tracing::info!("Interrupted, shutting down log actor");
        handle.shutdown().await
    };
    report.with_context(|| format!("append to {} failed", config.log_path.display()))
}

/// 模拟生产者
async fn produce(producer: &LogProducer, entries: usize, interval: Duration) {
    for i in 1..=entries {
        if let Err(e) = producer.submit(format!("Log entry number {i}")).await {
            // 邮箱已关闭说明 Actor 已经失败, 真正的错误由 join 取回
            tracing::warn!(error = %e, "submit rejected");
            return;
        }
        if i < entries {
            tokio::time::sleep(interval).await;
        }
    }
}
