//! AOL CLI - 交互式日志生产者

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use aol_core::LogConfig;
use aol_durable::{
    spawn_actor, ActorHandle, BoundedMailbox, DurableLogStore, LogProducer, LogReader,
    LogicalClock, RetryPolicy,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aol_cli=info,aol_durable=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LogConfig::default().apply_env()?;
    config.validate()?;

    let mailbox = Arc::new(BoundedMailbox::new(config.capacity)?);
    let handle = spawn_actor(
        Arc::clone(&mailbox),
        Arc::new(DurableLogStore::from_config(&config)),
        RetryPolicy::from(&config.retry),
    );
    let producer = LogProducer::new(
        Arc::new(LogicalClock::new()),
        Arc::clone(&mailbox),
        config.entry_max_len,
    );

    println!("AOL CLI v{}", env!("CARGO_PKG_VERSION"));
    println!("Logging to {}", config.log_path.display());
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("aol> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
        let rest = rest.trim();

        match command {
            "help" => {
                println!("Available commands:");
                println!("  log <text>    - Submit a log entry");
                println!("  read          - Print the log file");
                println!("  status        - Show actor and mailbox status");
                println!("  quit / exit   - Drain pending entries and exit");
            }
            "log" => {
                if rest.is_empty() {
                    println!("Usage: log <text>");
                    continue;
                }
                match producer.submit(rest).await {
                    Ok(timestamp) => println!("Queued with timestamp {timestamp}"),
                    Err(e) => {
                        println!("Submit failed: {e}");
                        break;
                    }
                }
            }
            "read" => match LogReader::new(&config.log_path).read() {
                Ok(lines) if lines.is_empty() => println!("(log is empty)"),
                Ok(lines) => lines.iter().for_each(|line| println!("{line}")),
                Err(e) => println!("Read failed: {e}"),
            },
            "status" => print_status(&handle, &producer),
            "quit" | "exit" => break,
            _ => {
                println!("Unknown command: {}", command);
                println!("Type 'help' for available commands.");
            }
        }
    }

    let report = handle.drain().await?;
    println!("Goodbye! {} entries written.", report.appended);

    Ok(())
}

fn print_status(handle: &ActorHandle, producer: &LogProducer) {
    let mailbox = handle.mailbox();
    println!("System Status:");
    println!("  Actor: {:?}", handle.state());
    println!(
        "  Mailbox: {}/{} queued{}",
        mailbox.len(),
        mailbox.usable_capacity(),
        if mailbox.is_closed() { " (closed)" } else { "" }
    );
    println!("  Clock: {}", producer.clock().current());
}
