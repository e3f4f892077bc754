//! Command-line arguments.

use std::time::Duration;

use clap::Parser;
use ferry_core::{QueueConfig, RetentionPolicy};

/// Push messages through a ferry queue and print what became of them.
///
/// Every flag can also be set through its `FERRY_*` environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "ferry", version, about)]
pub struct CliArgs {
    /// Messages to submit; read one per line from stdin when omitted
    pub messages: Vec<String>,

    /// Number of workers
    #[arg(short = 'w', long, env = "FERRY_MAX_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Channel capacity
    #[arg(short = 'c', long, env = "FERRY_QUEUE_CAPACITY", default_value_t = 50)]
    pub capacity: usize,

    /// How long `submit` waits for channel space, in milliseconds
    #[arg(long, env = "FERRY_ENQUEUE_TIMEOUT_MS", default_value_t = 1000)]
    pub enqueue_timeout_ms: u64,

    /// How long `stop` waits for workers, in milliseconds
    #[arg(long, env = "FERRY_JOIN_TIMEOUT_MS", default_value_t = 5000)]
    pub join_timeout_ms: u64,

    /// Tracked-record count that triggers a retention sweep
    #[arg(long, env = "FERRY_HIGH_WATERMARK", default_value_t = 100)]
    pub high_watermark: usize,

    /// Finished records kept after a sweep (default: half the high watermark)
    #[arg(long, env = "FERRY_LOW_WATERMARK")]
    pub low_watermark: Option<usize>,

    /// Conversation id attached to every message
    #[arg(long, env = "FERRY_CONVERSATION", default_value = "cli")]
    pub conversation: String,

    /// Session id attached to every message
    #[arg(long, env = "FERRY_SESSION", default_value = "local")]
    pub session: String,

    /// Simulated processing time per message, in milliseconds
    #[arg(long, env = "FERRY_DELAY_MS", default_value_t = 0)]
    pub delay_ms: u64,

    /// Messages containing this word fail instead of completing
    #[arg(long)]
    pub fail_on: Option<String>,

    /// How long to wait for each message to finish, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    pub wait_timeout_ms: u64,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    pub fn queue_config(&self) -> QueueConfig {
        let retention = match self.low_watermark {
            Some(low) => RetentionPolicy::new(self.high_watermark, low),
            None => RetentionPolicy::with_high_watermark(self.high_watermark),
        };
        QueueConfig::default()
            .with_max_workers(self.workers)
            .with_capacity(self.capacity)
            .with_enqueue_timeout(Duration::from_millis(self.enqueue_timeout_ms))
            .with_join_timeout(Duration::from_millis(self.join_timeout_ms))
            .with_retention(retention)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}
