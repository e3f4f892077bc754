//! Queue configuration with validation.

use std::time::Duration;

use crate::error::ConfigError;
use crate::queue::RetentionPolicy;

/// Upper bound on the worker pool size.
pub const MAX_WORKERS: usize = 256;

/// Sizing and timing of a `QueueController`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of workers, i.e. maximum number of jobs processed at once.
    pub max_workers: usize,

    /// Capacity of the work channel (unclaimed jobs).
    pub capacity: usize,

    /// How long `submit` waits for channel capacity before `QueueFull`.
    pub enqueue_timeout: Duration,

    /// How long `stop` waits for all workers to exit.
    pub join_timeout: Duration,

    pub retention: RetentionPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            capacity: 50,
            enqueue_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
            retention: RetentionPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 || self.max_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.max_workers,
                max: MAX_WORKERS,
            });
        }
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity(self.capacity));
        }
        if self.enqueue_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "enqueue timeout",
                value: self.enqueue_timeout,
            });
        }
        if self.join_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "join timeout",
                value: self.join_timeout,
            });
        }
        self.retention.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = QueueConfig::default();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.capacity, 50);
        assert_eq!(config.enqueue_timeout, Duration::from_secs(1));
        assert_eq!(config.retention.high_watermark, 100);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::no_workers(QueueConfig::default().with_max_workers(0))]
    #[case::too_many_workers(QueueConfig::default().with_max_workers(MAX_WORKERS + 1))]
    #[case::no_capacity(QueueConfig::default().with_capacity(0))]
    #[case::zero_enqueue_timeout(QueueConfig::default().with_enqueue_timeout(Duration::ZERO))]
    #[case::zero_join_timeout(QueueConfig::default().with_join_timeout(Duration::ZERO))]
    #[case::inverted_watermarks(QueueConfig::default().with_retention(RetentionPolicy::new(10, 20)))]
    fn invalid_configs_are_rejected(#[case] config: QueueConfig) {
        assert!(config.validate().is_err());
    }
}
