use std::num::NonZeroUsize;

use crate::error::{Result, SchedulerError};

pub const ENV_WORKERS: &str = "FIFO_POOL_WORKERS";
pub const ENV_THREAD_PREFIX: &str = "FIFO_POOL_THREAD_PREFIX";

const DEFAULT_THREAD_PREFIX: &str = "fifo-pool-";

/// Settings read once by [`Scheduler::start`](crate::Scheduler::start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads spawned on start.
    pub worker_count: usize,
    /// Worker threads are named `{prefix}{id}`.
    pub thread_name_prefix: String,
    /// Stack size for worker threads; `None` keeps the platform default.
    pub stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
            stack_size: None,
        }
    }
}

impl SchedulerConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Override fields from `FIFO_POOL_*` environment variables.
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(ENV_WORKERS) {
            match v.trim().parse::<NonZeroUsize>() {
                Ok(n) => self.worker_count = n.get(),
                Err(_) => tracing::warn!(
                    var = ENV_WORKERS,
                    value = %v,
                    "ignoring worker count override, expected a positive integer"
                ),
            }
        }
        if let Ok(v) = std::env::var(ENV_THREAD_PREFIX) {
            self.thread_name_prefix = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(feature = "single-worker"))]
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[cfg(feature = "single-worker")]
fn default_worker_count() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_at_least_one_worker() {
        let config = SchedulerConfig::default();
        assert!(config.worker_count >= 1);
        assert_eq!(config.thread_name_prefix, "fifo-pool-");
        assert!(config.stack_size.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_methods() {
        let config = SchedulerConfig::default()
            .with_workers(3)
            .with_thread_name_prefix("tile-")
            .with_stack_size(1 << 20);

        assert_eq!(config.worker_count, 3);
        assert_eq!(config.thread_name_prefix, "tile-");
        assert_eq!(config.stack_size, Some(1 << 20));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = SchedulerConfig::default()
            .with_workers(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }

    #[cfg(feature = "single-worker")]
    #[test]
    fn single_worker_feature_forces_one_worker() {
        assert_eq!(SchedulerConfig::default().worker_count, 1);
    }
}
