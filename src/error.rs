use std::time::Duration;

use crate::backend::BackendKind;

/// Error returned when a [`Config`](crate::init::Config) cannot be turned
/// into a running indexer.
#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("flush_bytes must be greater than zero")]
    ZeroFlushBytes,

    #[error("flush_interval must be greater than zero")]
    ZeroFlushInterval,

    #[error("num_workers must be at least 1")]
    NoWorkers,

    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("index name must not be empty")]
    EmptyIndex,

    #[error("invalid backend DSN `{dsn}`: {reason}")]
    InvalidDsn { dsn: String, reason: String },

    #[error("backend support is not compiled in: {0:?}")]
    BackendDisabled(BackendKind),

    #[error("failed to build backend client: {0}")]
    Backend(String),

    #[error("no Tokio runtime available to spawn indexer workers")]
    NoRuntime,

    #[error("invalid value `{value}` for environment variable {key}")]
    InvalidEnv { key: &'static str, value: String },
}

impl ConfigurationError {
    pub(crate) fn invalid_dsn(dsn: &str, reason: impl Into<String>) -> Self {
        ConfigurationError::InvalidDsn {
            dsn: dsn.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error returned synchronously when an event cannot be queued.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The indexer has been closed and accepts no more events.
    #[error("indexer is closed")]
    Closed,

    /// The intake queue is at capacity. Only returned by the non-blocking
    /// `try_*` entrypoints; the awaiting ones wait for room instead.
    #[error("intake queue is full")]
    Full,
}

/// Error returned by [`BatchIndexer::close`](crate::indexer::BatchIndexer::close).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseError {
    /// Workers did not drain within the deadline. Every item that was
    /// still pending has already been reported to the failure callback.
    #[error("indexer did not drain within {timeout:?}")]
    Timeout { timeout: Duration },
}
