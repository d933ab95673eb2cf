use std::time::Duration;

use crate::error::ConfigurationError;

/// Dual size/time trigger deciding when a worker ships its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    max_bytes: usize,
    max_interval: Duration,
}

impl FlushPolicy {
    pub fn new(max_bytes: usize, max_interval: Duration) -> Result<Self, ConfigurationError> {
        if max_bytes == 0 {
            return Err(ConfigurationError::ZeroFlushBytes);
        }
        if max_interval.is_zero() {
            return Err(ConfigurationError::ZeroFlushInterval);
        }
        Ok(Self {
            max_bytes,
            max_interval,
        })
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Whether a batch holding `batch_bytes` of serialized events should
    /// ship now, given the time since the worker last flushed.
    ///
    /// An empty batch never flushes. A single event larger than
    /// `max_bytes` trips the size trigger on its own.
    pub fn should_flush(&self, batch_bytes: usize, since_last_flush: Duration) -> bool {
        if batch_bytes == 0 {
            return false;
        }
        batch_bytes >= self.max_bytes || since_last_flush >= self.max_interval
    }

    /// Whether appending `incoming` bytes to a non-empty batch would push
    /// it past `max_bytes`, in which case the batch ships first and the
    /// event starts a new one.
    pub fn would_overflow(&self, batch_bytes: usize, incoming: usize) -> bool {
        batch_bytes > 0 && batch_bytes + incoming > self.max_bytes
    }
}
