//! Error types shared across the crate.
//!
//! Component-specific errors (buffer produce/consume, pool lifecycle, job
//! execution) live next to the component that raises them; this module holds
//! the construction-time and lock-contract errors that cut across modules.

use thiserror::Error;

/// Errors raised synchronously at construction time.
///
/// A configuration error is fatal to the construction call only; nothing
/// else in the process is affected.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Buffer capacity must be at least 1.
    #[error("capacity must be positive, got {0}")]
    InvalidCapacity(usize),

    /// Worker count must be at least 1.
    #[error("worker count must be positive, got {0}")]
    InvalidWorkerCount(usize),

    /// Bloom filter sizing needs a positive expected item count.
    #[error("expected item count must be positive")]
    InvalidExpectedItems,

    /// Bloom filter false-positive rate must be strictly between 0 and 1.
    #[error("false positive rate must be in (0, 1), got {0}")]
    InvalidFalsePositiveRate(f64),

    /// Sharded cache needs at least one shard.
    #[error("shard count must be positive, got {0}")]
    InvalidShardCount(usize),
}

/// Errors raised by lock contract violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    /// An unlock call with no matching lock call.
    #[error("unlock without a matching lock")]
    NotLocked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidCapacity(0);
        assert!(err.to_string().contains("positive"));

        let err = ConfigError::InvalidFalsePositiveRate(1.5);
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_lock_error_display() {
        let err = LockError::NotLocked;
        assert!(err.to_string().contains("matching lock"));
    }
}
