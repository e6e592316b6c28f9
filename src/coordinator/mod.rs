//! RingCond Coordinator Implementation
//!
//! This module provides the sequencing core: a condition-variable-like gate
//! over a fixed-size, power-of-two ring whose slots are owned by the caller.
//! Producers claim and publish sequences, consumers wait for them and report
//! progress, and a cooperative stop protocol drains in-flight data before
//! resetting the coordinator for reuse.

pub mod sequence;
pub mod wait_strategy;
pub mod ring_state;
pub mod sequencer;
pub mod consumer;
pub mod producer;
pub mod broadcaster;
pub mod merger;
pub mod worker_pool;
pub mod config;
pub mod logging;
pub mod thread_management;


pub use broadcaster::{build_broadcast, Broadcaster};
pub use config::{CoordinatorConfig, WaitStrategyKind};
pub use consumer::{ConsumeIter, Consumer, ConsumerCoordinator};
pub use merger::{build_merger, Merger};
pub use producer::{build_single, ProducerCoordinator};
pub use sequence::{Sequence, SequenceGroup};
pub use sequencer::{Gating, Sequencer};
pub use thread_management::{ManagedThread, ThreadBuilder};
pub use wait_strategy::{BusySpin, ConfiguredWait, SpinThenYield, WaitStrategy};
pub use worker_pool::{build_worker_pool, Worker, WorkerPool};

/// The initial cursor value for sequences: nothing produced or consumed yet
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Returned by non-blocking calls when no new data is available yet
pub const UNAVAILABLE: i64 = -2;

/// Returned once a stream has been fully drained after a stop request
pub const ACQUIRE_STOP_REQUEST: i64 = -3;

/// Stop marker value meaning "no stop requested"
pub const STOP_NOT_REQUESTED: i64 = i64::MAX;

/// Cursor value a worker pool jumps to on stop.
///
/// Workers compare claimed sequences (at most one per worker past the last
/// real sequence) against the cursor, and the producer adds at most the
/// buffer size to it. Half the `i64` range leaves 2^62 of headroom for both,
/// so no comparison or wrap computation can overflow.
pub const POOL_STOP_CURSOR: i64 = i64::MAX >> 1;

/// Errors that can occur when building or managing a coordinator
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Buffer size must be a power of 2, got: {0}")]
    InvalidBufferSize(usize),

    #[error("Coordinator group needs at least one member, got: {0}")]
    InvalidMemberCount(usize),

    #[error("Worker pool still has {0} attached worker(s)")]
    WorkersAttached(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Fail fast on a buffer size the index mask cannot address
pub(crate) fn check_buffer_size(buffer_size: usize) -> Result<()> {
    if is_power_of_two(buffer_size) && i64::try_from(buffer_size).is_ok() {
        Ok(())
    } else {
        Err(CoordinatorError::InvalidBufferSize(buffer_size))
    }
}

/// Returns true for the two reserved sentinels a consumer call can return
#[inline]
pub fn is_sentinel(sequence: i64) -> bool {
    sequence == UNAVAILABLE || sequence == ACQUIRE_STOP_REQUEST
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_power_of_two() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(2));
        assert!(is_power_of_two(4));
        assert!(is_power_of_two(8));
        assert!(is_power_of_two(1024));

        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(!is_power_of_two(5));
        assert!(!is_power_of_two(1023));
    }

    #[test]
    fn test_sentinels_are_not_sequences() {
        for sentinel in [UNAVAILABLE, ACQUIRE_STOP_REQUEST, INITIAL_CURSOR_VALUE] {
            assert!(sentinel < 0);
        }
        assert_ne!(UNAVAILABLE, ACQUIRE_STOP_REQUEST);
        assert!(is_sentinel(UNAVAILABLE));
        assert!(is_sentinel(ACQUIRE_STOP_REQUEST));
        assert!(!is_sentinel(0));
        assert!(!is_sentinel(INITIAL_CURSOR_VALUE));
    }

    #[test]
    fn test_check_buffer_size() {
        assert!(check_buffer_size(8).is_ok());
        assert!(matches!(
            check_buffer_size(12),
            Err(CoordinatorError::InvalidBufferSize(12))
        ));
        assert!(check_buffer_size(0).is_err());
    }

    #[test]
    fn test_pool_stop_cursor_headroom() {
        assert!(POOL_STOP_CURSOR.checked_add(1 << 40).is_some());
        assert!(POOL_STOP_CURSOR < STOP_NOT_REQUESTED);
    }
}
