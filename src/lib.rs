//! `RingCond` - Sequenced Ring-Buffer Coordination
//!
//! A condition-variable-like gate for fixed-size, power-of-two ring buffers.
//! The crate never stores data: callers own the slot storage and use the
//! sequence numbers handed out here to index it. What the crate provides is
//! the coordination around it:
//!
//! - **Claim / publish**: a producer reserves sequences, writes the slots and
//!   publishes them with a single release store
//! - **Backpressure**: a producer never wraps past the slowest consumer
//! - **Cooperative stop**: a stop marker is drained in order, then the
//!   coordinator resets itself and can run another cycle
//!
//! ## Topologies
//!
//! - [`build_single`]: one producer, one consumer
//! - [`build_broadcast`]: one producer, N consumers that each see every item
//! - [`build_merger`]: N producers merged round-robin into one consumer
//! - [`build_worker_pool`]: one producer, a dynamic pool of competing workers
//!
//! ## Quick Start
//!
//! ```rust
//! use ringcond::{build_single, Consumer, CoordinatorConfig, ACQUIRE_STOP_REQUEST};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let config = CoordinatorConfig::with_buffer_size(64);
//! let (mut producer, mut consumer) = build_single(&config, config.wait_strategy()).unwrap();
//!
//! // Caller-owned slots, indexed by `index(sequence)`
//! let slots: Arc<Vec<AtomicU64>> = Arc::new((0..64).map(|_| AtomicU64::new(0)).collect());
//!
//! let reader = {
//!     let slots = Arc::clone(&slots);
//!     thread::spawn(move || {
//!         let mut sum = 0;
//!         loop {
//!             let available = consumer.available_to();
//!             if available == ACQUIRE_STOP_REQUEST {
//!                 break;
//!             }
//!             for sequence in consumer.batch_start()..=available {
//!                 sum += slots[consumer.index(sequence)].load(Ordering::Relaxed);
//!             }
//!             consumer.notify_processed();
//!         }
//!         sum
//!     })
//! };
//!
//! for value in 1..=100u64 {
//!     let sequence = producer.claim(1);
//!     slots[producer.index(sequence)].store(value, Ordering::Relaxed);
//!     producer.publish(sequence);
//! }
//! producer.publish_stop();
//!
//! assert_eq!(reader.join().unwrap(), 5050);
//! ```
//!
//! Sequences are `i64` and negative values are reserved: [`UNAVAILABLE`] from
//! the non-blocking calls, [`ACQUIRE_STOP_REQUEST`] once a stream has ended.

pub mod coordinator;

// Re-export the main types for convenience
pub use coordinator::{
    // Topologies
    build_broadcast,
    build_merger,
    build_single,
    build_worker_pool,
    Broadcaster,
    ConsumerCoordinator,
    Merger,
    ProducerCoordinator,
    Worker,
    WorkerPool,

    // Consumer role
    ConsumeIter,
    Consumer,

    // Configuration
    CoordinatorConfig,
    WaitStrategyKind,

    // Errors
    CoordinatorError,
    Result,

    // Sequencing
    Sequence,
    SequenceGroup,

    // Wait strategies
    BusySpin,
    ConfiguredWait,
    SpinThenYield,
    WaitStrategy,

    // Threads
    ManagedThread,
    ThreadBuilder,

    // Utility functions
    is_power_of_two,
    is_sentinel,

    // Constants
    ACQUIRE_STOP_REQUEST,
    INITIAL_CURSOR_VALUE,
    UNAVAILABLE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `RingCond` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}
