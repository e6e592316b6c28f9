//! Single producer, single consumer coordination
//!
//! `build_single` splits one ring into its two roles: the
//! `ProducerCoordinator` keeps the producer's claim state and the paired
//! `ConsumerCoordinator` keeps the consumer's. Both share the cursor, the
//! consumer's tail and a private stop marker, so the producer thread and the
//! consumer thread each own exactly the caches they touch.

use crate::coordinator::ring_state::{RingState, StopScope};
use crate::coordinator::{
    ConsumerCoordinator, CoordinatorConfig, Result, Sequence, Sequencer, WaitStrategy,
};
use std::sync::Arc;

/// Build a single producer / single consumer coordinator pair
///
/// # Errors
/// Returns a configuration error if `config` does not validate
///
/// # Examples
///
/// ```rust
/// use ringcond::coordinator::{build_single, BusySpin, Consumer, CoordinatorConfig};
///
/// let (mut producer, mut consumer) =
///     build_single(&CoordinatorConfig::with_buffer_size(8), BusySpin).unwrap();
/// let sequence = producer.claim(1);
/// producer.publish(sequence);
/// assert_eq!(consumer.available_to(), sequence);
/// consumer.notify_processed();
/// ```
pub fn build_single<W: WaitStrategy>(
    config: &CoordinatorConfig,
    wait_strategy: W,
) -> Result<(ProducerCoordinator, ConsumerCoordinator<W>)> {
    config.validate()?;
    let ring = Arc::new(RingState::new(config.buffer_size)?);
    let tail = Arc::new(Sequence::new_with_initial_value());

    let consumer = ConsumerCoordinator::new(
        Arc::clone(&ring),
        Arc::clone(&tail),
        StopScope::Private,
        wait_strategy,
    );
    let producer = ProducerCoordinator {
        sequencer: Sequencer::new(ring, tail, config.claim_park()),
    };

    tracing::debug!(buffer_size = config.buffer_size, "built single producer coordinator");
    Ok((producer, consumer))
}

/// Producer side of a single producer / single consumer ring
#[derive(Debug)]
pub struct ProducerCoordinator {
    sequencer: Sequencer<Arc<Sequence>>,
}

impl ProducerCoordinator {
    /// Reserve the next `n` sequences, blocking until the consumer has freed
    /// enough slots; returns the highest one
    ///
    /// `n` must be between 1 and the buffer size; this is only checked in
    /// debug builds
    pub fn claim(&mut self, n: u32) -> i64 {
        self.sequencer.claim(n)
    }

    /// Non-blocking `claim`; returns `UNAVAILABLE` when the ring is full
    pub fn try_claim(&mut self, n: u32) -> i64 {
        self.sequencer.try_claim(n)
    }

    /// Make every claimed sequence up to `sequence` visible to the consumer
    #[inline]
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// End the stream; the consumer drains what was published before it
    pub fn publish_stop(&mut self) -> i64 {
        self.sequencer.publish_stop()
    }

    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    #[inline]
    pub fn index(&self, sequence: i64) -> usize {
        self.sequencer.ring().index(sequence)
    }

    pub fn is_shutdown(&self) -> bool {
        self.sequencer.ring().is_shutdown()
    }

    pub fn buffer_size(&self) -> i64 {
        self.sequencer.ring().buffer_size()
    }

    /// The consumer tail this producer is gated on
    pub fn consumer_tail(&self) -> &Arc<Sequence> {
        self.sequencer.gating()
    }
}
