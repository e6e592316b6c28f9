//! One producer broadcasting to N independent consumers
//!
//! Every consumer sees every published sequence. The producer is gated by the
//! slowest consumer, all consumers share one stop marker, and the ring is
//! reset only once the last of them has drained to it.

use crate::coordinator::ring_state::{RingState, StopLatch, StopScope};
use crate::coordinator::{
    ConsumerCoordinator, CoordinatorConfig, CoordinatorError, Result, Sequence, Sequencer,
    WaitStrategy,
};
use std::sync::Arc;

/// Build a broadcaster with `consumers` independent consumers
///
/// # Errors
/// `InvalidMemberCount` when `consumers` is zero, or a configuration error
pub fn build_broadcast<W: WaitStrategy>(
    config: &CoordinatorConfig,
    consumers: usize,
    wait_strategy: W,
) -> Result<(Broadcaster, Vec<ConsumerCoordinator<W>>)> {
    config.validate()?;
    if consumers == 0 {
        return Err(CoordinatorError::InvalidMemberCount(consumers));
    }

    let ring = Arc::new(RingState::new(config.buffer_size)?);
    let latch = Arc::new(StopLatch::new(consumers));
    let tails: Box<[Arc<Sequence>]> = (0..consumers)
        .map(|_| Arc::new(Sequence::new_with_initial_value()))
        .collect();

    let members = tails
        .iter()
        .map(|tail| {
            ConsumerCoordinator::new(
                Arc::clone(&ring),
                Arc::clone(tail),
                StopScope::Shared(Arc::clone(&latch)),
                wait_strategy,
            )
        })
        .collect();

    tracing::debug!(
        buffer_size = config.buffer_size,
        consumers,
        "built broadcaster"
    );
    Ok((
        Broadcaster {
            sequencer: Sequencer::new(ring, tails, config.claim_park()),
        },
        members,
    ))
}

/// Producer side of a one-to-many broadcast ring
#[derive(Debug)]
pub struct Broadcaster {
    sequencer: Sequencer<Box<[Arc<Sequence>]>>,
}

impl Broadcaster {
    /// Reserve the next `n` sequences, gated by the slowest consumer
    ///
    /// `n` must be between 1 and the buffer size; this is only checked in
    /// debug builds
    pub fn claim(&mut self, n: u32) -> i64 {
        self.sequencer.claim(n)
    }

    /// Non-blocking `claim`; returns `UNAVAILABLE` when the slowest consumer
    /// has not freed enough slots
    pub fn try_claim(&mut self, n: u32) -> i64 {
        self.sequencer.try_claim(n)
    }

    #[inline]
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// End the stream for every consumer at the same stop point
    pub fn publish_stop(&mut self) -> i64 {
        self.sequencer.publish_stop()
    }

    pub fn consumer_count(&self) -> usize {
        self.sequencer.gating().len()
    }

    /// Tail of the slowest consumer
    pub fn minimum_tail(&self) -> i64 {
        Sequence::get_minimum_sequence(self.sequencer.gating(), i64::MAX)
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
}
