//! Sequencer Implementation
//!
//! The producer half of every topology. A `Sequencer` hands out sequence
//! numbers, refuses to wrap past the slowest gating tail, publishes the
//! cursor and starts the stop protocol. What gates it is chosen at
//! construction through the `Gating` trait: one tail for a single consumer,
//! a fixed set for a broadcaster, a copy-on-write group for a worker pool.

use crate::coordinator::ring_state::RingState;
use crate::coordinator::{
    Sequence, SequenceGroup, INITIAL_CURSOR_VALUE, UNAVAILABLE,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Consumer tails a producer must not overtake
pub trait Gating: Send + Sync {
    /// Minimum of every gating tail, never above `floor`
    fn minimum_sequence(&self, floor: i64) -> i64;
}

impl Gating for Arc<Sequence> {
    #[inline]
    fn minimum_sequence(&self, floor: i64) -> i64 {
        self.get().min(floor)
    }
}

impl Gating for Box<[Arc<Sequence>]> {
    #[inline]
    fn minimum_sequence(&self, floor: i64) -> i64 {
        Sequence::get_minimum_sequence(self, floor)
    }
}

impl Gating for Arc<SequenceGroup> {
    #[inline]
    fn minimum_sequence(&self, floor: i64) -> i64 {
        self.get_minimum_sequence(floor)
    }
}

/// Single-threaded producer side of a ring
///
/// `next_value` and `cached_gating` are confined to the producer thread;
/// only the ring's cursor and stop marker are shared.
#[derive(Debug)]
pub struct Sequencer<G: Gating> {
    ring: Arc<RingState>,
    gating: G,
    next_value: i64,
    cached_gating: i64,
    stop_pending: bool,
    claim_park: Duration,
}

impl<G: Gating> Sequencer<G> {
    /// Create a new sequencer
    ///
    /// # Arguments
    /// * `ring` - The shared ring state to publish into
    /// * `gating` - The consumer tails this producer must not overtake
    /// * `claim_park` - How long to park between capacity checks in `claim`
    pub fn new(ring: Arc<RingState>, gating: G, claim_park: Duration) -> Self {
        Self {
            ring,
            gating,
            next_value: INITIAL_CURSOR_VALUE,
            cached_gating: INITIAL_CURSOR_VALUE,
            stop_pending: false,
            claim_park,
        }
    }

    /// Claim the next `n` sequences, blocking while the ring is full
    ///
    /// Returns the highest sequence claimed. After a stop this first waits
    /// for the consumer side to reset the ring, then restarts from
    /// `INITIAL_CURSOR_VALUE + 1`.
    ///
    /// `n` must be between 1 and the buffer size; this is only checked in
    /// debug builds
    pub fn claim(&mut self, n: u32) -> i64 {
        self.check_claim_size(n);
        self.await_reset();

        let next_sequence = self.next_value + i64::from(n);
        let wrap_point = next_sequence - self.ring.buffer_size();

        if wrap_point > self.cached_gating || self.cached_gating > self.next_value {
            let mut min_sequence;
            loop {
                min_sequence = self.gating.minimum_sequence(self.next_value);
                if wrap_point <= min_sequence {
                    break;
                }
                thread::park_timeout(self.claim_park);
            }
            self.cached_gating = min_sequence;
        }

        self.next_value = next_sequence;
        next_sequence
    }

    /// Try to claim the next `n` sequences without blocking
    ///
    /// Returns `UNAVAILABLE` when the ring lacks capacity or a stop is still
    /// draining.
    ///
    /// `n` must be between 1 and the buffer size; this is only checked in
    /// debug builds
    pub fn try_claim(&mut self, n: u32) -> i64 {
        self.check_claim_size(n);
        if self.stop_pending {
            if !self.ring.is_shutdown() {
                return UNAVAILABLE;
            }
            self.reset_local();
        }

        let next_sequence = self.next_value + i64::from(n);
        let wrap_point = next_sequence - self.ring.buffer_size();

        if wrap_point > self.cached_gating || self.cached_gating > self.next_value {
            let min_sequence = self.gating.minimum_sequence(self.next_value);
            self.cached_gating = min_sequence;
            if wrap_point > min_sequence {
                return UNAVAILABLE;
            }
        }

        self.next_value = next_sequence;
        next_sequence
    }

    /// Make every sequence up to `sequence` visible to consumers
    #[inline]
    pub fn publish(&self, sequence: i64) {
        self.ring.cursor().set(sequence);
    }

    /// Claim one slot, mark it as the stop point and publish it
    pub fn publish_stop(&mut self) -> i64 {
        let stop = self.claim(1);
        self.ring.stop().set(stop);
        self.publish(stop);
        self.stop_pending = true;
        tracing::debug!(stop, "stop published");
        stop
    }

    /// Slots the producer could still claim without waiting
    pub fn remaining_capacity(&self) -> i64 {
        let consumed = self.gating.minimum_sequence(self.next_value);
        self.ring.buffer_size() - (self.next_value - consumed)
    }

    /// Highest sequence claimed so far in this cycle
    #[inline]
    pub fn last_claimed(&self) -> i64 {
        self.next_value
    }

    #[inline]
    pub fn ring(&self) -> &Arc<RingState> {
        &self.ring
    }

    #[inline]
    pub fn gating(&self) -> &G {
        &self.gating
    }

    /// Block until a pending stop has been acknowledged and the ring reset
    pub(crate) fn await_reset(&mut self) {
        if !self.stop_pending {
            return;
        }
        while !self.ring.is_shutdown() {
            thread::park_timeout(self.claim_park);
        }
        self.reset_local();
    }

    pub(crate) fn mark_stop_pending(&mut self) {
        self.stop_pending = true;
    }

    pub(crate) fn reset_local(&mut self) {
        self.next_value = INITIAL_CURSOR_VALUE;
        self.cached_gating = INITIAL_CURSOR_VALUE;
        self.stop_pending = false;
    }

    #[inline]
    fn check_claim_size(&self, n: u32) {
        debug_assert!(
            n >= 1 && i64::from(n) <= self.ring.buffer_size(),
            "claim size must be between 1 and the buffer size, got: {n}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequencer(size: usize) -> (Sequencer<Arc<Sequence>>, Arc<Sequence>) {
        let ring = Arc::new(RingState::new(size).unwrap());
        let tail = Arc::new(Sequence::new_with_initial_value());
        let sequencer = Sequencer::new(ring, Arc::clone(&tail), Duration::from_nanos(1));
        (sequencer, tail)
    }

    #[test]
    fn test_claim_is_sequential() {
        let (mut sequencer, _tail) = sequencer(8);
        assert_eq!(sequencer.claim(1), 0);
        assert_eq!(sequencer.claim(1), 1);
        assert_eq!(sequencer.claim(3), 4);
    }

    #[test]
    fn test_try_claim_refuses_to_wrap() {
        let (mut sequencer, tail) = sequencer(4);
        assert_eq!(sequencer.try_claim(4), 3);
        assert_eq!(sequencer.try_claim(1), UNAVAILABLE);

        tail.set(0);
        assert_eq!(sequencer.try_claim(1), 4);
        assert_eq!(sequencer.try_claim(1), UNAVAILABLE);
    }

    #[test]
    fn test_wrap_point_arithmetic() {
        let (mut sequencer, tail) = sequencer(8);
        assert_eq!(sequencer.claim(4), 3);
        sequencer.publish(3);
        tail.set(3);

        // wrap point 7 - 8 = -1 is covered by the cached tail
        assert_eq!(sequencer.claim(4), 7);
        // wrap point 0 needs the live tail, which is already 3
        assert_eq!(sequencer.claim(1), 8);
    }

    #[test]
    fn test_remaining_capacity() {
        let (mut sequencer, tail) = sequencer(8);
        assert_eq!(sequencer.remaining_capacity(), 8);
        sequencer.claim(5);
        assert_eq!(sequencer.remaining_capacity(), 3);
        tail.set(1);
        assert_eq!(sequencer.remaining_capacity(), 5);
    }

    #[test]
    fn test_publish_stop_marks_ring() {
        let (mut sequencer, _tail) = sequencer(8);
        sequencer.claim(2);
        sequencer.publish(1);

        let stop = sequencer.publish_stop();
        assert_eq!(stop, 2);
        assert_eq!(sequencer.ring().stop().get(), 2);
        assert_eq!(sequencer.ring().cursor().get(), 2);
        assert_eq!(sequencer.try_claim(1), UNAVAILABLE);

        sequencer.ring().reset();
        assert_eq!(sequencer.try_claim(1), 0);
    }

    #[test]
    fn test_gating_group_floor() {
        let group = Arc::new(SequenceGroup::new());
        assert_eq!(group.minimum_sequence(5), 5);
        group.add(Arc::new(Sequence::new(2)));
        assert_eq!(group.minimum_sequence(5), 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "claim size")]
    fn test_claim_larger_than_buffer_panics() {
        let (mut sequencer, _tail) = sequencer(4);
        sequencer.claim(5);
    }
}
