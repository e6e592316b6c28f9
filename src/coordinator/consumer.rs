//! Consumer-side coordination
//!
//! A `ConsumerCoordinator` tracks one consumer's progress against a shared
//! cursor. It answers "how far may I read", applies the stop protocol and
//! publishes its tail so the producer knows which slots are free again.
//!
//! The stop protocol, once a candidate `available` sequence is known for a
//! `requested` one:
//!
//! 1. stop marker above `available`: no stop yet, return `available`;
//! 2. stop marker above `requested`: real data precedes the stop point,
//!    return `stop - 1` so it is drained first;
//! 3. otherwise the stream is drained: reset and return
//!    `ACQUIRE_STOP_REQUEST`.

use crate::coordinator::ring_state::{RingState, StopScope};
use crate::coordinator::{
    Sequence, WaitStrategy, ACQUIRE_STOP_REQUEST, INITIAL_CURSOR_VALUE, UNAVAILABLE,
};
use std::sync::Arc;

/// The consumer role shared by every topology
///
/// `notify_processed` must be called exactly once after each
/// `available_to`/`try_available_to` that returned a sequence, and before the
/// next such call. Skipping it or calling it twice corrupts backpressure
/// accounting; this is not checked on the hot path.
pub trait Consumer {
    /// Block until new data is published; returns the highest sequence that
    /// may be consumed, or `ACQUIRE_STOP_REQUEST` once the stream has ended
    fn available_to(&mut self) -> i64;

    /// Non-blocking `available_to`; returns `UNAVAILABLE` instead of waiting
    fn try_available_to(&mut self) -> i64;

    /// Release every sequence up to the last one returned
    fn notify_processed(&mut self);

    /// First sequence of the range the last `available_to` returned
    fn batch_start(&self) -> i64;

    /// Slot of `sequence` in caller-owned storage
    fn index(&self, sequence: i64) -> usize;

    /// True before first use and after a full stop cycle
    fn is_shutdown(&self) -> bool;

    /// Iterate every sequence in order until the stream stops
    fn consume_iter(&mut self) -> ConsumeIter<'_, Self>
    where
        Self: Sized,
    {
        ConsumeIter::new(self)
    }
}

/// Tracks one consumer's position against a shared cursor
#[derive(Debug)]
pub struct ConsumerCoordinator<W: WaitStrategy> {
    ring: Arc<RingState>,
    tail: Arc<Sequence>,
    scope: StopScope,
    wait_strategy: W,
    head_cache: i64,
    processed: i64,
    pending: i64,
    awaiting_generation: Option<i64>,
}

impl<W: WaitStrategy> ConsumerCoordinator<W> {
    pub(crate) fn new(
        ring: Arc<RingState>,
        tail: Arc<Sequence>,
        scope: StopScope,
        wait_strategy: W,
    ) -> Self {
        Self {
            ring,
            tail,
            scope,
            wait_strategy,
            head_cache: INITIAL_CURSOR_VALUE,
            processed: INITIAL_CURSOR_VALUE,
            pending: INITIAL_CURSOR_VALUE,
            awaiting_generation: None,
        }
    }

    /// This consumer's tail
    pub fn tail(&self) -> &Arc<Sequence> {
        &self.tail
    }

    /// The shared cursor this consumer reads
    pub fn cursor(&self) -> &Sequence {
        self.ring.cursor()
    }

    pub fn buffer_size(&self) -> i64 {
        self.ring.buffer_size()
    }

    /// Highest sequence this consumer has reported as processed
    pub fn processed(&self) -> i64 {
        self.processed
    }

    #[inline]
    fn resolve_stop(&mut self, available: i64, requested: i64) -> i64 {
        let stop = self.ring.stop().get();
        if stop > available {
            self.pending = available;
            available
        } else if stop > requested {
            self.pending = stop - 1;
            stop - 1
        } else {
            self.acknowledge_stop();
            ACQUIRE_STOP_REQUEST
        }
    }

    #[cold]
    fn acknowledge_stop(&mut self) {
        let generation = self.ring.generation().get();
        self.tail.set(INITIAL_CURSOR_VALUE);
        self.head_cache = INITIAL_CURSOR_VALUE;
        self.processed = INITIAL_CURSOR_VALUE;
        self.pending = INITIAL_CURSOR_VALUE;

        match &self.scope {
            StopScope::Private => self.ring.reset(),
            StopScope::Shared(latch) => {
                if latch.arrive() {
                    self.ring.reset();
                } else {
                    tracing::trace!(generation, "stop acknowledged, waiting for group");
                    self.awaiting_generation = Some(generation);
                }
            }
        }
    }
}

impl<W: WaitStrategy> Consumer for ConsumerCoordinator<W> {
    fn available_to(&mut self) -> i64 {
        if let Some(generation) = self.awaiting_generation.take() {
            self.wait_strategy
                .wait_for(generation + 1, self.ring.generation());
        }

        let requested = self.processed + 1;
        let available = if self.head_cache >= requested {
            self.head_cache
        } else {
            let available = self.wait_strategy.wait_for(requested, self.ring.cursor());
            self.head_cache = available;
            available
        };
        self.resolve_stop(available, requested)
    }

    fn try_available_to(&mut self) -> i64 {
        if let Some(generation) = self.awaiting_generation {
            if self.ring.generation().get() <= generation {
                return UNAVAILABLE;
            }
            self.awaiting_generation = None;
        }

        let requested = self.processed + 1;
        let available = if self.head_cache >= requested {
            self.head_cache
        } else {
            let cursor = self.ring.cursor().get();
            if cursor < requested {
                return UNAVAILABLE;
            }
            self.head_cache = cursor;
            cursor
        };
        self.resolve_stop(available, requested)
    }

    #[inline]
    fn notify_processed(&mut self) {
        debug_assert!(
            self.pending > self.processed,
            "notify_processed without a preceding available_to"
        );
        self.processed = self.pending;
        self.tail.set(self.pending);
    }

    #[inline]
    fn batch_start(&self) -> i64 {
        self.processed + 1
    }

    #[inline]
    fn index(&self, sequence: i64) -> usize {
        self.ring.index(sequence)
    }

    fn is_shutdown(&self) -> bool {
        self.ring.is_shutdown()
    }
}

/// Iterator over every sequence a consumer receives, until stop
///
/// Each range returned by `available_to` is yielded in order and released
/// with `notify_processed` once fully yielded. Dropping the iterator in the
/// middle of a range leaves that range unreleased, so the next call
/// delivers it again.
pub struct ConsumeIter<'a, C: Consumer> {
    consumer: &'a mut C,
    next: i64,
    end: i64,
    in_batch: bool,
    stopped: bool,
}

impl<'a, C: Consumer> ConsumeIter<'a, C> {
    pub fn new(consumer: &'a mut C) -> Self {
        Self {
            consumer,
            next: 0,
            end: INITIAL_CURSOR_VALUE,
            in_batch: false,
            stopped: false,
        }
    }

    /// The consumer being drained, e.g. to map a yielded sequence with `index`
    pub fn consumer(&self) -> &C {
        &*self.consumer
    }
}

impl<C: Consumer> Iterator for ConsumeIter<'_, C> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.in_batch {
            if self.next <= self.end {
                let sequence = self.next;
                self.next += 1;
                return Some(sequence);
            }
            self.consumer.notify_processed();
            self.in_batch = false;
        }
        if self.stopped {
            return None;
        }

        let available = self.consumer.available_to();
        if available == ACQUIRE_STOP_REQUEST {
            self.stopped = true;
            return None;
        }

        let start = self.consumer.batch_start();
        self.next = start + 1;
        self.end = available;
        self.in_batch = true;
        Some(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::ring_state::StopLatch;
    use crate::coordinator::{BusySpin, STOP_NOT_REQUESTED};

    fn private_consumer(size: usize) -> (Arc<RingState>, ConsumerCoordinator<BusySpin>) {
        let ring = Arc::new(RingState::new(size).unwrap());
        let tail = Arc::new(Sequence::new_with_initial_value());
        let consumer = ConsumerCoordinator::new(Arc::clone(&ring), tail, StopScope::Private, BusySpin);
        (ring, consumer)
    }

    #[test]
    fn test_try_available_to_without_data() {
        let (_ring, mut consumer) = private_consumer(8);
        assert!(consumer.is_shutdown());
        assert_eq!(consumer.try_available_to(), UNAVAILABLE);
    }

    #[test]
    fn test_available_to_returns_cursor() {
        let (ring, mut consumer) = private_consumer(8);
        ring.cursor().set(3);

        assert_eq!(consumer.available_to(), 3);
        assert_eq!(consumer.batch_start(), 0);
        consumer.notify_processed();
        assert_eq!(consumer.tail().get(), 3);
        assert_eq!(consumer.try_available_to(), UNAVAILABLE);
    }

    #[test]
    fn test_cached_head_served_without_cursor() {
        let (ring, mut consumer) = private_consumer(8);
        ring.cursor().set(5);
        assert_eq!(consumer.available_to(), 5);

        // A stale cache above the request is answered from the cache
        consumer.processed = 2;
        assert_eq!(consumer.try_available_to(), 5);
    }

    #[test]
    fn test_stop_drains_real_data_first() {
        let (ring, mut consumer) = private_consumer(8);
        ring.cursor().set(2);
        ring.stop().set(3);
        ring.cursor().set(3);

        assert_eq!(consumer.available_to(), 2);
        consumer.notify_processed();

        assert_eq!(consumer.available_to(), ACQUIRE_STOP_REQUEST);
        assert!(consumer.is_shutdown());
        assert_eq!(ring.stop().get(), STOP_NOT_REQUESTED);
        assert_eq!(consumer.tail().get(), INITIAL_CURSOR_VALUE);
        assert_eq!(ring.generation().get(), 1);
    }

    #[test]
    fn test_stop_with_nothing_pending() {
        let (ring, mut consumer) = private_consumer(8);
        ring.stop().set(0);
        ring.cursor().set(0);

        assert_eq!(consumer.try_available_to(), ACQUIRE_STOP_REQUEST);
        assert!(consumer.is_shutdown());
    }

    #[test]
    fn test_shared_scope_waits_for_last_member() {
        let ring = Arc::new(RingState::new(8).unwrap());
        let latch = Arc::new(StopLatch::new(2));
        let mut first = ConsumerCoordinator::new(
            Arc::clone(&ring),
            Arc::new(Sequence::default()),
            StopScope::Shared(Arc::clone(&latch)),
            BusySpin,
        );
        let mut second = ConsumerCoordinator::new(
            Arc::clone(&ring),
            Arc::new(Sequence::default()),
            StopScope::Shared(latch),
            BusySpin,
        );
        ring.stop().set(0);
        ring.cursor().set(0);

        assert_eq!(first.try_available_to(), ACQUIRE_STOP_REQUEST);
        assert!(!ring.is_shutdown());
        // A finished member does not re-read the old cycle
        assert_eq!(first.try_available_to(), UNAVAILABLE);

        assert_eq!(second.try_available_to(), ACQUIRE_STOP_REQUEST);
        assert!(ring.is_shutdown());
        assert_eq!(first.try_available_to(), UNAVAILABLE);

        ring.cursor().set(1);
        assert_eq!(first.try_available_to(), 1);
    }

    #[test]
    fn test_consume_iter_yields_in_order_until_stop() {
        let (ring, mut consumer) = private_consumer(8);
        ring.cursor().set(4);
        ring.stop().set(5);
        ring.cursor().set(5);

        let seen: Vec<i64> = consumer.consume_iter().collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(consumer.is_shutdown());
    }
}
