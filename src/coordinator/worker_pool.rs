//! One producer feeding a pool of competing workers
//!
//! Workers do not each see every sequence: they take turns through a shared
//! work counter, so each published sequence goes to exactly one worker.
//! Workers can join and leave at any time. The producer is gated by the
//! lowest tail among the attached workers, read from a copy-on-write
//! snapshot so membership changes never show a half-updated list.
//!
//! On stop the cursor jumps to `POOL_STOP_CURSOR` rather than to the stop
//! sequence: idle workers may already have claimed sequences past the stop
//! point, and the jump wakes every one of them at once. The ring is reset
//! when the last attached worker has acknowledged the stop.

use crate::coordinator::consumer::Consumer;
use crate::coordinator::ring_state::RingState;
use crate::coordinator::{
    CoordinatorConfig, CoordinatorError, Result, Sequence, SequenceGroup, Sequencer,
    WaitStrategy, ACQUIRE_STOP_REQUEST, INITIAL_CURSOR_VALUE, POOL_STOP_CURSOR, UNAVAILABLE,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Build a worker pool
///
/// The first worker's tail is registered here, before any sequence can be
/// claimed, so the producer can never run a full lap ahead of a pool that
/// has no worker yet. `new_worker` hands it out first.
pub fn build_worker_pool<W: WaitStrategy>(
    config: &CoordinatorConfig,
    wait_strategy: W,
) -> Result<WorkerPool<W>> {
    config.validate()?;
    let ring = Arc::new(RingState::new(config.buffer_size)?);
    let tails = Arc::new(SequenceGroup::new());
    let reserved = Arc::new(Sequence::new_with_initial_value());
    tails.add(Arc::clone(&reserved));

    let shared = Arc::new(PoolShared {
        ring: Arc::clone(&ring),
        work: Sequence::new_with_initial_value(),
        tails: Arc::clone(&tails),
        roster: Mutex::new(Roster {
            live: 0,
            acked: 0,
            reserved: Some(reserved),
        }),
    });

    tracing::debug!(buffer_size = config.buffer_size, "built worker pool");
    Ok(WorkerPool {
        shared,
        sequencer: Sequencer::new(ring, tails, config.claim_park()),
        wait_strategy,
    })
}

#[derive(Debug)]
struct Roster {
    /// Workers handed out and not yet detached
    live: usize,
    /// Live workers that acknowledged the pending stop
    acked: usize,
    /// Pre-registered tail for the next worker, if not handed out yet
    reserved: Option<Arc<Sequence>>,
}

impl Roster {
    /// Members that must acknowledge a stop; a reserved tail counts as the
    /// worker that will eventually take it
    fn members(&self) -> usize {
        self.live + usize::from(self.reserved.is_some())
    }
}

#[derive(Debug)]
struct PoolShared {
    ring: Arc<RingState>,
    work: Sequence,
    tails: Arc<SequenceGroup>,
    roster: Mutex<Roster>,
}

impl PoolShared {
    /// Caller holds the roster lock
    fn reset(&self, roster: &mut Roster) {
        roster.acked = 0;
        self.work.set(INITIAL_CURSOR_VALUE);
        self.ring.reset();
    }

    fn attach(&self) -> Arc<Sequence> {
        let mut roster = self.roster.lock();
        let tail = match roster.reserved.take() {
            Some(tail) => tail,
            None => {
                // Everything past the work counter is unclaimed and must stay
                // protected until some worker claims it
                let tail = Arc::new(Sequence::new(self.work.get()));
                self.tails.add(Arc::clone(&tail));
                tail
            }
        };
        roster.live += 1;
        tracing::debug!(workers = roster.live, "worker attached");
        tail
    }

    fn detach(&self, tail: &Arc<Sequence>, acked_generation: Option<i64>) {
        let mut roster = self.roster.lock();
        self.tails.remove(tail);
        roster.live -= 1;
        if acked_generation == Some(self.ring.generation().get()) {
            roster.acked -= 1;
        }
        tracing::debug!(workers = roster.live, "worker detached");

        if self.ring.is_stop_pending() && roster.acked >= roster.members() {
            self.reset(&mut roster);
        }
    }

    /// Record one worker's stop acknowledgement.
    ///
    /// Returns the generation being acknowledged and whether this worker
    /// was the last one, in which case the ring has been reset.
    fn acknowledge_stop(&self) -> (i64, bool) {
        let mut roster = self.roster.lock();
        let generation = self.ring.generation().get();
        roster.acked += 1;
        if roster.acked >= roster.members() {
            self.reset(&mut roster);
            (generation, true)
        } else {
            tracing::trace!(
                generation,
                acked = roster.acked,
                workers = roster.live,
                "worker acknowledged stop"
            );
            (generation, false)
        }
    }
}

/// Producer side and membership manager of a worker pool
#[derive(Debug)]
pub struct WorkerPool<W: WaitStrategy> {
    shared: Arc<PoolShared>,
    sequencer: Sequencer<Arc<SequenceGroup>>,
    wait_strategy: W,
}

impl<W: WaitStrategy> WorkerPool<W> {
    /// Claim the next sequence, blocking while the slowest attached worker
    /// holds every free slot
    pub fn next(&mut self) -> i64 {
        self.sequencer.claim(1)
    }

    /// Non-blocking `next`; returns `UNAVAILABLE` when the ring is full or
    /// a stop is still draining
    pub fn try_next(&mut self) -> i64 {
        self.sequencer.try_claim(1)
    }

    #[inline]
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// End the stream after everything claimed so far
    ///
    /// Returns the stop sequence, one past the last claimed one. Before the
    /// first worker is handed out the stop stays pending until that worker
    /// drains it. Once every worker has been removed the pool is reset at
    /// once and anything still unconsumed is dropped.
    pub fn publish_stop(&mut self) -> i64 {
        self.sequencer.await_reset();
        let stop = self.sequencer.last_claimed() + 1;
        let ring = self.sequencer.ring();

        let mut roster = self.shared.roster.lock();
        if roster.members() == 0 {
            tracing::warn!(stop, "stop published with no worker attached, resetting pool");
            self.shared.reset(&mut roster);
            drop(roster);
            self.sequencer.reset_local();
            return stop;
        }
        ring.stop().set(stop);
        ring.cursor().set(POOL_STOP_CURSOR);
        drop(roster);

        self.sequencer.mark_stop_pending();
        tracing::debug!(stop, "worker pool stop published");
        stop
    }

    /// Attach a new competing worker
    pub fn new_worker(&self) -> Worker<W> {
        let tail = self.shared.attach();
        Worker {
            shared: Arc::clone(&self.shared),
            tail,
            wait_strategy: self.wait_strategy,
            claimed: None,
            head_cache: INITIAL_CURSOR_VALUE,
            awaiting_generation: None,
            acked_generation: None,
        }
    }

    /// Detach a worker from the pool
    ///
    /// A sequence the worker has claimed but not yet processed is lost;
    /// detaching mid-consumption is the caller's responsibility. Dropping a
    /// `Worker` has the same effect.
    pub fn remove_worker(&self, worker: Worker<W>) {
        drop(worker);
    }

    /// Number of workers currently attached
    pub fn worker_count(&self) -> usize {
        self.shared.roster.lock().live
    }

    /// Estimate of published sequences not yet processed
    pub fn get_num_entries(&self) -> u64 {
        let ring = self.sequencer.ring();
        let published = if ring.is_stop_pending() {
            ring.stop().get() - 1
        } else {
            ring.cursor().get()
        };
        let consumed = self.shared.tails.get_minimum_sequence(published);
        u64::try_from(published - consumed).unwrap_or(0)
    }

    /// Reset the pool to its constructed state
    ///
    /// # Errors
    /// `WorkersAttached` if any worker is still attached: resetting under
    /// live workers would orphan their in-flight claims
    pub fn clear(&mut self) -> Result<()> {
        let mut roster = self.shared.roster.lock();
        if roster.live > 0 {
            tracing::warn!(workers = roster.live, "refusing to clear pool with attached workers");
            return Err(CoordinatorError::WorkersAttached(roster.live));
        }

        self.shared.reset(&mut roster);
        match &roster.reserved {
            Some(reserved) => reserved.set(INITIAL_CURSOR_VALUE),
            None => {
                let reserved = Arc::new(Sequence::new_with_initial_value());
                self.shared.tails.add(Arc::clone(&reserved));
                roster.reserved = Some(reserved);
            }
        }
        drop(roster);

        self.sequencer.reset_local();
        tracing::debug!("worker pool cleared");
        Ok(())
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
}

/// One competing consumer of a worker pool
///
/// Each call hands out a single sequence no other worker receives.
#[derive(Debug)]
pub struct Worker<W: WaitStrategy> {
    shared: Arc<PoolShared>,
    tail: Arc<Sequence>,
    wait_strategy: W,
    claimed: Option<i64>,
    head_cache: i64,
    awaiting_generation: Option<i64>,
    acked_generation: Option<i64>,
}

impl<W: WaitStrategy> Worker<W> {
    /// This worker's tail
    pub fn tail(&self) -> &Arc<Sequence> {
        &self.tail
    }

    /// Sequence claimed and not yet processed, if any.
    ///
    /// A claim survives an `UNAVAILABLE` result so the next call retries the
    /// same sequence instead of skipping it.
    #[inline]
    fn claim(&mut self) -> i64 {
        match self.claimed {
            Some(sequence) => sequence,
            None => {
                let sequence = self.shared.work.increment_and_get();
                self.tail.set(sequence - 1);
                self.claimed = Some(sequence);
                sequence
            }
        }
    }

    #[inline]
    fn resolve_stop(&mut self, sequence: i64) -> i64 {
        if sequence < self.shared.ring.stop().get() {
            sequence
        } else {
            self.acknowledge_stop();
            ACQUIRE_STOP_REQUEST
        }
    }

    #[cold]
    fn acknowledge_stop(&mut self) {
        self.claimed = None;
        self.head_cache = INITIAL_CURSOR_VALUE;
        self.tail.set(INITIAL_CURSOR_VALUE);

        let (generation, was_last) = self.shared.acknowledge_stop();
        self.acked_generation = Some(generation);
        if !was_last {
            self.awaiting_generation = Some(generation);
        }
    }
}

impl<W: WaitStrategy> Consumer for Worker<W> {
    fn available_to(&mut self) -> i64 {
        if let Some(generation) = self.awaiting_generation.take() {
            self.wait_strategy
                .wait_for(generation + 1, self.shared.ring.generation());
        }

        let sequence = self.claim();
        if self.head_cache < sequence {
            self.head_cache = self
                .wait_strategy
                .wait_for(sequence, self.shared.ring.cursor());
        }
        self.resolve_stop(sequence)
    }

    fn try_available_to(&mut self) -> i64 {
        if let Some(generation) = self.awaiting_generation {
            if self.shared.ring.generation().get() <= generation {
                return UNAVAILABLE;
            }
            self.awaiting_generation = None;
        }

        let sequence = self.claim();
        if self.head_cache < sequence {
            let cursor = self.shared.ring.cursor().get();
            if cursor < sequence {
                return UNAVAILABLE;
            }
            self.head_cache = cursor;
        }
        self.resolve_stop(sequence)
    }

    #[inline]
    fn notify_processed(&mut self) {
        debug_assert!(
            self.claimed.is_some(),
            "notify_processed without a preceding available_to"
        );
        if let Some(sequence) = self.claimed.take() {
            self.tail.set(sequence);
        }
    }

    #[inline]
    fn batch_start(&self) -> i64 {
        self.claimed.unwrap_or(INITIAL_CURSOR_VALUE)
    }

    #[inline]
    fn index(&self, sequence: i64) -> usize {
        self.shared.ring.index(sequence)
    }

    fn is_shutdown(&self) -> bool {
        self.shared.ring.is_shutdown()
    }
}

impl<W: WaitStrategy> Drop for Worker<W> {
    fn drop(&mut self) {
        self.shared.detach(&self.tail, self.acked_generation);
    }
}
