//! N independent producers merged into one consumer
//!
//! Each producer owns a full single-producer ring of its own. The `Merger`
//! holds the consumer side of all of them and polls them round-robin,
//! starting just after the source it serviced last. The merged stream ends
//! only after every source has stopped.

use crate::coordinator::{
    build_single, Consumer, ConsumerCoordinator, CoordinatorConfig, CoordinatorError,
    ProducerCoordinator, Result, WaitStrategy, ACQUIRE_STOP_REQUEST, UNAVAILABLE,
};
use std::hint;
use std::thread;

/// Build a merger over `producers` independent sources
///
/// Returns the merger (the consumer role) and one `ProducerCoordinator` per
/// source, in source order, ready to be moved to the producer threads.
///
/// # Errors
/// `InvalidMemberCount` when `producers` is zero, or a configuration error
pub fn build_merger<W: WaitStrategy>(
    config: &CoordinatorConfig,
    producers: usize,
    wait_strategy: W,
) -> Result<(Merger<W>, Vec<ProducerCoordinator>)> {
    config.validate()?;
    if producers == 0 {
        return Err(CoordinatorError::InvalidMemberCount(producers));
    }

    let mut sources = Vec::with_capacity(producers);
    let mut handles = Vec::with_capacity(producers);
    for _ in 0..producers {
        let (producer, consumer) = build_single(config, wait_strategy)?;
        handles.push(producer);
        sources.push(consumer);
    }

    tracing::debug!(
        buffer_size = config.buffer_size,
        producers,
        "built merger"
    );
    Ok((
        Merger {
            stopped: vec![false; producers],
            sources,
            stop_count: 0,
            rotation: producers - 1,
            current: 0,
            retry_budget: config.merge_retry_budget,
        },
        handles,
    ))
}

/// Consumer side of a many-to-one merge
///
/// Driven from a single consumer thread: `current_index` describes the
/// source of the last sequence returned to this same handle.
#[derive(Debug)]
pub struct Merger<W: WaitStrategy> {
    sources: Vec<ConsumerCoordinator<W>>,
    stopped: Vec<bool>,
    stop_count: usize,
    rotation: usize,
    current: usize,
    retry_budget: u32,
}

impl<W: WaitStrategy> Merger<W> {
    /// Consumer side of source `i`
    ///
    /// # Panics
    /// Panics if `i` is out of range
    pub fn get(&self, i: usize) -> &ConsumerCoordinator<W> {
        &self.sources[i]
    }

    /// Source that produced the last sequence returned
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// One pass over every source that has not stopped yet
    fn poll_rotation(&mut self) -> i64 {
        let count = self.sources.len();
        for _ in 0..count {
            self.rotation = (self.rotation + 1) % count;
            let source = self.rotation;
            if self.stopped[source] {
                continue;
            }

            match self.sources[source].try_available_to() {
                UNAVAILABLE => {}
                ACQUIRE_STOP_REQUEST => {
                    self.stopped[source] = true;
                    self.stop_count += 1;
                    tracing::debug!(
                        source,
                        stopped = self.stop_count,
                        sources = count,
                        "merger source stopped"
                    );
                    if self.stop_count == count {
                        self.stopped.iter_mut().for_each(|s| *s = false);
                        self.stop_count = 0;
                        return ACQUIRE_STOP_REQUEST;
                    }
                }
                sequence => {
                    self.current = source;
                    return sequence;
                }
            }
        }
        UNAVAILABLE
    }
}

impl<W: WaitStrategy> Consumer for Merger<W> {
    fn available_to(&mut self) -> i64 {
        let mut retries = 0;
        loop {
            let sequence = self.poll_rotation();
            if sequence != UNAVAILABLE {
                return sequence;
            }
            retries += 1;
            if retries >= self.retry_budget {
                thread::yield_now();
                retries = 0;
            } else {
                hint::spin_loop();
            }
        }
    }

    fn try_available_to(&mut self) -> i64 {
        self.poll_rotation()
    }

    /// Releases the range on the source that returned it
    fn notify_processed(&mut self) {
        self.sources[self.current].notify_processed();
    }

    fn batch_start(&self) -> i64 {
        self.sources[self.current].batch_start()
    }

    /// Every source has the same buffer size
    fn index(&self, sequence: i64) -> usize {
        self.sources[0].index(sequence)
    }

    fn is_shutdown(&self) -> bool {
        self.sources.iter().all(|source| source.is_shutdown())
    }
}
