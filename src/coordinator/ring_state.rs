//! Shared state of one ring: cursor, stop marker and reset generation
//!
//! A `RingState` is shared by the producer side and every consumer attached
//! to the same cursor. Only the three counters in it are shared between
//! threads; all caches live in the role handles.

use crate::coordinator::{
    check_buffer_size, Result, Sequence, INITIAL_CURSOR_VALUE, STOP_NOT_REQUESTED,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Cursor, stop marker and reset generation of one ring
#[derive(Debug)]
pub struct RingState {
    cursor: Sequence,
    stop: Sequence,
    generation: Sequence,
    buffer_size: i64,
    index_mask: i64,
}

impl RingState {
    /// Create the state for a ring of `buffer_size` slots
    ///
    /// # Errors
    /// Returns `InvalidBufferSize` unless `buffer_size` is a power of 2
    pub fn new(buffer_size: usize) -> Result<Self> {
        check_buffer_size(buffer_size)?;
        let buffer_size = buffer_size as i64;
        Ok(Self {
            cursor: Sequence::new_with_initial_value(),
            stop: Sequence::new(STOP_NOT_REQUESTED),
            generation: Sequence::new(0),
            buffer_size,
            index_mask: buffer_size - 1,
        })
    }

    /// Highest published sequence
    #[inline]
    pub fn cursor(&self) -> &Sequence {
        &self.cursor
    }

    /// Stop marker, `STOP_NOT_REQUESTED` while no stop is pending
    #[inline]
    pub fn stop(&self) -> &Sequence {
        &self.stop
    }

    /// Number of completed stop cycles
    #[inline]
    pub fn generation(&self) -> &Sequence {
        &self.generation
    }

    #[inline]
    pub fn buffer_size(&self) -> i64 {
        self.buffer_size
    }

    /// Slot of `sequence` in caller-owned storage
    #[inline]
    pub fn index(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    /// True before the first publish and after every completed stop cycle
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.cursor.get() == INITIAL_CURSOR_VALUE
    }

    #[inline]
    pub fn is_stop_pending(&self) -> bool {
        self.stop.get() != STOP_NOT_REQUESTED
    }

    /// Return the ring to its initial state.
    ///
    /// The cursor is written after the stop marker so a producer that sees
    /// the shutdown cursor also sees the cleared marker; the generation bump
    /// comes last and releases group members waiting for the reset.
    pub(crate) fn reset(&self) {
        self.stop.set(STOP_NOT_REQUESTED);
        self.cursor.set(INITIAL_CURSOR_VALUE);
        self.generation.increment_and_get();
        tracing::debug!(
            generation = self.generation.get(),
            "ring reset after stop"
        );
    }
}

/// Who resets a ring once a consumer has drained it to the stop marker
#[derive(Debug, Clone)]
pub(crate) enum StopScope {
    /// The single consumer resets the ring itself
    Private,
    /// The last of a group of consumers resets the ring
    Shared(Arc<StopLatch>),
}

/// Count of group members that have not yet acknowledged the current stop
#[derive(Debug)]
pub(crate) struct StopLatch {
    members: usize,
    open: AtomicUsize,
}

impl StopLatch {
    pub(crate) fn new(members: usize) -> Self {
        Self {
            members,
            open: AtomicUsize::new(members),
        }
    }

    /// Record one member's acknowledgement; true for the last one, which
    /// also re-arms the latch for the next cycle
    pub(crate) fn arrive(&self) -> bool {
        if self.open.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.open.store(self.members, Ordering::Release);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub(crate) fn open(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorError;

    #[test]
    fn test_ring_state_creation() {
        let ring = RingState::new(8).unwrap();
        assert_eq!(ring.buffer_size(), 8);
        assert!(ring.is_shutdown());
        assert!(!ring.is_stop_pending());
        assert_eq!(ring.generation().get(), 0);
    }

    #[test]
    fn test_ring_state_rejects_bad_size() {
        assert!(matches!(
            RingState::new(6),
            Err(CoordinatorError::InvalidBufferSize(6))
        ));
    }

    #[test]
    fn test_index_wraps() {
        let ring = RingState::new(8).unwrap();
        assert_eq!(ring.index(0), 0);
        assert_eq!(ring.index(7), 7);
        assert_eq!(ring.index(8), 0);
        assert_eq!(ring.index(13), ring.index(13 + 8));
    }

    #[test]
    fn test_reset_clears_stop_and_bumps_generation() {
        let ring = RingState::new(4).unwrap();
        ring.cursor().set(9);
        ring.stop().set(9);
        assert!(ring.is_stop_pending());

        ring.reset();

        assert!(ring.is_shutdown());
        assert!(!ring.is_stop_pending());
        assert_eq!(ring.generation().get(), 1);
    }

    #[test]
    fn test_stop_latch_last_member_rearms() {
        let latch = StopLatch::new(3);
        assert!(!latch.arrive());
        assert!(!latch.arrive());
        assert!(latch.arrive());
        assert_eq!(latch.open(), 3);
    }
}
