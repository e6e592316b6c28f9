//! Sequence implementation for the coordinator
//!
//! A `Sequence` is the shared counter behind every cursor, tail and stop
//! marker. Each one sits alone on its own cache line so that a producer
//! advancing its cursor never invalidates the line a consumer writes its
//! tail to.

use arc_swap::ArcSwap;
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A cache-line isolated sequence counter
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Create a sequence at `INITIAL_CURSOR_VALUE`
    pub fn new_with_initial_value() -> Self {
        Self::new(crate::coordinator::INITIAL_CURSOR_VALUE)
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Set the sequence value
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Set the sequence value with a full fence
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Compare and set the sequence value
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment and get the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Add a value and get the new result
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }

    /// Get the current value and then increment
    #[inline]
    pub fn get_and_increment(&self) -> i64 {
        self.value.fetch_add(1, Ordering::AcqRel)
    }

    /// Minimum over `sequences`, never above `floor`
    #[inline]
    pub fn get_minimum_sequence(sequences: &[Arc<Sequence>], floor: i64) -> i64 {
        sequences
            .iter()
            .map(|seq| seq.get())
            .fold(floor, i64::min)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new_with_initial_value()
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// A group of tails that can change while a producer is reading it
///
/// Readers load an immutable snapshot and never see a half-updated list.
/// Writers copy the current list, modify the copy and swap it in; they
/// serialize with each other on `write_lock` since membership changes are rare.
pub struct SequenceGroup {
    snapshot: ArcSwap<Vec<Arc<Sequence>>>,
    write_lock: Mutex<()>,
}

impl SequenceGroup {
    /// Create a new empty sequence group
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Add a sequence to the group
    pub fn add(&self, sequence: Arc<Sequence>) {
        let _guard = self.write_lock.lock();
        let mut next = Vec::clone(&self.snapshot.load());
        next.push(sequence);
        self.snapshot.store(Arc::new(next));
    }

    /// Remove a sequence from the group
    pub fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load_full();
        match current.iter().position(|s| Arc::ptr_eq(s, sequence)) {
            Some(pos) => {
                let mut next = Vec::clone(&current);
                next.remove(pos);
                self.snapshot.store(Arc::new(next));
                true
            }
            None => false,
        }
    }

    /// Get the minimum sequence value from all sequences in the group,
    /// or `floor` if the group is empty or every member is ahead of it
    #[inline]
    pub fn get_minimum_sequence(&self, floor: i64) -> i64 {
        Sequence::get_minimum_sequence(&self.snapshot.load(), floor)
    }

    /// Get the number of sequences in the group
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Check if the group is empty
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Current membership snapshot
    pub fn snapshot(&self) -> Arc<Vec<Arc<Sequence>>> {
        self.snapshot.load_full()
    }
}

impl Default for SequenceGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SequenceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.snapshot.load().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sequence_default() {
        let seq = Sequence::default();
        assert_eq!(seq.get(), crate::coordinator::INITIAL_CURSOR_VALUE);
    }

    #[test]
    fn test_sequence_set_get() {
        let seq = Sequence::new(0);
        seq.set(100);
        assert_eq!(seq.get(), 100);
        seq.set_volatile(7);
        assert_eq!(seq.get(), 7);
    }

    #[test]
    fn test_sequence_increment() {
        let seq = Sequence::new(0);
        assert_eq!(seq.increment_and_get(), 1);
        assert_eq!(seq.get_and_increment(), 1);
        assert_eq!(seq.get(), 2);
        assert_eq!(seq.add_and_get(5), 7);
    }

    #[test]
    fn test_sequence_compare_and_set() {
        let seq = Sequence::new(10);
        assert!(seq.compare_and_set(10, 20));
        assert!(!seq.compare_and_set(10, 30));
        assert_eq!(seq.get(), 20);
    }

    #[test]
    fn test_sequence_is_cache_line_isolated() {
        assert!(std::mem::align_of::<Sequence>() >= 64);
        assert!(std::mem::size_of::<Sequence>() >= 64);
    }

    #[test]
    fn test_minimum_sequence_respects_floor() {
        let seqs = vec![Arc::new(Sequence::new(10)), Arc::new(Sequence::new(4))];
        assert_eq!(Sequence::get_minimum_sequence(&seqs, 100), 4);
        assert_eq!(Sequence::get_minimum_sequence(&seqs, 2), 2);
        assert_eq!(Sequence::get_minimum_sequence(&[], 9), 9);
    }

    #[test]
    fn test_sequence_group() {
        let group = SequenceGroup::new();
        assert!(group.is_empty());

        let seq1 = Arc::new(Sequence::new(10));
        let seq2 = Arc::new(Sequence::new(20));
        let seq3 = Arc::new(Sequence::new(5));

        group.add(seq1.clone());
        group.add(seq2.clone());
        group.add(seq3.clone());

        assert_eq!(group.len(), 3);
        assert_eq!(group.get_minimum_sequence(i64::MAX), 5);

        assert!(group.remove(&seq3));
        assert_eq!(group.len(), 2);
        assert_eq!(group.get_minimum_sequence(i64::MAX), 10);

        assert!(!group.remove(&seq3));
    }

    #[test]
    fn test_sequence_group_snapshot_is_stable() {
        let group = SequenceGroup::new();
        let seq = Arc::new(Sequence::new(1));
        group.add(seq.clone());

        let before = group.snapshot();
        group.remove(&seq);

        assert_eq!(before.len(), 1);
        assert!(group.is_empty());
    }

    #[test]
    fn test_sequence_thread_safety() {
        let seq = Arc::new(Sequence::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let seq_clone = Arc::clone(&seq);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    seq_clone.increment_and_get();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seq.get(), 10000);
    }
}
