//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer burns time while the cursor it
//! depends on has not reached the sequence it needs. They are plain `Copy`
//! values passed by generic parameter, so the wait loop is monomorphized and
//! inlined into each coordinator.

use crate::coordinator::Sequence;
use std::hint;
use std::thread;

/// Strategy for waiting for a sequence to be published
pub trait WaitStrategy: Copy + Send + Sync + std::fmt::Debug {
    /// Block until `cursor` reaches at least `sequence`
    ///
    /// Returns the cursor value that satisfied the wait, which may be higher
    /// than requested. Every read of the cursor is an Acquire load, pairing
    /// with the producer's Release publish.
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64;
}

/// Busy spin wait strategy - lowest possible latency
///
/// Polls continuously with a spin loop hint and never gives up the CPU.
#[derive(Copy, Clone, Debug, Default)]
pub struct BusySpin;

impl WaitStrategy for BusySpin {
    #[inline]
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64 {
        loop {
            let available = cursor.get();
            if available >= sequence {
                return available;
            }
            hint::spin_loop();
        }
    }
}

/// Spin-then-yield wait strategy
///
/// Spins for `spin_tries` polls, then yields the thread and starts over.
#[derive(Copy, Clone, Debug)]
pub struct SpinThenYield {
    spin_tries: u32,
}

impl SpinThenYield {
    /// Spin tries before yielding when none are configured
    pub const DEFAULT_SPIN_TRIES: u32 = 100;

    /// Create a new spin-then-yield wait strategy
    ///
    /// # Arguments
    /// * `spin_tries` - Number of busy polls before yielding
    pub fn new(spin_tries: u32) -> Self {
        Self { spin_tries }
    }

    pub fn spin_tries(&self) -> u32 {
        self.spin_tries
    }
}

impl Default for SpinThenYield {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SPIN_TRIES)
    }
}

impl WaitStrategy for SpinThenYield {
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64 {
        let mut counter = self.spin_tries;
        loop {
            let available = cursor.get();
            if available >= sequence {
                return available;
            }
            if counter == 0 {
                thread::yield_now();
                counter = self.spin_tries;
            } else {
                counter -= 1;
                hint::spin_loop();
            }
        }
    }
}

/// Wait strategy chosen at runtime from configuration
#[derive(Copy, Clone, Debug)]
pub enum ConfiguredWait {
    BusySpin(BusySpin),
    SpinThenYield(SpinThenYield),
}

impl WaitStrategy for ConfiguredWait {
    #[inline]
    fn wait_for(&self, sequence: i64, cursor: &Sequence) -> i64 {
        match self {
            ConfiguredWait::BusySpin(strategy) => strategy.wait_for(sequence, cursor),
            ConfiguredWait::SpinThenYield(strategy) => strategy.wait_for(sequence, cursor),
        }
    }
}

impl Default for ConfiguredWait {
    fn default() -> Self {
        ConfiguredWait::SpinThenYield(SpinThenYield::default())
    }
}
