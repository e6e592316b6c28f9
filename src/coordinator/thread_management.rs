//! Dedicated role threads
//!
//! Producers and consumers are expected to run on long-lived threads of
//! their own, spinning on the coordinator. `ThreadBuilder` names such a
//! thread and optionally pins it to a CPU core; `ManagedThread` joins it on
//! drop so a role thread never outlives the scope that started it.

use core_affinity::CoreId;
use std::thread::{self, JoinHandle};

/// Builder for a named, optionally pinned role thread
#[derive(Debug, Default)]
pub struct ThreadBuilder {
    affinity: Option<CoreId>,
    name: Option<String>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the thread to a CPU core
    ///
    /// An unknown core is not an error: the thread runs unpinned and a
    /// warning is logged.
    pub fn pin_at_core(mut self, core_id: usize) -> Self {
        self.affinity = Some(CoreId { id: core_id });
        self
    }

    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Spawn the thread running `f`
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be created
    pub fn spawn<F>(self, f: F) -> std::io::Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_name = self.name.unwrap_or_else(|| "ringcond-role".to_string());
        let affinity = self.affinity;

        let name_for_thread = thread_name.clone();
        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                set_affinity_if_defined(affinity, &name_for_thread);
                f();
            })?;

        Ok(ManagedThread {
            join_handle: Some(join_handle),
            thread_name,
        })
    }
}

/// A role thread that is joined when dropped
#[derive(Debug)]
pub struct ManagedThread {
    join_handle: Option<JoinHandle<()>>,
    thread_name: String,
}

impl ManagedThread {
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Wait for the thread to finish, returning its panic payload if any
    pub fn join(mut self) -> thread::Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::warn!(thread = %self.thread_name, "role thread panicked");
            }
        }
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    if let Some(core_id) = affinity {
        if core_affinity::set_for_current(core_id) {
            tracing::debug!(thread = thread_name, core = core_id.id, "pinned role thread");
        } else {
            tracing::warn!(thread = thread_name, core = core_id.id, "could not pin role thread");
        }
    }
}

/// CPU core ids available for pinning
pub fn get_available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .iter()
        .map(|core| core.id)
        .collect()
}
