//! Registry of engine handles owned by live values
//!
//! Every handle the engine issues to a [`crate::Value`] is recorded here until
//! it is released. An entry's presence means the handle is live; releasing it
//! removes the entry and flips the owning value's [`Liveness`] cell, which is
//! the terminal disposed state. A later registration of the same number (the
//! engine reusing a freed slot) creates a fresh entry and never revives the
//! old value.
//!
//! The table never calls the engine. Callers free engine storage for every
//! handle whose release reports a transition.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tether_engine::{Handle, Representation};

use crate::error::{Error, Result};

/// Disposed flag shared between a value and its table entry
#[derive(Debug)]
pub struct Liveness {
    handle: Handle,
    disposed: AtomicBool,
}

impl Liveness {
    pub(crate) fn new(handle: Handle) -> Self {
        Self {
            handle,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark disposed; returns true only for the call that made the transition
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}

/// A live handle and what it holds
#[derive(Debug, Clone)]
pub struct HandleEntry {
    pub handle: Handle,
    pub representation: Representation,
    pub element_count: usize,
    pub created_at: Instant,
    owner: Weak<Liveness>,
}

impl HandleEntry {
    /// Whether the owning value still exists
    pub fn has_owner(&self) -> bool {
        self.owner.strong_count() > 0
    }

    pub(crate) fn is_owned_by(&self, state: &Arc<Liveness>) -> bool {
        self.owner.as_ptr() == Arc::as_ptr(state)
    }
}

/// Handle lifecycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandleStats {
    /// Registrations since creation
    pub allocated: u64,
    /// Releases since creation, including reclaimed ones
    pub freed: u64,
    /// Currently live handles
    pub active: usize,
    /// Handles reclaimed from values dropped without `dispose`
    pub leaked: u64,
}

/// How a handle left the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseKind {
    /// `dispose`, session teardown or forced release
    Explicit,
    /// A value dropped without being disposed
    Reclaimed,
}

#[derive(Debug, Default)]
pub struct HandleTable {
    entries: HashMap<Handle, HandleEntry>,
    allocated: u64,
    freed: u64,
    leaked: u64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly issued handle
    ///
    /// # Errors
    ///
    /// `DuplicateHandle` if the number is already registered and live. That
    /// means the engine handed out a handle it still holds.
    pub fn register(
        &mut self,
        handle: Handle,
        representation: Representation,
        element_count: usize,
        owner: &Arc<Liveness>,
    ) -> Result<&HandleEntry> {
        if self.entries.contains_key(&handle) {
            tracing::error!(handle = %handle, "engine issued a handle that is still live");
            return Err(Error::DuplicateHandle(handle));
        }

        self.allocated += 1;
        let entry = HandleEntry {
            handle,
            representation,
            element_count,
            created_at: Instant::now(),
            owner: Arc::downgrade(owner),
        };
        Ok(self.entries.entry(handle).or_insert(entry))
    }

    /// Release a handle; true if it was live
    ///
    /// Releasing an unknown or already released handle is a no-op.
    pub fn release(&mut self, handle: Handle) -> bool {
        self.release_as(handle, ReleaseKind::Explicit)
    }

    pub fn release_as(&mut self, handle: Handle, kind: ReleaseKind) -> bool {
        let Some(entry) = self.entries.remove(&handle) else {
            return false;
        };

        if let Some(owner) = entry.owner.upgrade() {
            owner.mark_disposed();
        }
        self.freed += 1;
        if kind == ReleaseKind::Reclaimed {
            self.leaked += 1;
            tracing::debug!(handle = %handle, age_us = entry.created_at.elapsed().as_micros() as u64, "reclaimed undisposed handle");
        }
        true
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle)
    }

    pub fn entry(&self, handle: Handle) -> Option<&HandleEntry> {
        self.entries.get(&handle)
    }

    /// Live handles in ascending order
    pub fn live_handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.entries.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub fn stats(&self) -> HandleStats {
        HandleStats {
            allocated: self.allocated,
            freed: self.freed,
            active: self.entries.len(),
            leaked: self.leaked,
        }
    }

    /// Release every live handle and mark their owners disposed
    ///
    /// Returns the released handles so the caller can free engine storage.
    pub fn force_release_all(&mut self) -> Vec<Handle> {
        let handles = self.live_handles();
        for handle in &handles {
            self.release(*handle);
        }
        if !handles.is_empty() {
            tracing::warn!(count = handles.len(), "force-released live handles");
        }
        handles
    }
}
