//! Re-entrancy protection for the replace-and-refresh step.
//!
//! Several lifecycle events may fire on the same in-memory document in quick
//! succession. At most one consolidation pass may be active per document
//! instance; a second attempt observes the flag and backs off. Flags are
//! per instance, so documents never wait on each other.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one in-memory document instance. Two loads of the same stored
/// document are distinct instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Set of document instances with a consolidation pass in flight.
///
/// Cloning yields a handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct GuardRegistry {
    active: Arc<Mutex<HashSet<InstanceId>>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `instance` as busy. Returns `None` when a pass is already active
    /// for it. The flag is cleared when the returned token is dropped, which
    /// also happens on early returns and unwinding.
    pub fn try_acquire(&self, instance: InstanceId) -> Option<GuardToken> {
        if self.lock().insert(instance) {
            Some(GuardToken {
                registry: self.clone(),
                instance,
            })
        } else {
            None
        }
    }

    pub fn is_active(&self, instance: InstanceId) -> bool {
        self.lock().contains(&instance)
    }

    /// The set is only ever touched by insert/remove/contains, so a poisoned
    /// lock still holds a consistent set.
    fn lock(&self) -> MutexGuard<'_, HashSet<InstanceId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, instance: InstanceId) {
        self.lock().remove(&instance);
    }
}

/// Proof that the holder runs the only active pass for one instance.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct GuardToken {
    registry: GuardRegistry,
    instance: InstanceId,
}

impl Drop for GuardToken {
    fn drop(&mut self) {
        self.registry.release(self.instance);
    }
}
