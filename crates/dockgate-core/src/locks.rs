use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Per-resource-key mutual exclusion for mutating actions.
///
/// Each key maps to its own mutex, so actions on `container:a` never wait
/// on actions against `container:b`. Slots are created on first use and
/// kept for the life of the process.
#[derive(Debug, Default)]
pub struct ResourceLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `key`. Lock it and hold the guard for the whole
    /// execute-and-record span.
    pub fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock a slot, recovering from poisoning: a panic in another holder must
/// not wedge the resource forever.
pub fn acquire(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}
