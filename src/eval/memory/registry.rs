//! The heap registry
//!
//! Ordered record of every object allocated in a heap and not yet
//! freed, in allocation order. Sweep vacates entries in place and
//! then compacts, so survivors keep their relative order.

use std::collections::TryReserveError;

use super::object::ObjectRef;

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Option<ObjectRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Make sure the next `track` cannot fail
    pub fn reserve(&mut self) -> Result<(), TryReserveError> {
        self.entries.try_reserve(1)
    }

    /// Append an entry (amortised constant time)
    pub fn track(&mut self, object: ObjectRef) {
        self.entries.push(Some(object));
    }

    /// Number of entries, including any vacated but not yet compacted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<ObjectRef> {
        self.entries.get(position).copied().flatten()
    }

    /// Clear the entry at `position`, returning what it held
    pub fn vacate(&mut self, position: usize) -> Option<ObjectRef> {
        self.entries.get_mut(position).and_then(Option::take)
    }

    /// Drop vacated entries, preserving the order of the rest
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(Option::is_some);
        before - self.entries.len()
    }

    /// Tracked objects in allocation order
    pub fn iter(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.entries.iter().flatten().copied()
    }

    /// Remove every entry, returning them in allocation order
    pub fn drain(&mut self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.entries.drain(..).flatten()
    }
}
