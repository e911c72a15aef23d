//! Fixed-size array storage for `Array` objects
//!
//! An array owns a backing sequence of slots, each either empty or
//! holding an edge to another heap object. The slot count is fixed
//! at construction. Edges carry no ownership: the collector alone
//! decides when the objects they point at are reclaimed.

use super::{heap::HeapError, object::ObjectRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapArray {
    slots: Box<[Option<ObjectRef>]>,
}

impl HeapArray {
    /// Construct an array of `size` empty slots
    pub fn with_size(size: usize) -> Result<Self, HeapError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(size)?;
        slots.resize(size, None);
        Ok(HeapArray {
            slots: slots.into_boxed_slice(),
        })
    }

    /// Construct an array holding the slots of `left` followed by
    /// the slots of `right`
    pub fn concat(left: &HeapArray, right: &HeapArray) -> Result<Self, HeapError> {
        let size = left
            .len()
            .checked_add(right.len())
            .ok_or(HeapError::CapacityOverflow)?;
        let mut slots = Vec::new();
        slots.try_reserve_exact(size)?;
        slots.extend_from_slice(&left.slots);
        slots.extend_from_slice(&right.slots);
        Ok(HeapArray {
            slots: slots.into_boxed_slice(),
        })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Return the edge at index (`None` when out of bounds)
    pub fn get(&self, index: usize) -> Option<Option<ObjectRef>> {
        self.slots.get(index).copied()
    }

    /// Overwrite the edge at index, returning false (and leaving the
    /// array untouched) when out of bounds
    pub fn set(&mut self, index: usize, item: ObjectRef) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = Some(item);
                true
            }
            None => false,
        }
    }

    /// All non-empty edges in slot order
    pub fn edges(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn slots(&self) -> &[Option<ObjectRef>] {
        &self.slots
    }
}
