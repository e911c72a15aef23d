//! The object heap
//!
//! Objects live by value in an arena of slots. A slot is reused once
//! its object is freed, with a bumped generation so that stale handles
//! stop resolving. Slots never move; the registry records the live
//! objects in allocation order and is the source of truth for sweep.

use std::collections::TryReserveError;
use std::fmt::{self, Debug};

use thiserror::Error;

use super::{
    object::{HeapId, HeapObject, ObjectRef, Payload},
    registry::Registry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    /// Objects currently registered
    pub live: usize,
    /// Slots in the arena (live or free)
    pub slots: usize,
    /// Slots available for reuse
    pub free_slots: usize,
    /// Objects allocated since heap creation
    pub total_allocated: u64,
    /// Objects freed since heap creation
    pub total_freed: u64,
}

/// State of the heap at the time of an allocation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapContext {
    pub live: usize,
    pub limit: Option<usize>,
    pub emergency_collection_attempted: bool,
}

impl fmt::Display for HeapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} live objects", self.live)?;
        match self.limit {
            Some(limit) => write!(f, " | limit: {limit} objects")?,
            None => write!(f, " | no limit")?,
        }
        if self.emergency_collection_attempted {
            write!(f, " | emergency collection attempted")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum HeapError {
    /// Heap limit reached
    #[error("out of memory: {context}")]
    OutOfMemory { context: HeapContext },
    /// The host allocator refused a request
    #[error("allocation failed: {0}")]
    AllocationFailed(#[from] TryReserveError),
    /// Requested size not representable
    #[error("requested capacity overflows")]
    CapacityOverflow,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<HeapObject>,
}

/// A heap of tagged objects with a registry of everything allocated
pub struct Heap {
    id: HeapId,
    slots: Vec<Slot>,
    free: Vec<u32>,
    registry: Registry,
    live: usize,
    limit: Option<usize>,
    total_allocated: u64,
    total_freed: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            id: HeapId::fresh(),
            slots: vec![],
            free: vec![],
            registry: Registry::new(),
            live: 0,
            limit: None,
            total_allocated: 0,
            total_freed: 0,
        }
    }

    /// A heap that refuses to hold more than `limit` live objects
    pub fn with_limit(limit: usize) -> Self {
        Heap {
            limit: Some(limit),
            ..Heap::new()
        }
    }

    pub fn id(&self) -> HeapId {
        self.id
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Number of registered objects
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Whether one more allocation would exceed the limit
    pub fn policy_requires_collection(&self) -> bool {
        self.limit.map_or(false, |limit| self.live >= limit)
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live: self.live,
            slots: self.slots.len(),
            free_slots: self.free.len(),
            total_allocated: self.total_allocated,
            total_freed: self.total_freed,
        }
    }

    pub fn context(&self, emergency_collection_attempted: bool) -> HeapContext {
        HeapContext {
            live: self.live,
            limit: self.limit,
            emergency_collection_attempted,
        }
    }

    /// Allocate an object and register it
    ///
    /// Everything that can fail is checked or reserved before the
    /// object is placed, so a failure leaves the heap unchanged.
    pub fn allocate(&mut self, payload: Payload) -> Result<ObjectRef, HeapError> {
        if self.policy_requires_collection() {
            return Err(HeapError::OutOfMemory {
                context: self.context(false),
            });
        }

        if self.free.is_empty() {
            if self.slots.len() >= u32::MAX as usize {
                return Err(HeapError::CapacityOverflow);
            }
            self.slots.try_reserve(1)?;
        }
        self.registry.reserve()?;

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.object.is_none());
        slot.object = Some(HeapObject::new(payload));
        let object = ObjectRef::new(self.id, index, slot.generation);

        self.registry.track(object);
        self.live += 1;
        self.total_allocated += 1;
        Ok(object)
    }

    /// Whether `object` was minted by this heap and is still allocated
    pub fn contains(&self, object: ObjectRef) -> bool {
        self.resolve(object).is_some()
    }

    pub fn resolve(&self, object: ObjectRef) -> Option<&HeapObject> {
        if object.heap() != self.id {
            return None;
        }
        self.slots
            .get(object.index() as usize)
            .filter(|slot| slot.generation == object.generation())
            .and_then(|slot| slot.object.as_ref())
    }

    pub fn resolve_mut(&mut self, object: ObjectRef) -> Option<&mut HeapObject> {
        if object.heap() != self.id {
            return None;
        }
        self.slots
            .get_mut(object.index() as usize)
            .filter(|slot| slot.generation == object.generation())
            .and_then(|slot| slot.object.as_mut())
    }

    /// Remove an object from its slot and retire the handle
    ///
    /// The registry entry is the caller's to vacate. Dropping the
    /// returned object releases its owned buffers; objects it has
    /// edges to are untouched.
    pub(crate) fn release(&mut self, object: ObjectRef) -> Option<HeapObject> {
        if object.heap() != self.id {
            return None;
        }
        let slot = self.slots.get_mut(object.index() as usize)?;
        if slot.generation != object.generation() {
            return None;
        }
        let freed = slot.object.take()?;

        // A slot whose generation would wrap is retired rather than
        // risk an old handle resolving again.
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(object.index());
            }
            None => slot.generation = 0,
        }

        self.live -= 1;
        self.total_freed += 1;
        Some(freed)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Free every registered object once, in allocation order
    pub fn clear(&mut self) -> usize {
        let registered = self.registry.drain().collect::<Vec<_>>();
        let mut freed = 0;
        for object in registered {
            if self.release(object).is_some() {
                freed += 1;
            }
        }
        freed
    }
}

/// Dump of registered objects in registry order
impl Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "heap {:?}: {} live", self.id, self.live)?;
        for object in self.registry.iter() {
            match self.resolve(object) {
                Some(o) => writeln!(
                    f,
                    "  {:>10} {:<7} {:<5} {}",
                    object.to_string(),
                    o.kind().to_string(),
                    o.colour().to_string(),
                    o
                )?,
                None => writeln!(f, "  {:>10} <dangling>", object.to_string())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::string::HeapString;

    #[test]
    pub fn test_simple_allocations() {
        let mut heap = Heap::new();
        let r = heap.allocate(Payload::Integer(99)).unwrap();
        assert_eq!(heap.resolve(r).unwrap().as_integer(), Some(99));
        assert!(!heap.resolve(r).unwrap().is_marked());
        assert_eq!(heap.live(), 1);
        assert_eq!(heap.registry().iter().collect::<Vec<_>>(), vec![r]);
    }

    #[test]
    pub fn test_many_allocations() {
        let mut heap = Heap::new();
        for i in 0..32000 {
            let r = heap.allocate(Payload::Integer(i)).unwrap();
            assert_eq!(heap.resolve(r).unwrap().as_integer(), Some(i));
        }
        assert_eq!(heap.stats().live, 32000);
    }

    #[test]
    pub fn test_released_handle_is_stale() {
        let mut heap = Heap::new();
        let r = heap.allocate(Payload::Integer(3)).unwrap();
        assert!(heap.release(r).is_some());
        assert!(heap.resolve(r).is_none());
        assert!(heap.release(r).is_none());

        // slot reuse gets a new generation
        let s = heap.allocate(Payload::Integer(4)).unwrap();
        assert_eq!(s.index(), r.index());
        assert_ne!(s.generation(), r.generation());
        assert!(heap.resolve(r).is_none());
        assert_eq!(heap.resolve(s).unwrap().as_integer(), Some(4));
    }

    #[test]
    pub fn test_foreign_handle_does_not_resolve() {
        let mut a = Heap::new();
        let mut b = Heap::new();
        let ra = a.allocate(Payload::Integer(1)).unwrap();
        let _rb = b.allocate(Payload::Integer(2)).unwrap();
        assert!(b.resolve(ra).is_none());
        assert!(b.release(ra).is_none());
        assert!(a.contains(ra));
    }

    #[test]
    pub fn test_limit() {
        let mut heap = Heap::with_limit(2);
        heap.allocate(Payload::Integer(1)).unwrap();
        heap.allocate(Payload::Integer(2)).unwrap();
        match heap.allocate(Payload::Integer(3)) {
            Err(HeapError::OutOfMemory { context }) => {
                assert_eq!(context.live, 2);
                assert_eq!(context.limit, Some(2));
            }
            other => panic!("expected out of memory, got {other:?}"),
        }
        assert_eq!(heap.registry().len(), 2);
    }

    #[test]
    pub fn test_clear_frees_everything_once() {
        let mut heap = Heap::new();
        heap.allocate(Payload::Integer(1)).unwrap();
        heap.allocate(Payload::String(HeapString::from_str("x").unwrap()))
            .unwrap();
        assert_eq!(heap.clear(), 2);
        assert_eq!(heap.clear(), 0);
        assert!(heap.is_empty());
        assert_eq!(heap.stats().total_freed, 2);
    }
}
