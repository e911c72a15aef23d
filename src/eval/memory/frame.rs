//! Frames: per-scope root sets
//!
//! Each active scope owns a frame listing the objects it pins as
//! reachable. Frames are pushed and popped in step with scope entry
//! and exit. Popping a frame only discards its roots; the objects
//! remain in the heap until a collection finds them unreachable.

use super::object::ObjectRef;

/// Identifies a pushed frame
///
/// An id goes stale once its frame is popped, even if a later frame
/// is pushed at the same depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    depth: usize,
    serial: u64,
}

impl FrameId {
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// A scope's root set
#[derive(Debug)]
pub struct Frame {
    serial: u64,
    roots: Vec<ObjectRef>,
}

impl Frame {
    /// Pin `object`; duplicates are allowed
    pub fn add_root(&mut self, object: ObjectRef) {
        self.roots.push(object);
    }

    pub fn roots(&self) -> &[ObjectRef] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// The stack of active frames, innermost last
#[derive(Debug, Default)]
pub struct FrameStack {
    frames: Vec<Frame>,
    next_serial: u64,
}

impl FrameStack {
    pub fn new() -> Self {
        FrameStack::default()
    }

    /// Push an empty frame
    pub fn push(&mut self) -> FrameId {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.frames.push(Frame {
            serial,
            roots: vec![],
        });
        FrameId {
            depth: self.frames.len() - 1,
            serial,
        }
    }

    /// Pop the innermost frame
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Pop `id` and every frame pushed after it, returning how many
    /// frames were popped (zero if `id` is stale)
    pub fn release(&mut self, id: FrameId) -> usize {
        if self.get(id).is_none() {
            return 0;
        }
        let popped = self.frames.len() - id.depth;
        self.frames.truncate(id.depth);
        popped
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames
            .get(id.depth)
            .filter(|frame| frame.serial == id.serial)
    }

    pub fn get_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames
            .get_mut(id.depth)
            .filter(|frame| frame.serial == id.serial)
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Every root of every active frame, outermost frame first
    pub fn roots(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.frames.iter().flat_map(|f| f.roots.iter().copied())
    }

    /// Total root references across active frames
    pub fn root_count(&self) -> usize {
        self.frames.iter().map(Frame::len).sum()
    }

    /// Release all frames, returning how many there were
    pub fn clear(&mut self) -> usize {
        let count = self.frames.len();
        self.frames.clear();
        count
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::object::HeapId;

    #[test]
    pub fn test_push_pop() {
        let mut stack = FrameStack::new();
        let outer = stack.push();
        let inner = stack.push();
        assert_eq!(stack.depth(), 2);
        assert_eq!(inner.depth(), 1);
        assert!(stack.pop().is_some());
        assert!(stack.get(inner).is_none());
        assert!(stack.get(outer).is_some());
    }

    #[test]
    pub fn test_stale_id_at_reused_depth() {
        let mut stack = FrameStack::new();
        let first = stack.push();
        stack.pop();
        let second = stack.push();
        assert_eq!(first.depth(), second.depth());
        assert!(stack.get(first).is_none());
        assert_eq!(stack.release(first), 0);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    pub fn test_release_unwinds_nested_frames() {
        let mut stack = FrameStack::new();
        let _a = stack.push();
        let b = stack.push();
        let _c = stack.push();
        assert_eq!(stack.release(b), 2);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    pub fn test_roots_across_frames() {
        let heap = HeapId::fresh();
        let r = |i| ObjectRef::new(heap, i, 0);
        let mut stack = FrameStack::new();
        let a = stack.push();
        let b = stack.push();
        stack.get_mut(a).unwrap().add_root(r(1));
        stack.get_mut(b).unwrap().add_root(r(2));
        stack.get_mut(b).unwrap().add_root(r(2));
        assert_eq!(stack.root_count(), 3);
        assert_eq!(stack.roots().collect::<Vec<_>>(), vec![r(1), r(2), r(2)]);
    }
}
