//! Collector support
//!
//! Stop-the-world mark, trace and sweep over a heap. Marking shades
//! the roots, tracing expands grey objects from a worklist until none
//! remain, and sweeping frees everything still white and resets the
//! survivors for the next cycle.
//!

use std::time::Instant;

use log::{debug, trace as log_trace};

use crate::eval::machine::metrics::{Clock, ThreadOccupation};

use super::{frame::FrameStack, heap::Heap, object::ObjectRef};

/// Anything that can supply roots to the collector
pub trait GcRoots {
    fn scan_roots(&self, visit: &mut dyn FnMut(ObjectRef));
}

impl GcRoots for FrameStack {
    fn scan_roots(&self, visit: &mut dyn FnMut(ObjectRef)) {
        for root in self.roots() {
            visit(root)
        }
    }
}

impl GcRoots for [ObjectRef] {
    fn scan_roots(&self, visit: &mut dyn FnMut(ObjectRef)) {
        for root in self {
            visit(*root)
        }
    }
}

impl GcRoots for Vec<ObjectRef> {
    fn scan_roots(&self, visit: &mut dyn FnMut(ObjectRef)) {
        self.as_slice().scan_roots(visit)
    }
}

/// Chain two root sources
impl<A: GcRoots + ?Sized, B: GcRoots + ?Sized> GcRoots for (&A, &B) {
    fn scan_roots(&self, visit: &mut dyn FnMut(ObjectRef)) {
        self.0.scan_roots(visit);
        self.1.scan_roots(visit);
    }
}

/// View of the heap available to the collector
pub struct CollectorHeapView<'guard> {
    heap: &'guard mut Heap,
}

impl<'guard> CollectorHeapView<'guard> {
    pub fn new(heap: &'guard mut Heap) -> Self {
        CollectorHeapView { heap }
    }

    /// Mark object if live and not already marked and return whether
    /// it was newly marked
    pub fn mark(&mut self, obj: ObjectRef) -> bool {
        match self.heap.resolve_mut(obj) {
            Some(o) => o.header_mut().shade(),
            None => false,
        }
    }

    pub fn is_marked(&self, obj: ObjectRef) -> bool {
        self.heap.resolve(obj).map_or(false, |o| o.is_marked())
    }

    /// Registered objects currently marked, in registry order
    pub fn marked(&self) -> Vec<ObjectRef> {
        self.heap
            .registry()
            .iter()
            .filter(|r| self.is_marked(*r))
            .collect()
    }

    /// Copy the edges of `obj` into `into` and blacken it
    fn blacken(&mut self, obj: ObjectRef, into: &mut Vec<ObjectRef>) {
        into.clear();
        if let Some(o) = self.heap.resolve_mut(obj) {
            into.extend(o.edges());
            o.header_mut().blacken();
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub freed: usize,
    pub survived: usize,
}

/// Summary of one collection cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectionReport {
    /// Root references scanned (duplicates included)
    pub roots: usize,
    /// Objects marked live
    pub marked: usize,
    /// Objects freed
    pub freed: usize,
    /// Objects surviving
    pub survived: usize,
}

impl std::fmt::Display for CollectionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "roots {}, marked {}, freed {}, survived {}",
            self.roots, self.marked, self.freed, self.survived
        )
    }
}

/// Mark phase: shade every root, returning the number of root
/// references scanned
pub fn mark(roots: &dyn GcRoots, heap: &mut Heap) -> usize {
    let mut view = CollectorHeapView::new(heap);
    let mut scanned = 0;
    roots.scan_roots(&mut |root| {
        scanned += 1;
        view.mark(root);
    });
    scanned
}

/// Trace phase: expand every marked object until the worklist is
/// empty, returning the number of objects marked in total
///
/// An object is pushed only when it turns from white to grey, so
/// cyclic structures terminate.
pub fn trace(heap: &mut Heap) -> usize {
    let mut view = CollectorHeapView::new(heap);

    let mut grey = view.marked();
    let mut marked = grey.len();
    let mut edges = vec![];

    while let Some(obj) = grey.pop() {
        view.blacken(obj, &mut edges);
        for child in edges.drain(..) {
            if view.mark(child) {
                marked += 1;
                grey.push(child);
            }
        }
    }

    marked
}

/// Sweep phase: free unmarked objects, unmark survivors and compact
/// the registry
///
/// Freeing an object releases its own buffers only. Objects it has
/// edges to are separate registry entries whose marks decide their
/// fate independently.
pub fn sweep(heap: &mut Heap) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();

    for position in 0..heap.registry().len() {
        let Some(obj) = heap.registry().get(position) else {
            continue;
        };

        let marked = match heap.resolve_mut(obj) {
            Some(o) if o.is_marked() => {
                o.header_mut().unmark();
                true
            }
            Some(_) => false,
            None => {
                debug_assert!(false, "registry entry {obj} does not resolve");
                heap.registry_mut().vacate(position);
                continue;
            }
        };

        if marked {
            outcome.survived += 1;
        } else {
            heap.registry_mut().vacate(position);
            drop(heap.release(obj));
            outcome.freed += 1;
        }
    }

    heap.registry_mut().compact();
    outcome
}

/// Run a full collection cycle over `heap` from `roots`
pub fn collect(
    roots: &dyn GcRoots,
    heap: &mut Heap,
    clock: &mut Clock,
    dump_heap: bool,
) -> CollectionReport {
    if dump_heap {
        eprintln!("GC!");
    }

    let start = Instant::now();

    clock.switch(ThreadOccupation::CollectorMark);
    let root_count = mark(roots, heap);
    log_trace!("mark: {} root references", root_count);

    clock.switch(ThreadOccupation::CollectorTrace);
    let marked = trace(heap);
    log_trace!("trace: {} objects reachable", marked);

    if dump_heap {
        eprintln!("Heap after mark:\n\n{:?}", heap)
    }

    clock.switch(ThreadOccupation::CollectorSweep);
    let outcome = sweep(heap);

    if dump_heap {
        eprintln!("Heap after sweep:\n\n{:?}", heap)
    }

    debug!(
        "collected {} of {} objects in {:?} ({} survived)",
        outcome.freed,
        outcome.freed + outcome.survived,
        start.elapsed(),
        outcome.survived
    );

    CollectionReport {
        roots: root_count,
        marked,
        freed: outcome.freed,
        survived: outcome.survived,
    }
}

#[cfg(test)]
pub mod tests {
    use crate::eval::memory::{
        array::HeapArray,
        header::Colour,
        object::Payload,
        string::HeapString,
    };

    use super::*;

    fn array_of(heap: &mut Heap, items: &[ObjectRef]) -> ObjectRef {
        let mut array = HeapArray::with_size(items.len()).unwrap();
        for (i, item) in items.iter().enumerate() {
            array.set(i, *item);
        }
        heap.allocate(Payload::Array(array)).unwrap()
    }

    #[test]
    pub fn test_simple_collection() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();

        // A bunch of garbage...
        for i in 0..1024 {
            heap.allocate(Payload::Integer(i)).unwrap();
        }

        let a = heap.allocate(Payload::Integer(1)).unwrap();
        let b = heap.allocate(Payload::Integer(2)).unwrap();
        let arr = array_of(&mut heap, &[a, b]);

        let report = collect(&vec![arr], &mut heap, &mut clock, true);
        assert_eq!(report.freed, 1024);
        assert_eq!(report.survived, 3);
        assert_eq!(heap.live(), 3);
        assert_eq!(heap.registry().iter().collect::<Vec<_>>(), vec![a, b, arr]);

        let report = collect(&Vec::<ObjectRef>::new(), &mut heap, &mut clock, false);
        assert_eq!(report.freed, 3);
        assert!(heap.is_empty());
        assert!(heap.resolve(arr).is_none());
    }

    #[test]
    pub fn test_marks_reset_after_sweep() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();
        let x = heap.allocate(Payload::Integer(1)).unwrap();
        let v = heap.allocate(Payload::Vector3([x, x, x])).unwrap();

        collect(&vec![v], &mut heap, &mut clock, false);

        for obj in heap.registry().iter() {
            assert_eq!(heap.resolve(obj).unwrap().colour(), Colour::White);
        }
    }

    #[test]
    pub fn test_phases() {
        let mut heap = Heap::new();
        let leaf = heap.allocate(Payload::Integer(7)).unwrap();
        let inner = array_of(&mut heap, &[leaf]);
        let outer = array_of(&mut heap, &[inner]);
        let garbage = heap.allocate(Payload::Integer(0)).unwrap();

        assert_eq!(mark(&vec![outer, outer], &mut heap), 2);
        assert_eq!(heap.resolve(outer).unwrap().colour(), Colour::Grey);
        assert_eq!(heap.resolve(inner).unwrap().colour(), Colour::White);

        assert_eq!(trace(&mut heap), 3);
        for obj in [leaf, inner, outer] {
            assert_eq!(heap.resolve(obj).unwrap().colour(), Colour::Black);
        }
        assert_eq!(heap.resolve(garbage).unwrap().colour(), Colour::White);

        let outcome = sweep(&mut heap);
        assert_eq!(outcome, SweepOutcome { freed: 1, survived: 3 });
        assert!(heap.resolve(garbage).is_none());
    }

    #[test]
    pub fn test_self_reference_terminates() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();
        let arr = heap
            .allocate(Payload::Array(HeapArray::with_size(2).unwrap()))
            .unwrap();
        heap.resolve_mut(arr)
            .unwrap()
            .as_array_mut()
            .unwrap()
            .set(0, arr);

        let report = collect(&vec![arr], &mut heap, &mut clock, false);
        assert_eq!(report.survived, 1);
        assert_eq!(report.marked, 1);
        assert!(heap.contains(arr));
    }

    #[test]
    pub fn test_unrooted_cycle_is_collected() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();
        let a = heap
            .allocate(Payload::Array(HeapArray::with_size(1).unwrap()))
            .unwrap();
        let b = array_of(&mut heap, &[a]);
        heap.resolve_mut(a).unwrap().as_array_mut().unwrap().set(0, b);

        let report = collect(&Vec::<ObjectRef>::new(), &mut heap, &mut clock, false);
        assert_eq!(report.freed, 2);
        assert!(heap.is_empty());
    }

    #[test]
    pub fn test_sweep_releases_children_independently() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();
        let s = heap
            .allocate(Payload::String(HeapString::from_str("kept").unwrap()))
            .unwrap();
        let holder = array_of(&mut heap, &[s]);

        // the holder dies but the string is rooted directly
        let report = collect(&vec![s], &mut heap, &mut clock, false);
        assert_eq!(report.freed, 1);
        assert!(heap.resolve(holder).is_none());
        assert_eq!(heap.resolve(s).unwrap().as_str(), Some("kept"));
    }

    #[test]
    pub fn test_chained_roots() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();
        let a = heap.allocate(Payload::Integer(1)).unwrap();
        let b = heap.allocate(Payload::Integer(2)).unwrap();
        let frames = FrameStack::new();
        let extra = vec![a, b];
        let report = collect(&(&frames, &extra), &mut heap, &mut clock, false);
        assert_eq!(report.roots, 2);
        assert_eq!(report.survived, 2);
    }
}
