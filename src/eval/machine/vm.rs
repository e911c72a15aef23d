//! The virtual machine: heap, frame stack and collection entry point

use std::time::{Duration, Instant};

use log::{debug, warn};
use structopt::StructOpt;

use crate::eval::{
    error::VmError,
    memory::{
        collect::{self, CollectionReport},
        frame::{FrameId, FrameStack},
        heap::{Heap, HeapError, HeapStats},
        mutator::Mutator,
        object::{HeapObject, ObjectRef, Payload},
    },
};

use super::metrics::{Clock, Metrics, ThreadOccupation};

/// Settings for constructing a VM
#[derive(StructOpt, Debug, Clone, Default)]
pub struct VmSettings {
    /// Maximum number of live objects in the heap
    #[structopt(long = "heap-limit")]
    pub heap_limit: Option<usize>,
    /// Collect and retry once when an allocation would exceed the heap
    /// limit
    #[structopt(long = "emergency-gc")]
    pub emergency_collection: bool,
    /// Dump the heap to stderr during every collection
    #[structopt(long = "dump-heap")]
    pub dump_heap: bool,
}

impl VmSettings {
    pub fn with_heap_limit(self, limit: usize) -> Self {
        VmSettings {
            heap_limit: Some(limit),
            ..self
        }
    }

    pub fn with_emergency_collection(self) -> Self {
        VmSettings {
            emergency_collection: true,
            ..self
        }
    }

    pub fn with_dump_heap(self) -> Self {
        VmSettings {
            dump_heap: true,
            ..self
        }
    }
}

/// Collection history
#[derive(Debug, Default, Clone)]
pub struct CollectionStats {
    /// Total number of collections performed
    pub collections: u64,
    /// Number of collections forced by allocation pressure
    pub emergency_collections: u64,
    /// Total time spent in garbage collection
    pub total_time: Duration,
    /// Duration of the most recent collection
    pub last_time: Option<Duration>,
    /// Objects freed across all collections
    pub total_freed: u64,
}

/// What teardown released
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub frames: usize,
    pub objects: usize,
}

/// A VM instance
///
/// GC roots (outside heap, pointing in) are:
/// - the roots of every active frame
/// - objects held by in-flight operations
pub struct Vm {
    /// All objects allocated by this VM
    heap: Heap,
    /// Active scopes, innermost last
    frames: FrameStack,
    /// Temporaries pinned while an operation allocates
    held: Vec<ObjectRef>,
    settings: VmSettings,
    metrics: Metrics,
    clock: Clock,
    gc_stats: CollectionStats,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm::with_settings(VmSettings::default())
    }

    pub fn with_settings(settings: VmSettings) -> Self {
        let mut clock = Clock::default();
        clock.switch(ThreadOccupation::Initialisation);

        let heap = settings
            .heap_limit
            .map(Heap::with_limit)
            .unwrap_or_else(Heap::new);

        clock.switch(ThreadOccupation::Mutator);

        Vm {
            heap,
            frames: FrameStack::new(),
            held: vec![],
            settings,
            metrics: Metrics::default(),
            clock,
            gc_stats: CollectionStats::default(),
        }
    }

    pub fn settings(&self) -> &VmSettings {
        &self.settings
    }

    /// Access the heap for inspection
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn frames(&self) -> &FrameStack {
        &self.frames
    }

    /// Access the metrics (allocs, collections, etc.)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Return clock for access to GC timings
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Stop the clock, charging time so far
    pub fn stop_clock(&mut self) {
        self.clock.stop();
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    pub fn gc_stats(&self) -> &CollectionStats {
        &self.gc_stats
    }

    /// Look up a live object
    pub fn get(&self, obj: ObjectRef) -> Option<&HeapObject> {
        self.heap.resolve(obj)
    }

    pub fn is_live(&self, obj: ObjectRef) -> bool {
        self.heap.contains(obj)
    }

    // Frames

    /// Enter a scope: push an empty frame
    pub fn new_frame(&mut self) -> FrameId {
        let id = self.frames.push();
        self.metrics.frames(self.frames.depth());
        id
    }

    /// Pin `obj` as a root of `frame`; `None` is ignored
    pub fn add_root<R: Into<Option<ObjectRef>>>(
        &mut self,
        frame: FrameId,
        obj: R,
    ) -> Result<(), VmError> {
        let obj: Option<ObjectRef> = obj.into();
        let Some(obj) = obj else {
            return Ok(());
        };
        self.require(obj, "root")?;
        self.frames
            .get_mut(frame)
            .ok_or_else(|| {
                VmError::InvalidArgument(format!(
                    "frame at depth {} is not active",
                    frame.depth()
                ))
            })?
            .add_root(obj);
        Ok(())
    }

    /// Exit the innermost scope, returning how many roots it held
    pub fn pop_frame(&mut self) -> Option<usize> {
        self.frames.pop().map(|f| f.len())
    }

    /// Exit the scope `frame` and any scopes nested inside it,
    /// returning the number of frames popped
    pub fn release_frame(&mut self, frame: FrameId) -> Result<usize, VmError> {
        match self.frames.release(frame) {
            0 => Err(VmError::InvalidArgument(format!(
                "frame at depth {} is not active",
                frame.depth()
            ))),
            n => Ok(n),
        }
    }

    /// Run `f` inside a fresh scope, exiting the scope afterwards
    /// whatever `f` returns
    pub fn with_frame<T, F>(&mut self, f: F) -> T
    where
        F: FnOnce(&mut Vm, FrameId) -> T,
    {
        let frame = self.new_frame();
        let result = f(self, frame);
        self.frames.release(frame);
        result
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.depth()
    }

    /// Total root references across active frames
    pub fn root_count(&self) -> usize {
        self.frames.root_count()
    }

    // Collection

    /// Run a full mark, trace and sweep cycle
    pub fn collect_garbage(&mut self) -> CollectionReport {
        self.collect_with(&[])
    }

    fn collect_with(&mut self, extra_roots: &[ObjectRef]) -> CollectionReport {
        let start = Instant::now();

        let mut pinned = self.held.clone();
        pinned.extend_from_slice(extra_roots);

        let report = collect::collect(
            &(&self.frames, &pinned),
            &mut self.heap,
            &mut self.clock,
            self.settings.dump_heap,
        );
        self.clock.switch(ThreadOccupation::Mutator);

        let elapsed = start.elapsed();
        self.metrics.collection();
        self.gc_stats.collections += 1;
        self.gc_stats.total_time += elapsed;
        self.gc_stats.last_time = Some(elapsed);
        self.gc_stats.total_freed += report.freed as u64;

        report
    }

    /// Make room under the heap limit by collecting, keeping the
    /// edges of the object about to be allocated alive
    fn emergency_collection(&mut self, pending: &Payload) -> Result<(), HeapError> {
        let edges = pending.edges().collect::<Vec<_>>();
        self.gc_stats.emergency_collections += 1;
        let report = self.collect_with(&edges);

        if self.heap.policy_requires_collection() {
            warn!(
                "emergency collection freed {} objects but heap is still at its limit",
                report.freed
            );
            Err(HeapError::OutOfMemory {
                context: self.heap.context(true),
            })
        } else {
            Ok(())
        }
    }

    // Teardown

    /// Release every frame, then every remaining object, once
    ///
    /// Safe to call repeatedly: later calls find nothing to release.
    pub fn teardown(&mut self) -> TeardownReport {
        let frames = self.frames.clear();
        self.held.clear();
        let objects = self.heap.clear();
        if frames > 0 || objects > 0 {
            debug!(
                "teardown released {} frames and {} objects",
                frames, objects
            );
        }
        TeardownReport { frames, objects }
    }

    /// Consume the VM, releasing everything it owns
    pub fn free(mut self) -> TeardownReport {
        self.teardown()
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Mutator for Vm {
    fn alloc(&mut self, payload: Payload) -> Result<ObjectRef, VmError> {
        if self.settings.emergency_collection && self.heap.policy_requires_collection() {
            self.emergency_collection(&payload)?;
        }
        let obj = self.heap.allocate(payload)?;
        self.metrics.alloc(1);
        Ok(obj)
    }

    fn resolve(&self, obj: ObjectRef) -> Option<&HeapObject> {
        self.heap.resolve(obj)
    }

    fn resolve_mut(&mut self, obj: ObjectRef) -> Option<&mut HeapObject> {
        self.heap.resolve_mut(obj)
    }

    fn hold(&mut self, obj: ObjectRef) {
        self.held.push(obj);
    }

    fn release_held(&mut self, count: usize) {
        let keep = self.held.len().saturating_sub(count);
        self.held.truncate(keep);
    }
}
