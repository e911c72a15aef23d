//! Capture and report statistics for optimisation

use std::{fmt::Display, time::Duration};

use indexmap::IndexMap;

use crate::eval::machine::vm::Vm;

#[derive(Default, Debug)]
pub struct Timings {
    timings: IndexMap<String, Duration>,
}

impl Timings {
    pub fn record<T: AsRef<str>>(&mut self, name: T, elapsed: Duration) {
        self.timings.insert(name.as_ref().to_string(), elapsed);
    }

    pub fn get<T: AsRef<str>>(&self, name: T) -> Option<Duration> {
        self.timings.get(name.as_ref()).copied()
    }
}

impl Display for Timings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self.timings.keys().map(|k| k.len()).max().unwrap_or(0) + 1;

        for (k, v) in &self.timings {
            writeln!(f, "{:width$}: {:14.9}s", k, v.as_secs_f64(), width = width)?;
        }
        Ok(())
    }
}

/// The statistics captured during a run
#[derive(Default, Debug)]
pub struct Statistics {
    allocs: u64,
    collections: u64,
    emergency_collections: u64,
    objects_freed: u64,
    max_frames: usize,
    live_at_exit: usize,
    timings: Timings,
}

impl Statistics {
    /// Snapshot the metrics, heap and clock of a VM
    pub fn from_vm(vm: &Vm) -> Self {
        let mut timings = Timings::default();
        for (occupation, elapsed) in vm.clock().report() {
            timings.record(occupation.to_string(), elapsed);
        }
        timings.record("GC total", vm.gc_stats().total_time);

        Statistics {
            allocs: vm.metrics().allocs(),
            collections: vm.metrics().collections(),
            emergency_collections: vm.gc_stats().emergency_collections,
            objects_freed: vm.gc_stats().total_freed,
            max_frames: vm.metrics().max_frames(),
            live_at_exit: vm.heap_stats().live,
            timings,
        }
    }

    pub fn allocs(&self) -> u64 {
        self.allocs
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    pub fn objects_freed(&self) -> u64 {
        self.objects_freed
    }

    pub fn live_at_exit(&self) -> usize {
        self.live_at_exit
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn timings_mut(&mut self) -> &mut Timings {
        &mut self.timings
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Allocations     : {:10}", self.allocs)?;
        writeln!(f, "Collections     : {:10}", self.collections)?;
        writeln!(f, "  (emergency)   : {:10}", self.emergency_collections)?;
        writeln!(f, "Objects Freed   : {:10}", self.objects_freed)?;
        writeln!(f, "Live At Exit    : {:10}", self.live_at_exit)?;
        writeln!(f, "Max Frame Depth : {:10}", self.max_frames)?;
        writeln!(f)?;
        writeln!(f, "{}", self.timings)
    }
}

#[cfg(test)]
pub mod tests {
    use crate::eval::memory::mutator::Mutator;

    use super::*;

    #[test]
    pub fn test_from_vm() {
        let mut vm = Vm::new();
        vm.new_frame();
        vm.new_integer(1).unwrap();
        vm.collect_garbage();
        let stats = Statistics::from_vm(&vm);
        assert_eq!(stats.allocs(), 1);
        assert_eq!(stats.collections(), 1);
        assert_eq!(stats.objects_freed(), 1);
        assert!(stats.timings().get("CollectorSweep").is_some());
        assert!(stats.to_string().contains("Allocations"));
    }

    #[test]
    pub fn test_empty_timings_display() {
        assert_eq!(Timings::default().to_string(), "");
    }
}
