//! Machine metrics

use std::{
    cmp::max,
    fmt,
    time::{Duration, Instant},
};

use indexmap::IndexMap;

/// Record some metrics as we execute code
#[derive(Default, Debug, Clone)]
pub struct Metrics {
    allocs: u64,
    collections: u64,
    max_frames: usize,
}

impl Metrics {
    pub fn alloc(&mut self, count: usize) {
        self.allocs += count as u64;
    }

    pub fn allocs(&self) -> u64 {
        self.allocs
    }

    pub fn collection(&mut self) {
        self.collections += 1;
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    pub fn frames(&mut self, depth: usize) {
        self.max_frames = max(self.max_frames, depth);
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }
}

/// What the thread is busy with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadOccupation {
    Initialisation,
    Mutator,
    CollectorMark,
    CollectorTrace,
    CollectorSweep,
}

impl fmt::Display for ThreadOccupation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadOccupation::Initialisation => "Initialisation",
            ThreadOccupation::Mutator => "Mutator",
            ThreadOccupation::CollectorMark => "CollectorMark",
            ThreadOccupation::CollectorTrace => "CollectorTrace",
            ThreadOccupation::CollectorSweep => "CollectorSweep",
        };
        f.write_str(name)
    }
}

/// Accumulates wall time against the current occupation
#[derive(Debug, Default)]
pub struct Clock {
    current: Option<(ThreadOccupation, Instant)>,
    totals: IndexMap<ThreadOccupation, Duration>,
}

impl Clock {
    /// Charge elapsed time to the current occupation and start
    /// timing `occupation`
    pub fn switch(&mut self, occupation: ThreadOccupation) {
        let now = Instant::now();
        self.charge(now);
        self.current = Some((occupation, now));
    }

    /// Charge elapsed time and stop timing
    pub fn stop(&mut self) {
        self.charge(Instant::now());
        self.current = None;
    }

    pub fn occupation(&self) -> Option<ThreadOccupation> {
        self.current.map(|(o, _)| o)
    }

    /// Time charged to `occupation` so far
    pub fn total(&self, occupation: ThreadOccupation) -> Duration {
        self.totals.get(&occupation).copied().unwrap_or_default()
    }

    /// Time charged per occupation, in order of first use
    pub fn report(&self) -> impl Iterator<Item = (ThreadOccupation, Duration)> + '_ {
        self.totals.iter().map(|(k, v)| (*k, *v))
    }

    fn charge(&mut self, now: Instant) {
        if let Some((occupation, since)) = self.current {
            *self.totals.entry(occupation).or_default() += now.duration_since(since);
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_clock_charges_previous_occupation() {
        let mut clock = Clock::default();
        assert_eq!(clock.occupation(), None);
        clock.switch(ThreadOccupation::Mutator);
        clock.switch(ThreadOccupation::CollectorMark);
        clock.stop();
        let occupations = clock.report().map(|(o, _)| o).collect::<Vec<_>>();
        assert_eq!(
            occupations,
            vec![ThreadOccupation::Mutator, ThreadOccupation::CollectorMark]
        );
        assert_eq!(clock.occupation(), None);
    }

    #[test]
    pub fn test_metrics() {
        let mut metrics = Metrics::default();
        metrics.alloc(3);
        metrics.frames(4);
        metrics.frames(2);
        metrics.collection();
        assert_eq!(metrics.allocs(), 3);
        assert_eq!(metrics.max_frames(), 4);
        assert_eq!(metrics.collections(), 1);
    }
}
