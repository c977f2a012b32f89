//! Bounded holding area for runs that arrive ahead of their dependencies.

use std::collections::VecDeque;

use converge_types::EventRun;

/// Default number of runs held before the oldest is evicted.
pub const DEFAULT_GAP_CAPACITY: usize = 1024;

/// FIFO of runs whose causal dependencies are not yet applied.
///
/// Eviction drops the oldest run; the sender still has it and a later pull
/// or push delivers it again.
#[derive(Debug, Clone)]
pub struct GapBuffer {
    runs: VecDeque<EventRun>,
    capacity: usize,
}

impl GapBuffer {
    /// Create a buffer holding at most `capacity` runs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            runs: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of held runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Whether an identical run is already held.
    pub fn contains(&self, run: &EventRun) -> bool {
        self.runs.contains(run)
    }

    /// Hold `run`, returning the run evicted to make room, if any.
    ///
    /// An identical run that is already held is not stored twice.
    pub fn hold(&mut self, run: EventRun) -> Option<EventRun> {
        if self.runs.contains(&run) {
            return None;
        }
        let evicted = if self.runs.len() >= self.capacity {
            self.runs.pop_front()
        } else {
            None
        };
        self.runs.push_back(run);
        evicted
    }

    /// Take every held run, oldest first.
    pub fn drain(&mut self) -> Vec<EventRun> {
        self.runs.drain(..).collect()
    }
}

impl Default for GapBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use converge_types::RowOp;

    fn run(counter_start: u32) -> EventRun {
        EventRun {
            peer: "a".to_owned(),
            counter_start,
            lamport_start: counter_start,
            deps: vec![],
            ops: vec![RowOp::Delete {
                tbl: "t".to_owned(),
                row_id: "r".to_owned(),
            }],
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut gap = GapBuffer::new(2);
        assert!(gap.hold(run(3)).is_none());
        assert!(gap.hold(run(5)).is_none());
        let evicted = gap.hold(run(7)).unwrap();
        assert_eq!(evicted.counter_start, 3);
        assert_eq!(gap.len(), 2);
    }

    #[test]
    fn identical_runs_are_held_once() {
        let mut gap = GapBuffer::new(4);
        gap.hold(run(3));
        gap.hold(run(3));
        assert_eq!(gap.len(), 1);
        assert!(gap.contains(&run(3)));
        assert!(!gap.contains(&run(5)));
        assert_eq!(gap.drain().len(), 1);
        assert!(gap.is_empty());
    }
}
