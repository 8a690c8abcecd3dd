//! Outstanding collectives of one workload.

use super::dims::Phase;
use super::error::{Result, WorkloadError};
use crate::sim::SimTime;
use crate::sys::CollectiveId;
use std::collections::BTreeMap;

/// A collective that has been issued and not yet completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub layer: usize,
    pub phase: Phase,
    pub blocking: bool,
    pub issued_at: SimTime,
}

#[derive(Debug)]
pub struct CompletionTracker {
    npu: usize,
    next_id: u64,
    in_flight: BTreeMap<CollectiveId, InFlight>,
    blocking: usize,
    issued: u64,
    completed: u64,
}

impl CompletionTracker {
    pub fn new(npu: usize) -> Self {
        Self {
            npu,
            next_id: 0,
            in_flight: BTreeMap::new(),
            blocking: 0,
            issued: 0,
            completed: 0,
        }
    }

    pub fn issue(&mut self, layer: usize, phase: Phase, blocking: bool, now: SimTime) -> CollectiveId {
        let id = CollectiveId(self.next_id);
        self.next_id += 1;
        self.issued += 1;
        if blocking {
            self.blocking += 1;
        }
        self.in_flight.insert(
            id,
            InFlight {
                layer,
                phase,
                blocking,
                issued_at: now,
            },
        );
        id
    }

    pub fn complete(&mut self, id: CollectiveId) -> Result<InFlight> {
        let done = self.in_flight.remove(&id).ok_or_else(|| WorkloadError::Desync {
            npu: self.npu,
            msg: format!(
                "completion for collective {} with {} outstanding",
                id.0,
                self.in_flight.len()
            ),
        })?;
        if done.blocking {
            self.blocking -= 1;
        }
        self.completed += 1;
        Ok(done)
    }

    /// Collectives in flight, blocking or not.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    pub fn blocking(&self) -> usize {
        self.blocking
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_issue_and_complete() {
        let mut t = CompletionTracker::new(0);
        let a = t.issue(0, Phase::Forward, false, SimTime::ZERO);
        let b = t.issue(1, Phase::WeightGradient, true, SimTime::from_nanos(5));
        assert_ne!(a, b);
        assert_eq!((t.pending(), t.blocking()), (2, 1));

        let done = t.complete(b).unwrap();
        assert_eq!(done.layer, 1);
        assert_eq!(done.issued_at, SimTime::from_nanos(5));
        assert_eq!((t.pending(), t.blocking()), (1, 0));

        t.complete(a).unwrap();
        assert_eq!(t.pending(), 0);
        assert_eq!((t.issued(), t.completed()), (2, 2));
    }

    #[test]
    fn unknown_completion_is_desync() {
        let mut t = CompletionTracker::new(3);
        let id = t.issue(0, Phase::Forward, true, SimTime::ZERO);
        t.complete(id).unwrap();
        let err = t.complete(id).unwrap_err();
        assert!(matches!(err, WorkloadError::Desync { npu: 3, .. }));
        assert_eq!(t.pending(), 0);
    }
}
