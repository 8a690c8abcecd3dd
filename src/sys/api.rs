//! System-facing API used by workloads.

use crate::cc::collective::{CollectiveOp, GroupScope};
use crate::sim::SimTime;
use crate::workload::{LoopState, Phase};
use serde::Serialize;

/// Why a workload is being called back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Start or plain re-entry.
    General,
    /// A compute delay the workload asked for has elapsed.
    WorkloadWait,
    CollectiveComplete,
    /// The device has no collective in flight after registering for it.
    StreamsFinished,
}

/// Typed payload delivered with an `EventKind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallData {
    None,
    Collective(CollectiveDone),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CollectiveId(pub u64);

/// A collective the workload wants run along some network dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectiveRequest {
    pub id: CollectiveId,
    pub npu: usize,
    pub pass: u32,
    pub layer: usize,
    pub phase: Phase,
    pub micro_batch: usize,
    pub op: CollectiveOp,
    pub scope: GroupScope,
    pub bytes: u64,
    /// One flag per network dimension, innermost first.
    pub dims: Vec<bool>,
    /// Cap on participating ranks for scoped (expert-parallel) groups.
    pub group_limit: Option<usize>,
}

impl CollectiveRequest {
    pub fn active_dims(&self) -> impl Iterator<Item = usize> + '_ {
        self.dims
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(idx, _)| idx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectiveDone {
    pub id: CollectiveId,
    pub issued_at: SimTime,
}

/// Busy time of one network dimension as seen by one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DimensionUsage {
    pub dim: usize,
    pub npus: usize,
    pub busy_ns: u64,
}

/// Minimal system API for workloads.
pub trait SysApi {
    fn npu(&self) -> usize;
    fn now(&self) -> SimTime;

    /// Call the workload back with `WorkloadWait` after `delay_ns`.
    fn schedule_wake(&mut self, delay_ns: u64);
    fn issue_collective(&mut self, req: CollectiveRequest);
    fn register_for_finished_streams(&mut self);
    fn workload_finished(&mut self);
    fn dimension_usage(&self) -> Vec<DimensionUsage>;

    fn viz_compute(&mut self, layer: usize, state: LoopState, micro_batch: usize, duration_ns: u64);
    fn viz_collective_issued(&mut self, req: &CollectiveRequest, blocking: bool);
    fn viz_collective_done(&mut self, id: CollectiveId, duration_ns: u64);
    fn viz_pass_finished(&mut self, pass: u32);
}
