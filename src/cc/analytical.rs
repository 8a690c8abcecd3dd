//! Analytical ring cost model for collectives.
//!
//! A collective runs its ring schedule on each active dimension in turn,
//! innermost first. Every step costs the link latency plus the chunk's
//! serialisation time.

use crate::sim::SimTime;
use crate::sys::{CollectiveRequest, DimensionUsage};
use std::collections::HashMap;
use tracing::trace;

/// Turns a collective request into simulated time.
pub trait CommGenerator {
    /// Runs `req` starting at `now`; returns its duration in ns.
    fn issue(&mut self, req: &CollectiveRequest, now: SimTime) -> u64;

    fn usage(&self, npu: usize) -> Vec<DimensionUsage>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionLink {
    pub npus: usize,
    pub bandwidth_gbps: f64,
    pub latency_ns: u64,
}

impl DimensionLink {
    /// Time to push `bytes` through the link once (Gbps == bits per ns).
    pub fn serialization_ns(&self, bytes: u64) -> u64 {
        if bytes == 0 || self.bandwidth_gbps <= 0.0 {
            return 0;
        }
        ((bytes as f64 * 8.0) / self.bandwidth_gbps).ceil() as u64
    }
}

/// Union of busy intervals on one dimension.
#[derive(Debug, Clone, Copy, Default)]
struct BusyTracker {
    busy_until: u64,
    busy_ns: u64,
}

impl BusyTracker {
    fn occupy(&mut self, start: u64, end: u64) {
        let from = start.max(self.busy_until);
        if end > from {
            self.busy_ns += end - from;
        }
        self.busy_until = self.busy_until.max(end);
    }
}

#[derive(Debug)]
pub struct AnalyticalComm {
    links: Vec<DimensionLink>,
    busy: HashMap<usize, Vec<BusyTracker>>,
}

impl AnalyticalComm {
    pub fn new(links: Vec<DimensionLink>) -> Self {
        Self {
            links,
            busy: HashMap::new(),
        }
    }

    pub fn links(&self) -> &[DimensionLink] {
        &self.links
    }

    /// Duration of `req` on each active dimension, innermost first.
    pub fn phase_durations(&self, req: &CollectiveRequest) -> Vec<(usize, u64)> {
        let mut remaining = req.group_limit.unwrap_or(usize::MAX);
        req.active_dims()
            .filter_map(|dim| self.links.get(dim).map(|link| (dim, link)))
            .map(|(dim, link)| {
                let ranks = link.npus.min(remaining).max(1);
                remaining = (remaining / ranks).max(1);
                let steps = req.op.total_steps(ranks) as u64;
                let chunk = req.op.chunk_bytes(req.bytes, ranks);
                let per_step = link.latency_ns + link.serialization_ns(chunk);
                (dim, steps * per_step)
            })
            .collect()
    }
}

impl CommGenerator for AnalyticalComm {
    fn issue(&mut self, req: &CollectiveRequest, now: SimTime) -> u64 {
        let phases = self.phase_durations(req);
        let dims = self.links.len();
        let busy = self
            .busy
            .entry(req.npu)
            .or_insert_with(|| vec![BusyTracker::default(); dims]);

        let mut t = now.as_nanos();
        for (dim, duration) in phases {
            trace!(npu = req.npu, dim, duration, "collective phase");
            busy[dim].occupy(t, t + duration);
            t += duration;
        }
        t - now.as_nanos()
    }

    fn usage(&self, npu: usize) -> Vec<DimensionUsage> {
        self.links
            .iter()
            .enumerate()
            .map(|(dim, link)| DimensionUsage {
                dim,
                npus: link.npus,
                busy_ns: self
                    .busy
                    .get(&npu)
                    .map(|b| b[dim].busy_ns)
                    .unwrap_or(0),
            })
            .collect()
    }
}
