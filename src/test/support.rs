//! Shared fixtures for workload tests.

use crate::cc::{CommGenerator, CommType};
use crate::sim::{SimTime, Simulator};
use crate::stats::RunSummary;
use crate::sys::{
    CallData, CollectiveDone, CollectiveId, CollectiveRequest, DimensionUsage, Sys, SysApi,
};
use crate::workload::{
    DimensionDecoder, Layer, LoopState, ParallelismParams, ParallelismPolicy, PhaseCost, Workload,
    WorkloadDescription, WorkloadOptions,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// A layer whose three phases share one compute time and one collective.
pub fn layer(name: &str, compute_ns: u64, comm: &str, bytes: u64) -> Layer {
    let cost = match CommType::parse(comm).expect("comm type") {
        Some(c) => PhaseCost::with_comm(compute_ns, c, bytes),
        None => PhaseCost::local(compute_ns),
    };
    Layer::new(name, cost.clone(), cost.clone(), cost)
}

pub fn layers(n: usize, compute_ns: u64, comm: &str, bytes: u64) -> Vec<Layer> {
    (0..n)
        .map(|i| layer(&format!("layer{i}"), compute_ns, comm, bytes))
        .collect()
}

pub fn description(
    policy: ParallelismPolicy,
    params: ParallelismParams,
    layers: Vec<Layer>,
) -> WorkloadDescription {
    WorkloadDescription {
        policy,
        params,
        layers,
    }
}

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// System stand-in driven by hand.
#[derive(Debug, Default)]
pub struct MockSys {
    pub now: SimTime,
    pub npu: usize,
    pub wakes: Vec<u64>,
    pub issued: Vec<CollectiveRequest>,
    pub registered: u32,
    pub finished: u32,
    pub passes_seen: Vec<u32>,
}

impl MockSys {
    pub fn advance(&mut self, ns: u64) {
        self.now = self.now.after(ns);
    }

    pub fn done(&self, id: CollectiveId) -> CallData {
        let req = self
            .issued
            .iter()
            .find(|r| r.id == id)
            .expect("issued collective");
        CallData::Collective(CollectiveDone {
            id: req.id,
            issued_at: self.now,
        })
    }
}

impl SysApi for MockSys {
    fn npu(&self) -> usize {
        self.npu
    }

    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_wake(&mut self, delay_ns: u64) {
        self.wakes.push(delay_ns);
    }

    fn issue_collective(&mut self, req: CollectiveRequest) {
        self.issued.push(req);
    }

    fn register_for_finished_streams(&mut self) {
        self.registered += 1;
    }

    fn workload_finished(&mut self) {
        self.finished += 1;
    }

    fn dimension_usage(&self) -> Vec<DimensionUsage> {
        Vec::new()
    }

    fn viz_compute(&mut self, _: usize, _: LoopState, _: usize, _: u64) {}

    fn viz_collective_issued(&mut self, _: &CollectiveRequest, _: bool) {}

    fn viz_collective_done(&mut self, _: CollectiveId, _: u64) {}

    fn viz_pass_finished(&mut self, pass: u32) {
        self.passes_seen.push(pass);
    }
}

/// Fixed-latency collectives, logged in issue order.
pub struct RecordingComm {
    pub latency_ns: u64,
    pub log: Arc<Mutex<Vec<CollectiveRequest>>>,
}

impl CommGenerator for RecordingComm {
    fn issue(&mut self, req: &CollectiveRequest, _now: SimTime) -> u64 {
        self.log.lock().expect("log lock").push(req.clone());
        self.latency_ns
    }

    fn usage(&self, _npu: usize) -> Vec<DimensionUsage> {
        Vec::new()
    }
}

/// Outcome of a full simulated run.
#[derive(Debug)]
pub struct RunOutcome {
    pub requests: Vec<CollectiveRequest>,
    pub summaries: Vec<RunSummary>,
    pub states: Vec<LoopState>,
    pub passes: Vec<u32>,
    pub all_finished: bool,
    pub end: SimTime,
}

impl RunOutcome {
    pub fn requests_for(&self, npu: usize) -> Vec<&CollectiveRequest> {
        self.requests.iter().filter(|r| r.npu == npu).collect()
    }
}

/// Runs `npus` devices of `desc` on a network of `dims` until the queue drains.
pub fn simulate(
    desc: &WorkloadDescription,
    dims: Vec<usize>,
    npus: usize,
    opts: WorkloadOptions,
    comm_latency_ns: u64,
) -> RunOutcome {
    let decoder = DimensionDecoder::new(dims).expect("decoder");
    let workloads = (0..npus)
        .map(|npu| {
            let opts = WorkloadOptions {
                npu,
                ..opts.clone()
            };
            Workload::new(opts, desc, &decoder).expect("workload")
        })
        .collect();
    let log = Arc::new(Mutex::new(Vec::new()));
    let comm = RecordingComm {
        latency_ns: comm_latency_ns,
        log: Arc::clone(&log),
    };
    let mut sys = Sys::new(workloads, Box::new(comm));
    let mut sim = Simulator::default();
    sys.start(&mut sim);
    sim.run(&mut sys);

    let requests = log.lock().expect("log lock").clone();
    RunOutcome {
        requests,
        summaries: sys.summaries(),
        states: (0..npus).map(|n| sys.workload(n).state()).collect(),
        passes: (0..npus).map(|n| sys.workload(n).pass_counter()).collect(),
        all_finished: sys.all_finished(),
        end: sim.now(),
    }
}
