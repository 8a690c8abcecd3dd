//! 系统层世界实现
//!
//! `Sys` 持有每个设备的 workload 与通信生成器，实现 `World`：
//! 引擎把通知投递到这里，再由这里转交给对应设备的 workload。

use super::api::{
    CallData, CollectiveDone, CollectiveId, CollectiveRequest, DimensionUsage, EventKind, SysApi,
};
use crate::cc::CommGenerator;
use crate::sim::{SimTime, Simulator, World};
use crate::stats::RunSummary;
use crate::viz::{VizEventKind, VizLogger};
use crate::workload::{LoopState, Workload};
use tracing::{debug, info};

/// 每个设备的流（集合通信）记账。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamLedger {
    pub injected: u64,
    pub finished: u64,
    /// workload 已登记等待流排空
    pub awaiting_finish: bool,
    /// 已投递 `StreamsFinished`
    pub announced: bool,
    pub workload_finished: bool,
}

impl StreamLedger {
    pub fn in_flight(&self) -> u64 {
        self.injected.saturating_sub(self.finished)
    }
}

/// 系统层：设备 workload + 通信模型。
pub struct Sys<'a> {
    workloads: Vec<Workload<'a>>,
    comm: Box<dyn CommGenerator>,
    ledgers: Vec<StreamLedger>,
    viz: Option<VizLogger>,
}

impl<'a> Sys<'a> {
    /// `workloads[i]` 必须是设备 `i` 的 workload。
    pub fn new(workloads: Vec<Workload<'a>>, comm: Box<dyn CommGenerator>) -> Self {
        debug_assert!(workloads.iter().enumerate().all(|(i, w)| w.npu() == i));
        let ledgers = vec![StreamLedger::default(); workloads.len()];
        Self {
            workloads,
            comm,
            ledgers,
            viz: None,
        }
    }

    pub fn set_viz(&mut self, viz: VizLogger) {
        self.viz = Some(viz);
    }

    pub fn take_viz(&mut self) -> Option<VizLogger> {
        self.viz.take()
    }

    /// 在 t=0 给每个设备投递一次 `General` 通知。
    pub fn start(&self, sim: &mut Simulator) {
        for npu in 0..self.workloads.len() {
            sim.notify_in(0, npu, EventKind::General, CallData::None);
        }
    }

    pub fn npus(&self) -> usize {
        self.workloads.len()
    }

    pub fn workload(&self, npu: usize) -> &Workload<'a> {
        &self.workloads[npu]
    }

    pub fn ledger(&self, npu: usize) -> StreamLedger {
        self.ledgers[npu]
    }

    pub fn all_finished(&self) -> bool {
        self.ledgers.iter().all(|l| l.workload_finished)
    }

    pub fn summaries(&self) -> Vec<RunSummary> {
        self.workloads
            .iter()
            .filter_map(|w| w.summary().cloned())
            .collect()
    }
}

impl World for Sys<'_> {
    fn notify(&mut self, npu: usize, kind: EventKind, data: CallData, sim: &mut Simulator) {
        let Some(workload) = self.workloads.get_mut(npu) else {
            panic!("notification {kind:?} for unknown npu {npu}");
        };
        let ledger = &mut self.ledgers[npu];
        if kind == EventKind::CollectiveComplete {
            ledger.finished += 1;
        }

        let mut ctx = SysCtx {
            npu,
            sim: &mut *sim,
            comm: self.comm.as_mut(),
            ledger,
            viz: self.viz.as_mut(),
        };
        if let Err(err) = workload.call(kind, data, &mut ctx) {
            panic!("npu {npu}: {err}");
        }

        let ledger = &mut self.ledgers[npu];
        if ledger.awaiting_finish && !ledger.announced && ledger.in_flight() == 0 {
            ledger.announced = true;
            debug!(npu, "streams drained");
            sim.notify_in(0, npu, EventKind::StreamsFinished, CallData::None);
        }
    }
}

/// 单次回调期间交给 workload 的系统视图。
struct SysCtx<'s> {
    npu: usize,
    sim: &'s mut Simulator,
    comm: &'s mut dyn CommGenerator,
    ledger: &'s mut StreamLedger,
    viz: Option<&'s mut VizLogger>,
}

impl SysCtx<'_> {
    fn record(&mut self, kind: VizEventKind) {
        let t_ns = self.sim.now().as_nanos();
        if let Some(viz) = self.viz.as_deref_mut() {
            viz.record(t_ns, self.npu, kind);
        }
    }
}

impl SysApi for SysCtx<'_> {
    fn npu(&self) -> usize {
        self.npu
    }

    fn now(&self) -> SimTime {
        self.sim.now()
    }

    fn schedule_wake(&mut self, delay_ns: u64) {
        self.sim
            .notify_in(delay_ns, self.npu, EventKind::WorkloadWait, CallData::None);
    }

    fn issue_collective(&mut self, req: CollectiveRequest) {
        let now = self.sim.now();
        let duration = self.comm.issue(&req, now);
        self.ledger.injected += 1;
        self.sim.notify_in(
            duration,
            self.npu,
            EventKind::CollectiveComplete,
            CallData::Collective(CollectiveDone {
                id: req.id,
                issued_at: now,
            }),
        );
    }

    fn register_for_finished_streams(&mut self) {
        self.ledger.awaiting_finish = true;
    }

    fn workload_finished(&mut self) {
        self.ledger.workload_finished = true;
        info!(npu = self.npu, now = ?self.sim.now(), "workload reported finished");
        self.record(VizEventKind::SimFinished);
    }

    fn dimension_usage(&self) -> Vec<DimensionUsage> {
        self.comm.usage(self.npu)
    }

    fn viz_compute(&mut self, layer: usize, state: LoopState, micro_batch: usize, duration_ns: u64) {
        self.record(VizEventKind::Compute {
            layer,
            state,
            micro_batch,
            duration_ns,
        });
    }

    fn viz_collective_issued(&mut self, req: &CollectiveRequest, blocking: bool) {
        self.record(VizEventKind::CollectiveIssued {
            id: req.id.0,
            layer: req.layer,
            phase: req.phase,
            op: req.op.to_string(),
            bytes: req.bytes,
            dims: req.active_dims().collect(),
            blocking,
        });
    }

    fn viz_collective_done(&mut self, id: CollectiveId, duration_ns: u64) {
        self.record(VizEventKind::CollectiveDone {
            id: id.0,
            duration_ns,
        });
    }

    fn viz_pass_finished(&mut self, pass: u32) {
        self.record(VizEventKind::PassFinished { pass });
    }
}
