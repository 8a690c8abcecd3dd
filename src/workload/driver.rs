//! The per-device workload state machine.
//!
//! A `Workload` walks the work units its strategy planned for a pass. For each
//! unit it runs the local compute delay, then issues the layer's collective
//! along the dimensions the participation table allows. Blocking collectives
//! and joins suspend the walk; completions re-enter it through `fire`. After
//! the last pass the workload parks in `WaitForSimFinish` until the system
//! reports its streams drained.

use super::dims::{DimensionDecoder, ParticipationTable};
use super::error::{Result, WorkloadError};
use super::file::WorkloadDescription;
use super::layer::Layer;
use super::params::ParallelismParams;
use super::pipeline::PipelineOrder;
use super::policy::ParallelismPolicy;
use super::state::{CommMode, LoopState, WorkUnit};
use super::strategy::{IterationStrategy, strategy_for};
use super::tracker::CompletionTracker;
use crate::cc::CommType;
use crate::sim::SimTime;
use crate::stats::{DetailedRow, LayerTimes, RunSummary, StatsReporter};
use crate::sys::{CallData, CollectiveDone, CollectiveRequest, EventKind, SysApi};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct WorkloadOptions {
    pub run_name: String,
    /// Name of the workload description, usually its file stem.
    pub workload_name: String,
    pub npu: usize,
    pub total_pass: u32,
    pub total_rows: usize,
    pub stat_row: usize,
    /// Directory for the stats tables; the working directory when unset.
    pub stats_path: Option<PathBuf>,
    /// Write stats tables (device 0 only).
    pub separate_log: bool,
    pub pipeline_order: PipelineOrder,
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        Self {
            run_name: "wlsim".to_string(),
            workload_name: "workload".to_string(),
            npu: 0,
            total_pass: 1,
            total_rows: 1,
            stat_row: 0,
            stats_path: None,
            separate_log: false,
            pipeline_order: PipelineOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitStage {
    Pending,
    Computing { until: SimTime },
    Computed,
    /// Waiting on this unit's blocking collective.
    Communicating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Advanced,
    Suspended,
}

pub struct Workload<'a> {
    opts: WorkloadOptions,
    policy: ParallelismPolicy,
    params: ParallelismParams,
    layers: &'a [Layer],
    table: ParticipationTable,
    strategy: Box<dyn IterationStrategy>,
    plan: Vec<WorkUnit>,
    total_npus: usize,

    state: LoopState,
    pass_counter: u32,
    pos: usize,
    stage: UnitStage,
    unit_start: SimTime,
    unit_compute_ns: u64,
    unit_exposed_ns: u64,
    waiting_since: Option<SimTime>,
    tracker: CompletionTracker,
    checkpoint_initiated: bool,
    registered_for_finished_streams: bool,
    finished: bool,

    times: LayerTimes,
    stats: StatsReporter,
    summary: Option<RunSummary>,
}

impl<'a> Workload<'a> {
    pub fn new(
        opts: WorkloadOptions,
        desc: &'a WorkloadDescription,
        decoder: &DimensionDecoder,
    ) -> Result<Self> {
        let policy = desc.policy;
        if !policy.is_defined() {
            return Err(WorkloadError::UndefinedPolicy(policy.token().into()));
        }
        if opts.total_pass == 0 {
            return Err(WorkloadError::InvalidConfig("total passes must be positive".into()));
        }
        let layers = desc.layers.as_slice();
        if layers.is_empty() {
            return Err(WorkloadError::InvalidConfig("workload has no layers".into()));
        }
        desc.params.validate(policy, layers.len())?;

        let table = decoder.build_table(policy, &desc.params, layers)?;
        let strategy = strategy_for(policy, &desc.params, opts.pipeline_order)?;
        let plan = strategy.plan_pass(layers.len(), &table);
        let Some(first) = plan.first() else {
            return Err(WorkloadError::InvalidConfig(format!(
                "{} strategy planned an empty pass",
                strategy.name()
            )));
        };
        let state = first.state;

        let stats = if opts.separate_log && opts.npu == 0 {
            let dir = opts.stats_path.clone().unwrap_or_else(|| PathBuf::from("."));
            StatsReporter::new(&dir, &opts.run_name, opts.total_rows, opts.stat_row)
        } else {
            StatsReporter::disabled()
        };

        debug!(
            npu = opts.npu,
            workload = %opts.workload_name,
            %policy,
            strategy = strategy.name(),
            units = plan.len(),
            "workload initialised"
        );

        Ok(Self {
            tracker: CompletionTracker::new(opts.npu),
            times: LayerTimes::new(layers.len()),
            total_npus: decoder.total_npus(),
            opts,
            policy,
            params: desc.params.clone(),
            layers,
            table,
            strategy,
            plan,
            state,
            pass_counter: 0,
            pos: 0,
            stage: UnitStage::Pending,
            unit_start: SimTime::ZERO,
            unit_compute_ns: 0,
            unit_exposed_ns: 0,
            waiting_since: None,
            checkpoint_initiated: false,
            registered_for_finished_streams: false,
            finished: false,
            stats,
            summary: None,
        })
    }

    pub fn npu(&self) -> usize {
        self.opts.npu
    }

    pub fn policy(&self) -> ParallelismPolicy {
        self.policy
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn pass_counter(&self) -> u32 {
        self.pass_counter
    }

    pub fn pending_collectives(&self) -> usize {
        self.tracker.pending()
    }

    pub fn issued_collectives(&self) -> u64 {
        self.tracker.issued()
    }

    pub fn checkpoint_initiated(&self) -> bool {
        self.checkpoint_initiated
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn plan(&self) -> &[WorkUnit] {
        &self.plan
    }

    pub fn table(&self) -> &ParticipationTable {
        &self.table
    }

    pub fn times(&self) -> &LayerTimes {
        &self.times
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Single entry point for system callbacks.
    pub fn call(&mut self, kind: EventKind, data: CallData, sys: &mut dyn SysApi) -> Result<()> {
        match (kind, data) {
            (EventKind::General | EventKind::WorkloadWait, _) => {
                self.fire(sys);
                Ok(())
            }
            (EventKind::CollectiveComplete, CallData::Collective(done)) => {
                self.on_collective_complete(done, sys)
            }
            (EventKind::CollectiveComplete, CallData::None) => Err(WorkloadError::Desync {
                npu: self.opts.npu,
                msg: "collective completion without payload".into(),
            }),
            (EventKind::StreamsFinished, _) => self.on_streams_finished(sys),
        }
    }

    /// Runs the walk until it has to wait. A no-op while blocked or terminal.
    #[tracing::instrument(level = "trace", skip(self, sys), fields(npu = self.opts.npu, pass = self.pass_counter))]
    pub fn fire(&mut self, sys: &mut dyn SysApi) {
        while self.step(sys) == Step::Advanced {}
    }

    pub fn on_collective_complete(
        &mut self,
        done: CollectiveDone,
        sys: &mut dyn SysApi,
    ) -> Result<()> {
        let finished = self.tracker.complete(done.id)?;
        let elapsed = sys.now().since(finished.issued_at);
        self.times.add_comm(finished.layer, finished.phase, elapsed);
        sys.viz_collective_done(done.id, elapsed);
        debug!(
            npu = self.opts.npu,
            id = done.id.0,
            layer = finished.layer,
            phase = %finished.phase,
            elapsed,
            pending = self.tracker.pending(),
            "collective complete"
        );
        if self.tracker.blocking() == 0 {
            self.fire(sys);
        }
        Ok(())
    }

    fn on_streams_finished(&mut self, sys: &mut dyn SysApi) -> Result<()> {
        if self.state != LoopState::WaitForSimFinish {
            return Err(WorkloadError::Desync {
                npu: self.opts.npu,
                msg: format!("streams finished while still in {:?}", self.state),
            });
        }
        if self.finished {
            return Ok(());
        }
        self.report(sys);
        self.finished = true;
        sys.workload_finished();
        Ok(())
    }

    fn step(&mut self, sys: &mut dyn SysApi) -> Step {
        if self.state == LoopState::WaitForSimFinish {
            return Step::Suspended;
        }
        let now = sys.now();
        let Some(&unit) = self.plan.get(self.pos) else {
            return self.end_of_pass(now, sys);
        };

        match self.stage {
            UnitStage::Pending => {
                if unit.join && self.tracker.pending() > 0 {
                    self.waiting_since.get_or_insert(now);
                    return Step::Suspended;
                }
                let joined = self.settle_wait(now);
                self.begin_unit(unit, now, joined, sys)
            }
            UnitStage::Computing { until } => {
                if now < until {
                    return Step::Suspended;
                }
                self.stage = UnitStage::Computed;
                Step::Advanced
            }
            UnitStage::Computed => {
                if let Some((comm, bytes, dims)) = self.collective_for(&unit) {
                    let blocking = unit.comm == CommMode::Blocking;
                    self.issue(&unit, comm, bytes, dims, blocking, now, sys);
                    if blocking {
                        self.stage = UnitStage::Communicating;
                        self.waiting_since = Some(now);
                        return Step::Suspended;
                    }
                }
                self.finish_unit(unit, now);
                Step::Advanced
            }
            UnitStage::Communicating => {
                if self.tracker.blocking() > 0 {
                    return Step::Suspended;
                }
                self.unit_exposed_ns += self.settle_wait(now);
                self.finish_unit(unit, now);
                Step::Advanced
            }
        }
    }

    fn begin_unit(&mut self, unit: WorkUnit, now: SimTime, joined: u64, sys: &mut dyn SysApi) -> Step {
        self.state = unit.state;
        if unit.state == LoopState::ForwardInBackPass && !self.checkpoint_initiated {
            self.checkpoint_initiated = true;
            debug!(npu = self.opts.npu, layer = unit.layer, "activation recompute started");
        }
        self.unit_start = now;
        self.unit_exposed_ns = joined;

        let phase = unit.phase();
        let layer = &self.layers[unit.layer];
        let mut compute = 0;
        if unit.local_compute {
            compute = layer.cost(phase).compute_ns;
            if unit.apply_update {
                compute += layer.wg_update_ns;
            }
        }
        self.unit_compute_ns = compute;
        if compute == 0 {
            self.stage = UnitStage::Computed;
            return Step::Advanced;
        }

        self.times.add_compute(unit.layer, phase, compute);
        sys.viz_compute(unit.layer, unit.state, unit.micro_batch, compute);
        self.stage = UnitStage::Computing {
            until: now.after(compute),
        };
        sys.schedule_wake(compute);
        Step::Suspended
    }

    /// The collective `unit` should issue: its layer asks for one and at
    /// least one dimension participates.
    fn collective_for(&self, unit: &WorkUnit) -> Option<(CommType, u64, Vec<bool>)> {
        if unit.comm == CommMode::Skip {
            return None;
        }
        let phase = unit.phase();
        let (comm, bytes) = self.layers[unit.layer].cost(phase).collective()?;
        let dims = self.table.for_layer(unit.layer).get(phase);
        if !dims.iter().any(|d| *d) {
            return None;
        }
        Some((comm, bytes, dims.to_vec()))
    }

    #[allow(clippy::too_many_arguments)]
    fn issue(
        &mut self,
        unit: &WorkUnit,
        comm: CommType,
        bytes: u64,
        dims: Vec<bool>,
        blocking: bool,
        now: SimTime,
        sys: &mut dyn SysApi,
    ) {
        let phase = unit.phase();
        let id = self.tracker.issue(unit.layer, phase, blocking, now);
        let req = CollectiveRequest {
            id,
            npu: self.opts.npu,
            pass: self.pass_counter,
            layer: unit.layer,
            phase,
            micro_batch: unit.micro_batch,
            op: comm.op,
            scope: comm.scope,
            bytes,
            dims,
            group_limit: self.params.group_limit(comm.scope, self.total_npus),
        };
        debug!(
            npu = self.opts.npu,
            id = id.0,
            layer = unit.layer,
            %phase,
            op = %comm.op,
            bytes,
            blocking,
            "issue collective"
        );
        sys.viz_collective_issued(&req, blocking);
        sys.issue_collective(req);
    }

    fn finish_unit(&mut self, unit: WorkUnit, now: SimTime) {
        let phase = unit.phase();
        self.times.add_exposed(unit.layer, phase, self.unit_exposed_ns);
        if unit.ends_recompute {
            debug_assert!(self.checkpoint_initiated, "recompute closed without starting");
            self.checkpoint_initiated = false;
        }
        self.stats.detailed(&DetailedRow {
            pass: self.pass_counter,
            layer: unit.layer,
            layer_name: &self.layers[unit.layer].name,
            state: unit.state,
            micro_batch: unit.micro_batch,
            start_ns: self.unit_start.as_nanos(),
            end_ns: now.as_nanos(),
            compute_ns: self.unit_compute_ns,
            exposed_comm_ns: self.unit_exposed_ns,
        });
        debug!(
            npu = self.opts.npu,
            layer = unit.layer,
            state = ?unit.state,
            micro_batch = unit.micro_batch,
            "unit done"
        );
        self.pos += 1;
        self.stage = UnitStage::Pending;
    }

    fn end_of_pass(&mut self, now: SimTime, sys: &mut dyn SysApi) -> Step {
        if self.tracker.pending() > 0 {
            self.waiting_since.get_or_insert(now);
            return Step::Suspended;
        }
        let drained = self.settle_wait(now);
        if let Some(last) = self.plan.last() {
            self.times.add_exposed(last.layer, last.phase(), drained);
        }

        self.pass_counter += 1;
        info!(
            npu = self.opts.npu,
            pass = self.pass_counter,
            total = self.opts.total_pass,
            now = ?now,
            "pass finished"
        );
        sys.viz_pass_finished(self.pass_counter);
        if self.check_for_sim_end(sys) {
            return Step::Suspended;
        }
        self.pos = 0;
        self.state = self.plan[0].state;
        Step::Advanced
    }

    /// Enters the terminal state once every pass is done. Idempotent.
    fn check_for_sim_end(&mut self, sys: &mut dyn SysApi) -> bool {
        if self.pass_counter < self.opts.total_pass {
            return false;
        }
        if self.state != LoopState::WaitForSimFinish {
            self.state = LoopState::WaitForSimFinish;
            info!(npu = self.opts.npu, "all passes finished, waiting for streams");
        }
        if !self.registered_for_finished_streams {
            self.registered_for_finished_streams = true;
            sys.register_for_finished_streams();
        }
        true
    }

    fn settle_wait(&mut self, now: SimTime) -> u64 {
        self.waiting_since
            .take()
            .map(|since| now.since(since))
            .unwrap_or(0)
    }

    fn report(&mut self, sys: &mut dyn SysApi) {
        let finished_ns = sys.now().as_nanos();
        let usage = sys.dimension_usage();
        self.stats.end_to_end(
            &self.opts.run_name,
            finished_ns,
            self.pass_counter,
            self.layers,
            &self.times,
        );
        self.stats.dimension_utilization(&usage, finished_ns);

        let total = self.times.total();
        info!(
            npu = self.opts.npu,
            finished_ns,
            collectives = self.tracker.issued(),
            compute_ns = total.compute_ns,
            exposed_comm_ns = total.exposed_comm_ns,
            "workload finished"
        );
        self.summary = Some(RunSummary {
            run_name: self.opts.run_name.clone(),
            workload: self.opts.workload_name.clone(),
            npu: self.opts.npu,
            policy: self.policy,
            passes: self.pass_counter,
            layers: self.layers.len(),
            finished_ns,
            collectives_issued: self.tracker.issued(),
            total_compute_ns: total.compute_ns,
            total_comm_ns: total.total_comm_ns,
            total_exposed_comm_ns: total.exposed_comm_ns,
            dimension_usage: usage,
        });
    }
}
