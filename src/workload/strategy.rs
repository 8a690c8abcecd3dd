//! Per-policy iteration strategies.
//!
//! Each strategy lays out the ordered work units of one pass. The driver walks
//! the plan; strategies never see simulated time.

use super::dims::ParticipationTable;
use super::error::{Result, WorkloadError};
use super::params::ParallelismParams;
use super::pipeline::{PipelineAction, PipelineOrder, PipelineShape};
use super::policy::ParallelismPolicy;
use super::state::{CommMode, WorkUnit};

pub trait IterationStrategy: Send {
    fn name(&self) -> &'static str;

    /// Work units of one pass over `layers` layers.
    fn plan_pass(&self, layers: usize, table: &ParticipationTable) -> Vec<WorkUnit>;
}

/// Picks the strategy for `policy`. Fails for `Undefined`.
pub fn strategy_for(
    policy: ParallelismPolicy,
    params: &ParallelismParams,
    order: PipelineOrder,
) -> Result<Box<dyn IterationStrategy>> {
    let strategy: Box<dyn IterationStrategy> = match policy {
        ParallelismPolicy::MicroBenchmark => Box::new(MicroBenchmark),
        ParallelismPolicy::Data => Box::new(DataParallel),
        ParallelismPolicy::Model
        | ParallelismPolicy::HybridDataModel
        | ParallelismPolicy::HybridModelData
        | ParallelismPolicy::HybridCustomized
        | ParallelismPolicy::All => Box::new(Standard),
        ParallelismPolicy::Transformer | ParallelismPolicy::TransformerFwdInBckwd => {
            Box::new(Pipelined::new(params, order))
        }
        ParallelismPolicy::Dlrm => Box::new(Dlrm { enhanced: false }),
        ParallelismPolicy::DlrmEnhanced => Box::new(Dlrm { enhanced: true }),
        ParallelismPolicy::DistributedInference => Box::new(Inference),
        ParallelismPolicy::Undefined => {
            return Err(WorkloadError::UndefinedPolicy(policy.token().into()));
        }
    };
    Ok(strategy)
}

/// Collectives back to back, no compute.
pub struct MicroBenchmark;

impl IterationStrategy for MicroBenchmark {
    fn name(&self) -> &'static str {
        "micro-benchmark"
    }

    fn plan_pass(&self, layers: usize, _table: &ParticipationTable) -> Vec<WorkUnit> {
        (0..layers)
            .map(|l| WorkUnit::weight_gradient(l).without_compute())
            .collect()
    }
}

pub struct DataParallel;

impl IterationStrategy for DataParallel {
    fn name(&self) -> &'static str {
        "data-parallel"
    }

    fn plan_pass(&self, layers: usize, _table: &ParticipationTable) -> Vec<WorkUnit> {
        let mut plan: Vec<WorkUnit> = (0..layers).map(WorkUnit::forward).collect();
        for l in (0..layers).rev() {
            plan.push(WorkUnit::weight_gradient(l).with_update());
            if l > 0 {
                plan.push(WorkUnit::input_gradient(l));
            }
        }
        plan
    }
}

/// Model-parallel, hybrids, all and customized: forward, then input- and
/// weight-gradient per layer walking back.
pub struct Standard;

impl IterationStrategy for Standard {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn plan_pass(&self, layers: usize, _table: &ParticipationTable) -> Vec<WorkUnit> {
        let mut plan: Vec<WorkUnit> = (0..layers).map(WorkUnit::forward).collect();
        for l in (0..layers).rev() {
            plan.push(WorkUnit::input_gradient(l));
            plan.push(WorkUnit::weight_gradient(l).with_update());
        }
        plan
    }
}

pub struct Inference;

impl IterationStrategy for Inference {
    fn name(&self) -> &'static str {
        "distributed-inference"
    }

    fn plan_pass(&self, layers: usize, _table: &ParticipationTable) -> Vec<WorkUnit> {
        (0..layers).map(WorkUnit::forward).collect()
    }
}

/// Embedding layers overlap their all-to-all with the dense layers.
pub struct Dlrm {
    enhanced: bool,
}

impl IterationStrategy for Dlrm {
    fn name(&self) -> &'static str {
        if self.enhanced {
            "dlrm-enhanced"
        } else {
            "dlrm"
        }
    }

    fn plan_pass(&self, layers: usize, table: &ParticipationTable) -> Vec<WorkUnit> {
        let dense_wg = if self.enhanced {
            CommMode::Overlapped
        } else {
            CommMode::Blocking
        };
        let mut plan = Vec::with_capacity(layers * 3);
        let mut first_dense = true;
        for l in 0..layers {
            let unit = WorkUnit::forward(l);
            if table.is_embedding(l) {
                plan.push(unit.comm(CommMode::Overlapped));
            } else if std::mem::take(&mut first_dense) {
                plan.push(unit.joined());
            } else {
                plan.push(unit);
            }
        }

        let backward_start = plan.len();
        for l in (0..layers).rev() {
            if table.is_embedding(l) {
                plan.push(WorkUnit::weight_gradient(l).with_update());
                if l > 0 {
                    plan.push(WorkUnit::input_gradient(l).comm(CommMode::Overlapped));
                }
            } else {
                plan.push(WorkUnit::weight_gradient(l).comm(dense_wg).with_update());
                if l > 0 {
                    plan.push(WorkUnit::input_gradient(l));
                }
            }
        }
        if let Some(first) = plan.get_mut(backward_start) {
            first.join = true;
        }
        plan
    }
}

/// Transformer hybrids: micro-batched pipeline with optional virtual stages
/// and activation recompute.
pub struct Pipelined {
    shape: PipelineShape,
    order: PipelineOrder,
    checkpoints: Vec<usize>,
    initiates: Vec<usize>,
}

impl Pipelined {
    pub fn new(params: &ParallelismParams, order: PipelineOrder) -> Self {
        Self {
            shape: PipelineShape {
                stages: params.pipeline_model_parallelism,
                virtual_stages: params.virtual_pipeline_stages,
                micro_batches: params.gradient_accumulation,
                stage: params.pp_stage,
            },
            order,
            checkpoints: params.checkpoints.clone(),
            initiates: params.checkpoint_initiates.clone(),
        }
    }

    /// Whether the backward step of `layer` replays its segment first.
    /// Without explicit initiators, the top layer of each checkpoint segment
    /// in the chunk ending at `end` starts the replay. With no checkpoints
    /// either, every layer replays itself.
    fn initiates_recompute(&self, layer: usize, end: usize) -> bool {
        if !self.initiates.is_empty() {
            return self.initiates.contains(&layer);
        }
        self.checkpoints.is_empty() || layer + 1 == end || self.checkpoints.contains(&(layer + 1))
    }

    /// Nearest checkpoint at or below `layer`, not crossing `floor`.
    fn checkpoint_for(&self, layer: usize, floor: usize) -> usize {
        if self.checkpoints.is_empty() {
            return layer;
        }
        self.checkpoints
            .iter()
            .copied()
            .filter(|c| *c <= layer && *c >= floor)
            .max()
            .unwrap_or(floor)
    }
}

impl IterationStrategy for Pipelined {
    fn name(&self) -> &'static str {
        "pipelined-transformer"
    }

    fn plan_pass(&self, layers: usize, table: &ParticipationTable) -> Vec<WorkUnit> {
        let per_chunk = layers / self.shape.virtual_stages.max(1);
        let last_mb = self.shape.micro_batches.saturating_sub(1);
        let recompute = table.forward_in_backward();
        let mut plan = Vec::new();

        for action in self.shape.schedule(self.order) {
            match action {
                PipelineAction::Forward { chunk, micro_batch } => {
                    let start = chunk * per_chunk;
                    for l in start..start + per_chunk {
                        plan.push(WorkUnit::forward(l).at(micro_batch, chunk));
                    }
                }
                PipelineAction::Backward { chunk, micro_batch } => {
                    let start = chunk * per_chunk;
                    let end = start + per_chunk;
                    let final_mb = micro_batch == last_mb;
                    for l in (start..end).rev() {
                        let mut ig = WorkUnit::input_gradient(l).at(micro_batch, chunk);
                        if recompute && self.initiates_recompute(l, end) {
                            let from = self.checkpoint_for(l, start);
                            plan.extend(
                                (from..=l).map(|r| WorkUnit::recompute(r).at(micro_batch, chunk)),
                            );
                            ig = ig.closing_recompute();
                        }
                        plan.push(ig);

                        let wg = WorkUnit::weight_gradient(l).at(micro_batch, chunk);
                        plan.push(if final_mb {
                            wg.with_update()
                        } else {
                            wg.comm(CommMode::Skip)
                        });
                    }
                }
            }
        }
        plan
    }
}
