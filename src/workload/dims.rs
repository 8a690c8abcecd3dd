//! Which network dimensions carry traffic in each training phase.
//!
//! Dimensions are listed innermost first: index 0 is the fastest, most local
//! fabric (e.g. the scale-up domain), the last index the outermost one.

use super::error::{Result, WorkloadError};
use super::layer::Layer;
use super::params::ParallelismParams;
use super::policy::ParallelismPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Forward,
    InputGradient,
    WeightGradient,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Forward, Phase::InputGradient, Phase::WeightGradient];

    pub fn key(self) -> &'static str {
        match self {
            Phase::Forward => "fwd",
            Phase::InputGradient => "ig",
            Phase::WeightGradient => "wg",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Phase::Forward => 0,
            Phase::InputGradient => 1,
            Phase::WeightGradient => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-phase participation masks, one entry per network dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvolvedDimensions {
    fwd: Vec<bool>,
    ig: Vec<bool>,
    wg: Vec<bool>,
    forward_in_backward: bool,
}

impl InvolvedDimensions {
    pub fn new(fwd: Vec<bool>, ig: Vec<bool>, wg: Vec<bool>) -> Self {
        debug_assert!(fwd.len() == ig.len() && ig.len() == wg.len());
        Self {
            fwd,
            ig,
            wg,
            forward_in_backward: false,
        }
    }

    pub fn uniform(dims: usize, active: bool) -> Self {
        Self::new(vec![active; dims], vec![active; dims], vec![active; dims])
    }

    pub fn with_forward_in_backward(mut self, on: bool) -> Self {
        self.forward_in_backward = on;
        self
    }

    pub fn get(&self, phase: Phase) -> &[bool] {
        match phase {
            Phase::Forward => &self.fwd,
            Phase::InputGradient => &self.ig,
            Phase::WeightGradient => &self.wg,
        }
    }

    pub fn any(&self, phase: Phase) -> bool {
        self.get(phase).iter().any(|d| *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, &[bool])> + '_ {
        Phase::ALL.into_iter().map(move |p| (p, self.get(p)))
    }

    pub fn dimension_count(&self) -> usize {
        self.fwd.len()
    }

    /// Backward pass replays forward computation from checkpoints.
    pub fn forward_in_backward(&self) -> bool {
        self.forward_in_backward
    }
}

/// Resolves participation for a network whose dimension sizes are known.
#[derive(Debug, Clone)]
pub struct DimensionDecoder {
    dims: Vec<usize>,
}

impl DimensionDecoder {
    pub fn new(dims: Vec<usize>) -> Result<Self> {
        if dims.is_empty() {
            return Err(WorkloadError::InvalidConfig(
                "network needs at least one dimension".into(),
            ));
        }
        if let Some(idx) = dims.iter().position(|d| *d == 0) {
            return Err(WorkloadError::InvalidConfig(format!(
                "dimension {idx} has zero devices"
            )));
        }
        Ok(Self { dims })
    }

    pub fn dimension_count(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn total_npus(&self) -> usize {
        self.dims.iter().product()
    }

    /// Model-parallel group size a policy implies when the header leaves it out.
    pub fn default_group(&self, policy: ParallelismPolicy) -> usize {
        match policy {
            ParallelismPolicy::Transformer
            | ParallelismPolicy::TransformerFwdInBckwd
            | ParallelismPolicy::HybridDataModel
            | ParallelismPolicy::HybridCustomized => self.dims[0],
            ParallelismPolicy::HybridModelData => self.total_npus() / self.dims[0],
            _ => self.total_npus(),
        }
    }

    pub fn decode(&self, policy: ParallelismPolicy, group: usize) -> Result<InvolvedDimensions> {
        let n = self.dims.len();
        let none = vec![false; n];
        let involved = match policy {
            ParallelismPolicy::MicroBenchmark | ParallelismPolicy::All => {
                InvolvedDimensions::uniform(n, true)
            }
            ParallelismPolicy::Data => {
                let mut wg = none.clone();
                wg[n - 1] = true;
                InvolvedDimensions::new(none.clone(), none, wg)
            }
            ParallelismPolicy::Model => {
                let (model, _) = self.split_inner(group);
                InvolvedDimensions::new(model.clone(), model, none)
            }
            ParallelismPolicy::DistributedInference => {
                let (model, _) = self.split_inner(group);
                InvolvedDimensions::new(model, none.clone(), none)
            }
            ParallelismPolicy::Transformer
            | ParallelismPolicy::HybridDataModel
            | ParallelismPolicy::HybridCustomized => {
                let (model, data) = self.split_inner(group);
                InvolvedDimensions::new(model.clone(), model, data)
            }
            ParallelismPolicy::TransformerFwdInBckwd => {
                let (model, data) = self.split_inner(group);
                InvolvedDimensions::new(model.clone(), model, data).with_forward_in_backward(true)
            }
            ParallelismPolicy::HybridModelData => {
                let (model, data) = self.split_outer(group);
                InvolvedDimensions::new(model.clone(), model, data)
            }
            // Dense layers: gradients synchronised everywhere, no activation traffic.
            ParallelismPolicy::Dlrm | ParallelismPolicy::DlrmEnhanced => {
                InvolvedDimensions::new(none.clone(), none, vec![true; n])
            }
            ParallelismPolicy::Undefined => {
                return Err(WorkloadError::UndefinedPolicy(policy.token().into()));
            }
        };
        Ok(involved)
    }

    /// Embedding (bottom) layers of a recommendation model: all-to-all over
    /// the model group in both directions, no weight-gradient traffic.
    pub fn decode_embedding(&self, group: usize) -> InvolvedDimensions {
        let (model, _) = self.split_inner(group);
        InvolvedDimensions::new(model.clone(), model, vec![false; self.dims.len()])
    }

    /// Participation for every layer of a run.
    pub fn build_table(
        &self,
        policy: ParallelismPolicy,
        params: &ParallelismParams,
        layers: &[Layer],
    ) -> Result<ParticipationTable> {
        let group = params
            .model_parallel_npu_group
            .unwrap_or_else(|| self.default_group(policy));
        match policy {
            ParallelismPolicy::Dlrm | ParallelismPolicy::DlrmEnhanced => {
                let last_bottom_layer = params.dlrm_last_bottom_layer.ok_or_else(|| {
                    WorkloadError::InvalidConfig("DLRM workload without last bottom layer".into())
                })?;
                if last_bottom_layer > layers.len() {
                    return Err(WorkloadError::InvalidConfig(format!(
                        "DLRM last bottom layer {last_bottom_layer} out of range for {} layers",
                        layers.len()
                    )));
                }
                Ok(ParticipationTable::Split {
                    last_bottom_layer,
                    embedding: self.decode_embedding(group),
                    dense: self.decode(policy, group)?,
                })
            }
            ParallelismPolicy::HybridCustomized => {
                let fallback = self.decode(policy, group)?;
                let per_layer = layers
                    .iter()
                    .map(|layer| match layer.override_policy.as_deref() {
                        None => Ok(fallback.clone()),
                        Some(token) => {
                            let own = ParallelismPolicy::resolve(token);
                            match own {
                                ParallelismPolicy::Undefined => {
                                    Err(WorkloadError::UndefinedPolicy(token.into()))
                                }
                                ParallelismPolicy::HybridCustomized => {
                                    Err(WorkloadError::InvalidConfig(format!(
                                        "layer {} cannot itself be {token}",
                                        layer.name
                                    )))
                                }
                                _ => self.decode(own, group),
                            }
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ParticipationTable::PerLayer(per_layer))
            }
            _ => Ok(ParticipationTable::Uniform(self.decode(policy, group)?)),
        }
    }

    /// Inner dimensions whose product covers `group` are model dimensions;
    /// a dimension that overshoots the group is shared with the data side.
    fn split_inner(&self, group: usize) -> (Vec<bool>, Vec<bool>) {
        split_by_group(self.dims.iter().copied().enumerate(), self.dims.len(), group)
    }

    fn split_outer(&self, group: usize) -> (Vec<bool>, Vec<bool>) {
        split_by_group(
            self.dims.iter().copied().enumerate().rev(),
            self.dims.len(),
            group,
        )
    }
}

fn split_by_group(
    order: impl Iterator<Item = (usize, usize)>,
    n: usize,
    group: usize,
) -> (Vec<bool>, Vec<bool>) {
    let mut model = vec![false; n];
    let mut data = vec![true; n];
    if group <= 1 {
        return (model, data);
    }
    let mut covered = 1usize;
    for (idx, size) in order {
        if covered >= group {
            break;
        }
        let next = covered.saturating_mul(size);
        model[idx] = true;
        data[idx] = next > group;
        covered = next;
    }
    (model, data)
}

/// Layer index → participation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipationTable {
    Uniform(InvolvedDimensions),
    /// Recommendation models: layers below `last_bottom_layer` are embedding
    /// layers, the rest dense.
    Split {
        last_bottom_layer: usize,
        embedding: InvolvedDimensions,
        dense: InvolvedDimensions,
    },
    PerLayer(Vec<InvolvedDimensions>),
}

impl ParticipationTable {
    pub fn for_layer(&self, idx: usize) -> &InvolvedDimensions {
        match self {
            ParticipationTable::Uniform(all) => all,
            ParticipationTable::Split {
                last_bottom_layer,
                embedding,
                dense,
            } => {
                if idx < *last_bottom_layer {
                    embedding
                } else {
                    dense
                }
            }
            ParticipationTable::PerLayer(layers) => &layers[idx],
        }
    }

    pub fn is_embedding(&self, idx: usize) -> bool {
        matches!(self, ParticipationTable::Split { last_bottom_layer, .. } if idx < *last_bottom_layer)
    }

    pub fn forward_in_backward(&self) -> bool {
        match self {
            ParticipationTable::Uniform(all) => all.forward_in_backward(),
            ParticipationTable::Split { dense, .. } => dense.forward_in_backward(),
            ParticipationTable::PerLayer(layers) => {
                layers.iter().any(InvolvedDimensions::forward_in_backward)
            }
        }
    }
}
