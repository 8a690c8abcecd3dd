//! Parallelism knobs read from a workload header.

use super::error::{Result, WorkloadError};
use super::policy::ParallelismPolicy;
use crate::cc::collective::GroupScope;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParallelismParams {
    /// Model-parallel group size. `None` lets the decoder pick per policy.
    pub model_parallel_npu_group: Option<usize>,
    pub expert_parallel_npu_group: usize,
    pub pipeline_model_parallelism: usize,
    pub virtual_pipeline_stages: usize,
    pub gradient_accumulation: usize,
    pub all_gpus: Option<usize>,
    /// Pipeline stage simulated by every device of this run.
    pub pp_stage: usize,
    pub checkpoints: Vec<usize>,
    pub checkpoint_initiates: Vec<usize>,
    pub dlrm_last_bottom_layer: Option<usize>,
}

impl Default for ParallelismParams {
    fn default() -> Self {
        Self {
            model_parallel_npu_group: None,
            expert_parallel_npu_group: 1,
            pipeline_model_parallelism: 1,
            virtual_pipeline_stages: 1,
            gradient_accumulation: 1,
            all_gpus: None,
            pp_stage: 0,
            checkpoints: Vec::new(),
            checkpoint_initiates: Vec::new(),
            dlrm_last_bottom_layer: None,
        }
    }
}

impl ParallelismParams {
    pub fn validate(&self, policy: ParallelismPolicy, layers: usize) -> Result<()> {
        let positive = [
            ("model_parallel_NPU_group", self.model_parallel_npu_group.unwrap_or(1)),
            ("ep", self.expert_parallel_npu_group),
            ("pp", self.pipeline_model_parallelism),
            ("vpp", self.virtual_pipeline_stages),
            ("ga", self.gradient_accumulation),
            ("all_gpus", self.all_gpus.unwrap_or(1)),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(WorkloadError::InvalidConfig(format!("{key} must be positive")));
        }
        if self.pp_stage >= self.pipeline_model_parallelism {
            return Err(WorkloadError::InvalidConfig(format!(
                "pp_stage {} outside pipeline of {} stages",
                self.pp_stage, self.pipeline_model_parallelism
            )));
        }
        if policy.is_pipelined() && layers % self.virtual_pipeline_stages != 0 {
            return Err(WorkloadError::InvalidConfig(format!(
                "vpp {} does not divide {layers} layers",
                self.virtual_pipeline_stages
            )));
        }
        for (key, list) in [
            ("checkpoints", &self.checkpoints),
            ("checkpoint_initiates", &self.checkpoint_initiates),
        ] {
            if let Some(idx) = list.iter().find(|idx| **idx >= layers) {
                return Err(WorkloadError::InvalidConfig(format!(
                    "{key} entry {idx} out of range for {layers} layers"
                )));
            }
        }
        Ok(())
    }

    /// Upper bound on the ranks a scoped collective spans.
    pub fn group_limit(&self, scope: GroupScope, total_npus: usize) -> Option<usize> {
        let total = self.all_gpus.unwrap_or(total_npus);
        match scope {
            GroupScope::Full => None,
            GroupScope::ExpertParallel => Some(self.expert_parallel_npu_group),
            GroupScope::DataExpertParallel => {
                let tp = self.model_parallel_npu_group.unwrap_or(1);
                Some((total / (tp * self.expert_parallel_npu_group).max(1)).max(1))
            }
        }
    }
}
