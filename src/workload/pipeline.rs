//! Micro-batch ordering for pipelined transformer workloads.

use serde::{Deserialize, Serialize};

/// How forward and backward micro-batches are ordered on one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOrder {
    /// Warm-up forwards, steady one-forward-one-backward, cool-down backwards.
    #[default]
    #[serde(rename = "interleaved_1f1b")]
    Interleaved1F1B,
    /// Every forward, then every backward.
    AllForwardAllBackward,
}

/// One step of a stage's schedule: a virtual chunk on a micro-batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineAction {
    Forward { chunk: usize, micro_batch: usize },
    Backward { chunk: usize, micro_batch: usize },
}

/// Schedule shape for a single pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineShape {
    pub stages: usize,
    pub virtual_stages: usize,
    pub micro_batches: usize,
    pub stage: usize,
}

impl PipelineShape {
    /// Forwards before the first backward.
    ///
    /// ```text
    /// vpp == 1: pp - stage - 1
    /// vpp  > 1: (pp - stage - 1) * 2 + (vpp - 1) * pp
    /// ```
    pub fn warmup(&self) -> usize {
        let total = self.micro_batches * self.virtual_stages;
        let behind = self.stages - self.stage - 1;
        let warmup = if self.virtual_stages > 1 {
            behind * 2 + (self.virtual_stages - 1) * self.stages
        } else {
            behind
        };
        warmup.min(total)
    }

    pub fn schedule(&self, order: PipelineOrder) -> Vec<PipelineAction> {
        let forwards = self.virtual_order(false);
        let backwards = self.virtual_order(true);
        let mut actions = Vec::with_capacity(forwards.len() * 2);

        match order {
            PipelineOrder::AllForwardAllBackward => {
                actions.extend(forwards.iter().map(|&(chunk, micro_batch)| {
                    PipelineAction::Forward { chunk, micro_batch }
                }));
                actions.extend(backwards.iter().map(|&(chunk, micro_batch)| {
                    PipelineAction::Backward { chunk, micro_batch }
                }));
            }
            PipelineOrder::Interleaved1F1B => {
                let warmup = self.warmup();
                let mut fwd = forwards.iter();
                let mut bwd = backwards.iter();
                for &(chunk, micro_batch) in fwd.by_ref().take(warmup) {
                    actions.push(PipelineAction::Forward { chunk, micro_batch });
                }
                for &(chunk, micro_batch) in fwd {
                    actions.push(PipelineAction::Forward { chunk, micro_batch });
                    if let Some(&(chunk, micro_batch)) = bwd.next() {
                        actions.push(PipelineAction::Backward { chunk, micro_batch });
                    }
                }
                for &(chunk, micro_batch) in bwd {
                    actions.push(PipelineAction::Backward { chunk, micro_batch });
                }
            }
        }
        actions
    }

    /// Virtual micro-batches in issue order: micro-batches go in groups of
    /// `stages`, and each group visits every chunk before the next group.
    /// Backward walks chunks from the last to the first.
    fn virtual_order(&self, backward: bool) -> Vec<(usize, usize)> {
        let group = self.stages.max(1);
        let mut order = Vec::with_capacity(self.micro_batches * self.virtual_stages);
        let mut start = 0;
        while start < self.micro_batches {
            let end = (start + group).min(self.micro_batches);
            for step in 0..self.virtual_stages {
                let chunk = if backward {
                    self.virtual_stages - 1 - step
                } else {
                    step
                };
                order.extend((start..end).map(|mb| (chunk, mb)));
            }
            start = end;
        }
        order
    }
}
