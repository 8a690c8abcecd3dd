//! Loop states and the work units a pass is made of.

use super::dims::Phase;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    ForwardPass,
    WeightGradient,
    InputGradient,
    WaitForSimFinish,
    /// Forward recomputation inside the backward pass.
    ForwardInBackPass,
}

impl LoopState {
    /// Phase whose costs and participation a unit in this state uses.
    pub fn phase(self) -> Option<Phase> {
        match self {
            LoopState::ForwardPass | LoopState::ForwardInBackPass => Some(Phase::Forward),
            LoopState::InputGradient => Some(Phase::InputGradient),
            LoopState::WeightGradient => Some(Phase::WeightGradient),
            LoopState::WaitForSimFinish => None,
        }
    }
}

/// How a unit treats the collective its layer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommMode {
    /// The driver suspends until the collective completes.
    Blocking,
    /// Issued and left in flight; a later join waits for it.
    Overlapped,
    /// Never issued (e.g. gradients still accumulating).
    Skip,
}

/// One (layer, state, micro-batch, chunk) step of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub layer: usize,
    pub state: LoopState,
    pub micro_batch: usize,
    pub chunk: usize,
    pub comm: CommMode,
    /// Wait for every outstanding collective before starting.
    pub join: bool,
    pub local_compute: bool,
    /// Add the layer's weight-update time to this unit's compute.
    pub apply_update: bool,
    /// Input-gradient that closes an activation-recompute segment.
    pub ends_recompute: bool,
}

impl WorkUnit {
    fn new(layer: usize, state: LoopState) -> Self {
        Self {
            layer,
            state,
            micro_batch: 0,
            chunk: 0,
            comm: CommMode::Blocking,
            join: false,
            local_compute: true,
            apply_update: false,
            ends_recompute: false,
        }
    }

    pub fn forward(layer: usize) -> Self {
        Self::new(layer, LoopState::ForwardPass)
    }

    pub fn input_gradient(layer: usize) -> Self {
        Self::new(layer, LoopState::InputGradient)
    }

    pub fn weight_gradient(layer: usize) -> Self {
        Self::new(layer, LoopState::WeightGradient)
    }

    pub fn recompute(layer: usize) -> Self {
        Self::new(layer, LoopState::ForwardInBackPass)
    }

    pub fn at(mut self, micro_batch: usize, chunk: usize) -> Self {
        self.micro_batch = micro_batch;
        self.chunk = chunk;
        self
    }

    pub fn comm(mut self, comm: CommMode) -> Self {
        self.comm = comm;
        self
    }

    pub fn joined(mut self) -> Self {
        self.join = true;
        self
    }

    pub fn without_compute(mut self) -> Self {
        self.local_compute = false;
        self
    }

    pub fn with_update(mut self) -> Self {
        self.apply_update = true;
        self
    }

    pub fn closing_recompute(mut self) -> Self {
        self.ends_recompute = true;
        self
    }

    pub fn phase(&self) -> Phase {
        // Work units never carry the terminal state.
        self.state.phase().unwrap_or(Phase::Forward)
    }
}
