//! Per-layer compute and communication costs.

use super::dims::Phase;
use crate::cc::collective::CommType;

/// Cost of one phase of a layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhaseCost {
    pub compute_ns: u64,
    pub comm: Option<CommType>,
    pub comm_bytes: u64,
}

impl PhaseCost {
    pub fn local(compute_ns: u64) -> Self {
        Self {
            compute_ns,
            comm: None,
            comm_bytes: 0,
        }
    }

    pub fn with_comm(compute_ns: u64, comm: CommType, comm_bytes: u64) -> Self {
        Self {
            compute_ns,
            comm: Some(comm),
            comm_bytes,
        }
    }

    /// The collective this phase asks for, if it moves any bytes.
    pub fn collective(&self) -> Option<(CommType, u64)> {
        match self.comm {
            Some(comm) if self.comm_bytes > 0 => Some((comm, self.comm_bytes)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    /// Layer this one depends on; `-1` for none.
    ///
    /// Kept only so workload files keep their column layout. Layers always
    /// run in file order and no strategy or report reads this field.
    pub dependency: i64,
    pub fwd: PhaseCost,
    pub ig: PhaseCost,
    pub wg: PhaseCost,
    /// Optimizer update applied after the last weight-gradient of a pass.
    pub wg_update_ns: u64,
    /// Policy token for this layer under `HYBRID_CUSTOMIZED`. `None` (a `-`
    /// in the file) takes the transformer-style split.
    pub override_policy: Option<String>,
}

impl Layer {
    pub fn new(name: impl Into<String>, fwd: PhaseCost, ig: PhaseCost, wg: PhaseCost) -> Self {
        Self {
            name: name.into(),
            dependency: -1,
            fwd,
            ig,
            wg,
            wg_update_ns: 0,
            override_policy: None,
        }
    }

    pub fn with_update(mut self, wg_update_ns: u64) -> Self {
        self.wg_update_ns = wg_update_ns;
        self
    }

    pub fn with_override(mut self, token: impl Into<String>) -> Self {
        self.override_policy = Some(token.into());
        self
    }

    pub fn cost(&self, phase: Phase) -> &PhaseCost {
        match phase {
            Phase::Forward => &self.fwd,
            Phase::InputGradient => &self.ig,
            Phase::WeightGradient => &self.wg,
        }
    }
}
