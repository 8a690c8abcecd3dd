//! Parallelism policy descriptor and its fixed name table.

use serde::Serialize;
use std::fmt;

/// How a job is split across devices. Resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelismPolicy {
    /// Raw collective stress test, no model structure.
    MicroBenchmark,
    Data,
    Transformer,
    /// Transformer hybrid with activation recompute in the backward pass.
    TransformerFwdInBckwd,
    Dlrm,
    DlrmEnhanced,
    Model,
    HybridDataModel,
    HybridModelData,
    /// Each layer names its own policy.
    HybridCustomized,
    DistributedInference,
    All,
    Undefined,
}

const POLICY_TABLE: [(&str, ParallelismPolicy); 12] = [
    ("MICRO", ParallelismPolicy::MicroBenchmark),
    ("DATA", ParallelismPolicy::Data),
    ("HYBRID_TRANSFORMER", ParallelismPolicy::Transformer),
    (
        "HYBRID_TRANSFORMER_FWD_IN_BCKWD",
        ParallelismPolicy::TransformerFwdInBckwd,
    ),
    ("HYBRID_DLRM", ParallelismPolicy::Dlrm),
    ("HYBRID_DLRM_ENHANCED", ParallelismPolicy::DlrmEnhanced),
    ("MODEL", ParallelismPolicy::Model),
    ("HYBRID_DATA_MODEL", ParallelismPolicy::HybridDataModel),
    ("HYBRID_MODEL_DATA", ParallelismPolicy::HybridModelData),
    ("HYBRID_CUSTOMIZED", ParallelismPolicy::HybridCustomized),
    ("DISTRIBUTED_INFERENCE", ParallelismPolicy::DistributedInference),
    ("ALL", ParallelismPolicy::All),
];

impl ParallelismPolicy {
    /// Exact, case-sensitive lookup. Anything unknown is `Undefined`.
    pub fn resolve(token: &str) -> Self {
        POLICY_TABLE
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, policy)| *policy)
            .unwrap_or(Self::Undefined)
    }

    pub fn token(self) -> &'static str {
        POLICY_TABLE
            .iter()
            .find(|(_, policy)| *policy == self)
            .map(|(name, _)| *name)
            .unwrap_or("UNDEFINED")
    }

    pub fn is_defined(self) -> bool {
        self != Self::Undefined
    }

    pub fn is_dlrm(self) -> bool {
        matches!(self, Self::Dlrm | Self::DlrmEnhanced)
    }

    /// Policies whose header may carry pipeline (`pp`/`vpp`/`ga`) settings.
    pub fn is_pipelined(self) -> bool {
        matches!(self, Self::Transformer | Self::TransformerFwdInBckwd)
    }

    pub fn all() -> impl Iterator<Item = ParallelismPolicy> {
        POLICY_TABLE.iter().map(|(_, policy)| *policy)
    }
}

impl fmt::Display for ParallelismPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
