use crate::sys::DimensionUsage;
use crate::workload::ParallelismPolicy;
use serde::Serialize;

/// What one device's run amounted to, for `--summary-json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_name: String,
    pub workload: String,
    pub npu: usize,
    pub policy: ParallelismPolicy,
    pub passes: u32,
    pub layers: usize,
    pub finished_ns: u64,
    pub collectives_issued: u64,
    pub total_compute_ns: u64,
    pub total_comm_ns: u64,
    pub total_exposed_comm_ns: u64,
    pub dimension_usage: Vec<DimensionUsage>,
}
