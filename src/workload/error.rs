//! Errors raised while building or driving a workload.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The policy token did not match any known parallelism policy.
    #[error("undefined parallelism policy: {0:?}")]
    UndefinedPolicy(String),

    #[error("failed to read workload file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workload file line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("workload declares {declared} layers but lists {found}")]
    LayerCount { declared: usize, found: usize },

    #[error("invalid workload configuration: {0}")]
    InvalidConfig(String),

    /// Scheduler and driver disagree about outstanding collectives.
    #[error("collective tracking desync on npu {npu}: {msg}")]
    Desync { npu: usize, msg: String },
}

pub type Result<T, E = WorkloadError> = std::result::Result<T, E>;
