//! System description (JSON): network dimensions and run-wide knobs.

use crate::cc::DimensionLink;
use crate::workload::PipelineOrder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_DIM_NPUS: usize = 8;
const DEFAULT_BANDWIDTH_GBPS: f64 = 100.0;
const DEFAULT_LATENCY_NS: u64 = 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read system config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse system config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid system config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub dims: Vec<DimensionConfig>,
    #[serde(default)]
    pub pipeline_order: Option<PipelineOrder>,
    /// Devices to simulate.
    #[serde(default)]
    pub npus: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionConfig {
    pub npus: usize,
    #[serde(default)]
    pub bandwidth_gbps: Option<f64>,
    #[serde(default)]
    pub latency_ns: Option<u64>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            dims: vec![DimensionConfig {
                npus: DEFAULT_DIM_NPUS,
                bandwidth_gbps: None,
                latency_ns: None,
            }],
            pipeline_order: None,
            npus: None,
        }
    }
}

impl SystemConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut cfg: SystemConfig = serde_json::from_str(raw)?;
        if cfg.dims.is_empty() {
            cfg.dims = SystemConfig::default().dims;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (idx, dim) in self.dims.iter().enumerate() {
            if dim.npus == 0 {
                return Err(ConfigError::Invalid(format!("dims[{idx}].npus must be positive")));
            }
            if dim.bandwidth_gbps.is_some_and(|bw| bw.is_nan() || bw <= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "dims[{idx}].bandwidth_gbps must be positive"
                )));
            }
        }
        if self.npus == Some(0) {
            return Err(ConfigError::Invalid("npus must be positive".into()));
        }
        Ok(())
    }

    pub fn dim_sizes(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.npus).collect()
    }

    pub fn links(&self) -> Vec<DimensionLink> {
        self.dims
            .iter()
            .map(|d| DimensionLink {
                npus: d.npus,
                bandwidth_gbps: d.bandwidth_gbps.unwrap_or(DEFAULT_BANDWIDTH_GBPS),
                latency_ns: d.latency_ns.unwrap_or(DEFAULT_LATENCY_NS),
            })
            .collect()
    }

    pub fn pipeline_order(&self) -> PipelineOrder {
        self.pipeline_order.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg = SystemConfig::from_json("{}").unwrap();
        assert_eq!(cfg.dim_sizes(), vec![8]);
        let links = cfg.links();
        assert_eq!(links[0].bandwidth_gbps, 100.0);
        assert_eq!(links[0].latency_ns, 1_000);
        assert_eq!(cfg.pipeline_order(), PipelineOrder::Interleaved1F1B);
    }

    #[test]
    fn parses_dims_and_order() {
        let cfg = SystemConfig::from_json(
            r#"{"dims":[{"npus":4,"bandwidth_gbps":400},{"npus":2,"latency_ns":5000}],
                "pipeline_order":"all_forward_all_backward","npus":2}"#,
        )
        .unwrap();
        assert_eq!(cfg.dim_sizes(), vec![4, 2]);
        assert_eq!(cfg.links()[1].latency_ns, 5000);
        assert_eq!(cfg.npus, Some(2));
        assert_eq!(cfg.pipeline_order(), PipelineOrder::AllForwardAllBackward);
    }

    #[test]
    fn rejects_zero_sized_dimension() {
        let err = SystemConfig::from_json(r#"{"dims":[{"npus":0}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
