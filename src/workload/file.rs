//! Text workload description: a header line, a layer count, then one line
//! per layer.

use super::error::{Result, WorkloadError};
use super::layer::{Layer, PhaseCost};
use super::params::ParallelismParams;
use super::policy::ParallelismPolicy;
use crate::cc::collective::CommType;
use std::path::Path;
use tracing::debug;

/// Everything a workload file says about a run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadDescription {
    pub policy: ParallelismPolicy,
    pub params: ParallelismParams,
    pub layers: Vec<Layer>,
}

impl WorkloadDescription {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WorkloadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = content_lines(text);

        let (line_no, header) = lines.next().ok_or(WorkloadError::Parse {
            line: 1,
            msg: "missing policy header".into(),
        })?;
        let (policy, params) = parse_header(line_no, header)?;

        let declared = parse_count(&mut lines, line_no)?;
        let customized = policy == ParallelismPolicy::HybridCustomized;
        let layers = lines
            .map(|(no, line)| parse_layer(no, line, customized))
            .collect::<Result<Vec<_>>>()?;
        if layers.len() != declared {
            return Err(WorkloadError::LayerCount {
                declared,
                found: layers.len(),
            });
        }
        Ok(Self {
            policy,
            params,
            layers,
        })
    }
}

/// Reads only the header and layer count, for sizing before a full parse.
pub fn count_layers(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| WorkloadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = content_lines(&text);
    let (line_no, _) = lines.next().ok_or(WorkloadError::Parse {
        line: 1,
        msg: "missing policy header".into(),
    })?;
    parse_count(&mut lines, line_no)
}

fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse_count<'t>(
    lines: &mut impl Iterator<Item = (usize, &'t str)>,
    header_line: usize,
) -> Result<usize> {
    let (line, raw) = lines.next().ok_or(WorkloadError::Parse {
        line: header_line + 1,
        msg: "missing layer count".into(),
    })?;
    raw.parse().map_err(|_| WorkloadError::Parse {
        line,
        msg: format!("layer count {raw:?} is not a non-negative integer"),
    })
}

fn parse_header(line: usize, header: &str) -> Result<(ParallelismPolicy, ParallelismParams)> {
    let mut tokens = header.split_whitespace();
    let token = tokens.next().unwrap_or_default();
    let policy = ParallelismPolicy::resolve(token);
    if !policy.is_defined() {
        return Err(WorkloadError::UndefinedPolicy(token.to_string()));
    }

    let mut params = ParallelismParams::default();
    while let Some(tok) = tokens.next() {
        let Some(key) = tok.strip_suffix(':') else {
            if policy.is_dlrm() && params.dlrm_last_bottom_layer.is_none() {
                params.dlrm_last_bottom_layer =
                    Some(number(line, "DLRM_LAST_BOTTOM_LAYER", Some(tok))?);
                continue;
            }
            return Err(WorkloadError::Parse {
                line,
                msg: format!("unexpected header token {tok:?}"),
            });
        };
        match key {
            "model_parallel_NPU_group" => {
                params.model_parallel_npu_group = Some(number(line, key, tokens.next())?)
            }
            "ep" => params.expert_parallel_npu_group = number(line, key, tokens.next())?,
            "pp" => params.pipeline_model_parallelism = number(line, key, tokens.next())?,
            "vpp" => params.virtual_pipeline_stages = number(line, key, tokens.next())?,
            "ga" => params.gradient_accumulation = number(line, key, tokens.next())?,
            "all_gpus" => params.all_gpus = Some(number(line, key, tokens.next())?),
            "pp_stage" => params.pp_stage = number(line, key, tokens.next())?,
            "checkpoints" => params.checkpoints = index_list(line, key, &mut tokens)?,
            "checkpoint_initiates" => {
                params.checkpoint_initiates = index_list(line, key, &mut tokens)?
            }
            "DLRM_LAST_BOTTOM_LAYER" => {
                params.dlrm_last_bottom_layer = Some(number(line, key, tokens.next())?)
            }
            other => {
                let value = tokens.next();
                debug!(key = other, ?value, "ignoring unknown workload header key");
            }
        }
    }
    Ok((policy, params))
}

fn number<T: std::str::FromStr>(line: usize, key: &str, raw: Option<&str>) -> Result<T> {
    let raw = raw.ok_or_else(|| WorkloadError::Parse {
        line,
        msg: format!("{key} is missing its value"),
    })?;
    raw.parse().map_err(|_| WorkloadError::Parse {
        line,
        msg: format!("{key}: {raw:?} is not a valid number"),
    })
}

fn index_list<'t>(
    line: usize,
    key: &str,
    tokens: &mut impl Iterator<Item = &'t str>,
) -> Result<Vec<usize>> {
    let count: usize = number(line, key, tokens.next())?;
    (0..count)
        .map(|_| number(line, key, tokens.next()))
        .collect()
}

fn parse_layer(line: usize, raw: &str, customized: bool) -> Result<Layer> {
    let cols: Vec<&str> = raw.split_whitespace().collect();
    let expected = if customized { 13 } else { 12 };
    if cols.len() != expected {
        return Err(WorkloadError::Parse {
            line,
            msg: format!("expected {expected} columns, found {}", cols.len()),
        });
    }
    let (name, rest) = (cols[0], &cols[1..]);
    let (override_policy, rest) = if customized {
        // `-` leaves the layer on the default split.
        let token = Some(rest[0]).filter(|t| *t != "-").map(str::to_string);
        (token, &rest[1..])
    } else {
        (None, rest)
    };

    let dependency = number(line, "dependency", Some(rest[0]))?;
    let fwd = phase_cost(line, "fwd", &rest[1..4])?;
    let ig = phase_cost(line, "ig", &rest[4..7])?;
    let wg = phase_cost(line, "wg", &rest[7..10])?;
    let wg_update_ns = number(line, "wg_update", Some(rest[10]))?;

    Ok(Layer {
        name: name.to_string(),
        dependency,
        fwd,
        ig,
        wg,
        wg_update_ns,
        override_policy,
    })
}

fn phase_cost(line: usize, phase: &str, cols: &[&str]) -> Result<PhaseCost> {
    let compute_ns = number(line, phase, Some(cols[0]))?;
    let comm = CommType::parse(cols[1]).map_err(|msg| WorkloadError::Parse { line, msg })?;
    let comm_bytes = number(line, phase, Some(cols[2]))?;
    Ok(PhaseCost {
        compute_ns,
        comm,
        comm_bytes,
    })
}
