//! Helpers for collective communication operations named in workload files.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectiveOp {
    Allreduce,
    Allgather,
    Reducescatter,
    Alltoall,
}

/// Device group a collective runs over.
///
/// `_EP` / `_DP_EP` suffixes on a workload comm type scope the collective to
/// the expert-parallel group or to the data-parallel replicas of an expert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GroupScope {
    #[default]
    Full,
    ExpertParallel,
    DataExpertParallel,
}

/// A parsed comm-type column: which collective, over which group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommType {
    pub op: CollectiveOp,
    pub scope: GroupScope,
}

impl CommType {
    /// Parse a workload comm-type token. `NONE` (any case) means no collective.
    pub fn parse(raw: &str) -> Result<Option<Self>, String> {
        let upper = raw.trim().to_uppercase();
        if upper.is_empty() || upper == "NONE" {
            return Ok(None);
        }
        let (base, scope) = if let Some(base) = upper.strip_suffix("_DP_EP") {
            (base, GroupScope::DataExpertParallel)
        } else if let Some(base) = upper.strip_suffix("_EP") {
            (base, GroupScope::ExpertParallel)
        } else {
            (upper.as_str(), GroupScope::Full)
        };
        let op = CollectiveOp::parse(base).map_err(|_| format!("unknown comm type: {raw}"))?;
        Ok(Some(Self { op, scope }))
    }
}

impl CollectiveOp {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let compact: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|ch| *ch != '_' && *ch != '-')
            .collect();
        match compact.as_str() {
            "allreduce" => Ok(Self::Allreduce),
            "allgather" => Ok(Self::Allgather),
            "reducescatter" => Ok(Self::Reducescatter),
            "alltoall" => Ok(Self::Alltoall),
            _ => Err(format!("unknown collective op: {raw}")),
        }
    }

    /// Ring steps needed over `ranks` participants.
    pub fn total_steps(self, ranks: usize) -> usize {
        let steps = ranks.saturating_sub(1);
        match self {
            Self::Allreduce => steps.saturating_mul(2),
            Self::Allgather | Self::Reducescatter | Self::Alltoall => steps,
        }
    }

    /// Bytes moved per ring step for a `comm_bytes` buffer.
    pub fn chunk_bytes(self, comm_bytes: u64, ranks: usize) -> u64 {
        match self {
            Self::Allreduce | Self::Reducescatter | Self::Alltoall => {
                div_ceil(comm_bytes, ranks.max(1) as u64)
            }
            // Allgather treats comm_bytes as the per-rank contribution.
            Self::Allgather => comm_bytes,
        }
    }
}

impl fmt::Display for CollectiveOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Allreduce => "ALLREDUCE",
            Self::Allgather => "ALLGATHER",
            Self::Reducescatter => "REDUCESCATTER",
            Self::Alltoall => "ALLTOALL",
        };
        f.write_str(name)
    }
}

fn div_ceil(n: u64, d: u64) -> u64 {
    if d <= 1 {
        return n;
    }
    n.saturating_add(d.saturating_sub(1)) / d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_comm_type_tokens() {
        assert_eq!(CommType::parse("NONE").unwrap(), None);
        assert_eq!(CommType::parse("none").unwrap(), None);
        assert_eq!(
            CommType::parse("ALLREDUCE").unwrap(),
            Some(CommType {
                op: CollectiveOp::Allreduce,
                scope: GroupScope::Full
            })
        );
        assert_eq!(
            CommType::parse("ALLTOALL_EP").unwrap(),
            Some(CommType {
                op: CollectiveOp::Alltoall,
                scope: GroupScope::ExpertParallel
            })
        );
        assert_eq!(
            CommType::parse("ALLGATHER_DP_EP").unwrap(),
            Some(CommType {
                op: CollectiveOp::Allgather,
                scope: GroupScope::DataExpertParallel
            })
        );
        assert_eq!(
            CommType::parse("REDUCE_SCATTER").unwrap().map(|c| c.op),
            Some(CollectiveOp::Reducescatter)
        );
        assert!(CommType::parse("BROADCAST").is_err());
    }

    #[test]
    fn steps_and_chunks() {
        let ranks = 4;
        assert_eq!(CollectiveOp::Allreduce.total_steps(ranks), 6);
        assert_eq!(CollectiveOp::Allgather.total_steps(ranks), 3);
        assert_eq!(CollectiveOp::Alltoall.total_steps(1), 0);

        assert_eq!(CollectiveOp::Allreduce.chunk_bytes(100, ranks), 25);
        assert_eq!(CollectiveOp::Allgather.chunk_bytes(100, ranks), 100);
        assert_eq!(CollectiveOp::Alltoall.chunk_bytes(101, ranks), 26);
    }
}
