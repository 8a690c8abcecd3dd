//! Stats tables written by one workload.
//!
//! - `detailed_<total_rows>.csv`: one row per finished work unit
//! - `EndToEnd.csv`: per-layer compute / total comm / exposed comm, averaged
//!   per pass, with a trailing `SUM` row
//! - `<run_name>_dimension_utilization_<stat_row>.csv`: busy share per dimension

use super::csv::CsvWriter;
use super::times::{LayerTimes, PhaseTimes};
use crate::sys::DimensionUsage;
use crate::workload::{Layer, LoopState, Phase};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

const DETAILED_HEADER: [&str; 9] = [
    "pass",
    "layer",
    "layer_name",
    "state",
    "micro_batch",
    "start_ns",
    "end_ns",
    "compute_ns",
    "exposed_comm_ns",
];

/// Column order follows the downstream end-to-end table readers.
const END_TO_END_COLUMNS: [(Phase, &str); 3] = [
    (Phase::Forward, "fwd"),
    (Phase::WeightGradient, "wg"),
    (Phase::InputGradient, "ig"),
];

/// One finished work unit.
#[derive(Debug, Clone)]
pub struct DetailedRow<'a> {
    pub pass: u32,
    pub layer: usize,
    pub layer_name: &'a str,
    pub state: LoopState,
    pub micro_batch: usize,
    pub start_ns: u64,
    pub end_ns: u64,
    pub compute_ns: u64,
    pub exposed_comm_ns: u64,
}

#[derive(Debug)]
struct StatsFiles {
    detailed: CsvWriter,
    end_to_end: CsvWriter,
    dimension_utilization: CsvWriter,
}

/// Writes the stats tables when enabled; a no-op otherwise.
#[derive(Debug, Default)]
pub struct StatsReporter {
    files: Option<StatsFiles>,
}

impl StatsReporter {
    pub fn disabled() -> Self {
        Self { files: None }
    }

    /// Files go under `dir`. The detailed table is re-created when this run
    /// is the first stat row.
    pub fn new(dir: &Path, run_name: &str, total_rows: usize, stat_row: usize) -> Self {
        let files = StatsFiles {
            detailed: CsvWriter::new(dir.join(format!("detailed_{total_rows}.csv"))),
            end_to_end: CsvWriter::new(dir.join("EndToEnd.csv")),
            dimension_utilization: CsvWriter::new(
                dir.join(format!("{run_name}_dimension_utilization_{stat_row}.csv")),
            ),
        };
        if stat_row == 0 {
            let header = vec![DETAILED_HEADER.iter().map(|s| s.to_string()).collect()];
            log_failure(files.detailed.path(), files.detailed.initialize(&header));
        }
        Self { files: Some(files) }
    }

    pub fn is_enabled(&self) -> bool {
        self.files.is_some()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .flat_map(|f| [&f.detailed, &f.end_to_end, &f.dimension_utilization])
            .map(|w| w.path().to_path_buf())
            .collect()
    }

    pub fn detailed(&self, row: &DetailedRow<'_>) {
        let Some(files) = &self.files else {
            return;
        };
        let cells = vec![
            row.pass.to_string(),
            row.layer.to_string(),
            row.layer_name.to_string(),
            state_label(row.state).to_string(),
            row.micro_batch.to_string(),
            row.start_ns.to_string(),
            row.end_ns.to_string(),
            row.compute_ns.to_string(),
            row.exposed_comm_ns.to_string(),
        ];
        log_failure(files.detailed.path(), files.detailed.append(&cells));
    }

    pub fn end_to_end(
        &self,
        run_name: &str,
        finished_ns: u64,
        passes: u32,
        layers: &[Layer],
        times: &LayerTimes,
    ) {
        let Some(files) = &self.files else {
            return;
        };
        let total = times.total();

        let mut rows = vec![
            vec![
                "run_name".into(),
                run_name.into(),
                "finished_ns".into(),
                finished_ns.to_string(),
                "passes".into(),
                passes.to_string(),
            ],
            vec![
                "total_compute_ns".into(),
                total.compute_ns.to_string(),
                "total_exposed_comm_ns".into(),
                total.exposed_comm_ns.to_string(),
            ],
        ];

        let mut header = vec!["layer_name".to_string()];
        for kind in ["compute", "total comm", "exposed comm"] {
            header.extend(END_TO_END_COLUMNS.iter().map(|(_, key)| format!("{key} {kind}")));
        }
        rows.push(header);

        for (idx, layer) in layers.iter().enumerate() {
            let mut row = vec![layer.name.clone()];
            row.extend(phase_cells(|p| times.get(idx, p), passes));
            rows.push(row);
        }
        let mut sum = vec!["SUM".to_string()];
        sum.extend(phase_cells(|p| times.phase_total(p), passes));
        rows.push(sum);

        log_failure(files.end_to_end.path(), files.end_to_end.initialize(&rows));
    }

    pub fn dimension_utilization(&self, usage: &[DimensionUsage], finished_ns: u64) {
        let Some(files) = &self.files else {
            return;
        };
        let mut rows = vec![vec![
            "dim".to_string(),
            "npus".to_string(),
            "busy_ns".to_string(),
            "utilization_pct".to_string(),
        ]];
        for u in usage {
            rows.push(vec![
                u.dim.to_string(),
                u.npus.to_string(),
                u.busy_ns.to_string(),
                format!("{:.2}", utilization_pct(u.busy_ns, finished_ns)),
            ]);
        }
        let writer = &files.dimension_utilization;
        log_failure(writer.path(), writer.initialize(&rows));
    }
}

/// Compute, total comm and exposed comm cells, each in column order,
/// averaged per pass.
fn phase_cells(times: impl Fn(Phase) -> PhaseTimes, passes: u32) -> Vec<String> {
    let per_pass = |ns: u64| (ns / u64::from(passes.max(1))).to_string();
    let fields: [fn(&PhaseTimes) -> u64; 3] = [
        |t| t.compute_ns,
        |t| t.total_comm_ns,
        |t| t.exposed_comm_ns,
    ];
    fields
        .iter()
        .flat_map(|field| {
            END_TO_END_COLUMNS
                .iter()
                .map(|(phase, _)| per_pass(field(&times(*phase))))
                .collect::<Vec<_>>()
        })
        .collect()
}

pub fn utilization_pct(busy_ns: u64, finished_ns: u64) -> f64 {
    if finished_ns == 0 {
        return 0.0;
    }
    (busy_ns as f64 / finished_ns as f64 * 100.0).min(100.0)
}

fn state_label(state: LoopState) -> &'static str {
    match state {
        LoopState::ForwardPass => "forward",
        LoopState::WeightGradient => "weight_gradient",
        LoopState::InputGradient => "input_gradient",
        LoopState::ForwardInBackPass => "forward_in_backward",
        LoopState::WaitForSimFinish => "wait_for_sim_finish",
    }
}

fn log_failure(path: &Path, res: std::io::Result<()>) {
    match res {
        Ok(()) => trace!(path = %path.display(), "stats written"),
        Err(err) => warn!(path = %path.display(), error = %err, "failed to write stats"),
    }
}
