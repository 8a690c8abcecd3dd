use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info, warn};
use wlsim_rs::cc::AnalyticalComm;
use wlsim_rs::sim::{SimTime, Simulator};
use wlsim_rs::sys::{ConfigError, Sys, SystemConfig};
use wlsim_rs::viz::{VizDimInfo, VizEvent, VizEventKind, VizLogger};
use wlsim_rs::workload::{
    DimensionDecoder, Workload, WorkloadDescription, WorkloadError, WorkloadOptions,
};

#[derive(Debug, Parser)]
#[command(
    name = "wlsim",
    about = "Drive a layer-wise training workload over an analytical collective model"
)]
struct Args {
    /// Path to the workload description
    #[arg(long)]
    workload: PathBuf,

    /// System config JSON (network dimensions); defaults to one 8-device dimension
    #[arg(long)]
    system: Option<PathBuf>,

    /// Training passes to simulate
    #[arg(long, default_value_t = 1)]
    passes: u32,

    /// Run name used in stats file names
    #[arg(long, default_value = "wlsim")]
    run_name: String,

    /// Directory for stats tables (defaults to the working directory)
    #[arg(long)]
    stats_dir: Option<PathBuf>,

    /// Write stats tables for device 0
    #[arg(long)]
    separate_log: bool,

    /// Total stat rows of a multi-run sweep
    #[arg(long, default_value_t = 1)]
    total_rows: usize,

    /// Row of this run within the sweep
    #[arg(long, default_value_t = 0)]
    stat_row: usize,

    /// Devices to simulate (overrides the system config)
    #[arg(long)]
    npus: Option<usize>,

    /// Run until this time (ms); defaults to running until completion
    #[arg(long)]
    until_ms: Option<u64>,

    /// Write per-device run summaries as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Write timeline events as JSON
    #[arg(long)]
    trace_json: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("simulation stopped with {0} of {1} devices unfinished")]
    Unfinished(usize, usize),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "wlsim failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), RunError> {
    let desc = WorkloadDescription::load(&args.workload)?;
    let system = match &args.system {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::default(),
    };
    let decoder = DimensionDecoder::new(system.dim_sizes())?;
    let npus = args.npus.or(system.npus).unwrap_or(1);
    let workload_name = args
        .workload
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workload".to_string());
    if npus == 0 {
        return Err(ConfigError::Invalid("npus must be positive".into()).into());
    }
    info!(
        workload = %args.workload.display(),
        policy = %desc.policy,
        layers = desc.layers.len(),
        dims = ?decoder.dims(),
        npus,
        passes = args.passes,
        "starting run"
    );

    let workloads = (0..npus)
        .map(|npu| {
            let opts = WorkloadOptions {
                run_name: args.run_name.clone(),
                workload_name: workload_name.clone(),
                npu,
                total_pass: args.passes,
                total_rows: args.total_rows,
                stat_row: args.stat_row,
                stats_path: args.stats_dir.clone(),
                separate_log: args.separate_log,
                pipeline_order: system.pipeline_order(),
            };
            Workload::new(opts, &desc, &decoder)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut sys = Sys::new(workloads, Box::new(AnalyticalComm::new(system.links())));
    if args.trace_json.is_some() {
        let mut viz = VizLogger::default();
        viz.push(VizEvent {
            t_ns: 0,
            npu: None,
            kind: VizEventKind::Meta {
                run_name: args.run_name.clone(),
                policy: desc.policy.to_string(),
                npus,
                dims: system
                    .links()
                    .iter()
                    .map(|l| VizDimInfo {
                        npus: l.npus,
                        bandwidth_gbps: l.bandwidth_gbps,
                        latency_ns: l.latency_ns,
                    })
                    .collect(),
            },
        });
        sys.set_viz(viz);
    }

    let mut sim = Simulator::default();
    sys.start(&mut sim);
    match args.until_ms {
        Some(ms) => sim.run_until(SimTime::from_millis(ms), &mut sys),
        None => sim.run(&mut sys),
    }

    let summaries = sys.summaries();
    for s in &summaries {
        println!(
            "npu={} finished_ns={} passes={} collectives={} compute_ns={} exposed_comm_ns={}",
            s.npu,
            s.finished_ns,
            s.passes,
            s.collectives_issued,
            s.total_compute_ns,
            s.total_exposed_comm_ns
        );
    }

    if let Some(path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&summaries).map_err(|e| RunError::Output {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(path, json).map_err(|source| RunError::Output {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "wrote summary");
    }
    if let (Some(path), Some(viz)) = (&args.trace_json, sys.take_viz()) {
        viz.write_json(path).map_err(|source| RunError::Output {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), events = viz.events.len(), "wrote trace");
    }

    if !sys.all_finished() {
        let unfinished = (0..sys.npus())
            .filter(|npu| !sys.ledger(*npu).workload_finished)
            .count();
        if args.until_ms.is_some() {
            warn!(unfinished, "stopped at --until-ms before every device finished");
            return Ok(());
        }
        return Err(RunError::Unfinished(unfinished, sys.npus()));
    }
    Ok(())
}
