use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use rxmeter_abstract::{Scenario, Topology};
use rxmeter_simulator::{SimulationReport, scenario_runner};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TopologyKind {
    /// Tram passing trackside stations
    Track,
    /// Static multi-hop chain
    Chain,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Per-station receive throughput sampler")]
struct Args {
    /// Load a scenario from disk (the layout flags below are then ignored).
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TopologyKind::Track)]
    topology: TopologyKind,

    /// Wi-Fi mode name, or `minstrel` for adaptive rate.
    #[arg(long, default_value = "OfdmRate54Mbps")]
    wifi_mode: String,

    /// Index of the first run.
    #[arg(long, default_value_t = 1)]
    run: u32,

    #[arg(long, default_value_t = 1)]
    runs: u32,

    /// Number of trackside stations.
    #[arg(long, default_value_t = 2)]
    sta_num: u32,

    /// Chain node spacing in metres.
    #[arg(long, default_value_t = 1.0)]
    distance: f64,

    #[arg(long, default_value_t = 3)]
    hop_num: u32,

    /// Directory receiving one CSV file per run.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Write a JSON trace of the finished runs.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

impl Args {
    fn build_scenario(&self) -> Scenario {
        let (name, topology) = match self.topology {
            TopologyKind::Track => ("expose", Topology::track(self.sta_num)),
            TopologyKind::Chain => ("benchmark", Topology::chain(self.distance, self.hop_num)),
        };
        let mut scenario = Scenario::new(name, self.wifi_mode.clone(), topology);
        scenario.run = self.run;
        scenario.runs = self.runs;
        scenario
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("rxmeter starting…");

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    let reports = if let Some(path) = &args.scenario {
        scenario_runner::run_scenario_file(path, &args.output_dir)?
    } else {
        let scenario = args.build_scenario();
        scenario_runner::run_series(&scenario, &args.output_dir)?
    };

    for report in &reports {
        if let Some(csv) = &report.csv_path {
            info!(
                "Run {}: {} rows, {} unique bytes -> {}",
                report.run,
                report.rows_written,
                report.unique_bytes,
                csv.display()
            );
        }
    }

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &reports)?;
    }

    Ok(())
}

fn write_trace(path: &Path, reports: &[SimulationReport]) -> Result<()> {
    let data =
        serde_json::to_vec_pretty(reports).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
