use anyhow::{Context, anyhow};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use rxmeter_abstract::{Assertion, EntityId, RateSelection, Scenario, SimTime};
use tracing::info;

use crate::engine::Simulator;
use crate::sampler::ThroughputSampler;
use crate::sink::{CsvSink, RecordSink};
use crate::topology::{self, TopologyPlan};
use crate::trace::SimulationReport;

/// Run one simulation of `scenario` writing its rows into `sink`.
pub fn run_with_sink<S: RecordSink>(
    scenario: &Scenario,
    run: u32,
    sink: S,
) -> anyhow::Result<(SimulationReport, S)> {
    let (rate, plan) = prepare(scenario, run)?;
    execute(scenario, &rate, &plan, run, sink, None)
}

/// Run one simulation writing its CSV file into `output_dir`.
pub fn run_once(
    scenario: &Scenario,
    run: u32,
    output_dir: &Path,
) -> anyhow::Result<SimulationReport> {
    let (rate, plan) = prepare(scenario, run)?;
    let path = output_dir.join(&plan.csv_name);
    let sink = CsvSink::create(&path, plan.layout.clone())
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    let (report, _) = execute(scenario, &rate, &plan, run, sink, Some(path))?;
    Ok(report)
}

/// Runs `run .. run + runs`, one CSV file each.
pub fn run_series(
    scenario: &Scenario,
    output_dir: &Path,
) -> anyhow::Result<Vec<SimulationReport>> {
    let first = scenario.run;
    let mut reports = Vec::with_capacity(scenario.runs as usize);
    for run in first..first.saturating_add(scenario.runs) {
        reports.push(run_once(scenario, run, output_dir)?);
    }
    Ok(reports)
}

pub fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: Scenario = toml::from_str(&content).context("Failed to parse scenario")?;
    Ok(scenario)
}

pub fn run_scenario_file(
    path: &Path,
    output_dir: &Path,
) -> anyhow::Result<Vec<SimulationReport>> {
    let scenario = load_scenario(path)?;

    info!("Running Scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let reports = run_series(&scenario, output_dir)?;
    for report in &reports {
        check_assertions(&scenario.assertions, report)?;
    }
    info!("All assertions passed for {} run(s)", reports.len());
    Ok(reports)
}

pub fn check_assertions(
    assertions: &[Assertion],
    report: &SimulationReport,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            Assertion::MinRows { count } => {
                if report.rows_written < *count {
                    return Err(anyhow!(
                        "Assertion Failed: run {} wrote {} rows, expected at least {}",
                        report.run,
                        report.rows_written,
                        count
                    ));
                }
            }
            Assertion::EntityReported { entity } => {
                if !report.entity_rows.contains_key(entity) {
                    return Err(anyhow!(
                        "Assertion Failed: entity {} never appeared in run {}",
                        entity,
                        report.run
                    ));
                }
            }
            Assertion::UniqueBytesAtLeast { bytes } => {
                if report.unique_bytes < *bytes {
                    return Err(anyhow!(
                        "Assertion Failed: run {} received {} unique bytes, expected at least {}",
                        report.run,
                        report.unique_bytes,
                        bytes
                    ));
                }
            }
            Assertion::MaxDuplicates { count } => {
                if report.duplicates > *count {
                    return Err(anyhow!(
                        "Assertion Failed: run {} saw {} duplicates, expected at most {}",
                        report.run,
                        report.duplicates,
                        count
                    ));
                }
            }
        }
    }
    Ok(())
}

fn prepare(scenario: &Scenario, run: u32) -> anyhow::Result<(RateSelection, TopologyPlan)> {
    let rate = scenario
        .validate()
        .with_context(|| format!("Invalid scenario '{}'", scenario.name))?;
    let plan = topology::describe(&scenario.topology, &rate, run)?;
    Ok((rate, plan))
}

fn execute<S: RecordSink>(
    scenario: &Scenario,
    rate: &RateSelection,
    plan: &TopologyPlan,
    run: u32,
    sink: S,
    csv_path: Option<PathBuf>,
) -> anyhow::Result<(SimulationReport, S)> {
    let config = scenario.effective_config();
    let seed = config.seed_for_run(run);
    let report_aggregate = config.report_aggregate.unwrap_or(plan.report_aggregate);

    let mut sampler = ThroughputSampler::new(
        sink,
        SimTime::from_secs_f64(config.sample_interval_s),
        config.dup_window,
    )
    .with_aggregate_rows(report_aggregate)
    .with_position(plan.position);
    for entity in &plan.entities {
        sampler.track(*entity);
    }

    let mut sim = Simulator::new(config.clone(), seed, sampler);
    topology::populate(&mut sim, &scenario.topology, rate)?;
    sim.stop_at(plan.stop_at);

    info!(
        "Run {} of '{}' ({}, {} on {}), stopping at {}",
        run,
        scenario.name,
        rate.phy_name(),
        rate.standard(),
        plan.csv_name,
        plan.stop_at
    );
    sim.run_until_complete();

    let engine = sim.stats();
    let duration_s = sim.current_time().as_secs_f64();
    let metrics: HashMap<String, Vec<(f64, f64)>> = sim
        .metrics
        .iter()
        .map(|(name, series)| {
            let points = series.iter().map(|(t, v)| (t.as_secs_f64(), *v)).collect();
            (name.clone(), points)
        })
        .collect();

    let mut sampler = sim.into_observer();
    if let Some(err) = sampler.take_error() {
        return Err(anyhow::Error::new(err)
            .context(format!("Sample sink failed during run {} of '{}'", run, scenario.name)));
    }

    let entity_totals = sampler
        .totals()
        .into_iter()
        .filter(|(entity, _)| !entity.is_aggregate())
        .map(|(entity, total)| (entity.0, total))
        .collect();
    let entity_rows = sampler
        .rows_per_entity()
        .iter()
        .map(|(entity, rows)| (entity.0, *rows))
        .collect();

    let report = SimulationReport {
        scenario: scenario.name.clone(),
        run,
        config,
        csv_path,
        duration_s,
        engine,
        packets_received: sampler.packets_received(),
        duplicates: sampler.duplicates(),
        unique_bytes: sampler.total_bytes(EntityId::AGGREGATE),
        entity_totals,
        entity_rows,
        ticks: sampler.ticks(),
        rows_written: sampler.rows_written(),
        metrics,
    };
    info!(
        "Run {} finished: {} packets sent, {} deliveries, {} rows",
        run, report.engine.packets_sent, report.engine.deliveries, report.rows_written
    );
    Ok((report, sampler.into_sink()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SampleRecord, SinkResult};
    use rxmeter_abstract::{ConfigError, Topology};
    use std::io;

    fn short_track(sta_num: u32) -> Scenario {
        Scenario::new(
            "short",
            "DsssRate1Mbps",
            Topology::Track {
                sta_num,
                track_length_m: 400.0,
                train_speed_mps: 40.0,
            },
        )
    }

    #[derive(Debug)]
    struct FullDisk;

    impl RecordSink for FullDisk {
        fn write_sample(&mut self, _record: &SampleRecord) -> SinkResult<()> {
            Err(io::Error::other("disk full").into())
        }

        fn finish(&mut self) -> SinkResult<()> {
            Ok(())
        }
    }

    #[test]
    fn track_run_reports_every_station_each_second() {
        let (report, sink) = run_with_sink(&short_track(2), 1, MemorySink::new()).unwrap();

        // ticks at 0..=10 (the one due at the 11s stop never runs); rows from 1s on
        // for the aggregate and both stations
        assert_eq!(report.ticks, 11);
        assert_eq!(report.rows_written, 30);
        assert_eq!(sink.records.len(), 30);
        assert!(sink.records.iter().all(|r| r.time_s <= 10.0));
        assert!(sink.finished);
        assert_eq!(report.duration_s, 11.0);

        // a broadcast frame reaches both stations under one uid
        let sent = report.engine.packets_sent;
        assert_eq!(report.duplicates, sent);
        assert_eq!(report.unique_bytes, sent * 1472);
        assert_eq!(report.entity_total(1), sent * 1472);
        assert_eq!(report.entity_total(2), sent * 1472);

        let first: Vec<EntityId> = sink.records[..3].iter().map(|r| r.entity).collect();
        assert_eq!(first, vec![EntityId(0), EntityId(1), EntityId(2)]);
        // tram x at t=1s
        assert_eq!(sink.records[0].position, 40.0);
        assert_eq!(report.metrics["aggregate_kbps"].len(), 11);
    }

    #[test]
    fn aggregate_rows_follow_config_override() {
        let mut scenario = short_track(2);
        scenario.config.report_aggregate = Some(false);
        let (report, sink) = run_with_sink(&scenario, 1, MemorySink::new()).unwrap();

        assert_eq!(report.rows_written, 20);
        assert_eq!(sink.rows_for(EntityId::AGGREGATE).count(), 0);
        assert!(!report.entity_rows.contains_key(&0));
    }

    #[test]
    fn same_run_is_reproducible() {
        let scenario = short_track(3);
        let (a, sink_a) = run_with_sink(&scenario, 4, MemorySink::new()).unwrap();
        let (b, sink_b) = run_with_sink(&scenario, 4, MemorySink::new()).unwrap();
        assert_eq!(a.entity_totals, b.entity_totals);
        assert_eq!(sink_a.records, sink_b.records);
    }

    #[test]
    fn sink_failure_fails_the_run() {
        let err = run_with_sink(&short_track(2), 1, FullDisk).unwrap_err();
        assert!(format!("{err:#}").contains("disk full"), "{err:#}");
    }

    #[test]
    fn unknown_wifi_mode_is_a_config_error() {
        let mut scenario = short_track(2);
        scenario.wifi_mode = "OfdmRate7Mbps".to_string();
        let err = run_with_sink(&scenario, 1, MemorySink::new()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnknownWifiMode("OfdmRate7Mbps".to_string()))
        );
    }

    #[test]
    fn run_once_writes_named_csv() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_once(&short_track(2), 3, dir.path()).unwrap();

        let path = dir.path().join("expose_phyrate-DsssRate1Mbps-stations-2-run-3.csv");
        assert_eq!(report.csv_path.as_deref(), Some(path.as_path()));
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("\"Second\",\"Station\""));
        assert_eq!(lines.len(), 1 + report.rows_written as usize);
        assert!(lines[1].starts_with("1,0,"));
        assert!(lines[1].ends_with(",40,\"DsssRate1Mbps\",2,\"DsssRate1Mbps\",3"));
    }

    #[test]
    fn scenario_file_runs_series_and_checks_assertions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.toml");
        fs::write(
            &path,
            r#"
            name = "mini-chain"
            run = 1
            runs = 2

            [topology]
            kind = "chain"
            distance_m = 5.0
            start_s = 0.0
            total_s = 3.0
            rate_mbps = 1

            [[assertions]]
            type = "min_rows"
            count = 2

            [[assertions]]
            type = "entity_reported"
            entity = 1

            [[assertions]]
            type = "max_duplicates"
            count = 0
            "#,
        )
        .unwrap();

        let reports = run_scenario_file(&path, dir.path()).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(dir.path().join("benchmark-olsr-udp-run-1.csv").exists());
        assert!(dir.path().join("benchmark-olsr-udp-run-2.csv").exists());
        // ticks at 0, 1, 2; the stop at 3s comes first
        assert_eq!(reports[0].rows_written, 2);

        let csv_path = dir.path().join("benchmark-olsr-udp-run-2.csv");
        let text = fs::read_to_string(csv_path).unwrap();
        let header = [
            "SimulationSecond",
            "ReceiveRate",
            "TransportProtocol",
            "Run",
            "Distance",
            "HopNum",
        ]
        .map(|h| format!("\"{h}\""))
        .join(",");
        assert_eq!(text.lines().next(), Some(header.as_str()));
    }

    #[test]
    fn failed_assertion_names_the_check() {
        let (report, _) = run_with_sink(&short_track(2), 1, MemorySink::new()).unwrap();
        let err = check_assertions(&[Assertion::MaxDuplicates { count: 0 }], &report).unwrap_err();
        assert!(err.to_string().contains("duplicates"));
        assert!(check_assertions(&[Assertion::EntityReported { entity: 2 }], &report).is_ok());
        assert!(check_assertions(&[Assertion::EntityReported { entity: 3 }], &report).is_err());
    }

    #[test]
    fn bundled_scenarios_parse_and_validate() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios");
        for file in ["expose.toml", "benchmark.toml"] {
            let scenario = load_scenario(&dir.join(file)).unwrap();
            scenario.validate().unwrap();
            assert!(!scenario.assertions.is_empty(), "{file}");
        }
    }
}
