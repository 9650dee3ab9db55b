use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use rxmeter_abstract::SimConfig;

use crate::engine::EngineStats;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: String,
    pub run: u32,
    pub config: SimConfig,
    pub csv_path: Option<PathBuf>,
    pub duration_s: f64,
    pub engine: EngineStats,
    pub packets_received: u64,
    pub duplicates: u64,
    pub unique_bytes: u64,
    /// Cumulative bytes per station entity (aggregate excluded)
    pub entity_totals: BTreeMap<u32, u64>,
    /// Rows written per entity, aggregate included when it was reported
    pub entity_rows: BTreeMap<u32, u64>,
    pub ticks: u64,
    pub rows_written: u64,
    /// Metric name -> (seconds, value)
    pub metrics: HashMap<String, Vec<(f64, f64)>>,
}

impl SimulationReport {
    pub fn entity_total(&self, entity: u32) -> u64 {
        self.entity_totals.get(&entity).copied().unwrap_or(0)
    }
}
