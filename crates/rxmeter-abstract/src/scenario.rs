use crate::config::SimConfig;
use crate::error::{ConfigError, ConfigResult, at_least, positive};
use crate::wifi::RateSelection;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_wifi_mode")]
    pub wifi_mode: String,
    /// Index of the first run; also mixed into the seed.
    #[serde(default = "default_run")]
    pub run: u32,
    /// Number of consecutive runs, each with its own CSV file.
    #[serde(default = "default_runs")]
    pub runs: u32,
    pub topology: Topology,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

fn default_wifi_mode() -> String {
    "OfdmRate54Mbps".to_string()
}

fn default_run() -> u32 {
    1
}

fn default_runs() -> u32 {
    1
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topology {
    /// A tram moving along a straight track past evenly spaced stations.
    Track {
        #[serde(default = "default_sta_num")]
        sta_num: u32,
        #[serde(default = "default_track_length")]
        track_length_m: f64,
        #[serde(default = "default_train_speed")]
        train_speed_mps: f64,
    },
    /// Static nodes on a line; node `hop_num` sends to node 0 along the chain.
    Chain {
        #[serde(default = "default_node_count")]
        node_count: u32,
        #[serde(default = "default_hop_num")]
        hop_num: u32,
        #[serde(default = "default_distance")]
        distance_m: f64,
        #[serde(default = "default_start")]
        start_s: f64,
        #[serde(default = "default_total")]
        total_s: f64,
        #[serde(default = "default_rate_mbps")]
        rate_mbps: u64,
        #[serde(default = "default_transport")]
        transport: String,
        #[serde(default = "default_csv_base")]
        csv_base: String,
    },
}

fn default_sta_num() -> u32 {
    2
}
fn default_track_length() -> f64 {
    10_000.0
}
fn default_train_speed() -> f64 {
    40.0
}
fn default_node_count() -> u32 {
    4
}
fn default_hop_num() -> u32 {
    3
}
fn default_distance() -> f64 {
    1.0
}
fn default_start() -> f64 {
    60.0
}
fn default_total() -> f64 {
    300.0
}
fn default_rate_mbps() -> u64 {
    54
}
fn default_transport() -> String {
    "udp".to_string()
}
fn default_csv_base() -> String {
    "benchmark-olsr".to_string()
}

impl Topology {
    pub fn track(sta_num: u32) -> Self {
        Topology::Track {
            sta_num,
            track_length_m: default_track_length(),
            train_speed_mps: default_train_speed(),
        }
    }

    pub fn chain(distance_m: f64, hop_num: u32) -> Self {
        Topology::Chain {
            node_count: default_node_count().max(hop_num.saturating_add(1)),
            hop_num,
            distance_m,
            start_s: default_start(),
            total_s: default_total(),
            rate_mbps: default_rate_mbps(),
            transport: default_transport(),
            csv_base: default_csv_base(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        match self {
            Topology::Track {
                sta_num,
                track_length_m,
                train_speed_mps,
            } => {
                // Station spacing divides by sta_num - 1.
                at_least("sta_num", 2, u64::from(*sta_num))?;
                positive("track_length_m", *track_length_m)?;
                positive("train_speed_mps", *train_speed_mps)?;
            }
            Topology::Chain {
                node_count,
                hop_num,
                distance_m,
                start_s,
                total_s,
                rate_mbps,
                transport,
                ..
            } => {
                at_least("node_count", 2, u64::from(*node_count))?;
                if *hop_num == 0 || hop_num >= node_count {
                    return Err(ConfigError::HopNum {
                        hop_num: *hop_num,
                        node_count: *node_count,
                    });
                }
                positive("distance_m", *distance_m)?;
                positive("total_s", *total_s)?;
                if !start_s.is_finite() || *start_s < 0.0 || start_s >= total_s {
                    return Err(ConfigError::EmptyTrafficWindow {
                        start_s: *start_s,
                        total_s: *total_s,
                    });
                }
                at_least("rate_mbps", 1, *rate_mbps)?;
                if transport != "udp" {
                    return Err(ConfigError::Transport(transport.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Per-scenario overrides applied on top of [`SimConfig::default`].
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub seed: Option<u64>,
    pub sample_interval_s: Option<f64>,
    pub dup_window: Option<usize>,
    pub packet_size: Option<u32>,
    pub range_m: Option<f64>,
    pub loss_rate: Option<f64>,
    pub propagation_speed_mps: Option<f64>,
    pub report_aggregate: Option<bool>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.sample_interval_s {
            config.sample_interval_s = v;
        }
        if let Some(v) = self.dup_window {
            config.dup_window = v;
        }
        if let Some(v) = self.packet_size {
            config.packet_size = v;
        }
        if let Some(v) = self.range_m {
            config.range_m = v;
        }
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.propagation_speed_mps {
            config.propagation_speed_mps = v;
        }
        if let Some(v) = self.report_aggregate {
            config.report_aggregate = Some(v);
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// At least `count` rows were written in each run
    MinRows { count: u64 },
    /// Entity `entity` appears in at least one row of each run
    EntityReported { entity: u32 },
    /// The de-duplicated byte total reached `bytes` in each run
    UniqueBytesAtLeast { bytes: u64 },
    /// No more than `count` duplicates were suppressed in each run
    MaxDuplicates { count: u64 },
}

impl Scenario {
    /// Scenario built from command-line style parameters, with default config.
    pub fn new(name: impl Into<String>, wifi_mode: impl Into<String>, topology: Topology) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            wifi_mode: wifi_mode.into(),
            run: default_run(),
            runs: default_runs(),
            topology,
            config: SimConfigOverride::default(),
            assertions: Vec::new(),
        }
    }

    pub fn effective_config(&self) -> SimConfig {
        let mut config = SimConfig::default();
        self.config.apply_to(&mut config);
        config
    }

    /// Check every parameter and resolve the rate selector.
    pub fn validate(&self) -> ConfigResult<RateSelection> {
        self.effective_config().validate()?;
        at_least("runs", 1, u64::from(self.runs))?;
        self.topology.validate()?;
        RateSelection::parse(&self.wifi_mode)
    }
}
