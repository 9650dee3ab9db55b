use crate::error::{ConfigError, ConfigResult, at_least, positive};
use crate::time::SimTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Base seed; each run seeds its generator with `seed + run`.
    pub seed: u64,
    pub sample_interval_s: f64,
    /// Slot count of the duplicate-detection window.
    pub dup_window: usize,
    pub packet_size: u32,
    /// Unit-disk reception range in metres
    pub range_m: f64,
    pub loss_rate: f64,
    pub propagation_speed_mps: f64,
    /// Emit rows for the aggregate counter. `None` keeps the topology's default.
    pub report_aggregate: Option<bool>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sample_interval_s: 1.0,
            dup_window: 100_000,
            packet_size: 1472,
            range_m: 1000.0,
            loss_rate: 0.0,
            propagation_speed_mps: 299_792_458.0,
            report_aggregate: None,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        positive("sample_interval_s", self.sample_interval_s)?;
        // A zero-length tick would re-arm at the same instant forever.
        if SimTime::from_secs_f64(self.sample_interval_s) == SimTime::ZERO {
            return Err(ConfigError::IntervalTooShort(self.sample_interval_s));
        }
        at_least("dup_window", 1, self.dup_window as u64)?;
        at_least("packet_size", 1, u64::from(self.packet_size))?;
        positive("range_m", self.range_m)?;
        positive("propagation_speed_mps", self.propagation_speed_mps)?;
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(ConfigError::LossRate(self.loss_rate));
        }
        Ok(())
    }

    pub fn seed_for_run(&self, run: u32) -> u64 {
        self.seed.wrapping_add(u64::from(run))
    }
}
