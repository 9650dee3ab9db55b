//! Minimal reception model: unit-disk range, i.i.d. loss, constant-speed delay.

use rand::Rng;
use rxmeter_abstract::{SimConfig, SimTime, Vector3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub range_m: f64,
    pub loss_rate: f64,
    pub propagation_speed_mps: f64,
}

impl Channel {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            range_m: config.range_m,
            loss_rate: config.loss_rate,
            propagation_speed_mps: config.propagation_speed_mps,
        }
    }

    pub fn in_range(&self, from: &Vector3, to: &Vector3) -> bool {
        from.distance(to) <= self.range_m
    }

    /// Propagation delay if the frame survives the hop, `None` if it is lost.
    pub fn transmit<R: Rng>(&self, rng: &mut R, from: &Vector3, to: &Vector3) -> Option<SimTime> {
        if !self.in_range(from, to) {
            return None;
        }
        if self.loss_rate > 0.0 && rng.random::<f64>() < self.loss_rate {
            return None;
        }
        Some(SimTime::from_secs_f64(from.distance(to) / self.propagation_speed_mps))
    }
}
