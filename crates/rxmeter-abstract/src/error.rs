use thiserror::Error;

/// Rejected configuration, reported before a run starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown wifi mode '{0}' (expected a mode name such as OfdmRate54Mbps, or 'minstrel')")]
    UnknownWifiMode(String),

    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u64,
        value: u64,
    },

    #[error("sample_interval_s {0} is shorter than the 1 ns clock resolution")]
    IntervalTooShort(f64),

    #[error("loss_rate must lie in [0, 1], got {0}")]
    LossRate(f64),

    #[error("hop_num {hop_num} must lie in 1..{node_count}")]
    HopNum { hop_num: u32, node_count: u32 },

    #[error("traffic start {start_s}s must precede run end {total_s}s")]
    EmptyTrafficWindow { start_s: f64, total_s: f64 },

    #[error("unsupported transport '{0}' (only 'udp' is modelled)")]
    Transport(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub(crate) fn positive(field: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

pub(crate) fn at_least(field: &'static str, min: u64, value: u64) -> ConfigResult<()> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { field, min, value })
    }
}
