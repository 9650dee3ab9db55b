//! Catalog of the named PHY modes a scenario may select.

use crate::error::{ConfigError, ConfigResult};
use serde::Serialize;
use std::fmt;

/// Selector value that picks adaptive-rate unicast instead of a fixed mode.
pub const ADAPTIVE_SENTINEL: &str = "minstrel";

/// Mode label written for adaptive runs, which have no single fixed mode.
pub const ADAPTIVE_MODE_LABEL: &str = "OfdmRate54Mbps";

const OFDM_RATES_MBPS: [u64; 8] = [6, 9, 12, 18, 24, 36, 48, 54];

// (bits per subcarrier, coding numerator, coding denominator) for HE MCS 0..=11
const HE_MCS: [(u64, u64, u64); 12] = [
    (1, 1, 2),
    (2, 1, 2),
    (2, 3, 4),
    (4, 1, 2),
    (4, 3, 4),
    (6, 2, 3),
    (6, 3, 4),
    (6, 5, 6),
    (8, 3, 4),
    (8, 5, 6),
    (10, 3, 4),
    (10, 5, 6),
];
const HE_DATA_SUBCARRIERS_20MHZ: u64 = 234;
// 12.8us symbol + 0.8us guard interval, in units of 100ns
const HE_SYMBOL_100NS: u64 = 136;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModulationClass {
    Dsss,
    Ofdm,
    He,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhyStandard {
    #[serde(rename = "802.11b")]
    Ieee80211b,
    #[serde(rename = "802.11a")]
    Ieee80211a,
    #[serde(rename = "802.11ax-5GHz")]
    Ieee80211ax5Ghz,
}

impl fmt::Display for PhyStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhyStandard::Ieee80211b => write!(f, "802.11b"),
            PhyStandard::Ieee80211a => write!(f, "802.11a"),
            PhyStandard::Ieee80211ax5Ghz => write!(f, "802.11ax-5GHz"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiMode {
    pub name: String,
    pub class: ModulationClass,
    /// Data rate at 20 MHz, one spatial stream, in bits per second.
    pub data_rate_bps: u64,
}

impl WifiMode {
    pub fn by_name(name: &str) -> Option<WifiMode> {
        let (class, data_rate_bps) = if let Some(rate) = name
            .strip_prefix("OfdmRate")
            .and_then(|r| r.strip_suffix("Mbps"))
        {
            let mbps: u64 = rate.parse().ok()?;
            if !OFDM_RATES_MBPS.contains(&mbps) {
                return None;
            }
            (ModulationClass::Ofdm, mbps * 1_000_000)
        } else if let Some(mcs) = name.strip_prefix("HeMcs") {
            let index: usize = mcs.parse().ok()?;
            let (bits, num, den) = *HE_MCS.get(index)?;
            let bps = HE_DATA_SUBCARRIERS_20MHZ * bits * num * 10_000_000 / (den * HE_SYMBOL_100NS);
            (ModulationClass::He, bps)
        } else {
            let bps = match name {
                "DsssRate1Mbps" => 1_000_000,
                "DsssRate2Mbps" => 2_000_000,
                "DsssRate5_5Mbps" => 5_500_000,
                "DsssRate11Mbps" => 11_000_000,
                _ => return None,
            };
            (ModulationClass::Dsss, bps)
        };
        Some(WifiMode {
            name: name.to_string(),
            class,
            data_rate_bps,
        })
    }

    /// Whole megabits per second, truncated.
    pub fn mbps(&self) -> u64 {
        self.data_rate_bps / 1_000_000
    }

    pub fn standard(&self) -> PhyStandard {
        match self.class {
            ModulationClass::Dsss => PhyStandard::Ieee80211b,
            _ if self.mbps() <= 54 => PhyStandard::Ieee80211a,
            _ => PhyStandard::Ieee80211ax5Ghz,
        }
    }
}

/// Outcome of parsing a `--wifi-mode` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateSelection {
    Fixed(WifiMode),
    Adaptive,
}

impl RateSelection {
    pub fn parse(value: &str) -> ConfigResult<Self> {
        if value == ADAPTIVE_SENTINEL {
            return Ok(RateSelection::Adaptive);
        }
        WifiMode::by_name(value)
            .map(RateSelection::Fixed)
            .ok_or_else(|| ConfigError::UnknownWifiMode(value.to_string()))
    }

    /// Name used in file names and the `phy` column.
    pub fn phy_name(&self) -> &str {
        match self {
            RateSelection::Fixed(mode) => &mode.name,
            RateSelection::Adaptive => ADAPTIVE_SENTINEL,
        }
    }

    /// Value written to the modulation column.
    pub fn mode_label(&self) -> &str {
        match self {
            RateSelection::Fixed(mode) => &mode.name,
            RateSelection::Adaptive => ADAPTIVE_MODE_LABEL,
        }
    }

    /// Offered application load: the mode's whole-Mbps rate, or 1 Mbps when adaptive.
    pub fn offered_load_bps(&self) -> u64 {
        match self {
            RateSelection::Fixed(mode) => mode.mbps().max(1) * 1_000_000,
            RateSelection::Adaptive => 1_000_000,
        }
    }

    pub fn standard(&self) -> PhyStandard {
        match self {
            RateSelection::Fixed(mode) => mode.standard(),
            RateSelection::Adaptive => PhyStandard::Ieee80211a,
        }
    }
}
