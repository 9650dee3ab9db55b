pub mod config;
pub mod error;
pub mod geo;
pub mod interface;
pub mod packet;
pub mod scenario;
pub mod time;
pub mod wifi;

pub use config::SimConfig;
pub use error::{ConfigError, ConfigResult};
pub use geo::Vector3;
pub use interface::{SimObserver, SystemContext};
pub use packet::{Delivery, EntityId, NodeId, Packet};
pub use scenario::{Assertion, Scenario, SimConfigOverride, Topology};
pub use time::SimTime;
pub use wifi::{PhyStandard, RateSelection, WifiMode};
