pub mod channel;
pub mod dedup;
pub mod engine;
pub mod mobility;
pub mod sampler;
pub mod scenario_runner;
pub mod sink;
pub mod topology;
pub mod trace;

pub use dedup::DuplicateWindow;
pub use engine::{Destination, EngineStats, Simulator, TrafficSource};
pub use sampler::{SamplerState, ThroughputSampler};
pub use sink::{CsvSink, MemorySink, RecordSink, RowLayout, SampleRecord, SinkError};
pub use trace::SimulationReport;
