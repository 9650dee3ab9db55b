//! Destinations for sample records.

use csv::{QuoteStyle, Writer, WriterBuilder};
use rxmeter_abstract::EntityId;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// One row of the throughput time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    pub time_s: f64,
    pub entity: EntityId,
    pub rate_kbps: f64,
    /// x coordinate of the tracked mobile node, when there is one
    pub position: f64,
}

/// Column order and the fixed per-run values that fill the metadata columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RowLayout {
    Track {
        mode_label: String,
        stations: u32,
        phy_name: String,
        run: u32,
    },
    Chain {
        transport: String,
        run: u32,
        distance_m: f64,
        hop_num: u32,
    },
}

impl RowLayout {
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            RowLayout::Track { .. } => &[
                "Second",
                "Station",
                "Rate",
                "Distance",
                "Phyrate",
                "NumberOfStations",
                "phy",
                "Run",
            ],
            RowLayout::Chain { .. } => &[
                "SimulationSecond",
                "ReceiveRate",
                "TransportProtocol",
                "Run",
                "Distance",
                "HopNum",
            ],
        }
    }

    pub fn fields(&self, record: &SampleRecord) -> Vec<String> {
        match self {
            RowLayout::Track {
                mode_label,
                stations,
                phy_name,
                run,
            } => vec![
                record.time_s.to_string(),
                record.entity.to_string(),
                record.rate_kbps.to_string(),
                record.position.to_string(),
                mode_label.clone(),
                stations.to_string(),
                phy_name.clone(),
                run.to_string(),
            ],
            RowLayout::Chain {
                transport,
                run,
                distance_m,
                hop_num,
            } => vec![
                record.time_s.to_string(),
                record.rate_kbps.to_string(),
                transport.clone(),
                run.to_string(),
                distance_m.to_string(),
                hop_num.to_string(),
            ],
        }
    }
}

pub trait RecordSink {
    fn write_sample(&mut self, record: &SampleRecord) -> SinkResult<()>;

    /// Flush buffered rows. Idempotent.
    fn finish(&mut self) -> SinkResult<()>;
}

/// Writes rows as CSV; label columns come out quoted.
pub struct CsvSink<W: io::Write = File> {
    writer: Writer<W>,
    layout: RowLayout,
    finished: bool,
}

impl CsvSink<File> {
    /// Create (truncating) `path` and write the header row.
    pub fn create(path: &Path, layout: RowLayout) -> SinkResult<Self> {
        let writer = Self::builder().from_path(path)?;
        Self::with_header(writer, layout)
    }
}

impl<W: io::Write> CsvSink<W> {
    pub fn from_writer(inner: W, layout: RowLayout) -> SinkResult<Self> {
        let writer = Self::builder().from_writer(inner);
        Self::with_header(writer, layout)
    }

    fn builder() -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder.quote_style(QuoteStyle::NonNumeric);
        builder
    }

    fn with_header(mut writer: Writer<W>, layout: RowLayout) -> SinkResult<Self> {
        writer.write_record(layout.header())?;
        Ok(Self {
            writer,
            layout,
            finished: false,
        })
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> SinkResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

impl<W: io::Write> RecordSink for CsvSink<W> {
    fn write_sample(&mut self, record: &SampleRecord) -> SinkResult<()> {
        self.writer.write_record(self.layout.fields(record))?;
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<SampleRecord>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows_for(&self, entity: EntityId) -> impl Iterator<Item = &SampleRecord> {
        self.records.iter().filter(move |r| r.entity == entity)
    }
}

impl RecordSink for MemorySink {
    fn write_sample(&mut self, record: &SampleRecord) -> SinkResult<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<()> {
        self.finished = true;
        Ok(())
    }
}
