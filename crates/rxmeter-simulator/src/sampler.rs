//! Periodic per-entity receive-throughput sampling.

use crate::dedup::DuplicateWindow;
use crate::sink::{RecordSink, SampleRecord, SinkError, SinkResult};
use rxmeter_abstract::{Delivery, EntityId, NodeId, SimObserver, SimTime, SystemContext};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Timer id the sampler arms for its own tick.
pub const SAMPLE_TIMER: u32 = 0;

/// Running byte total of one entity plus the value seen at the previous tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounter {
    pub total: u64,
    pub previous: u64,
}

/// Where the position column comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionSource {
    /// x coordinate of a node, read at each tick
    Node(NodeId),
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Active,
    Cancelled,
}

pub struct ThroughputSampler<S: RecordSink> {
    interval: SimTime,
    counters: BTreeMap<EntityId, ByteCounter>,
    window: DuplicateWindow,
    report_aggregate: bool,
    position: PositionSource,
    sink: S,
    state: SamplerState,
    packets_received: u64,
    duplicates: u64,
    rows_written: u64,
    rows_per_entity: BTreeMap<EntityId, u64>,
    ticks: u64,
    last_error: Option<SinkError>,
}

impl<S: RecordSink> ThroughputSampler<S> {
    pub fn new(sink: S, interval: SimTime, dup_window: usize) -> Self {
        Self {
            interval,
            counters: BTreeMap::new(),
            window: DuplicateWindow::new(dup_window),
            report_aggregate: true,
            position: PositionSource::Fixed(0.0),
            sink,
            state: SamplerState::Active,
            packets_received: 0,
            duplicates: 0,
            rows_written: 0,
            rows_per_entity: BTreeMap::new(),
            ticks: 0,
            last_error: None,
        }
    }

    pub fn with_aggregate_rows(mut self, enabled: bool) -> Self {
        self.report_aggregate = enabled;
        self
    }

    pub fn with_position(mut self, position: PositionSource) -> Self {
        self.position = position;
        self
    }

    /// Start tracking `entity` so it is reported once it receives bytes.
    pub fn track(&mut self, entity: EntityId) {
        self.counters.entry(entity).or_default();
    }

    pub fn on_packet_received(&mut self, entity: EntityId, size: u32, packet_id: u64) {
        let size = u64::from(size);
        self.counters.entry(entity).or_default().total += size;
        self.packets_received += 1;
        if self.window.insert(packet_id) {
            self.counters.entry(EntityId::AGGREGATE).or_default().total += size;
        } else {
            self.duplicates += 1;
            debug!("duplicate packet {} at entity {}", packet_id, entity);
        }
    }

    /// Append one row per entity with bytes, then roll the baselines forward.
    /// Returns the number of rows written. On a sink error the rows already
    /// written in this tick stay counted and later entities keep their baselines.
    pub fn on_sample_tick(&mut self, now: SimTime, position: f64) -> SinkResult<usize> {
        let interval_s = self.interval.as_secs_f64();
        let mut written = 0;
        let mut outcome = Ok(());
        for (entity, counter) in self.counters.iter_mut() {
            if counter.total == 0 {
                continue;
            }
            if entity.is_aggregate() && !self.report_aggregate {
                counter.previous = counter.total;
                continue;
            }
            let delta = counter.total - counter.previous;
            let record = SampleRecord {
                time_s: now.as_secs_f64(),
                entity: *entity,
                rate_kbps: kbps(delta, interval_s),
                position,
            };
            if let Err(e) = self.sink.write_sample(&record) {
                outcome = Err(e);
                break;
            }
            counter.previous = counter.total;
            *self.rows_per_entity.entry(*entity).or_default() += 1;
            written += 1;
        }
        self.ticks += 1;
        self.rows_written += written as u64;
        outcome.map(|()| written)
    }

    /// Stop the periodic tick. No further rows are written.
    pub fn cancel(&mut self, ctx: &mut dyn SystemContext) {
        if self.state == SamplerState::Active {
            ctx.cancel_timer(SAMPLE_TIMER);
            self.state = SamplerState::Cancelled;
        }
    }

    fn tick(&mut self, ctx: &mut dyn SystemContext) {
        let position = match self.position {
            PositionSource::Node(node) => ctx.position(node).map(|p| p.x).unwrap_or(0.0),
            PositionSource::Fixed(value) => value,
        };
        let aggregate_before = self.delta(EntityId::AGGREGATE);
        let result = self.on_sample_tick(ctx.now(), position);
        match result {
            Ok(rows) => {
                ctx.record_metric(
                    "aggregate_kbps",
                    kbps(aggregate_before, self.interval.as_secs_f64()),
                );
                debug!("tick at {} wrote {} rows", ctx.now(), rows);
            }
            Err(e) => {
                warn!("sample sink failed at {}: {}", ctx.now(), e);
                self.store_err(e);
                self.cancel(ctx);
            }
        }
    }

    fn delta(&self, entity: EntityId) -> u64 {
        self.counters
            .get(&entity)
            .map(|c| c.total - c.previous)
            .unwrap_or(0)
    }

    fn store_err(&mut self, e: SinkError) {
        // Keep only the first error.
        if self.last_error.is_none() {
            self.last_error = Some(e);
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn counter(&self, entity: EntityId) -> ByteCounter {
        self.counters.get(&entity).copied().unwrap_or_default()
    }

    pub fn total_bytes(&self, entity: EntityId) -> u64 {
        self.counter(entity).total
    }

    pub fn unique_bytes(&self) -> u64 {
        self.total_bytes(EntityId::AGGREGATE)
    }

    /// Cumulative totals of every entity seen so far, aggregate included.
    pub fn totals(&self) -> BTreeMap<EntityId, u64> {
        self.counters.iter().map(|(e, c)| (*e, c.total)).collect()
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Rows written so far for each entity that appeared in the output.
    pub fn rows_per_entity(&self) -> &BTreeMap<EntityId, u64> {
        &self.rows_per_entity
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Take the stored sink error (if any) after the run returns.
    pub fn take_error(&mut self) -> Option<SinkError> {
        self.last_error.take()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn kbps(delta_bytes: u64, interval_s: f64) -> f64 {
    (delta_bytes as f64 * 8.0) / 1000.0 / interval_s
}

impl<S: RecordSink> SimObserver for ThroughputSampler<S> {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.tick(ctx);
        if self.state == SamplerState::Active {
            ctx.start_timer(self.interval, SAMPLE_TIMER);
        }
    }

    fn on_receive(&mut self, _ctx: &mut dyn SystemContext, delivery: &Delivery) {
        self.on_packet_received(delivery.entity, delivery.packet.size, delivery.packet.uid);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        if timer_id != SAMPLE_TIMER || self.state != SamplerState::Active {
            return;
        }
        self.tick(ctx);
        if self.state == SamplerState::Active {
            ctx.start_timer(self.interval, SAMPLE_TIMER);
        }
    }

    fn on_stop(&mut self, ctx: &mut dyn SystemContext) {
        self.cancel(ctx);
        if let Err(e) = self.sink.finish() {
            warn!("failed to finish sample sink: {}", e);
            self.store_err(e);
        }
        ctx.log(&format!(
            "sampler stopped after {} ticks, {} rows, {} packets ({} duplicates)",
            self.ticks, self.rows_written, self.packets_received, self.duplicates
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use rxmeter_abstract::{Packet, Vector3};
    use std::io;

    /// Context that only records what the sampler asked for.
    #[derive(Default)]
    struct FakeContext {
        now: SimTime,
        started: Vec<(SimTime, u32)>,
        cancelled: Vec<u32>,
        metrics: Vec<(String, f64)>,
        tram_x: f64,
    }

    impl SystemContext for FakeContext {
        fn now(&self) -> SimTime {
            self.now
        }
        fn start_timer(&mut self, delay: SimTime, timer_id: u32) {
            self.started.push((delay, timer_id));
        }
        fn cancel_timer(&mut self, timer_id: u32) {
            self.cancelled.push(timer_id);
        }
        fn position(&self, _node: NodeId) -> Option<Vector3> {
            Some(Vector3::on_x(self.tram_x))
        }
        fn log(&mut self, _message: &str) {}
        fn record_metric(&mut self, name: &str, value: f64) {
            self.metrics.push((name.to_string(), value));
        }
    }

    struct BrokenSink;

    impl RecordSink for BrokenSink {
        fn write_sample(&mut self, _record: &SampleRecord) -> SinkResult<()> {
            Err(io::Error::other("disk full").into())
        }
        fn finish(&mut self) -> SinkResult<()> {
            Ok(())
        }
    }

    fn sampler() -> ThroughputSampler<MemorySink> {
        ThroughputSampler::new(MemorySink::new(), SimTime::from_secs(1), 1000)
    }

    const A: EntityId = EntityId(1);
    const B: EntityId = EntityId(2);
    const C: EntityId = EntityId(3);

    #[test]
    fn cumulative_counter_is_exact_sum_for_distinct_ids() {
        let mut s = sampler();
        let sizes = [1472u32, 64, 1, 900, 1472];
        for (uid, size) in sizes.iter().enumerate() {
            s.on_packet_received(A, *size, uid as u64);
        }
        let expected: u64 = sizes.iter().map(|s| u64::from(*s)).sum();
        assert_eq!(s.total_bytes(A), expected);
        assert_eq!(s.unique_bytes(), expected);
        assert_eq!(s.duplicates(), 0);
    }

    #[test]
    fn duplicate_counts_raw_bytes_twice_and_unique_once() {
        let mut s = sampler();
        s.on_packet_received(A, 100, 7);
        s.on_packet_received(A, 100, 7);
        assert_eq!(s.total_bytes(A), 200);
        assert_eq!(s.unique_bytes(), 100);
        assert_eq!(s.duplicates(), 1);
        assert_eq!(s.packets_received(), 2);
    }

    #[test]
    fn same_packet_at_two_stations_is_unique_once() {
        let mut s = sampler();
        s.on_packet_received(A, 1472, 42);
        s.on_packet_received(B, 1472, 42);
        assert_eq!(s.total_bytes(A), 1472);
        assert_eq!(s.total_bytes(B), 1472);
        assert_eq!(s.unique_bytes(), 1472);
    }

    #[test]
    fn aliasing_ids_are_not_treated_as_duplicates() {
        let mut s = ThroughputSampler::new(MemorySink::new(), SimTime::from_secs(1), 10);
        s.on_packet_received(A, 50, 4);
        s.on_packet_received(A, 70, 14);
        // a false negative by construction: both count as unique
        assert_eq!(s.unique_bytes(), 120);
        assert_eq!(s.duplicates(), 0);
    }

    #[test]
    fn tick_emits_deltas_not_totals() {
        let mut s = sampler().with_aggregate_rows(false);
        s.track(A);
        // cumulative 0, 100, 250 at three consecutive ticks
        s.on_sample_tick(SimTime::from_secs(0), 0.0).unwrap();
        s.on_packet_received(A, 100, 1);
        s.on_sample_tick(SimTime::from_secs(1), 0.0).unwrap();
        s.on_packet_received(A, 150, 2);
        s.on_sample_tick(SimTime::from_secs(2), 0.0).unwrap();

        let rates: Vec<f64> = s.sink().rows_for(A).map(|r| r.rate_kbps).collect();
        assert_eq!(rates, vec![100.0 * 8.0 / 1000.0, 150.0 * 8.0 / 1000.0]);
        assert_eq!(s.counter(A), ByteCounter { total: 250, previous: 250 });
    }

    #[test]
    fn idle_tick_after_traffic_reports_zero_rate() {
        let mut s = sampler().with_aggregate_rows(false);
        s.on_packet_received(A, 500, 1);
        s.on_sample_tick(SimTime::from_secs(1), 0.0).unwrap();
        assert_eq!(s.on_sample_tick(SimTime::from_secs(2), 0.0).unwrap(), 1);
        assert_eq!(s.sink().records[1].rate_kbps, 0.0);
    }

    #[test]
    fn rate_is_normalised_by_interval() {
        let mut s = ThroughputSampler::new(MemorySink::new(), SimTime::from_millis(500), 16)
            .with_aggregate_rows(false);
        s.on_packet_received(A, 1000, 1);
        s.on_sample_tick(SimTime::from_millis(500), 0.0).unwrap();
        assert_eq!(s.sink().records[0].rate_kbps, 16.0);
    }

    #[test]
    fn one_tick_reports_only_entities_with_bytes() {
        let mut s = sampler().with_aggregate_rows(false);
        s.track(A);
        s.track(B);
        s.track(C);
        s.on_packet_received(A, 1000, 1);
        s.on_packet_received(A, 1000, 1);
        s.on_packet_received(B, 500, 2);

        let rows = s.on_sample_tick(SimTime::from_secs(1), 12.0).unwrap();
        assert_eq!(rows, 2);

        let records = &s.sink().records;
        assert_eq!(records[0].entity, A);
        // raw bytes always count, duplicate included
        assert_eq!(records[0].rate_kbps, 2000.0 * 8.0 / 1000.0);
        assert_eq!(records[1].entity, B);
        assert_eq!(records[1].rate_kbps, 500.0 * 8.0 / 1000.0);
        assert_eq!(records[1].position, 12.0);
        assert_eq!(s.sink().rows_for(C).count(), 0);
        assert_eq!(s.unique_bytes(), 1500);
    }

    #[test]
    fn aggregate_row_comes_first_when_enabled() {
        let mut s = sampler();
        s.on_packet_received(B, 1000, 9);
        s.on_packet_received(A, 1000, 9);
        s.on_sample_tick(SimTime::from_secs(1), 0.0).unwrap();

        let entities: Vec<EntityId> = s.sink().records.iter().map(|r| r.entity).collect();
        assert_eq!(entities, vec![EntityId::AGGREGATE, A, B]);
        assert_eq!(s.sink().records[0].rate_kbps, 8.0);
    }

    #[test]
    fn observer_ticks_at_start_and_rearms() {
        let mut s = sampler();
        let mut ctx = FakeContext {
            tram_x: 80.0,
            ..Default::default()
        };
        s.init(&mut ctx);
        assert_eq!(ctx.started, vec![(SimTime::from_secs(1), SAMPLE_TIMER)]);

        let delivery = Delivery {
            node: NodeId(1),
            entity: A,
            packet: Packet::new(3, 1472, NodeId(0)),
        };
        s.on_receive(&mut ctx, &delivery);
        ctx.now = SimTime::from_secs(1);
        s.on_timer(&mut ctx, SAMPLE_TIMER);

        assert_eq!(ctx.started.len(), 2);
        assert_eq!(s.ticks(), 2);
        assert_eq!(s.sink().rows_for(A).next().unwrap().position, 80.0);
        assert_eq!(ctx.metrics.last().unwrap().0, "aggregate_kbps");
    }

    #[test]
    fn stop_cancels_and_finishes_sink() {
        let mut s = sampler();
        let mut ctx = FakeContext::default();
        s.init(&mut ctx);
        s.on_stop(&mut ctx);

        assert_eq!(ctx.cancelled, vec![SAMPLE_TIMER]);
        assert_eq!(s.state(), SamplerState::Cancelled);
        assert!(s.sink().finished);

        // a late expiry must not produce a tick
        s.on_packet_received(A, 10, 1);
        s.on_timer(&mut ctx, SAMPLE_TIMER);
        assert_eq!(s.ticks(), 1);
        assert!(s.sink().records.is_empty());
    }

    #[test]
    fn sink_failure_is_stored_and_stops_ticking() {
        let mut s = ThroughputSampler::new(BrokenSink, SimTime::from_secs(1), 8);
        let mut ctx = FakeContext::default();
        s.on_packet_received(A, 10, 1);
        s.init(&mut ctx);

        assert_eq!(s.state(), SamplerState::Cancelled);
        assert!(ctx.started.is_empty());
        assert!(matches!(s.take_error(), Some(SinkError::Io(_))));
        assert!(s.take_error().is_none());
    }

    /// Accepts `room` rows, then fails every write.
    #[derive(Default)]
    struct FillingSink {
        room: usize,
        records: Vec<SampleRecord>,
    }

    impl RecordSink for FillingSink {
        fn write_sample(&mut self, record: &SampleRecord) -> SinkResult<()> {
            if self.records.len() == self.room {
                return Err(io::Error::other("disk full").into());
            }
            self.records.push(record.clone());
            Ok(())
        }
        fn finish(&mut self) -> SinkResult<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_tick_counts_rows_already_written() {
        let sink = FillingSink {
            room: 2,
            ..Default::default()
        };
        let mut s = ThroughputSampler::new(sink, SimTime::from_secs(1), 8);
        s.on_packet_received(A, 100, 1);
        s.on_packet_received(B, 200, 2);

        assert!(s.on_sample_tick(SimTime::from_secs(1), 0.0).is_err());
        assert_eq!(s.ticks(), 1);
        assert_eq!(s.rows_written(), 2);
        assert_eq!(s.sink().records.len(), 2);
        // aggregate and A went out; B keeps its old baseline
        assert_eq!(s.counter(A), ByteCounter { total: 100, previous: 100 });
        assert_eq!(s.counter(B), ByteCounter { total: 200, previous: 0 });
        assert_eq!(s.rows_per_entity().get(&A), Some(&1));
        assert_eq!(s.rows_per_entity().get(&B), None);
    }
}
