use crate::channel::Channel;
use crate::mobility::{Mobility, SimNode};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rxmeter_abstract::{
    Delivery, EntityId, NodeId, Packet, SimConfig, SimObserver, SimTime, SystemContext, Vector3,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use tracing::{debug, info};

#[derive(Debug)]
pub enum EventType {
    AppSend {
        source: usize,
    },
    PacketArrival {
        to: NodeId,
        packet: Packet,
    },
    TimerExpiry {
        timer_id: u32,
        generation: u64,
    },
}

#[derive(Debug)]
struct Event {
    time: SimTime,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Where a source's packets go.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// Every bound receive socket within range
    Broadcast,
    /// The closest listed node, if it is within range
    Nearest(Vec<NodeId>),
    /// Hop by hop along the path; only the last node receives
    Route(Vec<NodeId>),
}

/// Constant bit-rate datagram source, active in `[start, stop)`.
#[derive(Debug, Clone)]
pub struct TrafficSource {
    pub node: NodeId,
    pub destination: Destination,
    pub rate_bps: u64,
    pub packet_size: u32,
    pub start: SimTime,
    pub stop: SimTime,
}

impl TrafficSource {
    pub fn packet_interval(&self) -> SimTime {
        let bits = u128::from(self.packet_size) * 8;
        let nanos = bits * 1_000_000_000 / u128::from(self.rate_bps.max(1));
        SimTime::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX).max(1))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub packets_sent: u64,
    pub deliveries: u64,
    pub channel_drops: u64,
    /// Arrivals at a node without a bound receive socket
    pub unbound_arrivals: u64,
}

/// Actions buffered during an observer callback
#[derive(Default)]
struct ActionBuffer {
    timers_start: Vec<(SimTime, u32)>, // (delay, id)
    timers_cancel: Vec<u32>,
    logs: Vec<String>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to the observer
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: SimTime,
    nodes: &'a [SimNode],
}

impl<'a> SystemContext for ScopedContext<'a> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn start_timer(&mut self, delay: SimTime, timer_id: u32) {
        self.buffer.timers_start.push((delay, timer_id));
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.buffer.timers_cancel.push(timer_id);
    }

    fn position(&self, node: NodeId) -> Option<Vector3> {
        self.nodes
            .get(node.index())
            .map(|n| n.mobility.position_at(self.now))
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

/// Single-threaded discrete-event engine driving one observer.
pub struct Simulator<O: SimObserver> {
    time: SimTime,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    rng: StdRng,
    channel: Channel,

    nodes: Vec<SimNode>,
    sources: Vec<TrafficSource>,
    /// Receive sockets: node -> entity credited with its bytes
    sinks: BTreeMap<NodeId, EntityId>,

    observer: O,
    /// Stop time plus the first event id queued after it was set; events
    /// at exactly the stop time only run when queued before the stop.
    stop_at: Option<(SimTime, u64)>,
    started: bool,
    stopped: bool,

    next_packet_uid: u64,
    stats: EngineStats,

    /// Time series recorded via `SystemContext::record_metric`
    /// Key: metric name, Value: Vec<(time, value)>
    pub metrics: HashMap<String, Vec<(SimTime, f64)>>,

    /// Timer generations to handle cancellation.
    /// Key: timer_id, Value: generation counter
    timer_generations: HashMap<u32, u64>,
}

impl<O: SimObserver> Simulator<O> {
    pub fn new(config: SimConfig, seed: u64, observer: O) -> Self {
        let channel = Channel::from_config(&config);
        Self {
            time: SimTime::ZERO,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            rng: StdRng::seed_from_u64(seed),
            channel,
            nodes: Vec::new(),
            sources: Vec::new(),
            sinks: BTreeMap::new(),
            observer,
            stop_at: None,
            started: false,
            stopped: false,
            next_packet_uid: 0,
            stats: EngineStats::default(),
            metrics: HashMap::new(),
            timer_generations: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The run's generator, shared by layout jitter and the channel.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn add_node(&mut self, name: impl Into<String>, mobility: Mobility) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SimNode {
            name: name.into(),
            mobility,
        });
        id
    }

    /// Bind a receive socket on `node`; its bytes are credited to `entity`.
    pub fn bind_sink(&mut self, node: NodeId, entity: EntityId) {
        self.sinks.insert(node, entity);
    }

    pub fn add_source(&mut self, source: TrafficSource) {
        let index = self.sources.len();
        if source.start < source.stop {
            self.push_event(source.start, EventType::AppSend { source: index });
        }
        self.sources.push(source);
    }

    /// Events later than `time` never fire, and neither do events at `time`
    /// queued after this call.
    pub fn stop_at(&mut self, time: SimTime) {
        self.stop_at = Some((time, self.event_id_counter));
    }

    pub fn node_position(&self, node: NodeId) -> Option<Vector3> {
        self.nodes
            .get(node.index())
            .map(|n| n.mobility.position_at(self.time))
    }

    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.index()).map(|n| n.name.as_str())
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    pub fn peek_next_event_time(&self) -> Option<SimTime> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> SimTime {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    fn push_event(&mut self, time: SimTime, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    fn with_observer<F>(&mut self, f: F)
    where
        F: FnOnce(&mut O, &mut dyn SystemContext),
    {
        let mut buffer = ActionBuffer::default();
        {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
                nodes: &self.nodes,
            };
            f(&mut self.observer, &mut ctx);
        }
        self.process_actions(buffer);
    }

    pub fn init(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.with_observer(|observer, ctx| observer.init(ctx));
    }

    /// Process the next event. Returns false once the queue is empty, the
    /// next event lies beyond the stop time, or the engine has stopped.
    pub fn step(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        let (next_time, next_id) = match self.event_queue.peek() {
            Some(e) => (e.time, e.id),
            None => return false,
        };
        if let Some((stop, first_after)) = self.stop_at
            && (next_time > stop || (next_time == stop && next_id >= first_after))
        {
            return false;
        }
        let Some(event) = self.event_queue.pop() else {
            return false;
        };

        self.time = event.time;

        match event.event_type {
            EventType::AppSend { source } => self.send_from(source),
            EventType::PacketArrival { to, packet } => {
                let Some(entity) = self.sinks.get(&to).copied() else {
                    self.stats.unbound_arrivals += 1;
                    return true;
                };
                self.stats.deliveries += 1;
                let delivery = Delivery {
                    node: to,
                    entity,
                    packet,
                };
                self.with_observer(|observer, ctx| observer.on_receive(ctx, &delivery));
            }
            EventType::TimerExpiry {
                timer_id,
                generation,
            } => {
                // Check if this timer event is still valid by comparing generations
                match self.timer_generations.get(&timer_id) {
                    Some(&current) if current == generation => {}
                    Some(_) => {
                        debug!("Skipping cancelled timer event for timer_id={}", timer_id);
                        return true;
                    }
                    None => {
                        debug!("Skipping orphaned timer event for timer_id={}", timer_id);
                        return true;
                    }
                }
                self.with_observer(|observer, ctx| observer.on_timer(ctx, timer_id));
            }
        }
        true
    }

    /// Notify the observer, apply its last actions and drop every pending event.
    pub fn finish(&mut self) {
        if self.stopped {
            return;
        }
        if let Some((stop, _)) = self.stop_at {
            self.time = self.time.max(stop);
        }
        self.with_observer(|observer, ctx| observer.on_stop(ctx));
        self.stopped = true;
        let discarded = self.event_queue.len();
        self.event_queue.clear();
        info!(
            "Simulation stopped at {} ({} pending events discarded)",
            self.time, discarded
        );
    }

    /// Run until the stop time or until no events remain.
    /// A self-rearming observer never drains the queue, so set `stop_at` first.
    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {}
        self.finish();
    }

    fn next_uid(&mut self) -> u64 {
        let uid = self.next_packet_uid;
        self.next_packet_uid += 1;
        uid
    }

    fn send_from(&mut self, index: usize) {
        let uid = self.next_uid();
        let (source_node, size, next) = {
            let source = &self.sources[index];
            let next = self.time + source.packet_interval();
            (source.node, source.packet_size, (next < source.stop).then_some(next))
        };
        self.stats.packets_sent += 1;

        let (arrivals, drops) = plan_arrivals(
            &self.sources[index],
            &self.nodes,
            &self.sinks,
            &self.channel,
            &mut self.rng,
            self.time,
        );
        self.stats.channel_drops += drops;

        let packet = Packet::new(uid, size, source_node);
        for (to, delay) in arrivals {
            self.push_event(
                self.time + delay,
                EventType::PacketArrival {
                    to,
                    packet: packet.clone(),
                },
            );
        }

        if let Some(next) = next {
            self.push_event(next, EventType::AppSend { source: index });
        }
    }

    fn process_actions(&mut self, buffer: ActionBuffer) {
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            info!("[{}] {}", self.time, log);
        }

        // Handle timer cancellations by incrementing the generation counter
        for timer_id in buffer.timers_cancel {
            let generation = self.timer_generations.entry(timer_id).or_insert(0);
            *generation += 1;
        }

        for (delay, id) in buffer.timers_start {
            let generation = *self.timer_generations.entry(id).or_insert(0);
            self.push_event(
                self.time + delay,
                EventType::TimerExpiry {
                    timer_id: id,
                    generation,
                },
            );
        }
    }
}

/// Decide which nodes receive one packet from `source` and after what delay.
/// Returns the arrivals and the number of hops lost on the channel.
fn plan_arrivals(
    source: &TrafficSource,
    nodes: &[SimNode],
    sinks: &BTreeMap<NodeId, EntityId>,
    channel: &Channel,
    rng: &mut StdRng,
    now: SimTime,
) -> (Vec<(NodeId, SimTime)>, u64) {
    let position = |node: NodeId| {
        nodes
            .get(node.index())
            .map(|n| n.mobility.position_at(now))
    };
    let Some(from) = position(source.node) else {
        return (Vec::new(), 0);
    };

    let mut arrivals = Vec::new();
    let mut drops = 0;
    match &source.destination {
        Destination::Broadcast => {
            for node in sinks.keys().copied().filter(|n| *n != source.node) {
                let Some(to) = position(node) else { continue };
                match channel.transmit(rng, &from, &to) {
                    Some(delay) => arrivals.push((node, delay)),
                    None => drops += 1,
                }
            }
        }
        Destination::Nearest(candidates) => {
            let nearest = candidates
                .iter()
                .filter_map(|n| position(*n).map(|p| (*n, p)))
                .min_by(|(_, a), (_, b)| from.distance(a).total_cmp(&from.distance(b)));
            if let Some((node, to)) = nearest {
                match channel.transmit(rng, &from, &to) {
                    Some(delay) => arrivals.push((node, delay)),
                    None => drops += 1,
                }
            }
        }
        Destination::Route(path) => {
            let mut hop_from = from;
            let mut total = SimTime::ZERO;
            for node in path {
                let Some(to) = position(*node) else {
                    return (arrivals, drops);
                };
                match channel.transmit(rng, &hop_from, &to) {
                    Some(delay) => total += delay,
                    None => return (arrivals, drops + 1),
                }
                hop_from = to;
            }
            if let Some(last) = path.last() {
                arrivals.push((*last, total));
            }
        }
    }
    (arrivals, drops)
}
