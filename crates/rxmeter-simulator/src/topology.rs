//! The two scenario layouts: a tram passing trackside stations and a static relay chain.
//!
//! [`describe`] fixes everything known before the run starts (file name, row layout,
//! stop time). [`populate`] then places the nodes and the traffic source on a
//! [`Simulator`], drawing position jitter from the run's generator.

use crate::engine::{Destination, Simulator, TrafficSource};
use crate::mobility::Mobility;
use crate::sampler::PositionSource;
use crate::sink::RowLayout;
use rand::Rng;
use rxmeter_abstract::{
    ConfigResult, EntityId, NodeId, RateSelection, SimObserver, SimTime, Topology, Vector3,
};
use tracing::debug;

/// The tram is always the first node of a track layout.
pub const TRAM: NodeId = NodeId(0);

/// Everything the runner needs to know about a layout before it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyPlan {
    pub csv_name: String,
    pub layout: RowLayout,
    pub position: PositionSource,
    pub report_aggregate: bool,
    pub stop_at: SimTime,
    /// Entities bound to receive sockets, in ascending order
    pub entities: Vec<EntityId>,
}

pub fn describe(
    topology: &Topology,
    rate: &RateSelection,
    run: u32,
) -> ConfigResult<TopologyPlan> {
    topology.validate()?;
    let plan = match topology {
        Topology::Track {
            sta_num,
            track_length_m,
            train_speed_mps,
        } => TopologyPlan {
            csv_name: format!(
                "expose_phyrate-{}-stations-{}-run-{}.csv",
                rate.phy_name(),
                sta_num,
                run
            ),
            layout: RowLayout::Track {
                mode_label: rate.mode_label().to_string(),
                stations: *sta_num,
                phy_name: rate.phy_name().to_string(),
                run,
            },
            position: PositionSource::Node(TRAM),
            report_aggregate: true,
            stop_at: SimTime::from_secs_f64(track_length_m / train_speed_mps + 1.0),
            entities: (0..*sta_num).map(EntityId::station).collect(),
        },
        Topology::Chain {
            hop_num,
            distance_m,
            total_s,
            transport,
            csv_base,
            ..
        } => TopologyPlan {
            csv_name: format!("{csv_base}-{transport}-run-{run}.csv"),
            layout: RowLayout::Chain {
                transport: transport.clone(),
                run,
                distance_m: *distance_m,
                hop_num: *hop_num,
            },
            position: PositionSource::Fixed(*distance_m),
            report_aggregate: false,
            stop_at: SimTime::from_secs_f64(*total_s),
            entities: vec![EntityId::station(0)],
        },
    };
    Ok(plan)
}

/// Add the layout's nodes, receive sockets and traffic source to `sim`.
pub fn populate<O: SimObserver>(
    sim: &mut Simulator<O>,
    topology: &Topology,
    rate: &RateSelection,
) -> ConfigResult<()> {
    topology.validate()?;
    match topology {
        Topology::Track {
            sta_num,
            track_length_m,
            train_speed_mps,
        } => populate_track(sim, *sta_num, *track_length_m, *train_speed_mps, rate),
        Topology::Chain {
            node_count,
            hop_num,
            distance_m,
            start_s,
            total_s,
            rate_mbps,
            ..
        } => {
            let chain = ChainParams {
                node_count: *node_count,
                hop_num: *hop_num,
                distance_m: *distance_m,
                start_s: *start_s,
                total_s: *total_s,
                rate_bps: rate_mbps.saturating_mul(1_000_000),
            };
            populate_chain(sim, &chain);
        }
    }
    Ok(())
}

fn populate_track<O: SimObserver>(
    sim: &mut Simulator<O>,
    sta_num: u32,
    track_length_m: f64,
    train_speed_mps: f64,
    rate: &RateSelection,
) {
    let tram = sim.add_node(
        "tram",
        Mobility::ConstantVelocity {
            origin: Vector3::ZERO,
            velocity: Vector3::on_x(train_speed_mps),
        },
    );
    debug_assert_eq!(tram, TRAM);

    let spacing = track_length_m / f64::from(sta_num - 1);
    let mut stations = Vec::with_capacity(sta_num as usize);
    for i in 0..sta_num {
        let x = f64::from(i) * spacing + sim.rng_mut().random_range(0.0..0.1);
        let node = sim.add_node(
            format!("sta{}", i + 1),
            Mobility::ConstantPosition(Vector3::on_x(x)),
        );
        sim.bind_sink(node, EntityId::station(i));
        stations.push(node);
        debug!("station {} at x={:.3}", EntityId::station(i), x);
    }

    let destination = match rate {
        RateSelection::Fixed(_) => Destination::Broadcast,
        RateSelection::Adaptive => Destination::Nearest(stations),
    };
    let packet_size = sim.config().packet_size;
    sim.add_source(TrafficSource {
        node: tram,
        destination,
        rate_bps: rate.offered_load_bps(),
        packet_size,
        start: SimTime::ZERO,
        stop: SimTime::from_secs_f64(track_length_m / train_speed_mps),
    });
}

struct ChainParams {
    node_count: u32,
    hop_num: u32,
    distance_m: f64,
    start_s: f64,
    total_s: f64,
    rate_bps: u64,
}

fn populate_chain<O: SimObserver>(sim: &mut Simulator<O>, chain: &ChainParams) {
    let mut nodes = Vec::with_capacity(chain.node_count as usize);
    for i in 0..chain.node_count {
        let jitter = sim.rng_mut().random_range(-0.1..0.1);
        let x = f64::from(i) * chain.distance_m + jitter;
        nodes.push(sim.add_node(
            format!("n{i}"),
            Mobility::ConstantPosition(Vector3::on_x(x)),
        ));
    }

    sim.bind_sink(nodes[0], EntityId::station(0));

    // hop_num - 1, ..., 0
    let path: Vec<NodeId> = nodes[..chain.hop_num as usize].iter().rev().copied().collect();
    let packet_size = sim.config().packet_size;
    sim.add_source(TrafficSource {
        node: nodes[chain.hop_num as usize],
        destination: Destination::Route(path),
        rate_bps: chain.rate_bps,
        packet_size,
        start: SimTime::from_secs_f64(chain.start_s),
        stop: SimTime::from_secs_f64(chain.total_s),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxmeter_abstract::{ConfigError, Delivery, SimConfig, SystemContext, WifiMode};

    struct Idle;

    impl SimObserver for Idle {
        fn on_receive(&mut self, _ctx: &mut dyn SystemContext, _delivery: &Delivery) {}
        fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {}
    }

    fn fixed_54() -> RateSelection {
        RateSelection::Fixed(WifiMode::by_name("OfdmRate54Mbps").unwrap())
    }

    #[test]
    fn track_plan_names_file_and_entities() {
        let plan = describe(&Topology::track(3), &fixed_54(), 2).unwrap();

        assert_eq!(plan.csv_name, "expose_phyrate-OfdmRate54Mbps-stations-3-run-2.csv");
        assert_eq!(plan.entities, vec![EntityId(1), EntityId(2), EntityId(3)]);
        assert_eq!(plan.stop_at, SimTime::from_secs(251));
        assert!(plan.report_aggregate);
        assert_eq!(plan.position, PositionSource::Node(TRAM));
    }

    #[test]
    fn track_places_stations_along_the_line() {
        let mut sim = Simulator::new(SimConfig::default(), 7, Idle);
        populate(&mut sim, &Topology::track(3), &fixed_54()).unwrap();

        assert_eq!(sim.node_name(TRAM), Some("tram"));
        for (i, expected) in [0.0, 5000.0, 10000.0].into_iter().enumerate() {
            let x = sim.node_position(NodeId(i as u32 + 1)).unwrap().x;
            assert!((expected..expected + 0.1).contains(&x), "station {i} at {x}");
        }
        // the tram transmits from t = 0
        assert_eq!(sim.peek_next_event_time(), Some(SimTime::ZERO));
    }

    #[test]
    fn adaptive_track_uses_sentinel_names() {
        let plan = describe(&Topology::track(2), &RateSelection::Adaptive, 1).unwrap();

        assert_eq!(plan.csv_name, "expose_phyrate-minstrel-stations-2-run-1.csv");
        assert_eq!(
            plan.layout,
            RowLayout::Track {
                mode_label: "OfdmRate54Mbps".to_string(),
                stations: 2,
                phy_name: "minstrel".to_string(),
                run: 1,
            }
        );
    }

    #[test]
    fn chain_routes_towards_node_zero() {
        let topology = Topology::chain(12.5, 3);
        let plan = describe(&topology, &fixed_54(), 4).unwrap();
        assert_eq!(plan.csv_name, "benchmark-olsr-udp-run-4.csv");
        assert_eq!(plan.entities, vec![EntityId(1)]);
        assert_eq!(plan.stop_at, SimTime::from_secs(300));
        assert!(!plan.report_aggregate);

        let mut sim = Simulator::new(SimConfig::default(), 7, Idle);
        populate(&mut sim, &topology, &fixed_54()).unwrap();
        let x3 = sim.node_position(NodeId(3)).unwrap().x;
        assert!((x3 - 37.5).abs() <= 0.1);
        // first packet leaves at start_s
        assert_eq!(sim.peek_next_event_time(), Some(SimTime::from_secs(60)));
    }

    #[test]
    fn chain_rejects_hop_past_last_node() {
        let mut topology = Topology::chain(1.0, 3);
        if let Topology::Chain { hop_num, .. } = &mut topology {
            *hop_num = 4;
        }
        let err = describe(&topology, &fixed_54(), 1).unwrap_err();
        assert_eq!(
            err,
            ConfigError::HopNum {
                hop_num: 4,
                node_count: 4
            }
        );
    }
}
