// Integration tests for AODV over the simulation host
//
// Expanding-ring discovery along a chain, reverse-path replies and
// link-loss detection through the periodic neighbour accounting.

use manet_core::{Aodv, NetAddress, SimConfig, Simulation};
use std::time::Duration;

fn chain(size: usize) -> Simulation<Aodv> {
    manet_core::init_logging("warn");
    let mut sim = Simulation::new(size, SimConfig::default(), Aodv::new);
    sim.connect_chain();
    sim.start();
    sim.run_for(Duration::from_millis(1));
    sim
}

fn addr(n: u32) -> NetAddress {
    NetAddress::from_index(n)
}

#[test]
fn test_discovery_along_chain_delivers_data() -> anyhow::Result<()> {
    let mut sim = chain(4);
    sim.send_data(0, addr(4), b"hello".to_vec())?;
    assert!(sim.engine(0).is_discovering(&addr(4)));
    assert_eq!(sim.engine(0).queued(), 1);

    sim.run_for(Duration::from_secs(10));

    let delivered = &sim.node(3).delivered;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].src, addr(1));
    assert_eq!(sim.engine(0).queued(), 0);
    assert!(sim.engine(0).has_route(&addr(4)));
    assert!(!sim.engine(0).is_discovering(&addr(4)));
    assert_eq!(sim.engine(0).stats().rreq_succeeded, 1);
    Ok(())
}

#[test]
fn test_expanding_ring_request_counts() -> anyhow::Result<()> {
    let mut sim = chain(4);
    sim.send_data(0, addr(4), b"ring".to_vec())?;
    sim.run_for(Duration::from_secs(10));

    // First ring (ttl 1) only reaches B; the retry reaches D
    let rreqs: Vec<u64> = (0..4).map(|i| sim.engine(i).stats().send.rreq).collect();
    assert_eq!(rreqs, vec![2, 1, 1, 0]);

    let replies: u64 = (0..4).map(|i| sim.engine(i).stats().rrep_originated).sum();
    assert_eq!(replies, 1);
    assert_eq!(sim.engine(3).stats().rrep_originated, 1);
    Ok(())
}

#[test]
fn test_second_packet_uses_cached_route() -> anyhow::Result<()> {
    let mut sim = chain(3);
    sim.send_data(0, addr(3), b"one".to_vec())?;
    sim.run_for(Duration::from_secs(10));
    let before = sim.engine(0).stats().send.rreq;

    sim.send_data(0, addr(3), b"two".to_vec())?;
    assert!(!sim.engine(0).is_discovering(&addr(3)));
    sim.run_for(Duration::from_secs(1));

    assert_eq!(sim.node(2).delivered.len(), 2);
    assert_eq!(sim.engine(0).stats().send.rreq, before);
    Ok(())
}

#[test]
fn test_neighbour_destination_found_on_first_ring() -> anyhow::Result<()> {
    let mut sim = chain(2);
    sim.send_data(0, addr(2), b"near".to_vec())?;
    sim.run_for(Duration::from_secs(1));

    assert_eq!(sim.node(1).delivered.len(), 1);
    assert_eq!(sim.engine(0).stats().send.rreq, 1);
    Ok(())
}

#[test]
fn test_link_loss_invalidates_route_at_originator() -> anyhow::Result<()> {
    let mut sim = chain(4);
    sim.send_data(0, addr(4), b"before".to_vec())?;
    sim.run_for(Duration::from_secs(10));
    assert!(sim.engine(0).has_route(&addr(4)));

    sim.link_down(1, 2);
    sim.run_for(Duration::from_secs(200));

    assert!(!sim.engine(0).has_route(&addr(4)));
    let errors: u64 = (0..4).map(|i| sim.engine(i).stats().send.rerr).sum();
    assert!(errors > 0);

    sim.send_data(0, addr(4), b"after".to_vec())?;
    assert!(sim.engine(0).is_discovering(&addr(4)));
    Ok(())
}

#[test]
fn test_unreachable_destination_is_never_delivered() -> anyhow::Result<()> {
    let mut sim = chain(3);
    sim.send_data(0, addr(9), b"nowhere".to_vec())?;
    sim.run_for(Duration::from_secs(60));

    assert!((0..3).all(|i| sim.node(i).delivered.is_empty()));
    assert!(!sim.engine(0).has_route(&addr(9)));
    Ok(())
}

