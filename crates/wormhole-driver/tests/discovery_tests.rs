//! Topology discovery and PCI enumeration tests

use std::path::Path;
use std::time::Duration;
use wormhole_driver::{
    DeviceManager, EthAddr, EthConfig, SimulatedCluster, TopologyWalker, WormholeDevice,
    WormholeError,
};

fn chip(i: u8) -> EthAddr {
    SimulatedCluster::ring_chip(i)
}

#[test]
fn four_chip_ring() {
    let sim = SimulatedCluster::ring(4);
    let config = EthConfig::default();
    let found = TopologyWalker::new(&sim, &config).discover().unwrap();

    assert_eq!(found.topology.len(), 4);
    assert_eq!(found.visited, 4);
    assert_eq!(found.dropped_pushes, 0);
    assert_eq!(found.dropped_links, 0);
    assert!(!found.truncated);

    for i in 0..4u8 {
        let entry = found.topology.find(&chip(i)).unwrap();
        assert_eq!(entry.link_count(), 2, "chip {i}");

        let next = entry.links().iter().find(|l| l.local_core == 0).unwrap();
        assert_eq!(next.peer, chip((i + 1) % 4));
        assert_eq!(next.remote_core, 8);

        let prev = entry.links().iter().find(|l| l.local_core == 8).unwrap();
        assert_eq!(prev.peer, chip((i + 3) % 4));
        assert_eq!(prev.remote_core, 0);
    }
    assert_eq!(sim.windows_in_use(), 0);
}

#[test]
fn stale_firmware_core_is_skipped() {
    let sim = SimulatedCluster::ring(4);
    sim.set_firmware(chip(2), 0, 0x0600_0000).unwrap();
    let config = EthConfig::default();
    let found = TopologyWalker::new(&sim, &config).discover().unwrap();

    assert_eq!(found.topology.len(), 4);
    let stale = found.topology.find(&chip(2)).unwrap();
    assert_eq!(stale.link_count(), 1);
    assert_eq!(stale.links()[0].local_core, 8);
    assert_eq!(stale.links()[0].peer, chip(1));

    // The other end still reports its side of the link.
    let neighbour = found.topology.find(&chip(3)).unwrap();
    assert!(neighbour.links().iter().any(|l| l.peer == chip(2)));
}

#[test]
fn silent_chip_is_kept_without_links() {
    let sim = SimulatedCluster::ring(4);
    sim.mute_relay(chip(2));
    let config = EthConfig::default().with_response_timeout(Duration::from_millis(2));
    let found = TopologyWalker::new(&sim, &config).discover().unwrap();

    assert_eq!(found.topology.len(), 4);
    assert_eq!(found.topology.find(&chip(2)).unwrap().link_count(), 0);
    assert_eq!(found.topology.find(&chip(1)).unwrap().link_count(), 2);
    assert_eq!(found.topology.find(&chip(3)).unwrap().link_count(), 2);
    assert!(!found.truncated);
}

#[test]
fn full_stack_drops_pushes() {
    let hub = EthAddr::new(0, 0, 0, 0);
    let sim = SimulatedCluster::new(hub);
    for core in 0..3u8 {
        let leaf = EthAddr::new(0, 0, core + 1, 0);
        sim.connect(hub, usize::from(core), leaf, 8).unwrap();
    }

    let config = EthConfig::default().with_max_topology_chips(1);
    let found = TopologyWalker::new(&sim, &config).discover().unwrap();

    assert_eq!(found.visited, 2);
    assert_eq!(found.dropped_pushes, 2);
    assert_eq!(found.topology.len(), 2);
    assert!(found.topology.find(&EthAddr::new(0, 0, 1, 0)).is_some());
    // The hub still records every link it saw.
    assert_eq!(found.topology.find(&hub).unwrap().link_count(), 3);
}

#[test]
fn window_exhaustion_truncates_the_walk() {
    // Enough windows for the local chip's 16 cores and part of the next chip.
    let sim = SimulatedCluster::ring(4).with_acquire_budget(100);
    let config = EthConfig::default();
    let found = TopologyWalker::new(&sim, &config).discover().unwrap();

    assert!(found.truncated);
    assert_eq!(found.visited, 2);
    assert_eq!(found.topology.len(), 3);
    assert_eq!(found.topology.find(&chip(0)).unwrap().link_count(), 2);
    assert_eq!(sim.windows_in_use(), 0);
}

#[test]
fn unreadable_local_chip_is_an_error() {
    let sim = SimulatedCluster::ring(2).with_acquire_budget(0);
    let config = EthConfig::default();
    assert!(matches!(
        TopologyWalker::new(&sim, &config).discover(),
        Err(WormholeError::ContextUnavailable)
    ));
}

#[test]
fn unreservable_stack_is_an_allocation_failure() {
    let sim = SimulatedCluster::ring(2);
    let config = EthConfig::default().with_max_topology_chips(usize::MAX);
    let err = TopologyWalker::new(&sim, &config).discover().unwrap_err();
    assert!(matches!(err, WormholeError::AllocationFailure { .. }));
}

#[test]
fn device_probe_dump() {
    let mut dev = WormholeDevice::with_backend(
        "sim",
        Box::new(SimulatedCluster::ring(2)),
        EthConfig::default(),
    );
    let dump = dev.probe().unwrap().topology.to_string();
    assert_eq!(
        dump,
        "Topology: 2 chip(s)\n\
         [0, 0, 0, 0] (2 links)\n\
         \x20 [0, 0, 0, 0] <-> [0, 0, 1, 0] : 0/8\n\
         \x20 [0, 0, 0, 0] <-> [0, 0, 1, 0] : 8/0\n\
         [0, 0, 1, 0] (2 links)\n\
         \x20 [0, 0, 1, 0] <-> [0, 0, 0, 0] : 0/8\n\
         \x20 [0, 0, 1, 0] <-> [0, 0, 0, 0] : 8/0\n"
    );
}

// ── PCI enumeration over a fake sysfs tree ───────────────────────────────────

fn fake_function(root: &Path, address: &str, vendor: &str, device: &str) {
    let dir = root.join(address);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("vendor"), format!("{vendor}\n")).unwrap();
    std::fs::write(dir.join("device"), format!("{device}\n")).unwrap();
}

#[test]
fn sysfs_enumeration_finds_wormholes_in_address_order() {
    let root = tempfile::tempdir().unwrap();
    fake_function(root.path(), "0000:05:00.0", "0x1e52", "0x401e");
    fake_function(root.path(), "0000:01:00.0", "0x1e52", "0x401e");
    fake_function(root.path(), "0000:02:00.0", "0x1e52", "0xfaca");
    fake_function(root.path(), "0000:03:00.0", "0x8086", "0x401e");
    std::fs::create_dir_all(root.path().join("0000:04:00.0")).unwrap();

    let mgr = DeviceManager::discover_in(root.path()).unwrap();
    assert_eq!(mgr.device_count(), 2);
    assert_eq!(mgr.devices()[0].pcie_address(), "0000:01:00.0");
    assert_eq!(mgr.devices()[1].pcie_address(), "0000:05:00.0");
    assert_eq!(mgr.devices()[1].index, 1);

    assert_eq!(mgr.resolve("1").unwrap().pcie_address(), "0000:05:00.0");
    assert_eq!(mgr.resolve("0000:01:00.0").unwrap().index, 0);
    assert!(matches!(
        mgr.resolve("7"),
        Err(WormholeError::InvalidIndex { index: 7, count: 2 })
    ));
    assert!(matches!(
        mgr.resolve("0000:09:00.0"),
        Err(WormholeError::DeviceNotFound { .. })
    ));
}

#[test]
fn sysfs_without_wormholes() {
    let root = tempfile::tempdir().unwrap();
    fake_function(root.path(), "0000:00:02.0", "0x8086", "0x3e92");
    assert!(matches!(
        DeviceManager::discover_in(root.path()),
        Err(WormholeError::NoDevicesFound)
    ));
}

#[test]
fn missing_sysfs_root_is_io_error() {
    let root = tempfile::tempdir().unwrap();
    assert!(matches!(
        DeviceManager::discover_in(&root.path().join("absent")),
        Err(WormholeError::Io { .. })
    ));
}
