//! Cluster topology discovery.
//!
//! Depth-first walk over the Ethernet mesh with an explicit, pre-reserved
//! stack. Starting from the host-attached chip, every Ethernet core of each
//! visited chip is probed through the router; each live link is recorded on
//! the visited chip and unseen peers are queued.
//!
//! Links are recorded from the visiting side only. The reverse link of an
//! edge appears when the peer itself is visited.

use crate::backend::NocBackend;
use crate::config::EthConfig;
use crate::error::{Result, WormholeError};
use crate::router::EthRouter;
use crate::topology::Topology;
use tracing::{debug, error, info, warn};
use wormhole_chip::addr::remote_noc_coord;
use wormhole_chip::mesh::ETH_CORE_COUNT;
use wormhole_chip::regs::{self, port_status};
use wormhole_chip::{channel_for_coord, eth_core_coord, EthAddr};

/// Outcome of a discovery run.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Chips and links found.
    pub topology: Topology,
    /// Chips popped off the stack and probed.
    pub visited: usize,
    /// Peers not queued because the stack was full.
    pub dropped_pushes: usize,
    /// Links refused by a full connection list.
    pub dropped_links: usize,
    /// The run stopped early because the NOC window pool ran dry.
    pub truncated: bool,
}

/// Live link read off one Ethernet core.
#[derive(Debug, Clone, Copy)]
struct ProbedLink {
    peer: EthAddr,
    remote_core: usize,
}

/// Walks the cluster reachable from one host-attached chip.
#[derive(Debug)]
pub struct TopologyWalker<'a> {
    router: EthRouter<'a>,
    config: &'a EthConfig,
}

impl<'a> TopologyWalker<'a> {
    /// Create a walker over `noc`.
    pub fn new(noc: &'a dyn NocBackend, config: &'a EthConfig) -> Self {
        Self {
            router: EthRouter::new(noc, config),
            config,
        }
    }

    /// Discover every chip reachable from the local one.
    ///
    /// Probe failures on individual cores are logged and the core skipped.
    /// Running out of NOC windows stops the walk and returns what was found
    /// so far with `truncated` set.
    ///
    /// # Errors
    ///
    /// `AllocationFailure` if the stack cannot be reserved; any error reading
    /// the local chip's identity.
    pub fn discover(&self) -> Result<Discovery> {
        let capacity = self.config.max_topology_chips;
        let mut stack: Vec<EthAddr> = Vec::new();
        stack.try_reserve_exact(capacity).map_err(|e| {
            WormholeError::allocation_failure(format!("topology stack of {capacity} chips: {e}"))
        })?;

        let mut found = Discovery::default();

        let local = self.router.local_chip()?;
        info!("Starting topology discovery from {local}");
        if capacity == 0 {
            warn!("Topology stack capacity is 0, nothing to walk");
            return Ok(found);
        }
        found.topology.insert_if_absent(local);
        stack.push(local);

        'walk: while let Some(chip) = stack.pop() {
            found.topology.insert_if_absent(chip);
            found.visited += 1;
            debug!("Visiting {chip}");

            for core in 0..ETH_CORE_COUNT {
                let link = match self.probe(chip, core) {
                    Ok(Some(link)) => link,
                    Ok(None) => continue,
                    Err(e) if e.is_allocation_failure() => {
                        error!("Topology discovery truncated at {chip} core {core}: {e}");
                        found.truncated = true;
                        break 'walk;
                    }
                    Err(e) => {
                        warn!("Probe of {chip} core {core} failed, treating as no link: {e}");
                        continue;
                    }
                };

                if let Err(e) = found.topology.add_link(chip, link.peer, core, link.remote_core) {
                    error!("Link {chip}:{core} -> {} dropped: {e}", link.peer);
                    found.dropped_links += 1;
                }

                if found.topology.find(&link.peer).is_none() {
                    if stack.len() < capacity {
                        found.topology.insert_if_absent(link.peer);
                        stack.push(link.peer);
                    } else {
                        error!("Stack overflow prevented during topology discovery");
                        found.dropped_pushes += 1;
                    }
                }
            }
        }

        info!(
            "Topology discovery finished: {} chip(s), {} link(s), {} visited",
            found.topology.len(),
            found.topology.link_count(),
            found.visited
        );
        Ok(found)
    }

    /// Read one core's link registers on `chip`. `Ok(None)` means no usable link.
    fn probe(&self, chip: EthAddr, core: usize) -> Result<Option<ProbedLink>> {
        let (x, y) = eth_core_coord(core).ok_or(WormholeError::InvalidCore { core })?;

        let fw_version = self.router.read32(chip, x, y, regs::FW_VERSION)?;
        if fw_version < self.config.min_fw_version {
            debug!("{chip} core {core}: firmware {fw_version:#x} too old, skipped");
            return Ok(None);
        }

        let status = self.router.read32(chip, x, y, regs::port_status_addr(core))?;
        if !port_status::is_connected(status) {
            return Ok(None);
        }

        let remote_rack = self.router.read32(chip, x, y, regs::REMOTE_RACK)?;
        let remote_shelf = self.router.read32(chip, x, y, regs::REMOTE_SHELF)?;

        let peer = EthAddr::from_remote(remote_rack, remote_shelf);
        let (peer_x, peer_y) = remote_noc_coord(remote_shelf);
        let Some(remote_core) = channel_for_coord(peer_x, peer_y) else {
            warn!("{chip} core {core}: peer coordinate ({peer_x}, {peer_y}) is not an Ethernet core");
            return Ok(None);
        };

        Ok(Some(ProbedLink { peer, remote_core }))
    }
}
