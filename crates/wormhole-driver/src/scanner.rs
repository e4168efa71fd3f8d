//! Catalogue of the local chip's live Ethernet links.

use crate::backend::NocBackend;
use crate::config::EthConfig;
use crate::error::Result;
use tracing::{debug, info};
use wormhole_chip::addr::remote_noc_coord;
use wormhole_chip::mesh::ETH_CORE_COUNT;
use wormhole_chip::regs::{self, port_status};
use wormhole_chip::{eth_core_coord, EthAddr};

/// One connected Ethernet core of the local chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthCoreLink {
    /// Channel number, `0..16`.
    pub core_num: usize,
    /// Firmware version running on the core.
    pub fw_version: u32,
    /// Identity of the chip the core lives on.
    pub local: EthAddr,
    /// Identity of the chip at the other end of the cable.
    pub remote: EthAddr,
    /// NOC0 x of this core, as reported by its firmware.
    pub local_noc_x: u32,
    /// NOC0 y of this core, as reported by its firmware.
    pub local_noc_y: u32,
    /// NOC0 x of the partner core.
    pub remote_noc_x: u32,
    /// NOC0 y of the partner core.
    pub remote_noc_y: u32,
}

/// Scan all 16 Ethernet cores of the local chip through one window.
///
/// Cores with firmware older than `config.min_fw_version` or with a port
/// that is not up are left out; the result is in channel order.
///
/// # Errors
///
/// Returns error if no window is available or a NOC access fails.
pub fn scan_eth_cores(noc: &dyn NocBackend, config: &EthConfig) -> Result<Vec<EthCoreLink>> {
    let mut win = noc.acquire()?;
    let mut links = Vec::with_capacity(ETH_CORE_COUNT);

    for core_num in 0..ETH_CORE_COUNT {
        let Some((x, y)) = eth_core_coord(core_num) else {
            continue;
        };

        let fw_version = win.read32(x, y, regs::FW_VERSION)?;
        let status = win.read32(x, y, regs::port_status_addr(core_num))?;
        let remote_rack = win.read32(x, y, regs::REMOTE_RACK)?;
        let remote_shelf = win.read32(x, y, regs::REMOTE_SHELF)?;
        let local_noc_x = win.read32(x, y, regs::LOCAL_NOC0_X)?;
        let local_noc_y = win.read32(x, y, regs::LOCAL_NOC0_Y)?;
        let local_rack_shelf = win.read32(x, y, regs::LOCAL_RACK_SHELF)?;

        if fw_version < config.min_fw_version {
            debug!("Ethernet core {core_num}: firmware {fw_version:#x} too old, skipped");
            continue;
        }
        if !port_status::is_connected(status) {
            continue;
        }

        let (remote_noc_x, remote_noc_y) = remote_noc_coord(remote_shelf);
        let link = EthCoreLink {
            core_num,
            fw_version,
            local: EthAddr::from_local_rack_shelf(local_rack_shelf),
            remote: EthAddr::from_remote(remote_rack, remote_shelf),
            local_noc_x,
            local_noc_y,
            remote_noc_x: u32::from(remote_noc_x),
            remote_noc_y: u32::from(remote_noc_y),
        };
        debug!(
            "Ethernet core {core_num} ({local_noc_x}, {local_noc_y}) -> {} ({remote_noc_x}, {remote_noc_y})",
            link.remote
        );
        links.push(link);
    }

    info!("{} connected Ethernet core(s)", links.len());
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimulatedCluster;

    #[test]
    fn isolated_chip_has_no_links() {
        let sim = SimulatedCluster::new(EthAddr::default());
        assert!(scan_eth_cores(&sim, &EthConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn ring_member_sees_both_neighbours() {
        let sim = SimulatedCluster::ring(3);
        let links = scan_eth_cores(&sim, &EthConfig::default()).unwrap();
        assert_eq!(links.len(), 2);

        assert_eq!(links[0].core_num, 0);
        assert_eq!(links[0].local, sim.local());
        assert_eq!(links[0].remote, SimulatedCluster::ring_chip(1));
        assert_eq!((links[0].local_noc_x, links[0].local_noc_y), (9, 0));
        assert_eq!((links[0].remote_noc_x, links[0].remote_noc_y), (9, 6));

        assert_eq!(links[1].core_num, 8);
        assert_eq!(links[1].remote, SimulatedCluster::ring_chip(2));
    }

    #[test]
    fn stale_firmware_core_is_skipped() {
        let sim = SimulatedCluster::ring(3);
        sim.set_firmware(sim.local(), 8, 0x0606_8000).unwrap();
        let links = scan_eth_cores(&sim, &EthConfig::default()).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].core_num, 0);
        assert_eq!(sim.windows_in_use(), 0);
    }
}
