// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated Ethernet cluster
//!
//! An in-memory model of several Wormhole chips wired together through their
//! Ethernet cores. It implements [`NocBackend`] for the host-attached chip and
//! plays the part of the Ethernet firmware: writing `REQ_WR_PTR` on a local
//! Ethernet core services every pending relay request against the target
//! chip's memory and posts the response before the write returns. Requests
//! for unknown or muted chips get a response slot whose flags stay clear.
//!
//! Used for CI, demos (`wormhole --sim-ring N`) and the integration tests.
//!
//! ```text
//! ring(4):
//!   [0,0,0,0] core 0 ── core 8 [0,0,1,0] core 0 ── core 8 [0,0,2,0] ...
//!       └──────────────── core 8 ... [0,0,3,0] core 0 ─────┘
//! ```

use crate::backend::{BackendType, NocBackend, NocWindow};
use crate::error::{Result, WormholeError};
use crate::mailbox::EthCommand;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use wormhole_chip::addr::{decode_sys_addr, pack_remote_shelf};
use wormhole_chip::mailbox::{
    advance, cmd, flags, queue_empty, queue_full, req_slot_addr, resp_slot_addr, PTR_MASK,
    REQ_RD_PTR, REQ_WR_PTR, RESP_RD_PTR, RESP_WR_PTR,
};
use wormhole_chip::mesh::{is_eth_core, ETH_CORE_COUNT, ETH_NOC0_X, ETH_NOC0_Y};
use wormhole_chip::regs::{self, port_status};
use wormhole_chip::{eth_core_coord, EthAddr};

/// Word-addressed sparse memory per tile. Unwritten words read as zero.
#[derive(Debug, Default)]
struct SimChip {
    tiles: HashMap<(u8, u8), BTreeMap<u64, u32>>,
    relay_muted: bool,
}

impl SimChip {
    fn with_identity(addr: EthAddr) -> Self {
        let mut chip = Self::default();
        for core in 0..ETH_CORE_COUNT {
            let Some((x, y)) = eth_core_coord(core) else {
                continue;
            };
            chip.write(x, y, regs::FW_VERSION, regs::MIN_FW_VERSION);
            chip.write(x, y, regs::LOCAL_RACK_SHELF, addr.to_local_rack_shelf());
            chip.write(x, y, regs::LOCAL_NOC0_X, u32::from(x));
            chip.write(x, y, regs::LOCAL_NOC0_Y, u32::from(y));
            chip.write(x, y, regs::port_status_addr(core), port_status::NOT_CONNECTED);
        }
        chip
    }

    fn read(&self, x: u8, y: u8, addr: u64) -> u32 {
        self.tiles
            .get(&(x, y))
            .and_then(|tile| tile.get(&addr))
            .copied()
            .unwrap_or(0)
    }

    fn write(&mut self, x: u8, y: u8, addr: u64, value: u32) {
        self.tiles.entry((x, y)).or_default().insert(addr, value);
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    chips: HashMap<EthAddr, SimChip>,
}

/// Ethernet core with its tile resolved.
#[derive(Debug, Clone, Copy)]
struct Port {
    core: usize,
    x: u8,
    y: u8,
}

impl Port {
    fn new(core: usize) -> Result<Self> {
        let (x, y) = eth_core_coord(core).ok_or(WormholeError::InvalidCore { core })?;
        Ok(Self { core, x, y })
    }
}

/// Ring wiring: core 0 of chip `i` to core 8 of chip `i + 1`.
const RING_OUT: Port = Port {
    core: 0,
    x: ETH_NOC0_X[0],
    y: ETH_NOC0_Y[0],
};
const RING_IN: Port = Port {
    core: 8,
    x: ETH_NOC0_X[8],
    y: ETH_NOC0_Y[8],
};

impl ClusterState {
    fn chip_mut(&mut self, addr: EthAddr) -> &mut SimChip {
        self.chips
            .entry(addr)
            .or_insert_with(|| SimChip::with_identity(addr))
    }

    fn link_half(&mut self, local: EthAddr, port: Port, peer: EthAddr, peer_port: Port) {
        let Port { core, x, y } = port;
        let chip = self.chip_mut(local);
        chip.write(x, y, regs::port_status_addr(core), port_status::UP);
        chip.write(x, y, regs::REMOTE_RACK, u32::from(peer.rack_field()));
        chip.write(
            x,
            y,
            regs::REMOTE_SHELF,
            pack_remote_shelf(peer.shelf_x, peer.shelf_y, peer_port.x, peer_port.y),
        );
    }

    /// Run the relay firmware of local Ethernet tile `(x, y)`.
    fn service_relay(&mut self, local: EthAddr, x: u8, y: u8) {
        if self.chips.get(&local).map_or(true, |chip| chip.relay_muted) {
            return;
        }

        loop {
            let Some(relay) = self.chips.get(&local) else {
                return;
            };
            let req_wr = relay.read(x, y, REQ_WR_PTR) & PTR_MASK;
            let req_rd = relay.read(x, y, REQ_RD_PTR) & PTR_MASK;
            let resp_wr = relay.read(x, y, RESP_WR_PTR) & PTR_MASK;
            let resp_rd = relay.read(x, y, RESP_RD_PTR) & PTR_MASK;
            if queue_empty(req_wr, req_rd) || queue_full(resp_wr, resp_rd) {
                return;
            }

            let mut raw = [0u8; cmd::SIZE];
            let base = req_slot_addr(req_rd);
            for (addr, chunk) in (base..).step_by(4).zip(raw.chunks_exact_mut(4)) {
                chunk.copy_from_slice(&relay.read(x, y, addr).to_le_bytes());
            }
            let request = EthCommand::decode(&raw);

            let response = self.execute(&request);

            let relay = self.chip_mut(local);
            let slot = resp_slot_addr(resp_wr);
            match response {
                Some(response) => {
                    let raw = response.encode();
                    for (addr, chunk) in (slot..).step_by(4).zip(raw.chunks_exact(4)) {
                        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        relay.write(x, y, addr, word);
                    }
                }
                // Forwarded but never answered: the slot is allocated with its flags clear.
                None => relay.write(x, y, slot + cmd::FLAGS as u64, 0),
            }
            relay.write(x, y, RESP_WR_PTR, advance(resp_wr));
            relay.write(x, y, REQ_RD_PTR, advance(req_rd));
        }
    }

    fn execute(&mut self, request: &EthCommand) -> Option<EthCommand> {
        let target = decode_sys_addr(request.sys_addr);
        let (rack_x, rack_y) = EthAddr::rack_from_field(request.rack);
        let chip_addr = EthAddr::new(rack_x, rack_y, target.chip_x, target.chip_y);
        let chip = self.chips.get_mut(&chip_addr)?;
        if chip.relay_muted {
            return None;
        }

        let mut response = *request;
        if request.flags & flags::RD_REQ != 0 {
            response.data = chip.read(target.noc_x, target.noc_y, target.offset & !3);
            response.flags = flags::RD_DATA;
        } else if request.flags & flags::WR_REQ != 0 {
            chip.write(target.noc_x, target.noc_y, target.offset & !3, request.data);
            response.flags = flags::WR_ACK;
        } else {
            response.flags = request.flags;
        }
        Some(response)
    }
}

/// In-memory cluster seen from one host-attached chip.
#[derive(Debug)]
pub struct SimulatedCluster {
    local: EthAddr,
    state: Mutex<ClusterState>,
    windows_in_use: AtomicUsize,
    max_windows: usize,
    acquire_budget: AtomicUsize,
}

impl SimulatedCluster {
    /// A cluster holding only the local chip, with every port down.
    #[must_use]
    pub fn new(local: EthAddr) -> Self {
        let mut state = ClusterState::default();
        state.chip_mut(local);
        Self {
            local,
            state: Mutex::new(state),
            windows_in_use: AtomicUsize::new(0),
            max_windows: 4,
            acquire_budget: AtomicUsize::new(usize::MAX),
        }
    }

    /// `n` chips in a ring: chip `i` core 0 is wired to chip `i + 1` core 8.
    ///
    /// Chip `i` is `[0, 0, i % 64, i / 64]`; chip 0 is local.
    #[must_use]
    pub fn ring(n: u8) -> Self {
        let chips: Vec<EthAddr> = (0..n.max(1)).map(Self::ring_chip).collect();
        let cluster = Self::new(chips[0]);
        {
            let mut state = cluster.lock();
            for (i, &chip) in chips.iter().enumerate() {
                let next = chips[(i + 1) % chips.len()];
                state.link_half(chip, RING_OUT, next, RING_IN);
                state.link_half(next, RING_IN, chip, RING_OUT);
            }
        }
        cluster
    }

    /// Identity of chip `i` in [`SimulatedCluster::ring`].
    #[must_use]
    pub const fn ring_chip(i: u8) -> EthAddr {
        EthAddr::new(0, 0, i % 64, i / 64)
    }

    /// Allow at most `limit` windows to be held at once.
    #[must_use]
    pub fn with_window_limit(mut self, limit: usize) -> Self {
        self.max_windows = limit;
        self
    }

    /// Fail every acquisition after the first `budget` with `ContextUnavailable`.
    #[must_use]
    pub fn with_acquire_budget(self, budget: usize) -> Self {
        self.acquire_budget.store(budget, Ordering::SeqCst);
        self
    }

    /// Host-attached chip.
    #[must_use]
    pub const fn local(&self) -> EthAddr {
        self.local
    }

    /// Add a chip with every port down. No effect if it already exists.
    pub fn add_chip(&self, addr: EthAddr) {
        self.lock().chip_mut(addr);
    }

    /// Wire `a` core `core_a` to `b` core `core_b`, both directions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCore` if either core index is out of range.
    pub fn connect(&self, a: EthAddr, core_a: usize, b: EthAddr, core_b: usize) -> Result<()> {
        let (port_a, port_b) = (Port::new(core_a)?, Port::new(core_b)?);
        let mut state = self.lock();
        state.link_half(a, port_a, b, port_b);
        state.link_half(b, port_b, a, port_a);
        Ok(())
    }

    /// Override the firmware version reported by one Ethernet core.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCore` if the core index is out of range.
    pub fn set_firmware(&self, addr: EthAddr, core: usize, version: u32) -> Result<()> {
        let (x, y) = eth_core_coord(core).ok_or(WormholeError::InvalidCore { core })?;
        self.lock().chip_mut(addr).write(x, y, regs::FW_VERSION, version);
        Ok(())
    }

    /// Make a chip's Ethernet firmware stop answering.
    ///
    /// A muted local chip never services its request rings. Requests
    /// relayed to a muted remote chip are consumed and never completed.
    pub fn mute_relay(&self, addr: EthAddr) {
        self.lock().chip_mut(addr).relay_muted = true;
    }

    /// Read a word of any chip's memory without going through a window.
    #[must_use]
    pub fn peek(&self, chip: EthAddr, x: u8, y: u8, addr: u64) -> u32 {
        self.lock().chips.get(&chip).map_or(0, |c| c.read(x, y, addr))
    }

    /// Write a word of any chip's memory without going through a window.
    pub fn poke(&self, chip: EthAddr, x: u8, y: u8, addr: u64, value: u32) {
        self.lock().chip_mut(chip).write(x, y, addr, value);
    }

    /// Number of chips in the cluster.
    #[must_use]
    pub fn chip_count(&self) -> usize {
        self.lock().chips.len()
    }

    /// Windows currently held.
    #[must_use]
    pub fn windows_in_use(&self) -> usize {
        self.windows_in_use.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NocBackend for SimulatedCluster {
    fn acquire(&self) -> Result<Box<dyn NocWindow + '_>> {
        let budget_ok = self
            .acquire_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
            .is_ok();
        if !budget_ok {
            return Err(WormholeError::ContextUnavailable);
        }

        self.windows_in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_windows).then_some(n + 1)
            })
            .map_err(|_| WormholeError::ContextUnavailable)?;

        Ok(Box::new(SimWindow { cluster: self }))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Software
    }
}

struct SimWindow<'a> {
    cluster: &'a SimulatedCluster,
}

impl SimWindow<'_> {
    fn check(addr: u64, len: usize) -> Result<()> {
        if addr % 4 != 0 || len % 4 != 0 {
            return Err(WormholeError::transfer_failed(format!(
                "Unaligned access: addr={addr:#x}, len={len}"
            )));
        }
        Ok(())
    }
}

impl NocWindow for SimWindow<'_> {
    fn read32(&mut self, x: u8, y: u8, addr: u64) -> Result<u32> {
        Self::check(addr, 4)?;
        let local = self.cluster.local;
        Ok(self.cluster.lock().chip_mut(local).read(x, y, addr))
    }

    fn write32(&mut self, x: u8, y: u8, addr: u64, value: u32) -> Result<()> {
        Self::check(addr, 4)?;
        let local = self.cluster.local;
        let mut state = self.cluster.lock();
        state.chip_mut(local).write(x, y, addr, value);
        if addr == REQ_WR_PTR && is_eth_core(x, y) {
            state.service_relay(local, x, y);
        }
        Ok(())
    }

    fn read_block(&mut self, x: u8, y: u8, addr: u64, buf: &mut [u8]) -> Result<()> {
        Self::check(addr, buf.len())?;
        let local = self.cluster.local;
        let mut state = self.cluster.lock();
        let chip = state.chip_mut(local);
        for (word_addr, chunk) in (addr..).step_by(4).zip(buf.chunks_exact_mut(4)) {
            chunk.copy_from_slice(&chip.read(x, y, word_addr).to_le_bytes());
        }
        Ok(())
    }

    fn write_block(&mut self, x: u8, y: u8, addr: u64, data: &[u8]) -> Result<()> {
        Self::check(addr, data.len())?;
        let local = self.cluster.local;
        let mut state = self.cluster.lock();
        let chip = state.chip_mut(local);
        for (word_addr, chunk) in (addr..).step_by(4).zip(data.chunks_exact(4)) {
            chip.write(x, y, word_addr, u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Ok(())
    }
}

impl Drop for SimWindow<'_> {
    fn drop(&mut self) {
        self.cluster.windows_in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_chip_reports_identity_and_firmware() {
        let local = EthAddr::new(1, 2, 3, 4);
        let sim = SimulatedCluster::new(local);
        let (x, y) = eth_core_coord(5).unwrap();
        assert_eq!(sim.read32(x, y, regs::FW_VERSION).unwrap(), regs::MIN_FW_VERSION);
        assert_eq!(
            EthAddr::from_local_rack_shelf(sim.read32(x, y, regs::LOCAL_RACK_SHELF).unwrap()),
            local
        );
        assert_eq!(
            sim.read32(x, y, regs::port_status_addr(5)).unwrap(),
            port_status::NOT_CONNECTED
        );
    }

    #[test]
    fn ring_wiring() {
        let sim = SimulatedCluster::ring(3);
        assert_eq!(sim.chip_count(), 3);
        let (x, y) = eth_core_coord(0).unwrap();
        let rack = sim.peek(SimulatedCluster::ring_chip(2), x, y, regs::REMOTE_RACK);
        let shelf = sim.peek(SimulatedCluster::ring_chip(2), x, y, regs::REMOTE_SHELF);
        assert_eq!(EthAddr::from_remote(rack, shelf), SimulatedCluster::ring_chip(0));
        assert_eq!(
            wormhole_chip::addr::remote_noc_coord(shelf),
            eth_core_coord(8).unwrap()
        );
    }

    #[test]
    fn window_limit_and_release() {
        let sim = SimulatedCluster::new(EthAddr::default()).with_window_limit(1);
        let held = sim.acquire().unwrap();
        assert!(matches!(sim.acquire(), Err(WormholeError::ContextUnavailable)));
        drop(held);
        assert_eq!(sim.windows_in_use(), 0);
        assert!(sim.acquire().is_ok());
    }

    #[test]
    fn acquire_budget_runs_out() {
        let sim = SimulatedCluster::new(EthAddr::default()).with_acquire_budget(2);
        assert!(sim.read32(9, 0, 0).is_ok());
        assert!(sim.read32(9, 0, 0).is_ok());
        assert!(matches!(sim.read32(9, 0, 0), Err(WormholeError::ContextUnavailable)));
        assert_eq!(sim.windows_in_use(), 0);
    }

    #[test]
    fn unaligned_access_rejected() {
        let sim = SimulatedCluster::new(EthAddr::default());
        assert!(sim.read32(1, 1, 2).is_err());
    }

    #[test]
    fn invalid_core_rejected() {
        let sim = SimulatedCluster::new(EthAddr::default());
        assert!(matches!(
            sim.connect(EthAddr::default(), 16, EthAddr::new(0, 0, 1, 0), 0),
            Err(WormholeError::InvalidCore { core: 16 })
        ));
        // A bad far end wires neither side.
        assert!(matches!(
            sim.connect(EthAddr::default(), 0, EthAddr::new(0, 0, 1, 0), 99),
            Err(WormholeError::InvalidCore { core: 99 })
        ));
        assert_eq!(sim.chip_count(), 1);
        let (x, y) = eth_core_coord(0).unwrap();
        assert_eq!(
            sim.peek(EthAddr::default(), x, y, regs::port_status_addr(0)),
            port_status::NOT_CONNECTED
        );
    }

    #[test]
    fn ring_ports_match_core_placement() {
        for port in [RING_OUT, RING_IN] {
            let resolved = Port::new(port.core).unwrap();
            assert_eq!((resolved.x, resolved.y), (port.x, port.y));
        }
    }
}
