//! NOC access abstraction
//!
//! Every register access the driver makes goes through a [`NocWindow`]: a
//! scoped aperture onto the NOC obtained from a [`NocBackend`]. Windows are
//! pooled; dropping one returns it to the pool on every exit path.

use crate::error::Result;
use std::fmt::Debug;

/// A scoped window onto the NOC.
///
/// Addresses are `(x, y, addr)`: tile coordinate on NOC0 plus byte offset in
/// that tile's address space.
pub trait NocWindow {
    /// Read a 32-bit word.
    ///
    /// # Errors
    ///
    /// Returns error if the access cannot be performed.
    fn read32(&mut self, x: u8, y: u8, addr: u64) -> Result<u32>;

    /// Write a 32-bit word.
    ///
    /// # Errors
    ///
    /// Returns error if the access cannot be performed.
    fn write32(&mut self, x: u8, y: u8, addr: u64, value: u32) -> Result<()>;

    /// Copy `buf.len()` bytes out of the tile.
    ///
    /// # Errors
    ///
    /// Returns error if the access cannot be performed.
    fn read_block(&mut self, x: u8, y: u8, addr: u64, buf: &mut [u8]) -> Result<()>;

    /// Copy `data` into the tile.
    ///
    /// # Errors
    ///
    /// Returns error if the access cannot be performed.
    fn write_block(&mut self, x: u8, y: u8, addr: u64, data: &[u8]) -> Result<()>;
}

/// Source of NOC windows for one local chip.
pub trait NocBackend: Debug + Send + Sync {
    /// Take a window from the pool.
    ///
    /// # Errors
    ///
    /// Returns `WormholeError::ContextUnavailable` when every window is in use.
    fn acquire(&self) -> Result<Box<dyn NocWindow + '_>>;

    /// Get backend type for debugging
    fn backend_type(&self) -> BackendType;

    /// Single-shot read through a temporary window.
    ///
    /// # Errors
    ///
    /// Returns error if no window is available or the access fails.
    fn read32(&self, x: u8, y: u8, addr: u64) -> Result<u32> {
        self.acquire()?.read32(x, y, addr)
    }

    /// Single-shot write through a temporary window.
    ///
    /// # Errors
    ///
    /// Returns error if no window is available or the access fails.
    fn write32(&self, x: u8, y: u8, addr: u64, value: u32) -> Result<()> {
        self.acquire()?.write32(x, y, addr, value)
    }
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// PCIe BAR0 TLB windows (real hardware)
    Tlb,

    /// Simulated cluster, no hardware required
    Software,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tlb => write!(f, "TLB (BAR0)"),
            Self::Software => write!(f, "Software (SimulatedCluster)"),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelection {
    /// Hardware at a PCIe address (e.g. `0000:01:00.0`)
    Tlb(String),

    /// Simulated ring of this many chips
    SimulatedRing(u8),
}

/// Build the backend described by `selection`.
///
/// # Errors
///
/// Returns error if the hardware backend cannot map BAR0.
pub fn select_backend(selection: &BackendSelection) -> Result<Box<dyn NocBackend>> {
    use crate::backends::{SimulatedCluster, TlbBackend};

    match selection {
        BackendSelection::Tlb(pcie_address) => {
            tracing::info!("Using TLB backend for {pcie_address}");
            Ok(Box::new(TlbBackend::open(pcie_address)?))
        }
        BackendSelection::SimulatedRing(chips) => {
            tracing::info!("Using simulated ring of {chips} chip(s)");
            Ok(Box::new(SimulatedCluster::ring(*chips)))
        }
    }
}
