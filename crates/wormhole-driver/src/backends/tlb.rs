//! NOC access through PCIe BAR0 TLB windows.
//!
//! Each [`TlbWindow`] owns one 16 MiB aperture from a small pool. Its TLB
//! configuration register is rewritten only when an access targets a
//! different tile or a different 16 MiB page than the previous one.

use super::mmap::MmapRegion;
use crate::backend::{BackendType, NocBackend, NocWindow};
use crate::error::{Result, WormholeError};
use std::sync::{Mutex, PoisonError};
use wormhole_chip::bar::{
    self, tlb_16m_index, tlb_16m_window_addr, tlb_config_addr, Tlb16M, TLB_16M_SIZE,
};

/// Hardware backend over a mapped BAR0.
#[derive(Debug)]
pub struct TlbBackend {
    bar: MmapRegion,
    free: Mutex<Vec<usize>>,
}

impl TlbBackend {
    /// Map BAR0 of the Wormhole at `pcie_address` (e.g. `0000:01:00.0`).
    ///
    /// # Errors
    ///
    /// Returns error if the BAR cannot be mapped or is too small to hold the
    /// TLB configuration registers.
    pub fn open(pcie_address: &str) -> Result<Self> {
        let bar = MmapRegion::new(pcie_address, 0)?;

        #[allow(clippy::cast_possible_truncation)]
        let needed = bar::BAR0_MAP_SIZE as usize;
        if bar.size() < needed {
            return Err(WormholeError::mapping_failed(format!(
                "BAR0 of {pcie_address} is {:#x} bytes, need {needed:#x}",
                bar.size()
            )));
        }

        // Highest window handed out first.
        let free: Vec<usize> = bar::HOST_TLB_POOL.collect();
        tracing::debug!("TLB pool for {pcie_address}: 16M windows {free:?}");

        Ok(Self {
            bar,
            free: Mutex::new(free),
        })
    }

    /// PCIe address of the mapped device.
    #[must_use]
    pub fn pcie_address(&self) -> &str {
        self.bar.pcie_address()
    }

    /// Windows currently free.
    #[must_use]
    pub fn available_windows(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl NocBackend for TlbBackend {
    fn acquire(&self) -> Result<Box<dyn NocWindow + '_>> {
        let window = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or(WormholeError::ContextUnavailable)?;

        tracing::trace!("Acquired 16M TLB window {window}");

        Ok(Box::new(TlbWindow {
            backend: self,
            window,
            target: None,
        }))
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Tlb
    }
}

/// One leased 16 MiB TLB window.
#[derive(Debug)]
pub struct TlbWindow<'a> {
    backend: &'a TlbBackend,
    window: usize,
    target: Option<(u8, u8, u64)>,
}

impl TlbWindow<'_> {
    /// Point the window at `(x, y, addr)` and return the BAR0 offset to use.
    #[allow(clippy::cast_possible_truncation)]
    fn aim(&mut self, x: u8, y: u8, addr: u64) -> Result<usize> {
        if addr % 4 != 0 {
            return Err(WormholeError::transfer_failed(format!(
                "Unaligned NOC address {addr:#x}"
            )));
        }

        let page = addr / TLB_16M_SIZE;
        if self.target != Some((x, y, page)) {
            let config = Tlb16M::unicast(x, y, addr).encode();
            let reg = tlb_config_addr(tlb_16m_index(self.window)) as usize;
            self.backend.bar.write_u64(reg, config)?;
            tracing::trace!("TLB {} -> ({x}, {y}) page {page:#x}", self.window);
            self.target = Some((x, y, page));
        }

        Ok((tlb_16m_window_addr(self.window) + addr % TLB_16M_SIZE) as usize)
    }

    fn check_block(addr: u64, len: usize) -> Result<()> {
        if addr % 4 != 0 || len % 4 != 0 {
            return Err(WormholeError::transfer_failed(format!(
                "Block access must be word aligned: addr={addr:#x}, len={len}"
            )));
        }
        Ok(())
    }
}

impl NocWindow for TlbWindow<'_> {
    fn read32(&mut self, x: u8, y: u8, addr: u64) -> Result<u32> {
        let offset = self.aim(x, y, addr)?;
        self.backend.bar.read_u32(offset)
    }

    fn write32(&mut self, x: u8, y: u8, addr: u64, value: u32) -> Result<()> {
        let offset = self.aim(x, y, addr)?;
        self.backend.bar.write_u32(offset, value)
    }

    fn read_block(&mut self, x: u8, y: u8, addr: u64, buf: &mut [u8]) -> Result<()> {
        Self::check_block(addr, buf.len())?;
        for (word_addr, chunk) in (addr..).step_by(4).zip(buf.chunks_exact_mut(4)) {
            let value = self.read32(x, y, word_addr)?;
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    fn write_block(&mut self, x: u8, y: u8, addr: u64, data: &[u8]) -> Result<()> {
        Self::check_block(addr, data.len())?;
        for (word_addr, chunk) in (addr..).step_by(4).zip(data.chunks_exact(4)) {
            let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.write32(x, y, word_addr, value)?;
        }
        Ok(())
    }
}

impl Drop for TlbWindow<'_> {
    fn drop(&mut self) {
        tracing::trace!("Released 16M TLB window {}", self.window);
        self.backend
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires Wormhole hardware"]
    fn reads_local_firmware_version() {
        let mgr = crate::DeviceManager::discover().unwrap();
        let backend = TlbBackend::open(mgr.devices()[0].pcie_address()).unwrap();
        let version = backend
            .read32(9, 0, wormhole_chip::regs::FW_VERSION)
            .unwrap();
        assert_ne!(version, 0);
        assert_eq!(backend.available_windows(), bar::HOST_TLB_POOL.len());
    }
}
