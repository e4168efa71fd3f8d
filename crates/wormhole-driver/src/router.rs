//! Local-or-relayed register access by chip identity.

use crate::backend::NocBackend;
use crate::config::EthConfig;
use crate::error::{Result, WormholeError};
use crate::mailbox::EthMailbox;
use tracing::trace;
use wormhole_chip::mesh::IDENTITY_CHANNEL;
use wormhole_chip::{eth_core_coord, regs, EthAddr};

/// Routes a `(chip, x, y, addr)` access either straight onto the local NOC
/// or through the relay mailbox of the configured local Ethernet core.
#[derive(Debug, Clone, Copy)]
pub struct EthRouter<'a> {
    noc: &'a dyn NocBackend,
    config: &'a EthConfig,
}

impl<'a> EthRouter<'a> {
    /// Create a router over `noc`.
    pub fn new(noc: &'a dyn NocBackend, config: &'a EthConfig) -> Self {
        Self { noc, config }
    }

    /// Identity of the host-attached chip, read directly from Ethernet core 0.
    ///
    /// # Errors
    ///
    /// Returns error if the NOC access fails.
    pub fn local_chip(&self) -> Result<EthAddr> {
        let core = IDENTITY_CHANNEL;
        let (x, y) = eth_core_coord(core).ok_or(WormholeError::InvalidCore { core })?;
        let word = self.noc.read32(x, y, regs::LOCAL_RACK_SHELF)?;
        Ok(EthAddr::from_local_rack_shelf(word))
    }

    /// Read a word from tile `(x, y)` of `target`.
    ///
    /// # Errors
    ///
    /// Local accesses fail only on NOC errors; remote ones return any
    /// [`EthMailbox::read32`] error unchanged.
    pub fn read32(&self, target: EthAddr, x: u8, y: u8, addr: u64) -> Result<u32> {
        if target == self.local_chip()? {
            trace!("Local read {target} ({x}, {y}) {addr:#x}");
            return self.noc.read32(x, y, addr);
        }
        self.mailbox()
            .read32(self.config.relay_core, target.sys_addr(x, y, addr), target.rack_field())
    }

    /// Write a word to tile `(x, y)` of `target`.
    ///
    /// # Errors
    ///
    /// As [`EthRouter::read32`].
    pub fn write32(&self, target: EthAddr, x: u8, y: u8, addr: u64, value: u32) -> Result<()> {
        if target == self.local_chip()? {
            trace!("Local write {target} ({x}, {y}) {addr:#x} = {value:#x}");
            return self.noc.write32(x, y, addr, value);
        }
        self.mailbox().write32(
            self.config.relay_core,
            target.sys_addr(x, y, addr),
            target.rack_field(),
            value,
        )
    }

    fn mailbox(&self) -> EthMailbox<'a> {
        EthMailbox::new(self.noc, self.config)
    }
}
