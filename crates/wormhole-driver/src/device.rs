//! Wormhole device handle
//!
//! Owns the NOC backend of one host-attached chip plus the results of its
//! Ethernet probe: the local link catalogue and the discovered cluster.

use crate::backend::{BackendType, NocBackend};
use crate::backends::TlbBackend;
use crate::config::EthConfig;
use crate::discovery::DeviceInfo;
use crate::error::Result;
use crate::router::EthRouter;
use crate::scanner::{scan_eth_cores, EthCoreLink};
use crate::topology::Topology;
use crate::walker::{Discovery, TopologyWalker};
use wormhole_chip::EthAddr;

/// Wormhole device handle
#[derive(Debug)]
pub struct WormholeDevice {
    label: String,
    backend: Box<dyn NocBackend>,
    config: EthConfig,
    connected_eth_cores: Vec<EthCoreLink>,
    discovery: Option<Discovery>,
}

impl WormholeDevice {
    /// Open a discovered PCIe device through its BAR0 TLB windows.
    ///
    /// # Errors
    ///
    /// Returns error if BAR0 cannot be mapped.
    pub fn open(info: &DeviceInfo, config: EthConfig) -> Result<Self> {
        tracing::debug!("Opening device {}: {}", info.index, info.pcie_address);
        let backend = TlbBackend::open(&info.pcie_address)?;
        tracing::info!("Opened device {}: {}", info.index, info.pcie_address);
        Ok(Self::with_backend(info.pcie_address.clone(), Box::new(backend), config))
    }

    /// Wrap an existing backend (e.g. a simulated cluster).
    pub fn with_backend(
        label: impl Into<String>,
        backend: Box<dyn NocBackend>,
        config: EthConfig,
    ) -> Self {
        Self {
            label: label.into(),
            backend,
            config,
            connected_eth_cores: Vec::new(),
            discovery: None,
        }
    }

    /// Scan the local chip's Ethernet cores, then walk the cluster.
    ///
    /// Results are kept on the device; a second probe replaces them.
    ///
    /// # Errors
    ///
    /// Returns error if the scan fails or discovery cannot start.
    pub fn probe(&mut self) -> Result<&Discovery> {
        self.scan()?;
        let found = TopologyWalker::new(self.backend.as_ref(), &self.config).discover()?;
        if found.truncated {
            tracing::warn!("{}: topology is incomplete", self.label);
        }
        Ok(&*self.discovery.insert(found))
    }

    /// Refresh the local link catalogue only.
    ///
    /// # Errors
    ///
    /// Returns error if a window cannot be acquired or a read fails.
    pub fn scan(&mut self) -> Result<&[EthCoreLink]> {
        self.connected_eth_cores = scan_eth_cores(self.backend.as_ref(), &self.config)?;
        Ok(self.connected_eth_cores.as_slice())
    }

    /// Connected Ethernet cores from the last scan.
    #[must_use]
    pub fn connected_eth_cores(&self) -> &[EthCoreLink] {
        &self.connected_eth_cores
    }

    /// Result of the last probe.
    #[must_use]
    pub const fn discovery(&self) -> Option<&Discovery> {
        self.discovery.as_ref()
    }

    /// Topology from the last probe.
    #[must_use]
    pub fn topology(&self) -> Option<&Topology> {
        self.discovery.as_ref().map(|d| &d.topology)
    }

    /// Router over this device's backend.
    #[must_use]
    pub fn router(&self) -> EthRouter<'_> {
        EthRouter::new(self.backend.as_ref(), &self.config)
    }

    /// Identity of the host-attached chip.
    ///
    /// # Errors
    ///
    /// Returns error if the NOC access fails.
    pub fn local_chip(&self) -> Result<EthAddr> {
        self.router().local_chip()
    }

    /// Routed read; see [`EthRouter::read32`].
    ///
    /// # Errors
    ///
    /// As [`EthRouter::read32`].
    pub fn read32(&self, target: EthAddr, x: u8, y: u8, addr: u64) -> Result<u32> {
        self.router().read32(target, x, y, addr)
    }

    /// Routed write; see [`EthRouter::write32`].
    ///
    /// # Errors
    ///
    /// As [`EthRouter::write32`].
    pub fn write32(&self, target: EthAddr, x: u8, y: u8, addr: u64, value: u32) -> Result<()> {
        self.router().write32(target, x, y, addr, value)
    }

    /// Label (PCIe address or simulator name).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Backend in use.
    #[must_use]
    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EthConfig {
        &self.config
    }
}
