//! Pure Rust host driver for Tenstorrent Wormhole Ethernet clusters.
//!
//! Reads and writes registers on any chip of an Ethernet-connected cluster
//! through the relay mailboxes of the host-attached chip, and discovers the
//! cluster's topology by walking its links.
//!
//! # Layers
//!
//! ```text
//! WormholeDevice ── probe() ──┬── scan_eth_cores   (local links)
//!                             └── TopologyWalker   (whole cluster)
//!                                       │
//!                                   EthRouter      local NOC or relay
//!                                       │
//!                                   EthMailbox     request/response rings
//!                                       │
//!                                   NocBackend     TlbBackend | SimulatedCluster
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use wormhole_driver::{DeviceManager, EthConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mgr = DeviceManager::discover()?;
//! let mut dev = mgr.open("0", EthConfig::default())?;
//! let found = dev.probe()?;
//! println!("{}", found.topology);
//! # Ok(())
//! # }
//! ```
//!
//! Without hardware, the same stack runs on a simulated ring:
//!
//! ```
//! use wormhole_driver::{EthConfig, SimulatedCluster, WormholeDevice};
//!
//! let mut dev = WormholeDevice::with_backend(
//!     "sim",
//!     Box::new(SimulatedCluster::ring(4)),
//!     EthConfig::default(),
//! );
//! let found = dev.probe().unwrap();
//! assert_eq!(found.topology.len(), 4);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
mod config;
mod device;
mod discovery;
mod error;
pub mod mailbox;
mod router;
mod scanner;
pub mod topology;
mod walker;

/// Hardware identification constants (re-exported from wormhole-chip).
pub mod pcie_ids {
    pub use wormhole_chip::pcie::device_id;
    pub use wormhole_chip::pcie::{ChipVariant, ETH_CAPABLE_DEVICE_IDS, TENSTORRENT_VENDOR_ID};
}

pub use backend::{select_backend, BackendSelection, BackendType, NocBackend, NocWindow};
pub use backends::{SimulatedCluster, TlbBackend};
pub use config::EthConfig;
pub use device::WormholeDevice;
pub use discovery::{DeviceInfo, DeviceManager, SYSFS_PCI_DEVICES};
pub use error::{Result, WormholeError};
pub use mailbox::{EthCommand, EthMailbox};
pub use router::EthRouter;
pub use scanner::{scan_eth_cores, EthCoreLink};
pub use topology::{ChipConnections, ChipLink, Topology, MAX_LINKS_PER_CHIP};
pub use walker::{Discovery, TopologyWalker};
pub use wormhole_chip::EthAddr;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        DeviceManager, Discovery, EthAddr, EthConfig, EthRouter, NocBackend, Result,
        SimulatedCluster, Topology, TopologyWalker, WormholeDevice, WormholeError,
    };
}
