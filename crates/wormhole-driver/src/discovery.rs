//! Runtime device discovery
//!
//! Finds Wormhole PCIe functions by scanning `/sys/bus/pci/devices` for the
//! Tenstorrent vendor ID and an Ethernet-capable device ID.

use crate::config::EthConfig;
use crate::device::WormholeDevice;
use crate::error::{Result, WormholeError};
use std::path::Path;
use wormhole_chip::pcie::{ChipVariant, ETH_CAPABLE_DEVICE_IDS, TENSTORRENT_VENDOR_ID};

/// Default sysfs location of PCI functions.
pub const SYSFS_PCI_DEVICES: &str = "/sys/bus/pci/devices";

/// Device manager for runtime discovery and access
#[derive(Debug)]
pub struct DeviceManager {
    devices: Vec<DeviceInfo>,
}

/// Information about a discovered device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device index (0, 1, 2, ...), in PCIe address order
    pub index: usize,

    /// PCIe bus address (0000:01:00.0, etc.)
    pub pcie_address: String,

    /// PCI device ID
    pub device_id: u16,

    /// Architecture derived from the device ID
    pub variant: ChipVariant,
}

impl DeviceManager {
    /// Discover all Wormhole devices on the system
    ///
    /// # Errors
    ///
    /// Returns `WormholeError::NoDevicesFound` if no devices are detected.
    pub fn discover() -> Result<Self> {
        Self::discover_in(Path::new(SYSFS_PCI_DEVICES))
    }

    /// Discover devices under an arbitrary sysfs-style directory.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be read and `NoDevicesFound` if
    /// it holds no matching function.
    pub fn discover_in(root: &Path) -> Result<Self> {
        tracing::info!("Discovering Wormhole devices in {}...", root.display());

        let mut matches = Vec::new();
        for entry in std::fs::read_dir(root)?.flatten() {
            let path = entry.path();

            let vendor = read_hex_sysfs(&path.join("vendor"));
            let device = read_hex_sysfs(&path.join("device"));

            if let (Some(vendor), Some(device_id)) = (vendor, device) {
                if vendor == TENSTORRENT_VENDOR_ID && ETH_CAPABLE_DEVICE_IDS.contains(&device_id) {
                    let pcie_address = entry.file_name().to_string_lossy().to_string();
                    tracing::debug!("Found Wormhole function {pcie_address} ({device_id:#06x})");
                    matches.push((pcie_address, device_id));
                }
            }
        }

        // Sort to ensure consistent ordering
        matches.sort();

        let devices: Vec<DeviceInfo> = matches
            .into_iter()
            .enumerate()
            .map(|(index, (pcie_address, device_id))| DeviceInfo {
                index,
                pcie_address,
                device_id,
                variant: ChipVariant::from_device_id(device_id),
            })
            .collect();

        if devices.is_empty() {
            tracing::warn!("No Wormhole devices found");
            return Err(WormholeError::NoDevicesFound);
        }

        tracing::info!("Discovered {} Wormhole device(s)", devices.len());
        Ok(Self { devices })
    }

    /// Get number of discovered devices
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Get slice of all devices
    #[must_use]
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Get device info by index
    ///
    /// # Errors
    ///
    /// Returns `WormholeError::InvalidIndex` if the index is out of bounds.
    pub fn device(&self, index: usize) -> Result<&DeviceInfo> {
        self.devices.get(index).ok_or(WormholeError::InvalidIndex {
            index,
            count: self.devices.len(),
        })
    }

    /// Look a device up by index (`"0"`) or PCIe address (`"0000:01:00.0"`).
    ///
    /// # Errors
    ///
    /// `InvalidIndex` for an out-of-range index, `DeviceNotFound` for an
    /// unknown address.
    pub fn resolve(&self, selector: &str) -> Result<&DeviceInfo> {
        if let Ok(index) = selector.parse::<usize>() {
            return self.device(index);
        }
        self.devices
            .iter()
            .find(|d| d.pcie_address == selector)
            .ok_or_else(|| WormholeError::device_not_found(selector))
    }

    /// Open device by index or PCIe address
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unknown or BAR0 cannot be mapped.
    pub fn open(&self, selector: &str, config: EthConfig) -> Result<WormholeDevice> {
        WormholeDevice::open(self.resolve(selector)?, config)
    }
}

impl DeviceInfo {
    /// Get PCIe address
    #[must_use]
    pub fn pcie_address(&self) -> &str {
        &self.pcie_address
    }
}

/// Read a hexadecimal sysfs attribute such as `vendor` (`0x1e52`).
fn read_hex_sysfs(path: &Path) -> Option<u16> {
    let content = std::fs::read_to_string(path).ok()?;
    let trimmed = content.trim().trim_start_matches("0x");
    u16::from_str_radix(trimmed, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_attribute_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendor");
        std::fs::write(&path, "0x1e52\n").unwrap();
        assert_eq!(read_hex_sysfs(&path), Some(0x1E52));
        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(read_hex_sysfs(&path), None);
        assert_eq!(read_hex_sysfs(&dir.path().join("missing")), None);
    }

    #[test]
    #[ignore = "requires Wormhole hardware"]
    fn discovers_real_devices() {
        let mgr = DeviceManager::discover().unwrap();
        assert!(mgr.device_count() > 0);
    }
}
