//! PCIe identifiers.

/// Tenstorrent vendor ID (PCI-SIG assigned).
pub const TENSTORRENT_VENDOR_ID: u16 = 0x1E52;

/// Device IDs for Tenstorrent accelerators.
pub mod device_id {
    /// Grayskull (no Ethernet cores).
    pub const GRAYSKULL: u16 = 0xFACA;
    /// Wormhole n150 / n300.
    pub const WORMHOLE: u16 = 0x401E;
    /// Blackhole.
    pub const BLACKHOLE: u16 = 0xB140;
}

/// Devices whose Ethernet cores speak the relay protocol in this crate.
pub const ETH_CAPABLE_DEVICE_IDS: &[u16] = &[device_id::WORMHOLE];

/// Chip architecture identified from the PCI device ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipVariant {
    /// Grayskull.
    Grayskull,
    /// Wormhole.
    Wormhole,
    /// Blackhole.
    Blackhole,
    /// Unknown / future device.
    Unknown(u16),
}

impl ChipVariant {
    /// Identify the architecture from a PCI device ID.
    #[must_use]
    pub const fn from_device_id(id: u16) -> Self {
        match id {
            device_id::GRAYSKULL => Self::Grayskull,
            device_id::WORMHOLE => Self::Wormhole,
            device_id::BLACKHOLE => Self::Blackhole,
            other => Self::Unknown(other),
        }
    }

    /// Whether this architecture has Ethernet cores with relay mailboxes.
    #[must_use]
    pub const fn has_eth_relay(&self) -> bool {
        matches!(self, Self::Wormhole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_from_ids() {
        assert_eq!(ChipVariant::from_device_id(0x401E), ChipVariant::Wormhole);
        assert_eq!(ChipVariant::from_device_id(0x1234), ChipVariant::Unknown(0x1234));
        assert!(ChipVariant::Wormhole.has_eth_relay());
        assert!(!ChipVariant::Grayskull.has_eth_relay());
    }
}
