//! Discovered cluster graph: chip identity → Ethernet links.

use crate::error::{Result, WormholeError};
use std::collections::HashMap;
use std::fmt;
use tracing::info;
use wormhole_chip::mesh::ETH_CORE_COUNT;
use wormhole_chip::EthAddr;

/// Links one chip can hold; one per Ethernet core.
pub const MAX_LINKS_PER_CHIP: usize = ETH_CORE_COUNT;

/// One directed edge out of a chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipLink {
    /// Ethernet channel on the owning chip.
    pub local_core: usize,
    /// Ethernet channel on the peer.
    pub remote_core: usize,
    /// Chip at the other end.
    pub peer: EthAddr,
}

/// A chip and its outgoing links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipConnections {
    /// Owning chip.
    pub chip: EthAddr,
    links: Vec<ChipLink>,
}

impl ChipConnections {
    fn new(chip: EthAddr) -> Self {
        Self {
            chip,
            links: Vec::with_capacity(MAX_LINKS_PER_CHIP),
        }
    }

    /// Links in discovery order.
    #[must_use]
    pub fn links(&self) -> &[ChipLink] {
        &self.links
    }

    /// Number of links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

/// Cluster topology.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    chips: HashMap<EthAddr, ChipConnections>,
}

impl Topology {
    /// Empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections of `chip`, if known.
    #[must_use]
    pub fn find(&self, chip: &EthAddr) -> Option<&ChipConnections> {
        self.chips.get(chip)
    }

    /// Entry for `chip`, created empty on first use.
    pub fn insert_if_absent(&mut self, chip: EthAddr) -> &mut ChipConnections {
        self.chips
            .entry(chip)
            .or_insert_with(|| ChipConnections::new(chip))
    }

    /// Record `local:local_core -> peer:remote_core`, creating `local` if needed.
    ///
    /// # Errors
    ///
    /// Returns `LinkCapacityExceeded` if `local` already holds
    /// [`MAX_LINKS_PER_CHIP`] links; the entry is left unchanged.
    pub fn add_link(
        &mut self,
        local: EthAddr,
        peer: EthAddr,
        local_core: usize,
        remote_core: usize,
    ) -> Result<()> {
        let entry = self.insert_if_absent(local);
        if entry.links.len() >= MAX_LINKS_PER_CHIP {
            return Err(WormholeError::LinkCapacityExceeded {
                chip: local,
                capacity: MAX_LINKS_PER_CHIP,
            });
        }
        entry.links.push(ChipLink {
            local_core,
            remote_core,
            peer,
        });
        Ok(())
    }

    /// All entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ChipConnections> {
        self.chips.values()
    }

    /// Number of chips.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chips.len()
    }

    /// Whether no chip is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }

    /// Total directed links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.chips.values().map(ChipConnections::link_count).sum()
    }

    /// Log the dump at info level, one line per record.
    pub fn enumerate(&self) {
        for line in self.to_string().lines() {
            info!("{line}");
        }
    }

    fn sorted(&self) -> Vec<&ChipConnections> {
        let mut entries: Vec<_> = self.chips.values().collect();
        entries.sort_by_key(|entry| entry.chip);
        entries
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Topology: {} chip(s)", self.len())?;
        for entry in self.sorted() {
            writeln!(f, "{} ({} links)", entry.chip, entry.link_count())?;
            for link in entry.links() {
                writeln!(
                    f,
                    "  {} <-> {} : {}/{}",
                    entry.chip, link.peer, link.local_core, link.remote_core
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip(i: u8) -> EthAddr {
        EthAddr::new(0, 0, i, 0)
    }

    #[test]
    fn double_insert_keeps_one_entry() {
        let mut topo = Topology::new();
        topo.insert_if_absent(chip(1));
        topo.add_link(chip(1), chip(2), 0, 8).unwrap();
        topo.insert_if_absent(chip(1));
        assert_eq!(topo.len(), 1);
        assert_eq!(topo.find(&chip(1)).unwrap().link_count(), 1);
    }

    #[test]
    fn seventeenth_link_rejected() {
        let mut topo = Topology::new();
        for core in 0..16 {
            topo.add_link(chip(0), chip(1), core, core).unwrap();
        }
        let err = topo.add_link(chip(0), chip(1), 16, 0).unwrap_err();
        assert!(matches!(
            err,
            WormholeError::LinkCapacityExceeded { capacity: 16, .. }
        ));
        assert_eq!(topo.find(&chip(0)).unwrap().link_count(), 16);
    }

    #[test]
    fn add_link_creates_local_entry_only() {
        let mut topo = Topology::new();
        topo.add_link(chip(3), chip(4), 2, 5).unwrap();
        assert!(topo.find(&chip(3)).is_some());
        assert!(topo.find(&chip(4)).is_none());
    }

    #[test]
    fn dump_format() {
        let mut topo = Topology::new();
        topo.add_link(chip(1), chip(0), 8, 0).unwrap();
        topo.add_link(chip(0), chip(1), 0, 8).unwrap();
        topo.insert_if_absent(chip(2));
        assert_eq!(
            topo.to_string(),
            "Topology: 3 chip(s)\n\
             [0, 0, 0, 0] (1 links)\n  [0, 0, 0, 0] <-> [0, 0, 1, 0] : 0/8\n\
             [0, 0, 1, 0] (1 links)\n  [0, 0, 1, 0] <-> [0, 0, 0, 0] : 8/0\n\
             [0, 0, 2, 0] (0 links)\n"
        );
        assert_eq!(topo.link_count(), 2);
    }
}
