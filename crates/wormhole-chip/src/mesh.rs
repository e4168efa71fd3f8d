//! Ethernet core placement on the Wormhole NOC0 grid.
//!
//! A Wormhole has 16 Ethernet cores split over two rows of the grid (y = 0
//! and y = 6). Channel numbers follow the firmware's interleaved ordering,
//! not left-to-right placement.
//!
//! ```text
//! channel  0  1  2  3  4  5  6  7     8  9 10 11 12 13 14 15
//! x        9  1  8  2  7  3  6  4     9  1  8  2  7  3  6  4
//! y        0  0  0  0  0  0  0  0     6  6  6  6  6  6  6  6
//! ```

/// Ethernet cores per chip; also the maximum fan-out of one chip.
pub const ETH_CORE_COUNT: usize = 16;

/// NOC0 x coordinate per channel.
pub const ETH_NOC0_X: [u8; ETH_CORE_COUNT] = [9, 1, 8, 2, 7, 3, 6, 4, 9, 1, 8, 2, 7, 3, 6, 4];

/// NOC0 y coordinate per channel.
pub const ETH_NOC0_Y: [u8; ETH_CORE_COUNT] = [0, 0, 0, 0, 0, 0, 0, 0, 6, 6, 6, 6, 6, 6, 6, 6];

/// Channel whose node info is used to identify the local chip.
pub const IDENTITY_CHANNEL: usize = 0;

/// NOC0 coordinate of an Ethernet channel, `None` past the last core.
#[must_use]
pub const fn eth_core_coord(channel: usize) -> Option<(u8, u8)> {
    if channel < ETH_CORE_COUNT {
        Some((ETH_NOC0_X[channel], ETH_NOC0_Y[channel]))
    } else {
        None
    }
}

/// Channel number of the Ethernet core at `(x, y)`, if there is one.
#[must_use]
pub fn channel_for_coord(x: u8, y: u8) -> Option<usize> {
    ETH_NOC0_X
        .iter()
        .zip(ETH_NOC0_Y.iter())
        .position(|(&cx, &cy)| cx == x && cy == y)
}

/// Whether `(x, y)` is one of the Ethernet cores.
#[must_use]
pub fn is_eth_core(x: u8, y: u8) -> bool {
    channel_for_coord(x, y).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_channel_resolves_back() {
        for channel in 0..ETH_CORE_COUNT {
            let (x, y) = eth_core_coord(channel).unwrap();
            assert_eq!(channel_for_coord(x, y), Some(channel));
        }
    }

    #[test]
    fn coordinates_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for channel in 0..ETH_CORE_COUNT {
            assert!(seen.insert(eth_core_coord(channel)));
        }
    }

    #[test]
    fn non_eth_tiles() {
        assert_eq!(channel_for_coord(0, 0), None);
        assert_eq!(channel_for_coord(9, 3), None);
        assert_eq!(eth_core_coord(ETH_CORE_COUNT), None);
        assert!(is_eth_core(4, 6));
    }
}
