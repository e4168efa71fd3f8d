//! Chip identity and the 64-bit system address used by the relay mailbox.
//!
//! ```text
//!  63    60 59      54 53      48 47      42 41      36 35                 0
//! ┌────────┬──────────┬──────────┬──────────┬──────────┬───────────────────┐
//! │ unused │ chip_y   │ chip_x   │ noc_y    │ noc_x    │ local offset      │
//! └────────┴──────────┴──────────┴──────────┴──────────┴───────────────────┘
//! ```
//!
//! For Ethernet relay traffic `chip_x`/`chip_y` are the target's shelf
//! coordinates; the rack travels separately in the command's `rack` field.

use std::fmt;
use std::str::FromStr;

/// Width of each coordinate field in a system address.
pub const NODE_ID_BITS: u32 = 6;

/// Width of the tile-local offset in a system address.
pub const LOCAL_BITS: u32 = 36;

const NODE_ID_MASK: u64 = (1 << NODE_ID_BITS) - 1;
const LOCAL_MASK: u64 = (1 << LOCAL_BITS) - 1;

/// Pack chip and tile coordinates with a local offset into a system address.
///
/// Coordinates are truncated to 6 bits and the offset to 36 bits.
#[must_use]
pub const fn encode_sys_addr(chip_x: u8, chip_y: u8, noc_x: u8, noc_y: u8, offset: u64) -> u64 {
    let mut result = chip_y as u64 & NODE_ID_MASK;
    result <<= NODE_ID_BITS;
    result |= chip_x as u64 & NODE_ID_MASK;
    result <<= NODE_ID_BITS;
    result |= noc_y as u64 & NODE_ID_MASK;
    result <<= NODE_ID_BITS;
    result |= noc_x as u64 & NODE_ID_MASK;
    result <<= LOCAL_BITS;
    result | (offset & LOCAL_MASK)
}

/// Unpacked system address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SysAddr {
    /// Target chip x (shelf_x for relay traffic).
    pub chip_x: u8,
    /// Target chip y (shelf_y for relay traffic).
    pub chip_y: u8,
    /// Target tile x.
    pub noc_x: u8,
    /// Target tile y.
    pub noc_y: u8,
    /// Tile-local byte offset.
    pub offset: u64,
}

/// Inverse of [`encode_sys_addr`].
#[must_use]
pub const fn decode_sys_addr(sys_addr: u64) -> SysAddr {
    SysAddr {
        noc_x: node_field(sys_addr, 0),
        noc_y: node_field(sys_addr, 1),
        chip_x: node_field(sys_addr, 2),
        chip_y: node_field(sys_addr, 3),
        offset: sys_addr & LOCAL_MASK,
    }
}

#[allow(clippy::cast_possible_truncation)] // masked to 6 bits
const fn node_field(sys_addr: u64, index: u32) -> u8 {
    ((sys_addr >> (LOCAL_BITS + index * NODE_ID_BITS)) & NODE_ID_MASK) as u8
}

/// Identity of one chip in an Ethernet-connected cluster.
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EthAddr {
    /// Rack column.
    pub rack_x: u8,
    /// Rack row.
    pub rack_y: u8,
    /// Chip position within the shelf, x.
    pub shelf_x: u8,
    /// Chip position within the shelf, y.
    pub shelf_y: u8,
}

impl EthAddr {
    /// Build an identity from its four coordinates.
    #[must_use]
    pub const fn new(rack_x: u8, rack_y: u8, shelf_x: u8, shelf_y: u8) -> Self {
        Self {
            rack_x,
            rack_y,
            shelf_x,
            shelf_y,
        }
    }

    /// Decode the `LOCAL_RACK_SHELF` register (one byte per field, LSB first).
    #[must_use]
    pub const fn from_local_rack_shelf(word: u32) -> Self {
        let [rack_x, rack_y, shelf_x, shelf_y] = word.to_le_bytes();
        Self::new(rack_x, rack_y, shelf_x, shelf_y)
    }

    /// Encode into the `LOCAL_RACK_SHELF` register layout.
    #[must_use]
    pub const fn to_local_rack_shelf(self) -> u32 {
        u32::from_le_bytes([self.rack_x, self.rack_y, self.shelf_x, self.shelf_y])
    }

    /// Decode the link partner from the `REMOTE_RACK` and `REMOTE_SHELF` registers.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_remote(remote_rack: u32, remote_shelf: u32) -> Self {
        Self::new(
            (remote_rack & 0xFF) as u8,
            ((remote_rack >> 8) & 0xFF) as u8,
            ((remote_shelf >> 16) & 0x3F) as u8,
            ((remote_shelf >> 22) & 0x3F) as u8,
        )
    }

    /// The 16-bit rack field carried in a mailbox command.
    #[must_use]
    pub const fn rack_field(self) -> u16 {
        ((self.rack_y as u16) << 8) | self.rack_x as u16
    }

    /// Split a mailbox rack field back into `(rack_x, rack_y)`.
    #[must_use]
    pub const fn rack_from_field(rack: u16) -> (u8, u8) {
        let [rack_x, rack_y] = rack.to_le_bytes();
        (rack_x, rack_y)
    }

    /// System address of `(noc_x, noc_y, offset)` on this chip.
    #[must_use]
    pub const fn sys_addr(self, noc_x: u8, noc_y: u8, offset: u64) -> u64 {
        encode_sys_addr(self.shelf_x, self.shelf_y, noc_x, noc_y, offset)
    }
}

/// NOC0 coordinate of the partner core, from the `REMOTE_SHELF` register.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn remote_noc_coord(remote_shelf: u32) -> (u8, u8) {
    (
        ((remote_shelf >> 4) & 0x3F) as u8,
        ((remote_shelf >> 10) & 0x3F) as u8,
    )
}

/// Build a `REMOTE_SHELF` value (inverse of the decoders above).
#[must_use]
pub const fn pack_remote_shelf(shelf_x: u8, shelf_y: u8, noc_x: u8, noc_y: u8) -> u32 {
    ((noc_x as u32 & 0x3F) << 4)
        | ((noc_y as u32 & 0x3F) << 10)
        | ((shelf_x as u32 & 0x3F) << 16)
        | ((shelf_y as u32 & 0x3F) << 22)
}

impl fmt::Display for EthAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.rack_x, self.rack_y, self.shelf_x, self.shelf_y
        )
    }
}

/// Error parsing an [`EthAddr`] from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEthAddrError(String);

impl fmt::Display for ParseEthAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid chip address '{}': expected rack_x,rack_y,shelf_x,shelf_y", self.0)
    }
}

impl std::error::Error for ParseEthAddrError {}

impl FromStr for EthAddr {
    type Err = ParseEthAddrError;

    /// Accepts `rx,ry,sx,sy`, optionally wrapped in brackets.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEthAddrError(s.to_string());
        let body = s.trim().trim_start_matches('[').trim_end_matches(']');
        let fields = body
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| err())?;

        match fields.as_slice() {
            &[rack_x, rack_y, shelf_x, shelf_y] => Ok(Self::new(rack_x, rack_y, shelf_x, shelf_y)),
            _ => Err(err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_addr_fixture() {
        let expected = (((((3u64 << 6) | 2) << 6 | 5) << 6 | 4) << 36) | 0x123;
        assert_eq!(encode_sys_addr(2, 3, 4, 5, 0x123), expected);
        assert_eq!(expected, 0x00C2_1440_0000_0123);
    }

    #[test]
    fn sys_addr_masks_fields() {
        // Over-wide coordinate and offset are cut down to 6 and 36 bits.
        let addr = encode_sys_addr(0x41, 0, 0, 0, 0x10_0000_0010);
        assert_eq!(decode_sys_addr(addr).chip_x, 1);
        assert_eq!(decode_sys_addr(addr).offset, 0x10);
    }

    #[test]
    fn sys_addr_decodes_fields() {
        let decoded = decode_sys_addr(encode_sys_addr(2, 3, 9, 6, 0x110a0));
        assert_eq!(
            decoded,
            SysAddr {
                chip_x: 2,
                chip_y: 3,
                noc_x: 9,
                noc_y: 6,
                offset: 0x110a0
            }
        );
    }

    #[test]
    fn local_rack_shelf_byte_order() {
        let addr = EthAddr::from_local_rack_shelf(0x0403_0201);
        assert_eq!(addr, EthAddr::new(1, 2, 3, 4));
        assert_eq!(addr.to_local_rack_shelf(), 0x0403_0201);
    }

    #[test]
    fn remote_identity_bitfields() {
        let shelf = pack_remote_shelf(5, 1, 9, 6);
        assert_eq!(remote_noc_coord(shelf), (9, 6));
        assert_eq!(EthAddr::from_remote(0x0201, shelf), EthAddr::new(1, 2, 5, 1));
    }

    #[test]
    fn rack_field_round_trip() {
        let addr = EthAddr::new(0x12, 0x34, 0, 0);
        assert_eq!(addr.rack_field(), 0x3412);
        assert_eq!(EthAddr::rack_from_field(0x3412), (0x12, 0x34));
    }

    #[test]
    fn parse_and_display() {
        let addr: EthAddr = "0, 1,2 ,3".parse().unwrap();
        assert_eq!(addr, EthAddr::new(0, 1, 2, 3));
        assert_eq!(addr.to_string(), "[0, 1, 2, 3]");
        assert_eq!(addr.to_string().parse::<EthAddr>().unwrap(), addr);
        assert!("1,2,3".parse::<EthAddr>().is_err());
        assert!("1,2,3,300".parse::<EthAddr>().is_err());
    }
}
