//! Ethernet core (ERISC) register map for Wormhole.
//!
//! Offsets are byte addresses inside one Ethernet core's L1 window, reached
//! through the NOC at that core's `(x, y)` coordinate. They are written by
//! the Ethernet firmware once link training completes and are laid out for
//! firmware `6.6.9` and newer.
//!
//! ```text
//! 0x000210: firmware version
//! 0x001100: node_info block (rack/shelf, NOC coordinates, remote identity)
//! 0x001200: port status, one u32 per Ethernet channel
//! 0x0110a0: relay request queue pointers + ring   (see `mailbox`)
//! 0x011220: relay response queue pointers + ring  (see `mailbox`)
//! ```

// ── Firmware ─────────────────────────────────────────────────────────────────

/// Ethernet firmware version word.
pub const FW_VERSION: u64 = 0x210;

/// Oldest firmware that implements the relay queues at the offsets below.
pub const MIN_FW_VERSION: u32 = 0x0606_9000;

// ── Link status ──────────────────────────────────────────────────────────────

/// Port status array base; channel `i` lives at `PORT_STATUS + 4 * i`.
pub const PORT_STATUS: u64 = 0x1200;

/// Port status word for a given Ethernet channel.
#[must_use]
pub const fn port_status_addr(channel: usize) -> u64 {
    PORT_STATUS + (channel as u64) * 4
}

/// Port status values.
pub mod port_status {
    /// Training has not reported anything yet.
    pub const UNKNOWN: u32 = 0;
    /// No cable or the partner never trained.
    pub const NOT_CONNECTED: u32 = 1;
    /// Link trained. Every value above `NOT_CONNECTED` counts as connected.
    pub const UP: u32 = 2;

    /// Whether a port status value describes a live link.
    #[must_use]
    pub const fn is_connected(status: u32) -> bool {
        !matches!(status, UNKNOWN | NOT_CONNECTED)
    }
}

// ── Node info ────────────────────────────────────────────────────────────────

/// Start of the `node_info` block.
pub const NODE_INFO: u64 = 0x1100;

/// Packed local identity: rack_x, rack_y, shelf_x, shelf_y (one byte each, LSB first).
pub const LOCAL_RACK_SHELF: u64 = 0x1108;

/// NOC0 x coordinate of this Ethernet core.
pub const LOCAL_NOC0_X: u64 = 0x1110;

/// NOC0 y coordinate of this Ethernet core.
pub const LOCAL_NOC0_Y: u64 = 0x1118;

/// Packed remote shelf and remote core coordinate.
///
/// `[4..10)` remote NOC x, `[10..16)` remote NOC y, `[16..22)` remote
/// shelf_x, `[22..28)` remote shelf_y.
pub const REMOTE_SHELF: u64 = 0x1124;

/// Packed remote rack: rack_x in byte 0, rack_y in byte 1.
pub const REMOTE_RACK: u64 = 0x1128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_status_stride() {
        assert_eq!(port_status_addr(0), 0x1200);
        assert_eq!(port_status_addr(15), 0x123c);
    }

    #[test]
    fn connected_statuses() {
        assert!(!port_status::is_connected(port_status::UNKNOWN));
        assert!(!port_status::is_connected(port_status::NOT_CONNECTED));
        assert!(port_status::is_connected(port_status::UP));
        assert!(port_status::is_connected(7));
    }

    #[test]
    fn node_info_layout() {
        assert_eq!(LOCAL_RACK_SHELF - NODE_INFO, 8);
        assert!(REMOTE_SHELF < REMOTE_RACK);
    }
}
