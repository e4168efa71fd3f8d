//! Ethernet relay mailbox layout.
//!
//! Each Ethernet core exposes a request ring and a response ring in its L1.
//! The host writes a command into the request ring and bumps the write
//! pointer; the Ethernet firmware forwards it over the link, then:
//!
//! 1. clears the response flags,
//! 2. starts the operation,
//! 3. advances the response write pointer,
//! 4. completes the operation and writes data into the response slot,
//! 5. sets the response flags.
//!
//! Rings are four slots deep. Pointers count modulo 8 so that a full ring
//! (write one lap ahead of read) is distinguishable from an empty one.

// ── Queue registers ──────────────────────────────────────────────────────────

/// Request ring write pointer (host advances).
pub const REQ_WR_PTR: u64 = 0x110a0;
/// Request ring read pointer (firmware advances).
pub const REQ_RD_PTR: u64 = 0x110b0;
/// Request ring slots.
pub const REQ_QUEUE: u64 = 0x110c0;

/// Response ring write pointer (firmware advances).
pub const RESP_WR_PTR: u64 = 0x11220;
/// Response ring read pointer (host advances).
pub const RESP_RD_PTR: u64 = 0x11230;
/// Response ring slots.
pub const RESP_QUEUE: u64 = 0x11240;

// ── Queue geometry ───────────────────────────────────────────────────────────

/// Slots per ring.
pub const QUEUE_DEPTH: u32 = 4;

/// Pointers wrap at twice the depth.
pub const PTR_MASK: u32 = 2 * QUEUE_DEPTH - 1;

const SLOT_MASK: u32 = QUEUE_DEPTH - 1;

/// Whether a ring with these pointers has no free slot.
#[must_use]
pub const fn queue_full(wr: u32, rd: u32) -> bool {
    wr != rd && (wr & SLOT_MASK) == (rd & SLOT_MASK)
}

/// Whether a ring with these pointers holds nothing.
#[must_use]
pub const fn queue_empty(wr: u32, rd: u32) -> bool {
    wr == rd
}

/// Slot index addressed by a pointer.
#[must_use]
pub const fn slot(ptr: u32) -> u32 {
    ptr & SLOT_MASK
}

/// Pointer value after one more entry.
#[must_use]
pub const fn advance(ptr: u32) -> u32 {
    ptr.wrapping_add(1) & PTR_MASK
}

/// Byte offset of a request slot.
#[must_use]
pub const fn req_slot_addr(ptr: u32) -> u64 {
    REQ_QUEUE + slot(ptr) as u64 * cmd::SIZE as u64
}

/// Byte offset of a response slot.
#[must_use]
pub const fn resp_slot_addr(ptr: u32) -> u64 {
    RESP_QUEUE + slot(ptr) as u64 * cmd::SIZE as u64
}

/// Command record layout (32 bytes, little-endian).
pub mod cmd {
    /// Size of one command record.
    pub const SIZE: usize = 32;

    /// `sys_addr: u64`
    pub const SYS_ADDR: usize = 0;
    /// `data: u32`
    pub const DATA: usize = 8;
    /// `flags: u32`
    pub const FLAGS: usize = 12;
    /// `rack: u16`
    pub const RACK: usize = 16;
    /// `src_resp_buf_index: u16`
    pub const SRC_RESP_BUF_INDEX: usize = 18;
    /// `local_buf_index: u32`
    pub const LOCAL_BUF_INDEX: usize = 20;
    /// `src_resp_q_id: u8`
    pub const SRC_RESP_Q_ID: usize = 24;
    /// `host_mem_txn_id: u8`
    pub const HOST_MEM_TXN_ID: usize = 25;
    /// Two bytes of padding.
    pub const PADDING: usize = 26;
    /// `src_addr_tag: u32`
    pub const SRC_ADDR_TAG: usize = 28;
}

/// Command flag bits.
pub mod flags {
    /// Host → firmware: write `data` to `sys_addr`.
    pub const WR_REQ: u32 = 1 << 0;
    /// Firmware → host: write completed.
    pub const WR_ACK: u32 = 1 << 1;
    /// Host → firmware: read 4 bytes from `sys_addr`.
    pub const RD_REQ: u32 = 1 << 2;
    /// Firmware → host: read completed, `data` is valid.
    pub const RD_DATA: u32 = 1 << 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_truth_table() {
        for rd in 0..8 {
            let mut full = 0;
            for wr in 0..8 {
                let expected = wr != rd && (wr & 3) == (rd & 3);
                assert_eq!(queue_full(wr, rd), expected, "wr={wr} rd={rd}");
                if queue_full(wr, rd) {
                    full += 1;
                    assert_eq!(wr, (rd + 4) % 8);
                }
            }
            assert_eq!(full, 1, "exactly one lap-ahead pointer per rd={rd}");
        }
    }

    #[test]
    fn four_pushes_fill_the_ring() {
        let rd = 6;
        let mut wr = rd;
        for _ in 0..QUEUE_DEPTH {
            assert!(!queue_full(wr, rd));
            wr = advance(wr);
        }
        assert!(queue_full(wr, rd));
        assert!(queue_empty(rd, rd));
    }

    #[test]
    fn pointers_wrap_at_eight() {
        assert_eq!(advance(7), 0);
        assert_eq!(advance(3), 4);
        assert_eq!(slot(5), 1);
    }

    #[test]
    fn slot_addresses() {
        assert_eq!(req_slot_addr(0), REQ_QUEUE);
        assert_eq!(req_slot_addr(5), REQ_QUEUE + 32);
        assert_eq!(resp_slot_addr(7), RESP_QUEUE + 96);
        // The response ring starts well past the last request slot.
        assert!(req_slot_addr(3) + cmd::SIZE as u64 <= RESP_WR_PTR);
    }

    #[test]
    fn command_layout_is_packed() {
        assert_eq!(cmd::DATA, cmd::SYS_ADDR + 8);
        assert_eq!(cmd::FLAGS, cmd::DATA + 4);
        assert_eq!(cmd::SRC_ADDR_TAG + 4, cmd::SIZE);
    }
}
