//! Relay mailbox client
//!
//! Reads and writes a 32-bit word on a remote chip by posting a command into
//! the request ring of a local Ethernet core and waiting for the firmware's
//! answer in the response ring.
//!
//! ```text
//! acquire window
//!   → check relay firmware
//!   → read req_wr, req_rd, resp_wr, resp_rd
//!   → refuse if request ring full
//!   → write command to slot req_wr, publish req_wr + 1
//!   → wait for resp_wr to move              (bounded)
//!   → wait for flags in slot resp_rd != 0   (bounded)
//!   → read data, publish resp_rd + 1        (always)
//!   → Timeout unless resp_wr moved and flags were set
//! release window
//! ```

use crate::backend::{NocBackend, NocWindow};
use crate::config::EthConfig;
use crate::error::{Result, WormholeError};
use bytes::{Buf, BufMut};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use wormhole_chip::mailbox::{
    advance, cmd, flags, queue_full, req_slot_addr, resp_slot_addr, PTR_MASK, REQ_RD_PTR,
    REQ_WR_PTR, RESP_RD_PTR, RESP_WR_PTR,
};
use wormhole_chip::{eth_core_coord, regs};

/// One 32-byte relay command record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EthCommand {
    /// Target system address.
    pub sys_addr: u64,
    /// Transfer size for read requests, value for write requests and read responses.
    pub data: u32,
    /// See [`wormhole_chip::mailbox::flags`].
    pub flags: u32,
    /// Target rack, `rack_y << 8 | rack_x`.
    pub rack: u16,
    /// Unused by register access.
    pub src_resp_buf_index: u16,
    /// Unused by register access.
    pub local_buf_index: u32,
    /// Unused by register access.
    pub src_resp_q_id: u8,
    /// Unused by register access.
    pub host_mem_txn_id: u8,
    /// Unused by register access.
    pub src_addr_tag: u32,
}

impl EthCommand {
    /// A 4-byte read of `sys_addr`.
    #[must_use]
    pub fn read_request(sys_addr: u64, rack: u16) -> Self {
        Self {
            sys_addr,
            data: 4,
            flags: flags::RD_REQ,
            rack,
            ..Self::default()
        }
    }

    /// A 4-byte write of `value` to `sys_addr`.
    #[must_use]
    pub fn write_request(sys_addr: u64, rack: u16, value: u32) -> Self {
        Self {
            sys_addr,
            data: value,
            flags: flags::WR_REQ,
            rack,
            ..Self::default()
        }
    }

    /// Little-endian wire image.
    #[must_use]
    pub fn encode(&self) -> [u8; cmd::SIZE] {
        let mut out = [0u8; cmd::SIZE];
        let mut buf = &mut out[..];
        buf.put_u64_le(self.sys_addr);
        buf.put_u32_le(self.data);
        buf.put_u32_le(self.flags);
        buf.put_u16_le(self.rack);
        buf.put_u16_le(self.src_resp_buf_index);
        buf.put_u32_le(self.local_buf_index);
        buf.put_u8(self.src_resp_q_id);
        buf.put_u8(self.host_mem_txn_id);
        buf.put_u16_le(0);
        buf.put_u32_le(self.src_addr_tag);
        out
    }

    /// Parse a wire image.
    #[must_use]
    pub fn decode(raw: &[u8; cmd::SIZE]) -> Self {
        let mut buf = &raw[..];
        let sys_addr = buf.get_u64_le();
        let data = buf.get_u32_le();
        let flags = buf.get_u32_le();
        let rack = buf.get_u16_le();
        let src_resp_buf_index = buf.get_u16_le();
        let local_buf_index = buf.get_u32_le();
        let src_resp_q_id = buf.get_u8();
        let host_mem_txn_id = buf.get_u8();
        buf.advance(2);
        let src_addr_tag = buf.get_u32_le();
        Self {
            sys_addr,
            data,
            flags,
            rack,
            src_resp_buf_index,
            local_buf_index,
            src_resp_q_id,
            host_mem_txn_id,
            src_addr_tag,
        }
    }
}

/// Mailbox client bound to one local chip.
#[derive(Debug, Clone, Copy)]
pub struct EthMailbox<'a> {
    noc: &'a dyn NocBackend,
    config: &'a EthConfig,
}

impl<'a> EthMailbox<'a> {
    /// Create a client over `noc`.
    pub fn new(noc: &'a dyn NocBackend, config: &'a EthConfig) -> Self {
        Self { noc, config }
    }

    /// Read a word at `sys_addr` in `rack`, relayed by local Ethernet `core`.
    ///
    /// # Errors
    ///
    /// `FirmwareTooOld` and `QueueFull` before anything is written;
    /// `Timeout` or `UnexpectedResponse` after the response read pointer has
    /// been advanced; `ContextUnavailable` when no window is free.
    pub fn read32(&self, core: usize, sys_addr: u64, rack: u16) -> Result<u32> {
        self.transact(core, &EthCommand::read_request(sys_addr, rack), flags::RD_DATA)
    }

    /// Write `value` at `sys_addr` in `rack`, relayed by local Ethernet `core`.
    ///
    /// # Errors
    ///
    /// Same as [`EthMailbox::read32`], with `WR_ACK` as the expected completion.
    pub fn write32(&self, core: usize, sys_addr: u64, rack: u16, value: u32) -> Result<()> {
        self.transact(core, &EthCommand::write_request(sys_addr, rack, value), flags::WR_ACK)
            .map(|_| ())
    }

    fn transact(&self, core: usize, request: &EthCommand, expected: u32) -> Result<u32> {
        let (x, y) = eth_core_coord(core).ok_or(WormholeError::InvalidCore { core })?;
        let mut win = self.noc.acquire()?;

        let version = win.read32(x, y, regs::FW_VERSION)?;
        if version < self.config.min_fw_version {
            error!(
                "Ethernet core {core} firmware {version:#x} below {:#x}, relay refused",
                self.config.min_fw_version
            );
            return Err(WormholeError::FirmwareTooOld {
                core,
                version,
                minimum: self.config.min_fw_version,
            });
        }

        let req_wr = win.read32(x, y, REQ_WR_PTR)? & PTR_MASK;
        let req_rd = win.read32(x, y, REQ_RD_PTR)? & PTR_MASK;
        let resp_wr = win.read32(x, y, RESP_WR_PTR)? & PTR_MASK;
        let resp_rd = win.read32(x, y, RESP_RD_PTR)? & PTR_MASK;

        if queue_full(req_wr, req_rd) {
            error!("Ethernet core {core} request queue full (wr={req_wr}, rd={req_rd})");
            return Err(WormholeError::QueueFull { core });
        }

        debug!(
            "Relay via core {core}: sys_addr={:#x} rack={:#x} flags={:#x} slot={req_wr}",
            request.sys_addr, request.rack, request.flags
        );

        win.write_block(x, y, req_slot_addr(req_wr), &request.encode())?;
        win.write32(x, y, REQ_WR_PTR, advance(req_wr))?;

        let response = await_response(
            &mut *win,
            (x, y),
            resp_wr,
            resp_slot_addr(resp_rd),
            self.config.response_timeout,
        );
        // Drained on every path once the request is out.
        win.write32(x, y, RESP_RD_PTR, advance(resp_rd))?;
        let (moved, response_flags, data) = response?;

        if !moved {
            warn!(
                "Ethernet core {core}: response slot not allocated within {}ms",
                self.config.timeout_ms()
            );
        }
        finish(core, moved, response_flags, expected, data, self.config.timeout_ms())
    }
}

/// Wait for the relay to allocate a response slot, then for the flags of
/// `slot` to go non-zero, and read its data word.
///
/// Returns whether the response write pointer moved off `resp_wr`, the flags
/// and the data. Both waits run to their own deadline.
fn await_response<W: NocWindow + ?Sized>(
    win: &mut W,
    (x, y): (u8, u8),
    resp_wr: u32,
    slot: u64,
    timeout: Duration,
) -> Result<(bool, u32, u32)> {
    let deadline = Instant::now() + timeout;
    let moved = poll_until(deadline, || {
        Ok((win.read32(x, y, RESP_WR_PTR)? & PTR_MASK) != resp_wr)
    })?;

    let deadline = Instant::now() + timeout;
    let mut response_flags = 0;
    poll_until(deadline, || {
        response_flags = win.read32(x, y, slot + cmd::FLAGS as u64)?;
        Ok(response_flags != 0)
    })?;

    let data = win.read32(x, y, slot + cmd::DATA as u64)?;
    Ok((moved, response_flags, data))
}

/// Flags left over from an earlier exchange count only if the relay allocated
/// a fresh slot.
fn finish(
    core: usize,
    moved: bool,
    response_flags: u32,
    expected: u32,
    data: u32,
    duration_ms: u64,
) -> Result<u32> {
    match response_flags {
        _ if !moved => Err(WormholeError::Timeout { core, duration_ms }),
        f if f == expected => Ok(data),
        0 => Err(WormholeError::Timeout { core, duration_ms }),
        f => Err(WormholeError::UnexpectedResponse { core, flags: f }),
    }
}

/// Poll `done` until it reports true or `deadline` passes. Checks at least once.
fn poll_until(deadline: Instant, mut done: impl FnMut() -> Result<bool>) -> Result<bool> {
    loop {
        if done()? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_wire_image() {
        let raw = EthCommand::read_request(0x00C2_1440_0000_0123, 0x0201).encode();
        assert_eq!(&raw[cmd::SYS_ADDR..8], &0x00C2_1440_0000_0123u64.to_le_bytes());
        assert_eq!(&raw[cmd::DATA..12], &4u32.to_le_bytes());
        assert_eq!(&raw[cmd::FLAGS..16], &flags::RD_REQ.to_le_bytes());
        assert_eq!(&raw[cmd::RACK..18], &[0x01, 0x02]);
        assert!(raw[cmd::SRC_RESP_BUF_INDEX..].iter().all(|&b| b == 0));
    }

    #[test]
    fn decode_reads_every_field() {
        let command = EthCommand {
            sys_addr: 1,
            data: 2,
            flags: 3,
            rack: 4,
            src_resp_buf_index: 5,
            local_buf_index: 6,
            src_resp_q_id: 7,
            host_mem_txn_id: 8,
            src_addr_tag: 9,
        };
        let raw = command.encode();
        assert_eq!(raw[cmd::SRC_RESP_Q_ID], 7);
        assert_eq!(raw[cmd::HOST_MEM_TXN_ID], 8);
        assert_eq!(&raw[cmd::PADDING..cmd::PADDING + 2], &[0, 0]);
        assert_eq!(raw[cmd::SRC_ADDR_TAG], 9);
        assert_eq!(EthCommand::decode(&raw), command);
    }

    #[test]
    fn completion_codes() {
        assert_eq!(finish(0, true, flags::RD_DATA, flags::RD_DATA, 7, 1).unwrap(), 7);
        assert!(matches!(
            finish(0, true, 0, flags::RD_DATA, 7, 1),
            Err(WormholeError::Timeout { core: 0, duration_ms: 1 })
        ));
        assert!(matches!(
            finish(2, true, flags::WR_ACK, flags::RD_DATA, 7, 1),
            Err(WormholeError::UnexpectedResponse { core: 2, flags: 2 })
        ));
    }

    /// Register file that fails every read of the first response slot's flags.
    #[derive(Debug, Default)]
    struct FailingFlags {
        regs: std::sync::Mutex<std::collections::HashMap<u64, u32>>,
    }

    struct FailingFlagsWindow<'a>(&'a FailingFlags);

    impl NocWindow for FailingFlagsWindow<'_> {
        fn read32(&mut self, _x: u8, _y: u8, addr: u64) -> Result<u32> {
            if addr == resp_slot_addr(0) + cmd::FLAGS as u64 {
                return Err(WormholeError::transfer_failed("flags read"));
            }
            Ok(self.0.regs.lock().unwrap().get(&addr).copied().unwrap_or(0))
        }

        fn write32(&mut self, _x: u8, _y: u8, addr: u64, value: u32) -> Result<()> {
            self.0.regs.lock().unwrap().insert(addr, value);
            Ok(())
        }

        fn read_block(&mut self, _x: u8, _y: u8, _addr: u64, buf: &mut [u8]) -> Result<()> {
            buf.fill(0);
            Ok(())
        }

        fn write_block(&mut self, _x: u8, _y: u8, _addr: u64, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    impl NocBackend for FailingFlags {
        fn acquire(&self) -> Result<Box<dyn NocWindow + '_>> {
            Ok(Box::new(FailingFlagsWindow(self)))
        }

        fn backend_type(&self) -> crate::backend::BackendType {
            crate::backend::BackendType::Software
        }
    }

    #[test]
    fn failed_response_read_still_drains() {
        let noc = FailingFlags::default();
        noc.regs
            .lock()
            .unwrap()
            .insert(regs::FW_VERSION, regs::MIN_FW_VERSION);
        let config = EthConfig::default().with_response_timeout(Duration::from_millis(1));

        let err = EthMailbox::new(&noc, &config).read32(0, 0, 0).unwrap_err();

        assert!(matches!(err, WormholeError::TransferFailed { .. }));
        let written = noc.regs.lock().unwrap();
        assert_eq!(written.get(&REQ_WR_PTR), Some(&1));
        assert_eq!(written.get(&RESP_RD_PTR), Some(&1));
    }

    #[test]
    fn completion_without_fresh_slot_is_timeout() {
        for stale in [flags::RD_DATA, flags::WR_ACK, 0] {
            assert!(matches!(
                finish(1, false, stale, flags::RD_DATA, 7, 5),
                Err(WormholeError::Timeout { core: 1, duration_ms: 5 })
            ));
        }
    }
}
