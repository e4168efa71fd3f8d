//! PCIe BAR0 layout for Wormhole: TLB apertures onto the NOC.
//!
//! ```text
//! BAR0 offset     Count  Size     Purpose
//! ─────────────── ────── ──────── ───────────────────────────────────────
//! 0x0000_0000      156    1 MiB    TLB windows
//! 0x09C0_0000       10    2 MiB    TLB windows
//! 0x0B00_0000       20   16 MiB    TLB windows
//! 0x1FC0_0000      186    8 B      TLB configuration registers
//! ```
//!
//! A TLB configuration register points its window at one NOC tile and one
//! aligned page of that tile's address space. Host accesses to the window
//! become NOC transactions.

/// Number of 1 MiB windows.
pub const TLB_1M_COUNT: usize = 156;
/// Number of 2 MiB windows.
pub const TLB_2M_COUNT: usize = 10;
/// Number of 16 MiB windows.
pub const TLB_16M_COUNT: usize = 20;
/// Total TLB windows.
pub const TLB_COUNT: usize = TLB_1M_COUNT + TLB_2M_COUNT + TLB_16M_COUNT;

/// Size of a 16 MiB window.
pub const TLB_16M_SIZE: u64 = 1 << 24;

/// BAR0 offset of the first 16 MiB window.
pub const TLB_16M_BASE: u64 = (TLB_1M_COUNT as u64) * (1 << 20) + (TLB_2M_COUNT as u64) * (1 << 21);

/// BAR0 offset of the TLB configuration register array.
pub const TLB_CONFIG_BASE: u64 = 0x1FC0_0000;

/// Bytes needed to map every window and configuration register.
pub const BAR0_MAP_SIZE: u64 = TLB_CONFIG_BASE + (TLB_COUNT as u64) * 8;

/// 16 MiB windows handed out to host tools, as indices into the 16 MiB bank.
///
/// The low windows stay free for user-space runtimes.
pub const HOST_TLB_POOL: core::ops::Range<usize> = 16..20;

/// Global TLB index of a 16 MiB window.
#[must_use]
pub const fn tlb_16m_index(window: usize) -> usize {
    TLB_1M_COUNT + TLB_2M_COUNT + window
}

/// BAR0 offset of a 16 MiB window's aperture.
#[must_use]
pub const fn tlb_16m_window_addr(window: usize) -> u64 {
    TLB_16M_BASE + (window as u64) * TLB_16M_SIZE
}

/// BAR0 offset of a TLB configuration register.
#[must_use]
pub const fn tlb_config_addr(tlb_index: usize) -> u64 {
    TLB_CONFIG_BASE + (tlb_index as u64) * 8
}

/// NOC transaction ordering selected by a TLB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ordering {
    /// Reads and writes may be reordered.
    Relaxed = 0,
    /// Every access completes before the next is issued.
    Strict = 1,
    /// Writes are posted.
    Posted = 2,
}

/// Contents of one 16 MiB TLB configuration register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlb16M {
    /// Target page: NOC address bits above the 24-bit window.
    pub local_offset: u64,
    /// Target tile x.
    pub x: u8,
    /// Target tile y.
    pub y: u8,
    /// NOC0 or NOC1.
    pub noc_sel: u8,
    /// Ordering mode.
    pub ordering: Ordering,
}

impl Tlb16M {
    const LOCAL_OFFSET_BITS: u32 = 12;
    const X_END: u32 = 12;
    const Y_END: u32 = 18;
    const X_START: u32 = 24;
    const Y_START: u32 = 30;
    const NOC_SEL: u32 = 36;
    const ORDERING: u32 = 38;

    /// Strict unicast window covering `addr` on tile `(x, y)`.
    #[must_use]
    pub const fn unicast(x: u8, y: u8, addr: u64) -> Self {
        Self {
            local_offset: addr / TLB_16M_SIZE,
            x,
            y,
            noc_sel: 0,
            ordering: Ordering::Strict,
        }
    }

    /// Register value. Unicast windows set start == end.
    #[must_use]
    pub const fn encode(&self) -> u64 {
        let x = (self.x & 0x3F) as u64;
        let y = (self.y & 0x3F) as u64;
        (self.local_offset & ((1 << Self::LOCAL_OFFSET_BITS) - 1))
            | (x << Self::X_END)
            | (y << Self::Y_END)
            | (x << Self::X_START)
            | (y << Self::Y_START)
            | (((self.noc_sel & 1) as u64) << Self::NOC_SEL)
            | ((self.ordering as u64) << Self::ORDERING)
    }
}
