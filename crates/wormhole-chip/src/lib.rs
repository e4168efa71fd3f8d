//! Silicon model for Tenstorrent Wormhole Ethernet connectivity.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the silicon: Ethernet core register offsets, the fixed core
//! coordinate table, the relay mailbox layout, chip addressing and the BAR0
//! TLB aperture used to reach the NOC from the host.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`pcie`] | Vendor/device IDs |
//! | [`bar`] | BAR0 TLB windows and configuration register encoding |
//! | [`regs`] | Ethernet core register map, port status, firmware floor |
//! | [`mesh`] | The 16 Ethernet core NOC0 coordinates and reverse lookup |
//! | [`addr`] | Chip identity (`EthAddr`) and the 64-bit system address |
//! | [`mailbox`] | Relay queue registers, command layout, pointer arithmetic |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod addr;
pub mod bar;
pub mod mailbox;
pub mod mesh;
pub mod pcie;
pub mod regs;

pub use addr::{decode_sys_addr, encode_sys_addr, EthAddr, ParseEthAddrError, SysAddr};
pub use mesh::{channel_for_coord, eth_core_coord, ETH_CORE_COUNT};
