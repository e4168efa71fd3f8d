//! `wormhole`: command-line interface for Tenstorrent Wormhole Ethernet clusters.
//!
//! ```text
//! USAGE:
//!   wormhole enumerate                               List Wormhole PCIe functions
//!   wormhole scan                                    Connected Ethernet cores of the local chip
//!   wormhole topology                                Discover and dump the cluster
//!   wormhole read  <chip> <x> <y> <addr>             Routed 32-bit register read
//!   wormhole write <chip> <x> <y> <addr> <value>     Routed 32-bit register write
//!
//! TARGET (all but enumerate):
//!   --device <index|pcie-addr>   Hardware device (default 0)
//!   --sim-ring <N>               Simulated ring of N chips instead of hardware
//!   --timeout-ms, --max-chips, --relay-core
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wormhole_driver::{
    select_backend, BackendSelection, DeviceManager, EthAddr, EthConfig, WormholeDevice,
};

#[derive(Parser)]
#[command(name = "wormhole", about = "Tenstorrent Wormhole Ethernet cluster CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List Wormhole PCIe functions.
    Enumerate,
    /// List the local chip's connected Ethernet cores.
    Scan {
        #[command(flatten)]
        target: Target,
    },
    /// Walk the Ethernet mesh and print the topology.
    Topology {
        #[command(flatten)]
        target: Target,
    },
    /// Read a 32-bit register on any chip of the cluster.
    Read {
        #[command(flatten)]
        target: Target,
        /// Chip as rack_x,rack_y,shelf_x,shelf_y (e.g. 0,0,1,0).
        chip: EthAddr,
        /// Tile x on NOC0.
        x: u8,
        /// Tile y on NOC0.
        y: u8,
        /// Byte offset in the tile (hex with 0x, or decimal).
        #[arg(value_parser = parse_u64)]
        addr: u64,
    },
    /// Write a 32-bit register on any chip of the cluster.
    Write {
        #[command(flatten)]
        target: Target,
        /// Chip as rack_x,rack_y,shelf_x,shelf_y (e.g. 0,0,1,0).
        chip: EthAddr,
        /// Tile x on NOC0.
        x: u8,
        /// Tile y on NOC0.
        y: u8,
        /// Byte offset in the tile (hex with 0x, or decimal).
        #[arg(value_parser = parse_u64)]
        addr: u64,
        /// Value to write (hex with 0x, or decimal).
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
}

/// Which host-attached chip to talk to, and how.
#[derive(Args, Debug, Clone)]
struct Target {
    /// PCIe address (e.g. 0000:01:00.0) or device index (e.g. 0).
    #[arg(long, default_value = "0", conflicts_with = "sim_ring")]
    device: String,

    /// Use a simulated ring of N chips instead of hardware.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..))]
    sim_ring: Option<u8>,

    /// Relay response timeout in milliseconds.
    #[arg(long, default_value_t = 250)]
    timeout_ms: u64,

    /// Capacity of the discovery stack.
    #[arg(long, default_value_t = 0xFFFF)]
    max_chips: usize,

    /// Local Ethernet core used as relay.
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..16))]
    relay_core: u8,
}

impl Target {
    fn config(&self) -> EthConfig {
        EthConfig::default()
            .with_response_timeout(Duration::from_millis(self.timeout_ms))
            .with_max_topology_chips(self.max_chips)
            .with_relay_core(usize::from(self.relay_core))
    }

    fn selection(&self) -> Result<BackendSelection> {
        if let Some(chips) = self.sim_ring {
            return Ok(BackendSelection::SimulatedRing(chips));
        }
        let mgr = DeviceManager::discover()?;
        let info = mgr
            .resolve(&self.device)
            .with_context(|| format!("Device not found: {}", self.device))?;
        Ok(BackendSelection::Tlb(info.pcie_address.clone()))
    }

    fn open(&self) -> Result<WormholeDevice> {
        let selection = self.selection()?;
        let label = match &selection {
            BackendSelection::Tlb(pcie_address) => pcie_address.clone(),
            BackendSelection::SimulatedRing(chips) => format!("sim-ring-{chips}"),
        };
        tracing::debug!("Opening {label} with {:?}", self.config());
        let backend = select_backend(&selection)
            .with_context(|| format!("Cannot open {label}"))?;
        Ok(WormholeDevice::with_backend(label, backend, self.config()))
    }
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("{s} does not fit in 32 bits"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Enumerate => cmd_enumerate()?,
        Cmd::Scan { target } => cmd_scan(&target)?,
        Cmd::Topology { target } => cmd_topology(&target)?,
        Cmd::Read {
            target,
            chip,
            x,
            y,
            addr,
        } => cmd_read(&target, chip, x, y, addr)?,
        Cmd::Write {
            target,
            chip,
            x,
            y,
            addr,
            value,
        } => cmd_write(&target, chip, x, y, addr, value)?,
    }

    Ok(())
}

fn cmd_enumerate() -> Result<()> {
    let mgr = DeviceManager::discover()?;

    println!("Wormhole devices: {}", mgr.device_count());
    println!();

    for info in mgr.devices() {
        println!(
            "[{}] {:?} @ {}  (device id {:#06x})",
            info.index, info.variant, info.pcie_address, info.device_id
        );
    }

    Ok(())
}

fn cmd_scan(target: &Target) -> Result<()> {
    let mut dev = target.open()?;
    println!("Local chip   : {}", dev.local_chip()?);
    println!("Backend      : {} ({})", dev.backend_type(), dev.label());

    let links = dev.scan()?;
    println!("Connected    : {} Ethernet core(s)", links.len());
    println!();

    for link in links {
        println!(
            "  core {:2} ({}, {})  fw {:#x}  ->  {} core ({}, {})",
            link.core_num,
            link.local_noc_x,
            link.local_noc_y,
            link.fw_version,
            link.remote,
            link.remote_noc_x,
            link.remote_noc_y
        );
    }

    Ok(())
}

fn cmd_topology(target: &Target) -> Result<()> {
    let mut dev = target.open()?;
    let found = dev.probe()?;

    print!("{}", found.topology);
    println!();
    println!(
        "Visited {} chip(s), {} link(s)",
        found.visited,
        found.topology.link_count()
    );
    if found.dropped_pushes > 0 {
        println!("Dropped {} chip(s): raise --max-chips", found.dropped_pushes);
    }
    if found.dropped_links > 0 {
        println!("Dropped {} link(s) over capacity", found.dropped_links);
    }
    if found.truncated {
        println!("Incomplete: ran out of NOC windows");
    }

    Ok(())
}

fn cmd_read(target: &Target, chip: EthAddr, x: u8, y: u8, addr: u64) -> Result<()> {
    let dev = target.open()?;
    let value = dev
        .read32(chip, x, y, addr)
        .with_context(|| format!("read {chip} ({x}, {y}) {addr:#x}"))?;
    println!("{chip} ({x}, {y}) {addr:#x} = {value:#010x}");
    Ok(())
}

fn cmd_write(target: &Target, chip: EthAddr, x: u8, y: u8, addr: u64, value: u32) -> Result<()> {
    let dev = target.open()?;
    dev.write32(chip, x, y, addr, value)
        .with_context(|| format!("write {chip} ({x}, {y}) {addr:#x}"))?;
    println!("{chip} ({x}, {y}) {addr:#x} <- {value:#010x}");
    Ok(())
}
