//! NOC backend implementations
//!
//! - **Tlb**: PCIe BAR0 mapped through sysfs, 16 MiB TLB windows (hardware)
//! - **Software**: simulated Ethernet cluster (CI, demos, tests)

pub mod mmap;
pub mod software;
pub mod tlb;

pub use software::SimulatedCluster;
pub use tlb::TlbBackend;
