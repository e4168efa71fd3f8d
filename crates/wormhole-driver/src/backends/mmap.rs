//! Memory-mapped PCIe BAR region
//!
//! The only unsafe code in the workspace. Every access is bounds-checked
//! against the mapped length and performed with volatile loads and stores.

use crate::error::{Result, WormholeError};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::Path;
use std::ptr::NonNull;

/// Memory-mapped PCIe BAR region
///
/// All accessors take `&self`: the region is device memory shared between
/// the TLB windows handed out by one backend, and each window only touches
/// its own aperture and configuration register.
#[derive(Debug)]
pub struct MmapRegion {
    ptr: NonNull<u8>,
    size: usize,
    _file: File,
    pcie_address: String,
    bar_index: usize,
}

impl MmapRegion {
    /// Map `/sys/bus/pci/devices/<pcie_address>/resource<bar_index>`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Resource file doesn't exist
    /// - Cannot open file (usually permissions)
    /// - mmap fails
    pub fn new(pcie_address: &str, bar_index: usize) -> Result<Self> {
        let path = format!("/sys/bus/pci/devices/{pcie_address}/resource{bar_index}");

        tracing::debug!("Mapping PCIe BAR: {path}");

        if !Path::new(&path).exists() {
            return Err(WormholeError::device_not_found(path));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                WormholeError::mapping_failed(format!("Cannot open {path}: {e}. Is device enabled?"))
            })?;

        // Truncation acceptable: BAR sizes fit in usize on 64-bit (our only target)
        #[allow(clippy::cast_possible_truncation)]
        let size = file
            .metadata()
            .map_err(|e| WormholeError::mapping_failed(format!("Cannot stat BAR: {e}")))?
            .len() as usize;

        if size == 0 {
            return Err(WormholeError::mapping_failed(
                "BAR size is 0 (device not enabled?)",
            ));
        }

        // SAFETY: mmap preconditions:
        // - File descriptor is valid (just opened, kept alive in `_file`)
        // - Size is non-zero (checked above)
        // - READ|WRITE with SHARED mapping for device memory, offset 0
        // - Unmapped exactly once, in Drop
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                0,
            )
        }
        .map_err(|e| WormholeError::mapping_failed(format!("mmap failed: {e}")))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| WormholeError::mapping_failed("mmap returned a null pointer"))?;

        tracing::info!(
            "Mapped BAR{bar_index} for {pcie_address} ({} MB at {ptr:p})",
            size / (1024 * 1024),
        );

        Ok(Self {
            ptr,
            size,
            _file: file,
            pcie_address: pcie_address.to_string(),
            bar_index,
        })
    }

    fn check(&self, offset: usize, len: usize, what: &str) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size && offset % 4 == 0 => Ok(()),
            _ => Err(WormholeError::transfer_failed(format!(
                "Out of bounds {what}: offset={offset:#x}, size={len}, limit={:#x}",
                self.size
            ))),
        }
    }

    /// Read 32-bit word at offset
    ///
    /// # Errors
    ///
    /// Returns error if offset is out of bounds or unaligned
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.check(offset, 4, "read")?;

        // SAFETY: offset + 4 <= size and offset is 4-byte aligned (checked
        // above); ptr comes from a live mapping. Volatile: MMIO reads must not
        // be merged or elided.
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };

        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    /// Write 32-bit word at offset
    ///
    /// # Errors
    ///
    /// Returns error if offset is out of bounds or unaligned
    pub fn write_u32(&self, offset: usize, value: u32) -> Result<()> {
        self.check(offset, 4, "write")?;

        tracing::trace!("Write u32 @ {offset:#x} = {value:#x}");

        // SAFETY: as in `read_u32`. Volatile: MMIO writes trigger NOC
        // transactions and must be issued exactly once, in order.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().write_volatile(value);
        }

        Ok(())
    }

    /// Write a 64-bit value as two 32-bit stores, low word first.
    ///
    /// # Errors
    ///
    /// Returns error if offset is out of bounds or unaligned
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_u64(&self, offset: usize, value: u64) -> Result<()> {
        self.check(offset, 8, "write")?;
        self.write_u32(offset, value as u32)?;
        self.write_u32(offset + 4, (value >> 32) as u32)
    }

    /// Get region size
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Get PCIe address
    #[must_use]
    pub fn pcie_address(&self) -> &str {
        &self.pcie_address
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        tracing::debug!(
            "Unmapping BAR{} for {} ({} MB)",
            self.bar_index,
            self.pcie_address,
            self.size / (1024 * 1024)
        );

        // SAFETY: ptr and size are exactly what mmap returned and was given in
        // `new`; the mapping has not been unmapped before.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.size) {
                tracing::error!("munmap failed during drop: {e}");
            }
        }
    }
}

// SAFETY: the mapping is owned exclusively by this value and stays valid
// until Drop; moving it between threads does not invalidate it.
unsafe impl Send for MmapRegion {}

// SAFETY: all accesses are bounds-checked volatile word operations on device
// memory. Callers coordinate which offsets they touch (one TLB window per
// borrower), so shared access never aliases a Rust-visible object.
unsafe impl Sync for MmapRegion {}
