//! Error types for Wormhole driver operations

use std::path::PathBuf;
use thiserror::Error;
use wormhole_chip::EthAddr;

/// Result type alias for Wormhole operations
pub type Result<T> = std::result::Result<T, WormholeError>;

/// Errors that can occur during Wormhole operations
#[derive(Debug, Error)]
pub enum WormholeError {
    /// Relay core firmware predates the mailbox layout
    #[error("Ethernet core {core} firmware {version:#x} is older than {minimum:#x}")]
    FirmwareTooOld {
        /// Relay core index
        core: usize,
        /// Version reported by the core
        version: u32,
        /// Oldest supported version
        minimum: u32,
    },

    /// Request ring has no free slot
    #[error("Ethernet core {core} request queue is full")]
    QueueFull {
        /// Relay core index
        core: usize,
    },

    /// Response flags were never set
    #[error("Ethernet core {core} did not respond within {duration_ms}ms")]
    Timeout {
        /// Relay core index
        core: usize,
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Response flags set but not to the expected completion code
    #[error("Ethernet core {core} returned unexpected response flags {flags:#x}")]
    UnexpectedResponse {
        /// Relay core index
        core: usize,
        /// Flags found in the response slot
        flags: u32,
    },

    /// No NOC window available
    #[error("No NOC window available")]
    ContextUnavailable,

    /// Scratch memory could not be reserved
    #[error("Allocation failed: {what}")]
    AllocationFailure {
        /// What was being allocated
        what: String,
    },

    /// Chip already has a link on every Ethernet core
    #[error("Chip {chip} already has {capacity} links")]
    LinkCapacityExceeded {
        /// Chip whose connection list is full
        chip: EthAddr,
        /// Connection list capacity
        capacity: usize,
    },

    /// Ethernet core index out of range
    #[error("Invalid Ethernet core {core}")]
    InvalidCore {
        /// Requested core index
        core: usize,
    },

    /// Device not found at the expected path
    #[error("Device not found: {path}")]
    DeviceNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// No Wormhole devices detected on the system
    #[error("No Wormhole devices detected")]
    NoDevicesFound,

    /// Device index out of range
    #[error("Device index {index} out of range (have {count} devices)")]
    InvalidIndex {
        /// Requested index
        index: usize,
        /// Number of available devices
        count: usize,
    },

    /// I/O error during device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// NOC access failed
    #[error("Transfer failed: {reason}")]
    TransferFailed {
        /// Reason for failure
        reason: String,
    },

    /// BAR mapping failed
    #[error("Mapping failed: {reason}")]
    MappingFailed {
        /// Reason for failure
        reason: String,
    },
}

impl WormholeError {
    /// Create a device not found error
    pub fn device_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DeviceNotFound { path: path.into() }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Create a mapping failed error
    pub fn mapping_failed(reason: impl Into<String>) -> Self {
        Self::MappingFailed {
            reason: reason.into(),
        }
    }

    /// Create an allocation failure error
    pub fn allocation_failure(what: impl Into<String>) -> Self {
        Self::AllocationFailure { what: what.into() }
    }

    /// Whether this error means a resource pool ran dry.
    ///
    /// Topology discovery stops on these instead of skipping the probe.
    pub const fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::ContextUnavailable | Self::AllocationFailure { .. })
    }
}
