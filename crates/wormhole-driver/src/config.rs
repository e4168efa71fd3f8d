//! Ethernet relay and discovery configuration

use std::time::Duration;
use wormhole_chip::regs::MIN_FW_VERSION;

/// Tunables for the relay mailbox and the topology walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthConfig {
    /// Bound on each of the two response polls.
    pub response_timeout: Duration,

    /// Oldest Ethernet firmware accepted for relay traffic and links.
    pub min_fw_version: u32,

    /// Local Ethernet core that relays requests to remote chips.
    pub relay_core: usize,

    /// Capacity of the traversal stack.
    pub max_topology_chips: usize,
}

impl Default for EthConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(250),
            min_fw_version: MIN_FW_VERSION,
            relay_core: 0,
            max_topology_chips: 0xFFFF,
        }
    }
}

impl EthConfig {
    /// Set the response timeout.
    #[must_use]
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the firmware floor.
    #[must_use]
    pub const fn with_min_fw_version(mut self, version: u32) -> Self {
        self.min_fw_version = version;
        self
    }

    /// Set the relay core.
    #[must_use]
    pub const fn with_relay_core(mut self, core: usize) -> Self {
        self.relay_core = core;
        self
    }

    /// Set the traversal stack capacity.
    #[must_use]
    pub const fn with_max_topology_chips(mut self, max: usize) -> Self {
        self.max_topology_chips = max;
        self
    }

    /// Response timeout in whole milliseconds, for error reporting.
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.response_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EthConfig::default();
        assert_eq!(config.timeout_ms(), 250);
        assert_eq!(config.min_fw_version, 0x0606_9000);
        assert_eq!(config.relay_core, 0);
        assert_eq!(config.max_topology_chips, 65_535);
    }

    #[test]
    fn builder() {
        let config = EthConfig::default()
            .with_response_timeout(Duration::from_millis(5))
            .with_relay_core(8)
            .with_max_topology_chips(2);
        assert_eq!(config.timeout_ms(), 5);
        assert_eq!(config.relay_core, 8);
        assert_eq!(config.max_topology_chips, 2);
    }
}
