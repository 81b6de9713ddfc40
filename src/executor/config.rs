//! Worker pool configuration.
//!
//! This module contains the [`PoolConfig`] struct and the default sizing
//! constants for the auxiliary executors.

use crate::executor::priority::Priority;
use std::time::Duration;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default worker count for the networking pool.
pub const DEFAULT_NETWORK_POOL_SIZE: usize = 2;

/// Default worker count for the processing pool.
pub const DEFAULT_PROCESSING_POOL_SIZE: usize = 1;

/// Default idle time before a surplus worker retires.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

// =============================================================================
// Pool Configuration
// =============================================================================

/// Configuration for one auxiliary executor pool.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Label used in log lines and worker spans.
    pub label: String,

    /// Maximum number of workers kept alive concurrently.
    ///
    /// Workers are spawned on demand up to this count and retire again
    /// after sitting idle for [`keep_alive`](Self::keep_alive). A value of
    /// zero is treated as one; a pool that can never run anything would
    /// strand its queue.
    pub core_pool_size: usize,

    /// Idle time after which a worker retires when the queue is empty.
    pub keep_alive: Duration,

    /// Number of priority tiers in the pending queue.
    pub priority_levels: usize,
}

impl PoolConfig {
    /// Creates a configuration with default keep-alive and priority tiers.
    pub fn new(label: impl Into<String>, core_pool_size: usize) -> Self {
        Self {
            label: label.into(),
            core_pool_size,
            keep_alive: DEFAULT_KEEP_ALIVE,
            priority_levels: Priority::COUNT,
        }
    }

    /// Default configuration for the networking pool.
    pub fn network() -> Self {
        Self::new("network", DEFAULT_NETWORK_POOL_SIZE)
    }

    /// Default configuration for the processing pool.
    pub fn processing() -> Self {
        Self::new("processing", DEFAULT_PROCESSING_POOL_SIZE)
    }

    /// Overrides the idle keep-alive.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Overrides the number of priority tiers.
    pub fn with_priority_levels(mut self, levels: usize) -> Self {
        self.priority_levels = levels;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new("auxiliary", 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.core_pool_size, 1);
        assert_eq!(config.keep_alive, DEFAULT_KEEP_ALIVE);
        assert_eq!(config.priority_levels, Priority::COUNT);
    }

    #[test]
    fn test_network_and_processing_presets() {
        let network = PoolConfig::network();
        assert_eq!(network.label, "network");
        assert_eq!(network.core_pool_size, DEFAULT_NETWORK_POOL_SIZE);

        let processing = PoolConfig::processing();
        assert_eq!(processing.label, "processing");
        assert_eq!(processing.core_pool_size, DEFAULT_PROCESSING_POOL_SIZE);
    }

    #[test]
    fn test_builder_overrides() {
        let config = PoolConfig::new("custom", 4)
            .with_keep_alive(Duration::from_millis(50))
            .with_priority_levels(5);
        assert_eq!(config.label, "custom");
        assert_eq!(config.core_pool_size, 4);
        assert_eq!(config.keep_alive, Duration::from_millis(50));
        assert_eq!(config.priority_levels, 5);
    }
}
