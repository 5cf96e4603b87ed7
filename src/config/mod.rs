//! Runtime configuration

mod persist;

use std::time::Duration;

pub use persist::ConfigTree;

/// Runtime configuration options
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Passes a digest cycle may take before it is treated as a watcher loop
    pub digest_ttl: u32,

    /// Minimum presentation time between two MPEG-TS PCRs
    pub pcr_interval: Duration,

    /// Broadcast capacity of a muxer session (chunks)
    pub mux_channel_capacity: usize,

    /// Broadcast capacity of the live state feed (messages)
    pub feed_channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            digest_ttl: 10,
            pcr_interval: Duration::from_millis(25),
            mux_channel_capacity: 256,
            feed_channel_capacity: 64,
        }
    }
}

impl RuntimeConfig {
    /// Set the digest TTL
    pub fn digest_ttl(mut self, ttl: u32) -> Self {
        self.digest_ttl = ttl.max(1);
        self
    }

    /// Set the PCR interval
    pub fn pcr_interval(mut self, interval: Duration) -> Self {
        self.pcr_interval = interval;
        self
    }

    /// Set the muxer session broadcast capacity
    pub fn mux_channel_capacity(mut self, capacity: usize) -> Self {
        self.mux_channel_capacity = capacity.max(1);
        self
    }

    /// Set the live state feed broadcast capacity
    pub fn feed_channel_capacity(mut self, capacity: usize) -> Self {
        self.feed_channel_capacity = capacity.max(1);
        self
    }
}
