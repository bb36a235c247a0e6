//! Runtime configuration for the E2EE core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eeConfig {
    /// One-time pre-keys generated at user initialization.
    pub initial_pool_size: usize,
    /// Pool depth that triggers an async replenish after a bundle hand-out.
    pub pool_low_water: usize,
    /// How far ahead of the expected counter a received message may run.
    pub skip_window: u32,
    /// How long a rotated-out signed pre-key stays usable for in-flight
    /// sessions, in seconds.
    pub spk_grace_secs: u64,
    /// Deadline applied to every backing-store round-trip, in seconds.
    pub store_deadline_secs: u64,
    /// When false, an empty one-time pool fails `get_bundle` instead of
    /// returning a bundle without a one-time key.
    pub allow_weak_bundles: bool,
}

impl E2eeConfig {
    pub fn spk_grace(&self) -> Duration {
        Duration::from_secs(self.spk_grace_secs)
    }

    pub fn store_deadline(&self) -> Duration {
        Duration::from_secs(self.store_deadline_secs)
    }
}

impl Default for E2eeConfig {
    fn default() -> Self {
        Self {
            initial_pool_size: 32,
            pool_low_water: 20,
            skip_window: 1024,
            spk_grace_secs: 7 * 24 * 3600,
            store_deadline_secs: 5,
            allow_weak_bundles: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: E2eeConfig = serde_json::from_str(r#"{"initial_pool_size": 8}"#).unwrap();
        assert_eq!(config.initial_pool_size, 8);
        assert_eq!(config.skip_window, 1024);
        assert!(config.allow_weak_bundles);
        assert_eq!(config.store_deadline(), Duration::from_secs(5));
    }

    #[test]
    fn roundtrips_through_json() {
        let config = E2eeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: E2eeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.spk_grace_secs, config.spk_grace_secs);
        assert_eq!(back.pool_low_water, config.pool_low_water);
    }
}
