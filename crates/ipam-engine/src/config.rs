//! Engine configuration.
//!
//! Limits default to the values the engine was designed around and can be
//! overridden from the environment with [`EngineConfig::from_env`].

use crate::error::IpamError;
use std::env;
use std::str::FromStr;
use tracing::{error, info};

/// Lowest VLAN/VNI tag handed out or accepted
pub const TAG_MIN: u32 = 4096;
/// Highest VLAN/VNI tag handed out or accepted
pub const TAG_MAX: u32 = 16_777_215;

/// Engine limits and paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Random samples tried before scanning the tag space
    pub tag_random_attempts: u32,
    /// Lower bound of automatically assigned tags
    pub tag_min: u32,
    /// Upper bound of automatically assigned tags
    pub tag_max: u32,
    pub max_instance_interfaces: usize,
    pub min_network_addresses: u128,
    pub max_network_addresses: u128,
    pub max_floating_ip_batch: u32,
    /// Bandwidth ceiling in Mbps for interfaces and floating IPs
    pub max_bandwidth: u32,
    /// Directory holding the host-side scripts
    pub script_dir: String,
    pub interface_mtu: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tag_random_attempts: 32,
            tag_min: TAG_MIN,
            tag_max: TAG_MAX,
            max_instance_interfaces: 8,
            min_network_addresses: 5,
            max_network_addresses: 1000,
            max_floating_ip_batch: 64,
            max_bandwidth: 20_000,
            script_dir: "/opt/ipam/scripts/backend".to_string(),
            interface_mtu: 1450,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, IpamError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| IpamError::InvalidConfig(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, IpamError> {
        let defaults = Self::default();
        let config = Self {
            tag_random_attempts: env_or("IPAM_TAG_RANDOM_ATTEMPTS", defaults.tag_random_attempts)?,
            tag_min: env_or("IPAM_TAG_MIN", defaults.tag_min)?,
            tag_max: env_or("IPAM_TAG_MAX", defaults.tag_max)?,
            max_instance_interfaces: env_or("IPAM_MAX_INSTANCE_INTERFACES", defaults.max_instance_interfaces)?,
            min_network_addresses: env_or("IPAM_MIN_NETWORK_ADDRESSES", defaults.min_network_addresses)?,
            max_network_addresses: env_or("IPAM_MAX_NETWORK_ADDRESSES", defaults.max_network_addresses)?,
            max_floating_ip_batch: env_or("IPAM_MAX_FLOATING_IP_BATCH", defaults.max_floating_ip_batch)?,
            max_bandwidth: env_or("IPAM_MAX_BANDWIDTH", defaults.max_bandwidth)?,
            script_dir: env::var("IPAM_SCRIPT_DIR").unwrap_or(defaults.script_dir),
            interface_mtu: defaults.interface_mtu,
        };
        config.validate()?;

        info!("Engine configuration:");
        info!("  Tag range: {}-{}", config.tag_min, config.tag_max);
        info!("  Script dir: {}", config.script_dir);
        Ok(config)
    }

    /// Check that limits are coherent
    pub fn validate(&self) -> Result<(), IpamError> {
        if self.tag_min < TAG_MIN || self.tag_max > TAG_MAX || self.tag_min > self.tag_max {
            return Err(IpamError::InvalidConfig(format!(
                "tag range {}-{} must lie within {}-{}",
                self.tag_min, self.tag_max, TAG_MIN, TAG_MAX
            )));
        }
        if self.min_network_addresses > self.max_network_addresses {
            return Err(IpamError::InvalidConfig(format!(
                "network size bounds {}-{} are inverted",
                self.min_network_addresses, self.max_network_addresses
            )));
        }
        if self.max_floating_ip_batch == 0 {
            return Err(IpamError::InvalidConfig(
                "max floating IP batch must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject bandwidth limits above `max_bandwidth`
    pub fn check_bandwidth(&self, inbound: u32, outbound: u32) -> Result<(), IpamError> {
        if inbound > self.max_bandwidth || outbound > self.max_bandwidth {
            let error_msg = format!(
                "Bandwidth {}/{} exceeds {} Mbps",
                inbound, outbound, self.max_bandwidth
            );
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }
        Ok(())
    }
}
