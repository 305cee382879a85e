//! Address arithmetic helpers.
//!
//! Addresses are stepped as `u128` so the same code walks IPv4 and IPv6
//! ranges without overflowing.

use crate::error::IpamError;
use ipnet::IpNet;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Parse a CIDR, normalizing host bits away
pub fn parse_network(cidr: &str) -> Result<IpNet, IpamError> {
    cidr.trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|e| IpamError::InvalidParameter(format!("invalid CIDR {}: {}", cidr, e)))
}

/// Parse an address given either bare or as "ip/len"
pub fn parse_ip(value: &str) -> Result<IpAddr, IpamError> {
    ipam_store::strip_prefix_len(value.trim())
        .parse::<IpAddr>()
        .map_err(|e| IpamError::InvalidParameter(format!("invalid IP address {}: {}", value, e)))
}

/// Total number of addresses in a network, saturating at `u128::MAX`
#[must_use]
pub fn address_count(net: &IpNet) -> u128 {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
}

#[must_use]
pub fn ip_to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn u128_to_ip(value: u128, like: IpAddr) -> Option<IpAddr> {
    match like {
        IpAddr::V4(_) => u32::try_from(value).ok().map(|v| IpAddr::V4(Ipv4Addr::from(v))),
        IpAddr::V6(_) => Some(IpAddr::V6(Ipv6Addr::from(value))),
    }
}

/// The address after `ip`, `None` at the end of the family's space
#[must_use]
pub fn next_ip(ip: IpAddr) -> Option<IpAddr> {
    ip_to_u128(ip).checked_add(1).and_then(|v| u128_to_ip(v, ip))
}

/// The address before `ip`, `None` at zero
#[must_use]
pub fn prev_ip(ip: IpAddr) -> Option<IpAddr> {
    ip_to_u128(ip).checked_sub(1).and_then(|v| u128_to_ip(v, ip))
}

/// Inclusive range of addresses; empty when `start > end` or families differ
pub fn ip_range(start: IpAddr, end: IpAddr) -> impl Iterator<Item = IpAddr> {
    let same_family = start.is_ipv4() == end.is_ipv4();
    let (lo, hi) = (ip_to_u128(start), ip_to_u128(end));
    let bounds = (same_family && lo <= hi).then_some((lo, hi));
    bounds
        .into_iter()
        .flat_map(|(lo, hi)| lo..=hi)
        .filter_map(move |v| u128_to_ip(v, start))
}

/// Number of addresses in the inclusive range, 0 when empty
#[must_use]
pub fn range_len(start: IpAddr, end: IpAddr) -> u128 {
    if start.is_ipv4() != end.is_ipv4() {
        return 0;
    }
    let (lo, hi) = (ip_to_u128(start), ip_to_u128(end));
    if lo > hi {
        return 0;
    }
    (hi - lo).saturating_add(1)
}

/// "ip/len"
#[must_use]
pub fn with_prefix(ip: IpAddr, prefix_len: u8) -> String {
    format!("{}/{}", ip, prefix_len)
}

/// Random locally administered MAC in the 52:54 range
pub fn generate_mac<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bytes: [u8; 4] = rng.r#gen();
    format!(
        "52:54:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// Whether `mac` looks like six colon-separated hex octets
#[must_use]
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network_truncates_host_bits() {
        let net = parse_network("10.0.0.5/28").unwrap();
        assert_eq!(net.to_string(), "10.0.0.0/28");
        assert!(parse_network("10.0.0.0/33").is_err());
        assert!(parse_network("not-a-cidr").is_err());
    }

    #[test]
    fn test_address_count() {
        assert_eq!(address_count(&parse_network("10.0.0.0/28").unwrap()), 16);
        assert_eq!(address_count(&parse_network("10.0.0.0/30").unwrap()), 4);
        assert_eq!(address_count(&parse_network("fd00::/120").unwrap()), 256);
        assert_eq!(address_count(&parse_network("::/0").unwrap()), u128::MAX);
    }

    #[test]
    fn test_step_across_octet_boundary() {
        let ip: IpAddr = "10.0.0.255".parse().unwrap();
        assert_eq!(next_ip(ip).unwrap().to_string(), "10.0.1.0");
        assert_eq!(prev_ip(next_ip(ip).unwrap()).unwrap(), ip);
        assert!(next_ip("255.255.255.255".parse().unwrap()).is_none());
        assert!(prev_ip("0.0.0.0".parse().unwrap()).is_none());
    }

    #[test]
    fn test_ipv6_range() {
        let start: IpAddr = "fd00::fffe".parse().unwrap();
        let end: IpAddr = "fd00::1:1".parse().unwrap();
        let ips: Vec<String> = ip_range(start, end).map(|ip| ip.to_string()).collect();
        assert_eq!(ips, vec!["fd00::fffe", "fd00::ffff", "fd00::1:0", "fd00::1:1"]);
        assert_eq!(range_len(start, end), 4);
    }

    #[test]
    fn test_empty_ranges() {
        let a: IpAddr = "10.0.0.9".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert_eq!(ip_range(a, b).count(), 0);
        assert_eq!(range_len(a, b), 0);
        let v6: IpAddr = "fd00::1".parse().unwrap();
        assert_eq!(ip_range(b, v6).count(), 0);
    }

    #[test]
    fn test_generated_mac_shape() {
        let mac = generate_mac(&mut rand::thread_rng());
        assert!(mac.starts_with("52:54:"));
        assert!(is_valid_mac(&mac));
        assert!(!is_valid_mac("52:54:00:zz:00:01"));
    }
}
