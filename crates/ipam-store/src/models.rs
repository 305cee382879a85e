//! IPAM data model
//!
//! Rows owned by the IPAM engine (subnets, addresses, interfaces, floating
//! IPs, security rules) plus read-only views of the entities it references
//! but does not own (instances, routers, load balancers).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Subnet type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubnetType {
    /// Tenant network behind a router
    #[default]
    Internal,
    /// Publicly routable pool for floating IPs
    Public,
    /// Range bound directly to one instance's primary interface
    Site,
}

impl SubnetType {
    /// Lowercase name as stored
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetType::Internal => "internal",
            SubnetType::Public => "public",
            SubnetType::Site => "site",
        }
    }
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subnet row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subnet {
    pub id: u64,
    pub uuid: Uuid,
    pub name: String,
    /// Owning organization
    pub owner: u64,
    pub network: String, // e.g., "10.0.0.0/28"
    pub netmask: String, // e.g., "255.255.255.240"
    pub gateway: String, // e.g., "10.0.0.1/28"
    pub start: String,
    pub end: String,
    pub vlan: u32,
    pub subnet_type: SubnetType,
    pub router_id: Option<u64>,
    pub group_id: Option<u64>,
    pub dhcp: bool,
    pub dns: String,
    pub domain: String,
    /// Interface a site subnet is bound to
    pub interface_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subnet {
    /// Gateway address without the prefix length
    #[must_use]
    pub fn gateway_ip(&self) -> &str {
        strip_prefix_len(&self.gateway)
    }

    /// Prefix length of the network, 0 if the network string has none
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.network
            .split_once('/')
            .and_then(|(_, len)| len.parse().ok())
            .unwrap_or(0)
    }
}

/// Fields for a new subnet row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSubnet {
    pub name: String,
    pub owner: u64,
    pub network: String,
    pub netmask: String,
    pub gateway: String,
    pub start: String,
    pub end: String,
    pub vlan: u32,
    pub subnet_type: SubnetType,
    pub router_id: Option<u64>,
    pub group_id: Option<u64>,
    pub dhcp: bool,
    pub dns: String,
    pub domain: String,
}

/// IP version of an address row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum IpVersion {
    #[default]
    #[serde(rename = "ipv4")]
    V4,
    #[serde(rename = "ipv6")]
    V6,
}

/// How an allocated address is bound to its interface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AddressRole {
    /// The interface's own (primary) address
    Native,
    /// A secondary address of the interface
    Second,
}

/// Address row, one per IP of a subnet's allocatable range plus the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub id: u64,
    pub address: String, // e.g., "10.0.0.2/28"
    pub netmask: String,
    pub ip_version: IpVersion,
    pub subnet_id: u64,
    pub allocated: bool,
    pub reserved: bool,
    pub role: Option<AddressRole>,
    pub interface_id: Option<u64>,
    pub second_interface_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Address {
    /// Address without the prefix length
    #[must_use]
    pub fn ip(&self) -> &str {
        strip_prefix_len(&self.address)
    }

    /// Whether the address is bound to any interface
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.interface_id.is_some() || self.second_interface_id.is_some()
    }
}

/// Fields for a new address row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAddress {
    pub address: String,
    pub netmask: String,
    pub ip_version: IpVersion,
    pub subnet_id: u64,
}

/// Conditional claim of one free address
///
/// Without `address`, the first free row in the subnet that is neither
/// reserved nor equal to `exclude` is taken. With `address`, only that row
/// is considered; it must be free and must not be `exclude`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressClaim {
    pub subnet_id: u64,
    pub interface_id: u64,
    pub role: AddressRole,
    pub address: Option<String>,
    pub exclude: Option<String>,
}

/// Owner kind of an interface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Instance,
    Floating,
    Gateway,
    Dhcp,
}

impl InterfaceKind {
    /// Infrastructure interfaces don't keep a subnet "in use"
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, InterfaceKind::Gateway | InterfaceKind::Dhcp)
    }
}

/// Interface row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interface {
    pub id: u64,
    pub uuid: Uuid,
    pub name: String,
    pub owner: u64,
    pub kind: InterfaceKind,
    /// Instance, floating IP, or router id depending on `kind`
    pub owner_id: u64,
    /// Instance served by this interface, if any
    pub instance_id: Option<u64>,
    pub mac: String,
    pub mtu: u32,
    pub primary_if: bool,
    pub inbound: u32,
    pub outbound: u32,
    pub allow_spoofing: bool,
    pub security_groups: Vec<u64>,
    /// Subnet of the primary address
    pub subnet_id: u64,
    pub hyper: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new interface row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewInterface {
    pub name: String,
    pub owner: u64,
    pub kind: InterfaceKind,
    pub owner_id: u64,
    pub instance_id: Option<u64>,
    pub mac: String,
    pub mtu: u32,
    pub primary_if: bool,
    pub inbound: u32,
    pub outbound: u32,
    pub allow_spoofing: bool,
    pub security_groups: Vec<u64>,
    pub subnet_id: u64,
    pub hyper: Option<i32>,
}

/// Floating IP type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FloatingIpType {
    #[default]
    Floating,
    Site,
    Native,
    Reserved,
    #[serde(rename = "loadbalancer")]
    LoadBalancer,
}

impl fmt::Display for FloatingIpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FloatingIpType::Floating => "floating",
            FloatingIpType::Site => "site",
            FloatingIpType::Native => "native",
            FloatingIpType::Reserved => "reserved",
            FloatingIpType::LoadBalancer => "loadbalancer",
        };
        f.write_str(name)
    }
}

/// Floating IP row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: u64,
    pub uuid: Uuid,
    pub name: String,
    pub owner: u64,
    pub fip_type: FloatingIpType,
    /// Public address with prefix length
    pub fip_address: String,
    /// Public address without prefix length
    pub ip_address: String,
    /// Internal address of the attached instance
    pub int_address: String,
    pub instance_id: Option<u64>,
    pub router_id: Option<u64>,
    pub load_balancer_id: Option<u64>,
    pub interface_id: Option<u64>,
    pub subnet_id: Option<u64>,
    pub group_id: Option<u64>,
    pub inbound: u32,
    pub outbound: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FloatingIp {
    /// Whether an instance is linked
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.instance_id.is_some()
    }
}

/// Fields for a new floating IP row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NewFloatingIp {
    pub name: String,
    pub owner: u64,
    pub fip_type: FloatingIpType,
    pub fip_address: String,
    pub ip_address: String,
    pub int_address: String,
    pub instance_id: Option<u64>,
    pub router_id: Option<u64>,
    pub load_balancer_id: Option<u64>,
    pub subnet_id: Option<u64>,
    pub group_id: Option<u64>,
    pub inbound: u32,
    pub outbound: u32,
}

/// Compute instance status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Pending,
    Running,
    Stopped,
    Error,
}

/// Compute instance, owned outside the IPAM engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    pub id: u64,
    pub hostname: String,
    pub owner: u64,
    pub status: InstanceStatus,
    pub router_id: Option<u64>,
    pub hyper: Option<i32>,
    pub os_code: String,
}

/// Router, owned outside the IPAM engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Router {
    pub id: u64,
    pub name: String,
    pub owner: u64,
    pub hyper: Option<i32>,
    pub peer: Option<i32>,
    pub default_security_group: Option<u64>,
}

/// Load balancer status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerStatus {
    #[default]
    Pending,
    Available,
    Error,
}

/// One side of a VRRP pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VrrpEndpoint {
    pub hyper: Option<i32>,
    pub mac: String,
    pub address: String,
}

/// Load balancer, owned outside the IPAM engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadBalancer {
    pub id: u64,
    pub name: String,
    pub owner: u64,
    pub status: LoadBalancerStatus,
    pub router_id: u64,
    pub vrrp_instance_id: u64,
    pub vrrp_vlan: u32,
    /// Hypervisor group name backing the VRRP pair
    pub hyper_group: String,
    pub primary: VrrpEndpoint,
    pub backup: VrrpEndpoint,
}

/// Security rule direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Ingress,
    Egress,
}

/// Security rule protocol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

/// Security rule row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityRule {
    pub id: u64,
    pub security_group_id: u64,
    pub direction: RuleDirection,
    pub protocol: Protocol,
    pub remote_cidr: String,
    pub port_min: u16,
    pub port_max: u16,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new security rule row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSecurityRule {
    pub security_group_id: u64,
    pub direction: RuleDirection,
    pub protocol: Protocol,
    pub remote_cidr: String,
    pub port_min: u16,
    pub port_max: u16,
}

/// Drop a trailing "/len" from an address string
#[must_use]
pub fn strip_prefix_len(address: &str) -> &str {
    address.split_once('/').map_or(address, |(ip, _)| ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix_len() {
        assert_eq!(strip_prefix_len("10.0.0.1/28"), "10.0.0.1");
        assert_eq!(strip_prefix_len("10.0.0.1"), "10.0.0.1");
        assert_eq!(strip_prefix_len("fd00::1/64"), "fd00::1");
    }

    #[test]
    fn test_floating_ip_type_serde_names() {
        let json = serde_json::to_string(&FloatingIpType::LoadBalancer).unwrap();
        assert_eq!(json, "\"loadbalancer\"");
        let parsed: FloatingIpType = serde_json::from_str("\"reserved\"").unwrap();
        assert_eq!(parsed, FloatingIpType::Reserved);
    }

    #[test]
    fn test_infrastructure_kinds() {
        assert!(InterfaceKind::Gateway.is_infrastructure());
        assert!(InterfaceKind::Dhcp.is_infrastructure());
        assert!(!InterfaceKind::Instance.is_infrastructure());
        assert!(!InterfaceKind::Floating.is_infrastructure());
    }
}
