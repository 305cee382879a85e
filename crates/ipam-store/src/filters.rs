//! Row filters
//!
//! `WHERE`-style filters for list queries. Unset fields match everything;
//! set fields must all match.

use crate::models::*;

/// Subnet filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetFilter {
    pub subnet_type: Option<SubnetType>,
    pub router_id: Option<u64>,
    pub interface_id: Option<u64>,
    pub vlan: Option<u32>,
}

impl SubnetFilter {
    /// Whether `subnet` passes the filter
    #[must_use]
    pub fn matches(&self, subnet: &Subnet) -> bool {
        self.subnet_type.is_none_or(|t| subnet.subnet_type == t)
            && self.router_id.is_none_or(|r| subnet.router_id == Some(r))
            && self.interface_id.is_none_or(|i| subnet.interface_id == Some(i))
            && self.vlan.is_none_or(|v| subnet.vlan == v)
    }
}

/// Address filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    pub subnet_id: Option<u64>,
    pub interface_id: Option<u64>,
    pub second_interface_id: Option<u64>,
    pub allocated: Option<bool>,
}

impl AddressFilter {
    /// Whether `address` passes the filter
    #[must_use]
    pub fn matches(&self, address: &Address) -> bool {
        self.subnet_id.is_none_or(|s| address.subnet_id == s)
            && self.interface_id.is_none_or(|i| address.interface_id == Some(i))
            && self
                .second_interface_id
                .is_none_or(|i| address.second_interface_id == Some(i))
            && self.allocated.is_none_or(|a| address.allocated == a)
    }
}

/// Interface filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceFilter {
    pub kind: Option<InterfaceKind>,
    pub owner_id: Option<u64>,
    pub instance_id: Option<u64>,
    pub subnet_id: Option<u64>,
}

impl InterfaceFilter {
    /// Whether `iface` passes the filter
    #[must_use]
    pub fn matches(&self, iface: &Interface) -> bool {
        self.kind.is_none_or(|k| iface.kind == k)
            && self.owner_id.is_none_or(|o| iface.owner_id == o)
            && self.instance_id.is_none_or(|i| iface.instance_id == Some(i))
            && self.subnet_id.is_none_or(|s| iface.subnet_id == s)
    }
}

/// Floating IP filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FloatingIpFilter {
    pub fip_type: Option<FloatingIpType>,
    pub subnet_id: Option<u64>,
    pub instance_id: Option<u64>,
    pub load_balancer_id: Option<u64>,
    pub interface_id: Option<u64>,
}

impl FloatingIpFilter {
    /// Whether `fip` passes the filter
    #[must_use]
    pub fn matches(&self, fip: &FloatingIp) -> bool {
        self.fip_type.is_none_or(|t| fip.fip_type == t)
            && self.subnet_id.is_none_or(|s| fip.subnet_id == Some(s))
            && self.instance_id.is_none_or(|i| fip.instance_id == Some(i))
            && self
                .load_balancer_id
                .is_none_or(|l| fip.load_balancer_id == Some(l))
            && self.interface_id.is_none_or(|i| fip.interface_id == Some(i))
    }
}
