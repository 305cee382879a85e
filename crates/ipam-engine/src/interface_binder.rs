//! Interface binder.
//!
//! An interface holds one primary address, an ordered list of secondary
//! addresses and, for an instance's primary NIC, any number of site subnets.
//! Interfaces are created by claiming their primary address, so an
//! interface row never exists without one.

use crate::commands::NicInfo;
use crate::error::IpamError;
use crate::floating_ip::PublicIp;
use crate::net;
use crate::permission::{require_owner, require_permission, Role};
use crate::{instance_target, Ipam};
use ipam_store::{
    Address, AddressFilter, AddressRole, FloatingIpFilter, FloatingIpType, Instance, Interface, InterfaceFilter,
    InterfaceKind, IpamTx, NewInterface, Subnet, SubnetFilter, SubnetType,
};
use tracing::{debug, error, info, warn};

/// Entity an interface belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceOwner {
    Instance(u64),
    FloatingIp(u64),
    /// Gateway of a router-bound subnet, keyed by router
    Gateway(u64),
    /// DHCP port of a subnet, keyed by router
    Dhcp(u64),
}

impl InterfaceOwner {
    #[must_use]
    pub fn kind(&self) -> InterfaceKind {
        match self {
            InterfaceOwner::Instance(_) => InterfaceKind::Instance,
            InterfaceOwner::FloatingIp(_) => InterfaceKind::Floating,
            InterfaceOwner::Gateway(_) => InterfaceKind::Gateway,
            InterfaceOwner::Dhcp(_) => InterfaceKind::Dhcp,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            InterfaceOwner::Instance(id)
            | InterfaceOwner::FloatingIp(id)
            | InterfaceOwner::Gateway(id)
            | InterfaceOwner::Dhcp(id) => *id,
        }
    }

    fn default_name(&self) -> &'static str {
        match self {
            InterfaceOwner::Instance(_) => "eth0",
            InterfaceOwner::FloatingIp(_) => "fip",
            InterfaceOwner::Gateway(_) => "subnet-gw",
            InterfaceOwner::Dhcp(_) => "dhcp",
        }
    }
}

/// Parameters of a new interface
///
/// Empty `name` picks the owner's default (`eth<n>` for instances).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateInterface {
    pub name: String,
    /// Claim this address instead of the first free one
    pub address: Option<String>,
    /// Use this MAC instead of generating one
    pub mac: Option<String>,
    pub inbound: u32,
    pub outbound: u32,
    pub security_groups: Vec<u64>,
    pub allow_spoofing: bool,
    pub hyper: Option<i32>,
}

/// An interface with its bound addresses and site subnets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDetails {
    pub interface: Interface,
    pub address: Address,
    pub subnet: Subnet,
    pub secondary: Vec<Address>,
    pub site_subnets: Vec<Subnet>,
}

impl InterfaceDetails {
    /// Addresses reachable through the interface besides the primary one
    #[must_use]
    pub fn secondary_addresses(&self) -> Vec<String> {
        self.secondary.iter().map(|a| a.address.clone()).collect()
    }
}

/// Desired address topology of an interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredAddresses {
    /// Subnets secondary addresses are drawn from, in order
    pub subnets: Vec<Subnet>,
    pub site_subnets: Vec<Subnet>,
    pub secondary_count: usize,
    /// Public IPs to derive the interface from; overrides `secondary_count`
    pub public_ips: Vec<PublicIp>,
}

/// Result of comparing an interface against a desired topology
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressCheck {
    /// Every desired subnet shares the interface's tag
    pub valid: bool,
    /// The desired topology differs from the current one
    pub changed: bool,
}

/// New attributes and topology of an instance interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceUpdate {
    pub name: Option<String>,
    pub inbound: u32,
    pub outbound: u32,
    pub allow_spoofing: bool,
    pub security_groups: Vec<u64>,
    pub addresses: DesiredAddresses,
}

/// Lowest `eth<n>` not used by `existing`
fn next_nic_name(existing: &[Interface]) -> String {
    (0..=existing.len())
        .map(|n| format!("eth{}", n))
        .find(|candidate| !existing.iter().any(|i| &i.name == candidate))
        .unwrap_or_else(|| format!("eth{}", existing.len()))
}

/// Compare an interface with a desired topology without touching the store
#[must_use]
pub fn check_addresses_consistent(details: &InterfaceDetails, desired: &DesiredAddresses) -> AddressCheck {
    let vlan = details.subnet.vlan;
    let secondary = &details.secondary;
    let mut check = AddressCheck::default();

    if desired.public_ips.is_empty() {
        check.changed |= desired.secondary_count != secondary.len();
        if desired.subnets.iter().any(|s| s.vlan != vlan) {
            return check;
        }
    } else {
        check.changed |= desired.public_ips.len() != secondary.len() + 1;
        for (i, public) in desired.public_ips.iter().enumerate() {
            if public.subnet.vlan != vlan {
                return check;
            }
            let current = if i == 0 {
                Some(&details.address)
            } else {
                secondary.get(i - 1)
            };
            if let Some(current) = current {
                if public.floating_ip.fip_address != current.address {
                    debug!(
                        "Public IP {} does not match bound address {}",
                        public.floating_ip.fip_address, current.address
                    );
                    return check;
                }
            }
        }
    }

    check.changed |= desired.site_subnets.len() != details.site_subnets.len();
    for site in &desired.site_subnets {
        if site.vlan != vlan {
            return check;
        }
        if !details.site_subnets.iter().any(|s| s.id == site.id) {
            check.changed = true;
        }
    }
    check.valid = true;
    check
}

/// Interface operations
#[derive(Debug, Clone, Copy)]
pub struct InterfaceBinder<'a> {
    ipam: &'a Ipam,
}

impl<'a> InterfaceBinder<'a> {
    pub(crate) fn new(ipam: &'a Ipam) -> Self {
        Self { ipam }
    }

    /// Create an interface by claiming an address from the first candidate
    /// subnet that has one
    ///
    /// Candidates are tried in order. A candidate that cannot supply an
    /// address leaves nothing behind.
    pub async fn create_interface(
        &self,
        tx: &mut dyn IpamTx,
        owner: InterfaceOwner,
        candidates: &[Subnet],
        params: &CreateInterface,
    ) -> Result<(Interface, Address), IpamError> {
        require_permission(self.ipam.membership(), Role::Writer, "create an interface")?;
        if candidates.is_empty() {
            return Err(IpamError::InvalidParameter("no candidate subnet given".to_string()));
        }
        self.ipam.config().check_bandwidth(params.inbound, params.outbound)?;
        let mac = match &params.mac {
            Some(mac) if !net::is_valid_mac(mac) => {
                return Err(IpamError::InvalidParameter(format!("invalid MAC address {}", mac)));
            }
            Some(mac) => mac.clone(),
            None => net::generate_mac(&mut rand::thread_rng()),
        };

        let mut name = if params.name.is_empty() {
            owner.default_name().to_string()
        } else {
            params.name.clone()
        };
        let mut org = self.ipam.membership().org_id();
        let mut hyper = params.hyper;
        let mut instance = None;

        if let InterfaceOwner::Instance(instance_id) = owner {
            if candidates.iter().any(|s| s.subnet_type == SubnetType::Site) {
                let error_msg = "Site subnet can not be used for an instance interface".to_string();
                error!("{}", error_msg);
                return Err(IpamError::InvalidParameter(error_msg));
            }
            let inst = tx.get_instance(instance_id).await?;
            if let Some(router_id) = inst.router_id {
                if candidates.iter().any(|s| s.router_id != Some(router_id)) {
                    let error_msg = format!("All subnets must belong to router {}", router_id);
                    error!("{}", error_msg);
                    return Err(IpamError::InvalidParameter(error_msg));
                }
            }
            let existing = tx
                .list_interfaces(&InterfaceFilter {
                    instance_id: Some(instance_id),
                    ..Default::default()
                })
                .await?;
            let max = self.ipam.config().max_instance_interfaces;
            if existing.len() >= max {
                let error_msg = format!("Instance {} already has the maximum of {} interfaces", instance_id, max);
                error!("{}", error_msg);
                return Err(IpamError::InvalidParameter(error_msg));
            }
            if params.name.is_empty() {
                name = next_nic_name(&existing);
            }
            org = inst.owner;
            hyper = hyper.or(inst.hyper);
            instance = Some(inst);
        }

        for subnet in candidates {
            let iface = tx
                .insert_interface(NewInterface {
                    name: name.clone(),
                    owner: org,
                    kind: owner.kind(),
                    owner_id: owner.id(),
                    instance_id: instance.as_ref().map(|i| i.id),
                    mac: mac.clone(),
                    mtu: self.ipam.config().interface_mtu,
                    primary_if: owner.kind() == InterfaceKind::Instance && name == "eth0",
                    inbound: params.inbound,
                    outbound: params.outbound,
                    allow_spoofing: params.allow_spoofing,
                    security_groups: params.security_groups.clone(),
                    subnet_id: subnet.id,
                    hyper,
                })
                .await?;
            let pool = self.ipam.address_pool();
            let claimed = match owner {
                InterfaceOwner::Gateway(_) => pool.claim_gateway(tx, subnet, iface.id).await?,
                _ => {
                    pool.claim(tx, subnet, iface.id, AddressRole::Native, params.address.as_deref())
                        .await?
                }
            };
            let Some(address) = claimed else {
                debug!("Subnet {} has no address for interface {}, trying next", subnet.name, name);
                tx.delete_interface(iface.id).await?;
                continue;
            };

            if let Some(instance) = &instance {
                if subnet.subnet_type == SubnetType::Public {
                    self.ipam
                        .floating_ips()
                        .create_native_shadow(tx, instance, &address)
                        .await?;
                }
            }
            info!(
                "Created interface {} ({}) with address {} in subnet {}",
                iface.name, iface.mac, address.address, subnet.name
            );
            return Ok((iface, address));
        }

        let error_msg = match &params.address {
            Some(addr) => format!("Address {} is not available in the candidate subnets", addr),
            None => "No address available in the candidate subnets".to_string(),
        };
        error!("{}", error_msg);
        Err(IpamError::InsufficientCapacity(error_msg))
    }

    /// Load an interface with its primary address, secondary addresses and
    /// site subnets
    pub async fn details(&self, tx: &mut dyn IpamTx, interface_id: u64) -> Result<InterfaceDetails, IpamError> {
        let interface = tx.get_interface(interface_id).await?;
        let address = tx
            .list_addresses(&AddressFilter {
                interface_id: Some(interface_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IpamError::NotFound(format!("Address of interface {} not found", interface_id)))?;
        let subnet = tx.get_subnet(address.subnet_id).await?;
        let mut secondary = tx
            .list_addresses(&AddressFilter {
                second_interface_id: Some(interface_id),
                ..Default::default()
            })
            .await?;
        secondary.sort_by_key(|a| a.id);
        let site_subnets = tx
            .list_subnets(&SubnetFilter {
                interface_id: Some(interface_id),
                ..Default::default()
            })
            .await?;
        Ok(InterfaceDetails {
            interface,
            address,
            subnet,
            secondary,
            site_subnets,
        })
    }

    /// Primary interface of an instance
    pub async fn primary_interface(&self, tx: &mut dyn IpamTx, instance_id: u64) -> Result<Interface, IpamError> {
        tx.list_interfaces(&InterfaceFilter {
            instance_id: Some(instance_id),
            ..Default::default()
        })
        .await?
        .into_iter()
        .find(|i| i.primary_if)
        .ok_or_else(|| {
            let error_msg = format!("No primary interface for the instance {}", instance_id);
            error!("{}", error_msg);
            IpamError::InvalidState(error_msg)
        })
    }

    /// Claim `count` more secondary addresses, walking the candidate subnets
    ///
    /// On shortfall the addresses already claimed stay bound and the error
    /// reports how many could be allocated.
    pub async fn allocate_secondary_addresses(
        &self,
        tx: &mut dyn IpamTx,
        instance: &Instance,
        interface: &Interface,
        candidates: &[Subnet],
        count: usize,
    ) -> Result<Vec<Address>, IpamError> {
        let mut claimed = Vec::with_capacity(count);
        'subnets: for subnet in candidates {
            while claimed.len() < count {
                let address = self
                    .ipam
                    .address_pool()
                    .claim(tx, subnet, interface.id, AddressRole::Second, None)
                    .await?;
                let Some(address) = address else {
                    debug!("Subnet {} exhausted for secondary addresses", subnet.name);
                    continue 'subnets;
                };
                if subnet.subnet_type == SubnetType::Public {
                    self.ipam
                        .floating_ips()
                        .create_native_shadow(tx, instance, &address)
                        .await?;
                }
                claimed.push(address);
            }
            break;
        }

        if claimed.len() < count {
            let error_msg = format!("Only {} addresses can be allocated", claimed.len());
            error!("{}", error_msg);
            return Err(IpamError::InsufficientCapacity(error_msg));
        }
        Ok(claimed)
    }

    /// Drop one secondary address from an interface
    async fn release_secondary(&self, tx: &mut dyn IpamTx, mut address: Address) -> Result<(), IpamError> {
        match address.interface_id {
            // lent by a floating IP: hand it back
            Some(owner_iface) => {
                address.second_interface_id = None;
                address.role = Some(AddressRole::Native);
                tx.update_address(&address).await?;
                self.ipam.floating_ips().return_to_pool(tx, owner_iface).await?;
            }
            None => {
                self.ipam.floating_ips().remove_native_shadows(tx, &address).await?;
                self.ipam.address_pool().release(tx, address.id).await?;
            }
        }
        Ok(())
    }

    /// Reconcile an interface with a desired topology
    ///
    /// Site subnets are rebound, then either the interface is rederived from
    /// public IPs or its secondary addresses grow or shrink from the tail.
    pub async fn change_addresses(
        &self,
        tx: &mut dyn IpamTx,
        instance: &Instance,
        interface_id: u64,
        desired: &DesiredAddresses,
    ) -> Result<InterfaceDetails, IpamError> {
        let details = self.details(tx, interface_id).await?;

        for site in &details.site_subnets {
            if !desired.site_subnets.iter().any(|s| s.id == site.id) {
                let mut site = site.clone();
                site.interface_id = None;
                tx.update_subnet(&site).await?;
                debug!("Unbound site subnet {} from interface {}", site.name, interface_id);
            }
        }
        for site in &desired.site_subnets {
            let mut site = tx.get_subnet(site.id).await?;
            if site.subnet_type != SubnetType::Site {
                return Err(IpamError::InvalidParameter(format!("Subnet {} is not a site subnet", site.name)));
            }
            match site.interface_id {
                Some(bound) if bound == interface_id => {}
                Some(bound) => {
                    let error_msg = format!("Site subnet {} is bound to interface {}", site.name, bound);
                    error!("{}", error_msg);
                    return Err(IpamError::InvalidState(error_msg));
                }
                None => {
                    site.interface_id = Some(interface_id);
                    tx.update_subnet(&site).await?;
                    debug!("Bound site subnet {} to interface {}", site.name, interface_id);
                }
            }
        }

        if !desired.public_ips.is_empty() {
            self.ipam
                .floating_ips()
                .derive_public_interface(tx, instance, Some(interface_id), &desired.public_ips)
                .await?;
        } else if desired.secondary_count > details.secondary.len() {
            let missing = desired.secondary_count - details.secondary.len();
            self.allocate_secondary_addresses(tx, instance, &details.interface, &desired.subnets, missing)
                .await?;
        } else {
            for address in details.secondary.into_iter().skip(desired.secondary_count).rev() {
                self.release_secondary(tx, address).await?;
            }
        }

        self.details(tx, interface_id).await
    }

    /// Description of an interface for the instance's host
    pub async fn nic_info(
        &self,
        tx: &mut dyn IpamTx,
        instance: &Instance,
        details: &InterfaceDetails,
    ) -> Result<NicInfo, IpamError> {
        let mut security = Vec::new();
        for group in &details.interface.security_groups {
            security.extend(tx.list_security_rules(*group).await?);
        }
        Ok(NicInfo {
            device: details.interface.name.clone(),
            vlan: details.subnet.vlan,
            gateway: details.subnet.gateway.clone(),
            router: details.subnet.router_id.unwrap_or_default(),
            inbound: details.interface.inbound,
            outbound: details.interface.outbound,
            allow_spoofing: details.interface.allow_spoofing,
            ip_address: details.address.address.clone(),
            mac_address: details.interface.mac.clone(),
            security,
            more_addresses: self.more_addresses(tx, instance, details).await?,
        })
    }

    /// Secondary addresses plus, outside a VPC, every site-subnet address
    async fn more_addresses(
        &self,
        tx: &mut dyn IpamTx,
        instance: &Instance,
        details: &InterfaceDetails,
    ) -> Result<Vec<String>, IpamError> {
        let mut addresses = details.secondary_addresses();
        if instance.router_id.is_none() {
            for site in &details.site_subnets {
                let rows = tx
                    .list_addresses(&AddressFilter {
                        subnet_id: Some(site.id),
                        ..Default::default()
                    })
                    .await?;
                addresses.extend(
                    rows.into_iter()
                        .filter(|a| a.ip() != site.gateway_ip())
                        .map(|a| a.address),
                );
            }
        }
        Ok(addresses)
    }

    /// Update an instance interface and push the result to its host
    pub async fn update(
        &self,
        tx: &mut dyn IpamTx,
        instance_id: u64,
        interface_id: u64,
        update: &InterfaceUpdate,
    ) -> Result<InterfaceDetails, IpamError> {
        let instance = tx.get_instance(instance_id).await?;
        require_owner(self.ipam.membership(), Role::Writer, instance.owner, "update the interface")?;
        let mut iface = tx.get_interface(interface_id).await?;
        if iface.instance_id != Some(instance_id) {
            return Err(IpamError::InvalidParameter(format!(
                "Interface {} does not belong to instance {}",
                interface_id, instance_id
            )));
        }
        self.ipam.config().check_bandwidth(update.inbound, update.outbound)?;
        if update.security_groups.is_empty() {
            let error_msg = "At least one security group is needed".to_string();
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }

        let mut need_remote_update = false;
        if let Some(name) = &update.name {
            iface.name = name.clone();
        }
        if iface.inbound != update.inbound || iface.outbound != update.outbound {
            iface.inbound = update.inbound;
            iface.outbound = update.outbound;
            need_remote_update = true;
        }
        if iface.allow_spoofing != update.allow_spoofing {
            iface.allow_spoofing = update.allow_spoofing;
            need_remote_update = true;
        }
        if iface.security_groups != update.security_groups {
            iface.security_groups = update.security_groups.clone();
            need_remote_update = true;
        }
        tx.update_interface(&iface).await?;

        let target = instance_target(&instance)?;
        let mut details = self.details(tx, interface_id).await?;
        if need_remote_update {
            let nic = self.nic_info(tx, &instance, &details).await?;
            let command = self.ipam.commands().sync_nic_info(&instance, false, &[nic])?;
            self.ipam.execute(&target, &command).await?;
        }

        if iface.primary_if {
            let check = check_addresses_consistent(&details, &update.addresses);
            if !check.valid {
                let error_msg = format!("Addresses of interface {} span multiple tags", interface_id);
                error!("{}", error_msg);
                return Err(IpamError::InvalidParameter(error_msg));
            }
            let old_addresses = self.more_addresses(tx, &instance, &details).await?;
            details = self
                .change_addresses(tx, &instance, interface_id, &update.addresses)
                .await?;
            let command = self.ipam.commands().clear_second_ips(
                &instance,
                &details.interface.mac,
                check.changed,
                &old_addresses,
            )?;
            self.ipam.execute(&target, &command).await?;
        }
        Ok(details)
    }

    /// Delete a non-primary interface
    pub async fn delete_interface(&self, tx: &mut dyn IpamTx, interface_id: u64) -> Result<(), IpamError> {
        let iface = tx.get_interface(interface_id).await?;
        require_owner(self.ipam.membership(), Role::Writer, iface.owner, "delete the interface")?;
        if iface.primary_if && iface.instance_id.is_some() {
            let error_msg = format!("Primary interface {} of an instance can not be deleted", iface.id);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        }
        self.remove(tx, &iface).await
    }

    /// Delete every interface of an owner, returning how many were removed
    pub async fn delete_owner_interfaces(&self, tx: &mut dyn IpamTx, owner: InterfaceOwner) -> Result<usize, IpamError> {
        let interfaces = tx
            .list_interfaces(&InterfaceFilter {
                kind: Some(owner.kind()),
                owner_id: Some(owner.id()),
                ..Default::default()
            })
            .await?;
        for iface in &interfaces {
            self.remove(tx, iface).await?;
        }
        Ok(interfaces.len())
    }

    /// Unbind site subnets, drop native shadows, release addresses, delete the row
    pub(crate) async fn remove(&self, tx: &mut dyn IpamTx, iface: &Interface) -> Result<(), IpamError> {
        let sites = tx
            .list_subnets(&SubnetFilter {
                interface_id: Some(iface.id),
                ..Default::default()
            })
            .await?;
        for mut site in sites {
            site.interface_id = None;
            tx.update_subnet(&site).await?;
        }

        let shadows = tx
            .list_floating_ips(&FloatingIpFilter {
                fip_type: Some(FloatingIpType::Native),
                ..Default::default()
            })
            .await?;
        if !shadows.is_empty() {
            let bound = tx
                .list_addresses(&AddressFilter {
                    interface_id: Some(iface.id),
                    ..Default::default()
                })
                .await?;
            let lent = tx
                .list_addresses(&AddressFilter {
                    second_interface_id: Some(iface.id),
                    ..Default::default()
                })
                .await?;
            for address in bound.iter().chain(lent.iter().filter(|a| a.interface_id.is_none())) {
                self.ipam.floating_ips().remove_native_shadows(tx, address).await?;
            }
        }

        let lent_by_fips: Vec<u64> = tx
            .list_addresses(&AddressFilter {
                second_interface_id: Some(iface.id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter_map(|a| a.interface_id)
            .collect();
        self.ipam.address_pool().release_interface(tx, iface.id).await?;
        for owner_iface in lent_by_fips {
            self.ipam.floating_ips().return_to_pool(tx, owner_iface).await?;
        }

        match tx.delete_interface(iface.id).await {
            Ok(()) => {}
            Err(ipam_store::StoreError::NotFound(_)) => warn!("Interface {} already deleted", iface.id),
            Err(e) => return Err(e.into()),
        }
        info!("Deleted interface {} ({})", iface.name, iface.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ipam_store::{FloatingIp, IpVersion};
    use uuid::Uuid;

    fn subnet(id: u64, vlan: u32) -> Subnet {
        Subnet {
            id,
            uuid: Uuid::new_v4(),
            name: format!("net-{}", id),
            owner: 1,
            network: "10.0.0.0/24".to_string(),
            netmask: "255.255.255.0".to_string(),
            gateway: "10.0.0.1/24".to_string(),
            start: "10.0.0.2".to_string(),
            end: "10.0.0.254".to_string(),
            vlan,
            subnet_type: SubnetType::Internal,
            router_id: None,
            group_id: None,
            dhcp: false,
            dns: String::new(),
            domain: String::new(),
            interface_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn address(id: u64, ip: &str) -> Address {
        Address {
            id,
            address: format!("{}/24", ip),
            netmask: "255.255.255.0".to_string(),
            ip_version: IpVersion::V4,
            subnet_id: 1,
            allocated: true,
            reserved: false,
            role: Some(AddressRole::Native),
            interface_id: Some(5),
            second_interface_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn details(secondary: usize, sites: Vec<Subnet>) -> InterfaceDetails {
        InterfaceDetails {
            interface: Interface {
                id: 5,
                uuid: Uuid::new_v4(),
                name: "eth0".to_string(),
                owner: 1,
                kind: InterfaceKind::Instance,
                owner_id: 9,
                instance_id: Some(9),
                mac: "52:54:00:00:00:01".to_string(),
                mtu: 1450,
                primary_if: true,
                inbound: 0,
                outbound: 0,
                allow_spoofing: false,
                security_groups: vec![1],
                subnet_id: 1,
                hyper: Some(1),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            address: address(100, "10.0.0.2"),
            subnet: subnet(1, 5000),
            secondary: (0..secondary)
                .map(|i| address(101 + i as u64, &format!("10.0.0.{}", 3 + i)))
                .collect(),
            site_subnets: sites,
        }
    }

    fn public_ip(fip_address: &str, vlan: u32) -> PublicIp {
        PublicIp {
            floating_ip: FloatingIp {
                id: 1,
                uuid: Uuid::new_v4(),
                name: "p".to_string(),
                owner: 1,
                fip_type: FloatingIpType::Floating,
                fip_address: fip_address.to_string(),
                ip_address: ipam_store::strip_prefix_len(fip_address).to_string(),
                int_address: String::new(),
                instance_id: None,
                router_id: None,
                load_balancer_id: None,
                interface_id: Some(7),
                subnet_id: Some(1),
                group_id: None,
                inbound: 0,
                outbound: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            subnet: subnet(1, vlan),
        }
    }

    #[test]
    fn test_unchanged_topology() {
        let current = details(2, vec![]);
        let desired = DesiredAddresses {
            subnets: vec![subnet(1, 5000)],
            secondary_count: 2,
            ..Default::default()
        };
        assert_eq!(
            check_addresses_consistent(&current, &desired),
            AddressCheck { valid: true, changed: false }
        );
    }

    #[test]
    fn test_secondary_count_change_detected() {
        let desired = DesiredAddresses {
            subnets: vec![subnet(1, 5000)],
            secondary_count: 3,
            ..Default::default()
        };
        let check = check_addresses_consistent(&details(2, vec![]), &desired);
        assert!(check.valid);
        assert!(check.changed);
    }

    #[test]
    fn test_foreign_tag_is_invalid() {
        let desired = DesiredAddresses {
            subnets: vec![subnet(2, 5001)],
            secondary_count: 0,
            ..Default::default()
        };
        assert!(!check_addresses_consistent(&details(0, vec![]), &desired).valid);

        let desired = DesiredAddresses {
            site_subnets: vec![subnet(3, 5002)],
            ..Default::default()
        };
        assert!(!check_addresses_consistent(&details(0, vec![]), &desired).valid);
    }

    #[test]
    fn test_new_site_subnet_is_a_change() {
        let desired = DesiredAddresses {
            site_subnets: vec![subnet(3, 5000)],
            ..Default::default()
        };
        let check = check_addresses_consistent(&details(0, vec![subnet(4, 5000)]), &desired);
        assert!(check.valid);
        assert!(check.changed);

        let check = check_addresses_consistent(&details(0, vec![subnet(3, 5000)]), &desired);
        assert_eq!(check, AddressCheck { valid: true, changed: false });
    }

    #[test]
    fn test_public_ips_must_match_bound_addresses() {
        let desired = DesiredAddresses {
            public_ips: vec![public_ip("10.0.0.2/24", 5000), public_ip("10.0.0.3/24", 5000)],
            ..Default::default()
        };
        assert_eq!(
            check_addresses_consistent(&details(1, vec![]), &desired),
            AddressCheck { valid: true, changed: false }
        );

        let desired = DesiredAddresses {
            public_ips: vec![public_ip("10.0.0.9/24", 5000)],
            ..Default::default()
        };
        assert!(!check_addresses_consistent(&details(1, vec![]), &desired).valid);

        // a third public IP beyond the current secondaries only marks a change
        let desired = DesiredAddresses {
            public_ips: vec![
                public_ip("10.0.0.2/24", 5000),
                public_ip("10.0.0.3/24", 5000),
                public_ip("10.0.0.4/24", 5000),
            ],
            ..Default::default()
        };
        assert_eq!(
            check_addresses_consistent(&details(1, vec![]), &desired),
            AddressCheck { valid: true, changed: true }
        );
    }

    #[test]
    fn test_nic_name_fills_lowest_gap() {
        let named = |names: &[&str]| -> Vec<Interface> {
            names
                .iter()
                .map(|n| Interface {
                    name: (*n).to_string(),
                    ..details(0, vec![]).interface
                })
                .collect()
        };
        assert_eq!(next_nic_name(&[]), "eth0");
        assert_eq!(next_nic_name(&named(&["eth0", "eth1"])), "eth2");
        assert_eq!(next_nic_name(&named(&["eth0", "eth2"])), "eth1");
        assert_eq!(next_nic_name(&named(&["eth1", "eth2"])), "eth0");
    }
}
