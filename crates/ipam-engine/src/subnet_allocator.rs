//! Subnet allocator.
//!
//! Validates CIDRs, hands out VLAN/VNI tags, materializes address pools and
//! wires router-bound subnets to their router. Creation and deletion run
//! entirely inside the caller's transaction, so a failure at any step leaves
//! no subnet, address, rule or gateway interface behind.

use crate::commands::router_target;
use crate::config::{TAG_MAX, TAG_MIN};
use crate::error::IpamError;
use crate::interface_binder::{CreateInterface, InterfaceOwner};
use crate::net;
use crate::permission::{require_owner, require_permission, Role};
use crate::Ipam;
use ipam_store::{
    AddressFilter, FloatingIpFilter, InterfaceFilter, IpamTx, NewSubnet, Protocol, Router, StoreError, Subnet,
    SubnetFilter, SubnetType,
};
use ipnet::IpNet;
use rand::Rng;
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use tracing::{debug, error, info, warn};

/// Insert attempts when a freshly assigned tag loses a race
const TAG_INSERT_ATTEMPTS: usize = 3;

/// Parameters of a new subnet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateSubnet {
    /// Explicit tag, assigned automatically when `None`
    pub vlan: Option<u32>,
    pub name: String,
    pub network: String,
    pub gateway: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub subnet_type: SubnetType,
    pub dns: String,
    pub domain: String,
    pub dhcp: bool,
    pub router_id: Option<u64>,
    pub group_id: Option<u64>,
}

/// Mutable subnet attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetUpdate {
    pub name: String,
    pub group_id: Option<u64>,
}

/// Gateway and allocatable range of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetRange {
    pub gateway: IpAddr,
    pub start: IpAddr,
    pub end: IpAddr,
    pub prefix_len: u8,
}

/// Work out gateway, start and end, filling in defaults
///
/// The gateway defaults to the first host address. The range defaults to
/// the first and last host addresses, moved off the gateway when they land
/// on it.
pub fn derive_range(
    network: &IpNet,
    gateway: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<SubnetRange, IpamError> {
    let first = network.network();
    let last = network.broadcast();
    let outside = || IpamError::InvalidParameter(format!("network {} has no host addresses", network));

    let gateway = match gateway {
        Some(gw) => net::parse_ip(gw)?,
        None => net::next_ip(first).ok_or_else(outside)?,
    };
    let mut start = match start {
        Some(s) => net::parse_ip(s)?,
        None => net::next_ip(first).ok_or_else(outside)?,
    };
    if start == gateway {
        start = net::next_ip(start).ok_or_else(outside)?;
    }
    let mut end = match end {
        Some(e) => net::parse_ip(e)?,
        None => net::prev_ip(last).ok_or_else(outside)?,
    };
    if end == gateway {
        end = net::prev_ip(end).ok_or_else(outside)?;
    }

    for (what, ip) in [("gateway", gateway), ("start", start), ("end", end)] {
        if !network.contains(&ip) {
            return Err(IpamError::InvalidParameter(format!(
                "{} {} is outside network {}",
                what, ip, network
            )));
        }
    }
    if net::range_len(start, end) == 0 {
        return Err(IpamError::InvalidParameter(format!(
            "start {} is after end {}",
            start, end
        )));
    }

    Ok(SubnetRange {
        gateway,
        start,
        end,
        prefix_len: network.prefix_len(),
    })
}

/// Lowest tag in `min..=max` not in `used`
#[must_use]
pub fn first_unused_tag(used: &BTreeSet<u32>, min: u32, max: u32) -> Option<u32> {
    let mut candidate = min;
    for &tag in used.range(min..=max) {
        if tag > candidate {
            break;
        }
        candidate = tag.checked_add(1)?;
    }
    (candidate <= max).then_some(candidate)
}

/// Random sampling first, then a scan of the whole range
fn pick_tag(used: &BTreeSet<u32>, min: u32, max: u32, attempts: u32) -> Option<u32> {
    let mut rng = rand::thread_rng();
    for _ in 0..attempts {
        let tag = rng.gen_range(min..=max);
        if !used.contains(&tag) {
            return Some(tag);
        }
    }
    debug!("Random tag sampling exhausted after {} attempts, scanning", attempts);
    first_unused_tag(used, min, max)
}

/// Subnet operations
#[derive(Debug, Clone, Copy)]
pub struct SubnetAllocator<'a> {
    ipam: &'a Ipam,
}

impl<'a> SubnetAllocator<'a> {
    pub(crate) fn new(ipam: &'a Ipam) -> Self {
        Self { ipam }
    }

    /// Pick a tag no existing subnet uses
    pub async fn assign_tag(&self, tx: &mut dyn IpamTx) -> Result<u32, IpamError> {
        let used = tx.used_tags().await?;
        let config = self.ipam.config();
        match pick_tag(&used, config.tag_min, config.tag_max, config.tag_random_attempts) {
            Some(tag) => Ok(tag),
            None => {
                let error_msg = format!("No free tag left in {}-{}", config.tag_min, config.tag_max);
                error!("{}", error_msg);
                Err(IpamError::InsufficientCapacity(error_msg))
            }
        }
    }

    pub async fn get(&self, tx: &mut dyn IpamTx, id: u64) -> Result<Subnet, IpamError> {
        Ok(tx.get_subnet(id).await?)
    }

    /// Create a subnet with its address pool and, when router-bound, its
    /// gateway interface and ingress rules
    pub async fn create(&self, tx: &mut dyn IpamTx, params: &CreateSubnet) -> Result<Subnet, IpamError> {
        debug!("Creating subnet {:?}", params);
        let membership = self.ipam.membership();
        require_permission(membership, Role::Writer, "create a subnet")?;
        if params.subnet_type == SubnetType::Public {
            require_permission(membership, Role::Admin, "create a public subnet")?;
            if params.router_id.is_some() {
                let error_msg = "Public subnet can not be created in a vpc".to_string();
                error!("{}", error_msg);
                return Err(IpamError::InvalidParameter(error_msg));
            }
        }
        if params.name.trim().is_empty() {
            return Err(IpamError::InvalidParameter("subnet name is required".to_string()));
        }

        let network = net::parse_network(&params.network)?;
        let size = net::address_count(&network);
        let config = self.ipam.config();
        if size < config.min_network_addresses || size > config.max_network_addresses {
            let error_msg = format!(
                "Network {} must have more than {} but less than {} addresses",
                network, config.min_network_addresses, config.max_network_addresses
            );
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }
        let range = derive_range(
            &network,
            params.gateway.as_deref(),
            params.start.as_deref(),
            params.end.as_deref(),
        )?;

        let existing = tx.list_subnets(&SubnetFilter::default()).await?;
        if existing.iter().any(|s| s.name == params.name) {
            let error_msg = format!("Subnet name {} is already in use", params.name);
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }
        if let Some(tag) = params.vlan {
            if !(TAG_MIN..=TAG_MAX).contains(&tag) {
                let error_msg = format!("Tag {} is outside {}-{}", tag, TAG_MIN, TAG_MAX);
                error!("{}", error_msg);
                return Err(IpamError::InvalidParameter(error_msg));
            }
        }

        let router = match params.router_id {
            Some(router_id) => {
                let router = tx.get_router(router_id).await?;
                require_owner(membership, Role::Writer, router.owner, "attach a subnet to the router")?;
                Some(router)
            }
            None => None,
        };

        let subnet = self.insert(tx, params, &network, &range).await?;
        self.ipam
            .address_pool()
            .generate_pool(tx, &subnet, range.start, range.end, range.prefix_len)
            .await?;
        if let Some(router) = router {
            self.wire_router(tx, &subnet, &router).await?;
        }

        info!(
            "Created {} subnet {} ({}) with tag {}",
            subnet.subnet_type, subnet.name, subnet.network, subnet.vlan
        );
        Ok(subnet)
    }

    async fn insert(
        &self,
        tx: &mut dyn IpamTx,
        params: &CreateSubnet,
        network: &IpNet,
        range: &SubnetRange,
    ) -> Result<Subnet, IpamError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let vlan = match params.vlan {
                Some(tag) => tag,
                None => self.assign_tag(tx).await?,
            };
            let row = NewSubnet {
                name: params.name.clone(),
                owner: self.ipam.membership().org_id(),
                network: network.to_string(),
                netmask: network.netmask().to_string(),
                gateway: net::with_prefix(range.gateway, range.prefix_len),
                start: range.start.to_string(),
                end: range.end.to_string(),
                vlan,
                subnet_type: params.subnet_type,
                router_id: params.router_id,
                group_id: params.group_id,
                dhcp: params.dhcp,
                dns: params.dns.clone(),
                domain: params.domain.clone(),
            };
            match tx.insert_subnet(row).await {
                Ok(subnet) => return Ok(subnet),
                Err(StoreError::UniqueViolation(msg)) if params.vlan.is_none() && attempt < TAG_INSERT_ATTEMPTS => {
                    warn!("Subnet insert lost a uniqueness race ({}), reassigning tag", msg);
                }
                Err(StoreError::UniqueViolation(msg)) => {
                    error!("Failed to create subnet {}: {}", params.name, msg);
                    return Err(IpamError::InvalidParameter(msg));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Open the router to the subnet and give it a gateway interface
    async fn wire_router(&self, tx: &mut dyn IpamTx, subnet: &Subnet, router: &Router) -> Result<(), IpamError> {
        let Some(security_group) = router.default_security_group else {
            let error_msg = format!("Router {} has no default security group", router.id);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        };
        for protocol in [Protocol::Tcp, Protocol::Udp] {
            self.ipam
                .security()
                .allow_ingress(tx, security_group, &subnet.network, protocol, (1, 65535))
                .await?;
        }

        let params = CreateInterface {
            name: "subnet-gw".to_string(),
            address: Some(subnet.gateway.clone()),
            hyper: router.hyper,
            ..Default::default()
        };
        self.ipam
            .interfaces()
            .create_interface(tx, InterfaceOwner::Gateway(router.id), std::slice::from_ref(subnet), &params)
            .await?;
        debug!("Wired subnet {} to router {}", subnet.name, router.id);
        Ok(())
    }

    /// Rename a subnet and move it between IP groups
    pub async fn update(&self, tx: &mut dyn IpamTx, id: u64, update: &SubnetUpdate) -> Result<Subnet, IpamError> {
        let mut subnet = tx.get_subnet(id).await?;
        require_owner(self.ipam.membership(), Role::Writer, subnet.owner, "update the subnet")?;
        if update.name.trim().is_empty() {
            return Err(IpamError::InvalidParameter("subnet name is required".to_string()));
        }
        subnet.name = update.name.clone();
        subnet.group_id = update.group_id;
        match tx.update_subnet(&subnet).await {
            Ok(subnet) => Ok(subnet),
            Err(StoreError::UniqueViolation(msg)) => {
                error!("Failed to update subnet {}: {}", id, msg);
                Err(IpamError::InvalidParameter(msg))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a subnet, its addresses, its infrastructure interfaces and the
    /// floating IPs anchored to it
    pub async fn delete(&self, tx: &mut dyn IpamTx, id: u64) -> Result<(), IpamError> {
        let mut subnet = tx.get_subnet(id).await?;
        require_owner(self.ipam.membership(), Role::Writer, subnet.owner, "delete the subnet")?;

        if subnet.subnet_type != SubnetType::Site && self.in_use(tx, &subnet).await? {
            let error_msg = format!("Some addresses of subnet {} are still in use", subnet.name);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        }

        // free the name for reuse
        subnet.name = format!("{}-{}", subnet.name, subnet.created_at.timestamp());
        let subnet = tx.update_subnet(&subnet).await?;

        let floating_ips = tx
            .list_floating_ips(&FloatingIpFilter {
                subnet_id: Some(subnet.id),
                ..Default::default()
            })
            .await?;
        for fip in floating_ips {
            self.ipam.floating_ips().deallocate(tx, fip.id).await?;
        }

        let interfaces = tx
            .list_interfaces(&InterfaceFilter {
                subnet_id: Some(subnet.id),
                ..Default::default()
            })
            .await?;
        for iface in interfaces.iter().filter(|i| i.kind.is_infrastructure()) {
            self.ipam.interfaces().remove(tx, iface).await?;
        }

        let removed = tx.delete_addresses(subnet.id).await?;
        tx.delete_subnet(subnet.id).await?;
        debug!("Deleted subnet {} and {} addresses", subnet.name, removed);

        if let Some(router_id) = subnet.router_id {
            let router = tx.get_router(router_id).await?;
            if router.hyper.is_some() {
                let target = router_target(&router)?;
                let command = self.ipam.commands().clear_gateway(router.id, &subnet);
                self.ipam.execute(&target, &command).await?;
            }
        }
        info!("Deleted subnet {}", subnet.name);
        Ok(())
    }

    /// Whether a non-infrastructure interface holds an address of the subnet
    async fn in_use(&self, tx: &mut dyn IpamTx, subnet: &Subnet) -> Result<bool, IpamError> {
        let allocated = tx
            .list_addresses(&AddressFilter {
                subnet_id: Some(subnet.id),
                allocated: Some(true),
                ..Default::default()
            })
            .await?;
        let holders: HashSet<u64> = allocated
            .iter()
            .flat_map(|a| a.interface_id.into_iter().chain(a.second_interface_id))
            .collect();
        for iface_id in holders {
            match tx.get_interface(iface_id).await {
                Ok(iface) if !iface.kind.is_infrastructure() => return Ok(true),
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => warn!("Address of subnet {} bound to missing interface {}", subnet.name, iface_id),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }

    /// Idle addresses of a subnet
    pub async fn count_idle_addresses(&self, tx: &mut dyn IpamTx, id: u64) -> Result<u64, IpamError> {
        let subnet = tx.get_subnet(id).await?;
        self.ipam.address_pool().count_idle(tx, &subnet).await
    }
}
