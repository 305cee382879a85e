//! Address pool of a subnet.
//!
//! A subnet's addresses are materialized as rows when the subnet is created.
//! From then on a row only changes state: it is claimed by an interface,
//! released, or deleted together with its subnet.

use crate::error::IpamError;
use crate::net;
use crate::Ipam;
use ipam_store::{Address, AddressClaim, AddressFilter, AddressRole, IpVersion, IpamTx, NewAddress, Subnet};
use std::net::IpAddr;
use tracing::{debug, error};

/// Address pool operations
#[derive(Debug, Clone, Copy)]
pub struct AddressPool<'a> {
    ipam: &'a Ipam,
}

impl<'a> AddressPool<'a> {
    pub(crate) fn new(ipam: &'a Ipam) -> Self {
        Self { ipam }
    }

    /// Create one row per IP of `start..=end`, skipping the gateway, plus
    /// one row for the gateway itself
    ///
    /// Returns the number of rows written. A failure leaves partial rows in
    /// the transaction; the caller's rollback removes them.
    pub async fn generate_pool(
        &self,
        tx: &mut dyn IpamTx,
        subnet: &Subnet,
        start: IpAddr,
        end: IpAddr,
        prefix_len: u8,
    ) -> Result<usize, IpamError> {
        let gateway = net::parse_ip(&subnet.gateway)?;
        let size = net::range_len(start, end);
        if size == 0 || size > self.ipam.config().max_network_addresses {
            let error_msg = format!(
                "address range {}-{} of subnet {} is empty or too large",
                start, end, subnet.name
            );
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }

        let ip_version = if start.is_ipv4() { IpVersion::V4 } else { IpVersion::V6 };
        let row = |ip: IpAddr| NewAddress {
            address: net::with_prefix(ip, prefix_len),
            netmask: subnet.netmask.clone(),
            ip_version,
            subnet_id: subnet.id,
        };

        let mut rows: Vec<NewAddress> = net::ip_range(start, end)
            .filter(|ip| *ip != gateway)
            .map(row)
            .collect();
        rows.push(row(gateway));

        let written = tx.insert_addresses(rows).await?;
        debug!("Generated {} addresses for subnet {}", written, subnet.name);
        Ok(written)
    }

    /// Free, unreserved addresses other than the gateway
    ///
    /// A snapshot only: concurrent claims may consume the counted addresses
    /// before the caller gets to them.
    pub async fn count_idle(&self, tx: &mut dyn IpamTx, subnet: &Subnet) -> Result<u64, IpamError> {
        Ok(tx.count_idle(subnet.id, &subnet.gateway).await?)
    }

    /// Claim one free address for `interface_id`
    ///
    /// Without `address` the first free, unreserved, non-gateway row is
    /// taken. With `address` only that row is tried, and naming the gateway
    /// never matches. `None` means nothing matched and the caller should
    /// move on to its next candidate subnet.
    pub async fn claim(
        &self,
        tx: &mut dyn IpamTx,
        subnet: &Subnet,
        interface_id: u64,
        role: AddressRole,
        address: Option<&str>,
    ) -> Result<Option<Address>, IpamError> {
        let claim = AddressClaim {
            subnet_id: subnet.id,
            interface_id,
            role,
            address: address.map(str::to_string),
            exclude: Some(subnet.gateway.clone()),
        };
        let claimed = tx.claim_address(&claim).await?;
        match &claimed {
            Some(addr) => debug!(
                "Claimed {} in subnet {} for interface {}",
                addr.address, subnet.name, interface_id
            ),
            None => debug!("No free address in subnet {} for interface {}", subnet.name, interface_id),
        }
        Ok(claimed)
    }

    /// Bind the subnet's gateway row to a router gateway interface
    pub async fn claim_gateway(
        &self,
        tx: &mut dyn IpamTx,
        subnet: &Subnet,
        interface_id: u64,
    ) -> Result<Option<Address>, IpamError> {
        let claim = AddressClaim {
            subnet_id: subnet.id,
            interface_id,
            role: AddressRole::Native,
            address: Some(subnet.gateway.clone()),
            exclude: None,
        };
        let claimed = tx.claim_address(&claim).await?;
        if claimed.is_some() {
            debug!("Bound gateway {} of subnet {} to interface {}", subnet.gateway, subnet.name, interface_id);
        }
        Ok(claimed)
    }

    /// Return an address to the pool; releasing a free address is a no-op
    pub async fn release(&self, tx: &mut dyn IpamTx, address_id: u64) -> Result<Address, IpamError> {
        Ok(tx.release_address(address_id).await?)
    }

    /// Release everything bound to an interface
    ///
    /// Addresses the interface holds as primary are freed. Secondary
    /// addresses owned by another interface (public addresses lent by a
    /// floating IP) only lose the secondary binding.
    pub async fn release_interface(&self, tx: &mut dyn IpamTx, interface_id: u64) -> Result<usize, IpamError> {
        let mut released = 0;

        let primary = tx
            .list_addresses(&AddressFilter {
                interface_id: Some(interface_id),
                ..Default::default()
            })
            .await?;
        for addr in primary {
            tx.release_address(addr.id).await?;
            released += 1;
        }

        let secondary = tx
            .list_addresses(&AddressFilter {
                second_interface_id: Some(interface_id),
                ..Default::default()
            })
            .await?;
        for mut addr in secondary {
            if addr.interface_id.is_some() {
                addr.second_interface_id = None;
                addr.role = Some(AddressRole::Native);
                tx.update_address(&addr).await?;
            } else {
                tx.release_address(addr.id).await?;
            }
            released += 1;
        }

        debug!("Released {} addresses of interface {}", released, interface_id);
        Ok(released)
    }
}
