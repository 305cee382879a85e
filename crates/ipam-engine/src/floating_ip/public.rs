//! Public addressing of instances outside a VPC: floating IPs used directly
//! as interface addresses, and native shadows of public interface addresses.

use super::state::{self, FloatingIpOp};
use super::FloatingIpManager;
use crate::error::IpamError;
use crate::interface_binder::InterfaceDetails;
use ipam_store::{
    Address, AddressFilter, AddressRole, FloatingIp, FloatingIpFilter, FloatingIpType, Instance, IpamTx, NewFloatingIp,
    Subnet, strip_prefix_len,
};
use tracing::{debug, error, info};

/// A floating IP together with the subnet its address comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIp {
    pub floating_ip: FloatingIp,
    pub subnet: Subnet,
}

impl FloatingIpManager<'_> {
    /// Load floating IPs with their subnets, in the given order
    pub async fn resolve_public_ips(&self, tx: &mut dyn IpamTx, ids: &[u64]) -> Result<Vec<PublicIp>, IpamError> {
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            let floating_ip = tx.get_floating_ip(*id).await?;
            let Some(subnet_id) = floating_ip.subnet_id else {
                let error_msg = format!("Floating IP {} has no address", floating_ip.name);
                error!("{}", error_msg);
                return Err(IpamError::InvalidState(error_msg));
            };
            let subnet = tx.get_subnet(subnet_id).await?;
            resolved.push(PublicIp { floating_ip, subnet });
        }
        Ok(resolved)
    }

    /// Make public IPs the addresses of an instance interface
    ///
    /// The first public IP's address is the primary address and the rest
    /// become secondary addresses. Without `interface_id` the first public
    /// IP's own interface is turned into the instance's `eth0`. Public IPs
    /// beyond the current secondaries are linked as `Reserved`; secondaries
    /// beyond the public IPs are handed back to their floating IPs.
    pub async fn derive_public_interface(
        &self,
        tx: &mut dyn IpamTx,
        instance: &Instance,
        interface_id: Option<u64>,
        public_ips: &[PublicIp],
    ) -> Result<InterfaceDetails, IpamError> {
        if instance.router_id.is_some() {
            let error_msg = "VPC instance is not allowed to set public addresses".to_string();
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }
        let Some(first) = public_ips.first() else {
            return Err(IpamError::InvalidParameter("no public IP given".to_string()));
        };
        let primary_id = match interface_id.or(first.floating_ip.interface_id) {
            Some(id) => id,
            None => {
                let error_msg = format!("Floating IP {} has no interface", first.floating_ip.name);
                error!("{}", error_msg);
                return Err(IpamError::InvalidState(error_msg));
            }
        };
        let details = self.ipam.interfaces().details(tx, primary_id).await?;

        if public_ips.len() > details.secondary.len() {
            for (i, public) in public_ips.iter().enumerate() {
                let mut fip = tx.lock_floating_ip(public.floating_ip.id).await?;
                if fip.is_attached() {
                    continue;
                }
                state::require(&fip, FloatingIpOp::Attach)?;

                if i == 0 {
                    let mut iface = details.interface.clone();
                    iface.instance_id = Some(instance.id);
                    iface.name = "eth0".to_string();
                    iface.primary_if = true;
                    tx.update_interface(&iface).await?;
                    fip.int_address = details.address.address.clone();
                } else {
                    let mut address = self.address_of(tx, &fip).await?;
                    address.role = Some(AddressRole::Second);
                    address.second_interface_id = Some(primary_id);
                    let address = tx.update_address(&address).await?;
                    fip.int_address = address.address;
                }
                fip.instance_id = Some(instance.id);
                fip.fip_type = FloatingIpType::Reserved;
                tx.update_floating_ip(&fip).await?;
                debug!("Linked public IP {} to instance {}", fip.ip_address, instance.hostname);
            }
        } else {
            let keep = public_ips.len() - 1;
            for mut address in details.secondary.into_iter().skip(keep).rev() {
                address.second_interface_id = None;
                address.role = Some(AddressRole::Native);
                tx.update_address(&address).await?;
                if let Some(owner_iface) = address.interface_id {
                    self.return_to_pool(tx, owner_iface).await?;
                }
            }
        }

        info!(
            "Derived public interface {} of instance {} from {} public IPs",
            primary_id,
            instance.hostname,
            public_ips.len()
        );
        self.ipam.interfaces().details(tx, primary_id).await
    }

    async fn address_of(&self, tx: &mut dyn IpamTx, fip: &FloatingIp) -> Result<Address, IpamError> {
        let Some(iface_id) = fip.interface_id else {
            let error_msg = format!("Floating IP {} has no interface", fip.name);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        };
        tx.list_addresses(&AddressFilter {
            interface_id: Some(iface_id),
            ..Default::default()
        })
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| IpamError::NotFound(format!("Address of floating IP {} not found", fip.name)))
    }

    /// Unlink the floating IP owning `owner_interface_id` and make it a
    /// plain `Floating` IP again
    pub(crate) async fn return_to_pool(&self, tx: &mut dyn IpamTx, owner_interface_id: u64) -> Result<(), IpamError> {
        let owners = tx
            .list_floating_ips(&FloatingIpFilter {
                interface_id: Some(owner_interface_id),
                ..Default::default()
            })
            .await?;
        for mut fip in owners {
            fip.instance_id = None;
            fip.int_address.clear();
            fip.fip_type = FloatingIpType::Floating;
            tx.update_floating_ip(&fip).await?;
            debug!("Returned floating IP {} to the pool", fip.ip_address);
        }
        Ok(())
    }

    /// Record an instance's public interface address as a `Native` floating IP
    pub(crate) async fn create_native_shadow(
        &self,
        tx: &mut dyn IpamTx,
        instance: &Instance,
        address: &Address,
    ) -> Result<FloatingIp, IpamError> {
        let fip = tx
            .insert_floating_ip(NewFloatingIp {
                name: format!("native-{}", address.ip()),
                owner: instance.owner,
                fip_type: FloatingIpType::Native,
                fip_address: address.address.clone(),
                ip_address: strip_prefix_len(&address.address).to_string(),
                int_address: address.address.clone(),
                instance_id: Some(instance.id),
                router_id: instance.router_id,
                load_balancer_id: None,
                subnet_id: Some(address.subnet_id),
                group_id: None,
                inbound: 0,
                outbound: 0,
            })
            .await?;
        debug!("Created native floating IP {} for instance {}", fip.ip_address, instance.hostname);
        Ok(fip)
    }

    /// Drop the native shadows of `address`
    pub(crate) async fn remove_native_shadows(&self, tx: &mut dyn IpamTx, address: &Address) -> Result<usize, IpamError> {
        let shadows: Vec<FloatingIp> = tx
            .list_floating_ips(&FloatingIpFilter {
                fip_type: Some(FloatingIpType::Native),
                subnet_id: Some(address.subnet_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|f| f.fip_address == address.address)
            .collect();
        for fip in &shadows {
            tx.delete_floating_ip(fip.id).await?;
        }
        Ok(shadows.len())
    }
}
