//! Load balancer virtual IPs, served Active/Passive by a VRRP pair

use super::FloatingIpManager;
use crate::commands::{VrrpAddress, VrrpRole};
use crate::error::IpamError;
use hypervisor_client::HostTarget;
use ipam_store::{FloatingIp, FloatingIpFilter, IpamTx, LoadBalancer, LoadBalancerStatus};
use tracing::{error, info};

/// Both hosts of a load balancer's VRRP pair
pub(crate) fn lb_target(lb: &LoadBalancer) -> Result<HostTarget, IpamError> {
    let members: Vec<i32> = [lb.primary.hyper, lb.backup.hyper].into_iter().flatten().collect();
    if members.is_empty() {
        let error_msg = format!("Load balancer {} is not placed on any host", lb.name);
        error!("{}", error_msg);
        return Err(IpamError::InvalidState(error_msg));
    }
    Ok(HostTarget::Group {
        name: lb.hyper_group.clone(),
        members,
    })
}

impl FloatingIpManager<'_> {
    /// Rewrite the keepalived configuration on both sides of a load balancer
    /// from its current floating IPs
    pub async fn regenerate_vrrp_conf(&self, tx: &mut dyn IpamTx, lb_id: u64) -> Result<(), IpamError> {
        let lb = tx.get_load_balancer(lb_id).await?;
        if lb.status != LoadBalancerStatus::Available {
            let error_msg = format!("Load balancer {} is not available", lb.name);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        }

        let floating_ips = tx
            .list_floating_ips(&FloatingIpFilter {
                load_balancer_id: Some(lb.id),
                ..Default::default()
            })
            .await?;
        let mut addresses = Vec::with_capacity(floating_ips.len());
        for fip in &floating_ips {
            let vlan = match fip.subnet_id {
                Some(subnet_id) => tx.get_subnet(subnet_id).await?.vlan,
                None => continue,
            };
            addresses.push(VrrpAddress {
                address: fip.fip_address.clone(),
                vlan,
            });
        }

        for (role, endpoint) in [(VrrpRole::Master, &lb.primary), (VrrpRole::Backup, &lb.backup)] {
            let Some(hyper) = endpoint.hyper else {
                let error_msg = format!("{} side of load balancer {} has no host", role, lb.name);
                error!("{}", error_msg);
                return Err(IpamError::InvalidState(error_msg));
            };
            let command = self.ipam.commands().create_keepalived_conf(&lb, role, &addresses)?;
            self.ipam.execute(&HostTarget::Host(hyper), &command).await?;
        }
        info!(
            "Regenerated VRRP configuration of load balancer {} with {} addresses",
            lb.name,
            addresses.len()
        );
        Ok(())
    }

    /// Drop a virtual IP on every host of the load balancer
    pub(crate) async fn clear_lb_floating(
        &self,
        tx: &mut dyn IpamTx,
        lb_id: u64,
        fip: &FloatingIp,
        vlan: u32,
    ) -> Result<(), IpamError> {
        let lb = tx.get_load_balancer(lb_id).await?;
        let target = lb_target(&lb)?;
        let command = self.ipam.commands().clear_lb_floating(&lb, fip, vlan);
        self.ipam.execute(&target, &command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam_store::VrrpEndpoint;

    fn lb(primary: Option<i32>, backup: Option<i32>) -> LoadBalancer {
        LoadBalancer {
            id: 3,
            name: "web-lb".to_string(),
            owner: 1,
            status: LoadBalancerStatus::Available,
            router_id: 7,
            vrrp_instance_id: 12,
            vrrp_vlan: 4300,
            hyper_group: "group-vrrp-12".to_string(),
            primary: VrrpEndpoint {
                hyper: primary,
                ..Default::default()
            },
            backup: VrrpEndpoint {
                hyper: backup,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_lb_target_covers_both_sides() {
        let target = lb_target(&lb(Some(1), Some(2))).unwrap();
        assert_eq!(target.to_string(), "toall=group-vrrp-12:1,2");
        let target = lb_target(&lb(None, Some(2))).unwrap();
        assert_eq!(target.to_string(), "toall=group-vrrp-12:2");
        assert!(lb_target(&lb(None, None)).is_err());
    }
}
