//! Host-side command builders.
//!
//! Every physical-network effect of the engine is one of these shell
//! commands, sent through the [`NetworkActuator`](hypervisor_client::NetworkActuator)
//! to a [`HostTarget`]. Arguments are single-quoted; payloads too large for
//! arguments go on stdin as a JSON heredoc.

use crate::error::IpamError;
use hypervisor_client::HostTarget;
use ipam_store::{FloatingIp, Instance, LoadBalancer, Router, SecurityRule, Subnet};
use serde::Serialize;
use std::fmt;
use tracing::error;

/// Side of a VRRP pair a keepalived configuration is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrrpRole {
    Master,
    Backup,
}

impl fmt::Display for VrrpRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VrrpRole::Master => f.write_str("MASTER"),
            VrrpRole::Backup => f.write_str("BACKUP"),
        }
    }
}

/// One virtual address served by a load balancer
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VrrpAddress {
    pub address: String,
    pub vlan: u32,
}

/// Interface description consumed by `sync_nic_info`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NicInfo {
    pub device: String,
    pub vlan: u32,
    pub gateway: String,
    pub router: u64,
    pub inbound: u32,
    pub outbound: u32,
    pub allow_spoofing: bool,
    pub ip_address: String,
    pub mac_address: String,
    pub security: Vec<SecurityRule>,
    pub more_addresses: Vec<String>,
}

/// Quote a shell argument
#[must_use]
pub fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn heredoc<T: Serialize + ?Sized>(payload: &T) -> Result<String, IpamError> {
    let json = serde_json::to_string(payload).map_err(|e| {
        error!("Failed to serialize command payload: {}", e);
        IpamError::Serialization(e)
    })?;
    Ok(format!("<<EOF\n{}\nEOF", json))
}

/// Where a router's gateway commands run
///
/// A router living on a single host is addressed directly; a router with a
/// distinct peer is addressed as the `router-<id>` group of both hosts.
pub fn router_target(router: &Router) -> Result<HostTarget, IpamError> {
    match (router.hyper, router.peer) {
        (Some(hyper), None) => Ok(HostTarget::Host(hyper)),
        (Some(hyper), Some(peer)) if hyper == peer => Ok(HostTarget::Host(hyper)),
        (Some(hyper), Some(peer)) => Ok(HostTarget::Group {
            name: format!("router-{}", router.id),
            members: vec![hyper, peer],
        }),
        (None, _) => {
            let error_msg = format!("Router {} is not placed on any host", router.id);
            error!("{}", error_msg);
            Err(IpamError::InvalidState(error_msg))
        }
    }
}

/// Command builder rooted at the script directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commands {
    script_dir: String,
}

impl Commands {
    pub fn new(script_dir: impl Into<String>) -> Self {
        Self {
            script_dir: script_dir.into().trim_end_matches('/').to_string(),
        }
    }

    fn script(&self, name: &str, args: &[String]) -> String {
        let quoted: Vec<String> = args.iter().map(|a| quote(a)).collect();
        format!("{}/{}.sh {}", self.script_dir, name, quoted.join(" "))
    }

    /// Program NAT for a floating IP
    #[must_use]
    pub fn create_floating(
        &self,
        router_id: u64,
        fip: &FloatingIp,
        public_subnet: &Subnet,
        int_address: &str,
        int_vlan: u32,
    ) -> String {
        self.script(
            "create_floating",
            &[
                router_id.to_string(),
                fip.fip_address.clone(),
                public_subnet.gateway.clone(),
                public_subnet.vlan.to_string(),
                int_address.to_string(),
                int_vlan.to_string(),
                fip.id.to_string(),
                fip.inbound.to_string(),
                fip.outbound.to_string(),
            ],
        )
    }

    /// Remove the NAT of a floating IP
    #[must_use]
    pub fn clear_floating(&self, fip: &FloatingIp, int_vlan: u32) -> String {
        self.script(
            "clear_floating",
            &[
                fip.router_id.unwrap_or_default().to_string(),
                fip.fip_address.clone(),
                fip.int_address.clone(),
                int_vlan.to_string(),
                fip.id.to_string(),
            ],
        )
    }

    #[must_use]
    pub fn clear_gateway(&self, router_id: u64, subnet: &Subnet) -> String {
        self.script(
            "clear_gateway",
            &[router_id.to_string(), subnet.gateway.clone(), subnet.vlan.to_string()],
        )
    }

    /// keepalived configuration for one side of a load balancer
    pub fn create_keepalived_conf(
        &self,
        lb: &LoadBalancer,
        role: VrrpRole,
        addresses: &[VrrpAddress],
    ) -> Result<String, IpamError> {
        let (local, peer) = match role {
            VrrpRole::Master => (&lb.primary, &lb.backup),
            VrrpRole::Backup => (&lb.backup, &lb.primary),
        };
        let command = self.script(
            "create_keepalived_conf",
            &[
                lb.router_id.to_string(),
                lb.vrrp_instance_id.to_string(),
                lb.vrrp_vlan.to_string(),
                local.address.clone(),
                peer.address.clone(),
                role.to_string(),
            ],
        );
        Ok(format!("{}{}", command, heredoc(addresses)?))
    }

    /// Drop a load-balancer virtual address on every host of the pair
    #[must_use]
    pub fn clear_lb_floating(&self, lb: &LoadBalancer, fip: &FloatingIp, vlan: u32) -> String {
        self.script(
            "clear_lb_floating",
            &[
                lb.router_id.to_string(),
                lb.vrrp_instance_id.to_string(),
                fip.fip_address.clone(),
                vlan.to_string(),
            ],
        )
    }

    pub fn sync_nic_info(&self, instance: &Instance, update_meta: bool, nics: &[NicInfo]) -> Result<String, IpamError> {
        let command = self.script(
            "sync_nic_info",
            &[
                instance.id.to_string(),
                instance.hostname.clone(),
                instance.os_code.clone(),
                update_meta.to_string(),
            ],
        );
        Ok(format!("{}{}", command, heredoc(nics)?))
    }

    /// Remove addresses that left an interface, `old_addresses` being the set before the change
    pub fn clear_second_ips(
        &self,
        instance: &Instance,
        mac: &str,
        changed: bool,
        old_addresses: &[String],
    ) -> Result<String, IpamError> {
        let command = self.script(
            "clear_second_ips",
            &[
                instance.id.to_string(),
                mac.to_string(),
                instance.os_code.clone(),
                changed.to_string(),
            ],
        );
        Ok(format!("{}{}", command, heredoc(old_addresses)?))
    }
}
