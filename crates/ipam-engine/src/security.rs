//! Security-rule manager.

use crate::error::IpamError;
use ipam_store::{IpamTx, NewSecurityRule, Protocol, RuleDirection, SecurityRule};
use tracing::debug;

/// Creates security rules scoped to a CIDR
///
/// Rules are written through the caller's transaction so they roll back
/// together with the subnet that needed them.
#[async_trait::async_trait]
pub trait SecurityRuleManager: Send + Sync {
    /// Allow inbound traffic from `remote_cidr` on a port range
    async fn allow_ingress(
        &self,
        tx: &mut dyn IpamTx,
        security_group: u64,
        remote_cidr: &str,
        protocol: Protocol,
        ports: (u16, u16),
    ) -> Result<SecurityRule, IpamError>;
}

/// Rule manager backed by the IPAM store
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreSecurityRules;

#[async_trait::async_trait]
impl SecurityRuleManager for StoreSecurityRules {
    async fn allow_ingress(
        &self,
        tx: &mut dyn IpamTx,
        security_group: u64,
        remote_cidr: &str,
        protocol: Protocol,
        ports: (u16, u16),
    ) -> Result<SecurityRule, IpamError> {
        let (port_min, port_max) = ports;
        if port_min > port_max {
            return Err(IpamError::InvalidParameter(format!(
                "port range {}-{} is inverted",
                port_min, port_max
            )));
        }
        debug!(
            "Allowing ingress {:?} {}-{} from {} on security group {}",
            protocol, port_min, port_max, remote_cidr, security_group
        );
        let rule = tx
            .insert_security_rule(NewSecurityRule {
                security_group_id: security_group,
                direction: RuleDirection::Ingress,
                protocol,
                remote_cidr: remote_cidr.to_string(),
                port_min,
                port_max,
            })
            .await?;
        Ok(rule)
    }
}
