//! Legal operations per floating IP type

use crate::error::IpamError;
use ipam_store::{FloatingIp, FloatingIpType};
use std::fmt;
use tracing::warn;

/// Public floating IP operation, checked against the type before any write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatingIpOp {
    Attach,
    Detach,
    Update,
    Delete,
    Reserve,
}

impl fmt::Display for FloatingIpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FloatingIpOp::Attach => "attach",
            FloatingIpOp::Detach => "detach",
            FloatingIpOp::Update => "update",
            FloatingIpOp::Delete => "delete",
            FloatingIpOp::Reserve => "reserve",
        };
        f.write_str(name)
    }
}

/// What Detach does to a floating IP of a given type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachAction {
    /// Drop the row; nothing to reclaim
    DeleteRecord,
    /// Unlink without a remote call and degrade to `Floating`
    SoftDetach,
    /// Clear the remote NAT if linked, then unlink
    ClearLink,
}

/// Whether `op` is legal for `fip_type`
#[must_use]
pub fn allows(fip_type: FloatingIpType, op: FloatingIpOp) -> bool {
    use FloatingIpOp::*;
    match fip_type {
        FloatingIpType::Floating => true,
        FloatingIpType::Site => matches!(op, Attach | Detach | Update),
        FloatingIpType::Native => matches!(op, Detach),
        FloatingIpType::Reserved => matches!(op, Detach | Update),
        FloatingIpType::LoadBalancer => matches!(op, Detach | Update | Delete),
    }
}

#[must_use]
pub fn detach_action(fip_type: FloatingIpType) -> DetachAction {
    match fip_type {
        FloatingIpType::Native => DetachAction::DeleteRecord,
        FloatingIpType::Reserved => DetachAction::SoftDetach,
        FloatingIpType::Floating | FloatingIpType::Site | FloatingIpType::LoadBalancer => DetachAction::ClearLink,
    }
}

/// Reject `op` on `fip` unless its type allows it
pub fn require(fip: &FloatingIp, op: FloatingIpOp) -> Result<(), IpamError> {
    if allows(fip.fip_type, op) {
        return Ok(());
    }
    let error_msg = format!(
        "Can not {} floating IP {} of type {}",
        op, fip.ip_address, fip.fip_type
    );
    warn!("{}", error_msg);
    Err(IpamError::InvalidState(error_msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [FloatingIpType; 5] = [
        FloatingIpType::Floating,
        FloatingIpType::Site,
        FloatingIpType::Native,
        FloatingIpType::Reserved,
        FloatingIpType::LoadBalancer,
    ];

    #[test]
    fn test_only_floating_and_site_attach() {
        let attachable: Vec<_> = ALL_TYPES
            .into_iter()
            .filter(|t| allows(*t, FloatingIpOp::Attach))
            .collect();
        assert_eq!(attachable, vec![FloatingIpType::Floating, FloatingIpType::Site]);
    }

    #[test]
    fn test_only_floating_and_load_balancer_delete() {
        let deletable: Vec<_> = ALL_TYPES
            .into_iter()
            .filter(|t| allows(*t, FloatingIpOp::Delete))
            .collect();
        assert_eq!(deletable, vec![FloatingIpType::Floating, FloatingIpType::LoadBalancer]);
    }

    #[test]
    fn test_every_type_detaches() {
        assert!(ALL_TYPES.into_iter().all(|t| allows(t, FloatingIpOp::Detach)));
        assert_eq!(detach_action(FloatingIpType::Native), DetachAction::DeleteRecord);
        assert_eq!(detach_action(FloatingIpType::Reserved), DetachAction::SoftDetach);
        assert_eq!(detach_action(FloatingIpType::Site), DetachAction::ClearLink);
    }

    #[test]
    fn test_reserve_only_from_floating() {
        let reservable: Vec<_> = ALL_TYPES
            .into_iter()
            .filter(|t| allows(*t, FloatingIpOp::Reserve))
            .collect();
        assert_eq!(reservable, vec![FloatingIpType::Floating]);
    }
}
