//! Permission and ownership checks.
//!
//! The engine does not model users or organizations. It asks a
//! [`Membership`] supplied by the caller before every mutating operation.

use crate::error::IpamError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Role of the caller within its organization, in increasing privilege
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Owner,
    Admin,
}

/// Caller identity as seen by the engine
pub trait Membership: Send + Sync {
    /// Organization new rows are owned by
    fn org_id(&self) -> u64;
    /// Whether the caller holds at least `role`
    fn check_permission(&self, role: Role) -> bool;
    /// Whether the caller holds `role` over rows owned by `owner`
    fn validate_owner(&self, role: Role, owner: u64) -> bool;
}

/// Fixed role in a fixed organization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMembership {
    pub org_id: u64,
    pub role: Role,
}

impl StaticMembership {
    /// Admin of `org_id`
    #[must_use]
    pub fn admin(org_id: u64) -> Self {
        Self { org_id, role: Role::Admin }
    }

    /// Writer in `org_id`
    #[must_use]
    pub fn writer(org_id: u64) -> Self {
        Self { org_id, role: Role::Writer }
    }

    /// Reader in `org_id`
    #[must_use]
    pub fn reader(org_id: u64) -> Self {
        Self { org_id, role: Role::Reader }
    }
}

impl Membership for StaticMembership {
    fn org_id(&self) -> u64 {
        self.org_id
    }

    fn check_permission(&self, role: Role) -> bool {
        self.role >= role
    }

    fn validate_owner(&self, role: Role, owner: u64) -> bool {
        // admins act across organizations
        self.role >= role && (self.role == Role::Admin || owner == self.org_id)
    }
}

pub(crate) fn require_permission(membership: &dyn Membership, role: Role, action: &str) -> Result<(), IpamError> {
    if membership.check_permission(role) {
        return Ok(());
    }
    let error_msg = format!("{:?} role required to {}", role, action);
    warn!("{}", error_msg);
    Err(IpamError::PermissionDenied(error_msg))
}

pub(crate) fn require_owner(membership: &dyn Membership, role: Role, owner: u64, action: &str) -> Result<(), IpamError> {
    if membership.validate_owner(role, owner) {
        return Ok(());
    }
    let error_msg = format!("{:?} role over organization {} required to {}", role, owner, action);
    warn!("{}", error_msg);
    Err(IpamError::PermissionDenied(error_msg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        let writer = StaticMembership::writer(1);
        assert!(writer.check_permission(Role::Reader));
        assert!(writer.check_permission(Role::Writer));
        assert!(!writer.check_permission(Role::Admin));
    }

    #[test]
    fn test_owner_validation() {
        let writer = StaticMembership::writer(1);
        assert!(writer.validate_owner(Role::Writer, 1));
        assert!(!writer.validate_owner(Role::Writer, 2));
        assert!(StaticMembership::admin(9).validate_owner(Role::Writer, 2));
        assert!(!StaticMembership::reader(1).validate_owner(Role::Writer, 1));
    }

    #[test]
    fn test_require_permission_error() {
        let err = require_permission(&StaticMembership::reader(1), Role::Writer, "create subnet").unwrap_err();
        assert!(matches!(err, IpamError::PermissionDenied(_)));
    }
}
