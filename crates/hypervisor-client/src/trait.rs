//! NetworkActuator trait for mocking
//!
//! This trait abstracts the hypervisor client so the IPAM engine can be
//! tested without live hosts. `HypervisorClient` implements it over HTTP and
//! `MockActuator` records calls in memory.

use crate::error::ActuatorError;
use crate::target::HostTarget;

/// Applies network changes on hypervisor hosts
///
/// Calls are synchronous from the caller's point of view: the future
/// resolves once the host agent reports success or failure. No retry is
/// performed here.
#[async_trait::async_trait]
pub trait NetworkActuator: Send + Sync {
    /// Run `command` on the hosts selected by `target`
    async fn execute(&self, target: &HostTarget, command: &str) -> Result<(), ActuatorError>;
}
