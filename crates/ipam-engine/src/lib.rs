//! IPAM Engine
//!
//! Subnet, address-pool, interface and floating-IP allocation for a cloud
//! network. The engine is split the way its state is layered:
//!
//! - [`AddressPool`]: per-subnet address rows, idle counts, atomic claims
//! - [`SubnetAllocator`]: CIDR validation, VLAN/VNI tags, pool generation
//! - [`InterfaceBinder`]: primary/secondary addresses and site subnets of an interface
//! - [`FloatingIpManager`]: floating-IP lifecycle and its type state machine
//!
//! Every operation runs against an open [`IpamTx`]. The caller commits on
//! success and drops (or rolls back) the transaction on error, which undoes
//! every write of the operation. Remote effects go through a
//! [`NetworkActuator`] and cannot be undone; see
//! [`Ipam::attach_floating_ip`] for the commit-then-apply variant.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hypervisor_client::HypervisorClient;
//! use ipam_engine::{CreateSubnet, EngineConfig, Ipam, StaticMembership};
//! use ipam_store::{MemoryStore, SubnetType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let actuator = HypervisorClient::new("http://hyper-control:8080".to_string(), "token".to_string())?;
//! let ipam = Ipam::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(actuator),
//!     Arc::new(StaticMembership::admin(1)),
//!     EngineConfig::default(),
//! )?;
//!
//! let mut tx = ipam.begin().await?;
//! let subnet = ipam
//!     .subnets()
//!     .create(
//!         tx.as_mut(),
//!         &CreateSubnet {
//!             name: "public-1".to_string(),
//!             network: "203.0.113.0/24".to_string(),
//!             subnet_type: SubnetType::Public,
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! tx.commit().await?;
//! println!("subnet {} uses tag {}", subnet.name, subnet.vlan);
//! # Ok(())
//! # }
//! ```

pub mod address_pool;
pub mod commands;
pub mod config;
pub mod error;
pub mod floating_ip;
pub mod interface_binder;
pub mod net;
pub mod permission;
pub mod security;
pub mod subnet_allocator;

pub use address_pool::AddressPool;
pub use commands::{Commands, NicInfo, VrrpAddress, VrrpRole};
pub use config::{EngineConfig, TAG_MAX, TAG_MIN};
pub use error::{ErrorCode, IpamError};
pub use floating_ip::state::{DetachAction, FloatingIpOp};
pub use floating_ip::{AttachPlan, CreateFloatingIps, FloatingIpManager, FloatingIpUpdate, PublicIp};
pub use interface_binder::{
    AddressCheck, CreateInterface, DesiredAddresses, InterfaceBinder, InterfaceDetails, InterfaceOwner,
    InterfaceUpdate,
};
pub use permission::{Membership, Role, StaticMembership};
pub use security::{SecurityRuleManager, StoreSecurityRules};
pub use subnet_allocator::{CreateSubnet, SubnetAllocator, SubnetRange, SubnetUpdate};

use hypervisor_client::{HostTarget, NetworkActuator};
use ipam_store::{Instance, IpamStore, IpamTx};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Entry point holding the engine's collaborators
#[derive(Clone)]
pub struct Ipam {
    store: Arc<dyn IpamStore>,
    actuator: Arc<dyn NetworkActuator>,
    membership: Arc<dyn Membership>,
    security: Arc<dyn SecurityRuleManager>,
    config: EngineConfig,
    commands: Commands,
}

impl fmt::Debug for Ipam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ipam")
            .field("config", &self.config)
            .field("org_id", &self.membership.org_id())
            .finish_non_exhaustive()
    }
}

impl Ipam {
    /// Create an engine with store-backed security rules
    pub fn new(
        store: Arc<dyn IpamStore>,
        actuator: Arc<dyn NetworkActuator>,
        membership: Arc<dyn Membership>,
        config: EngineConfig,
    ) -> Result<Self, IpamError> {
        config.validate()?;
        let commands = Commands::new(config.script_dir.clone());
        Ok(Self {
            store,
            actuator,
            membership,
            security: Arc::new(StoreSecurityRules),
            config,
            commands,
        })
    }

    /// Replace the security-rule manager
    #[must_use]
    pub fn with_security_rules(mut self, security: Arc<dyn SecurityRuleManager>) -> Self {
        self.security = security;
        self
    }

    /// Same engine acting on behalf of another caller
    #[must_use]
    pub fn with_membership(&self, membership: Arc<dyn Membership>) -> Self {
        Self {
            membership,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    /// Open a transaction on the engine's store
    pub async fn begin(&self) -> Result<Box<dyn IpamTx>, IpamError> {
        Ok(self.store.begin().await?)
    }

    #[must_use]
    pub fn address_pool(&self) -> AddressPool<'_> {
        AddressPool::new(self)
    }

    #[must_use]
    pub fn subnets(&self) -> SubnetAllocator<'_> {
        SubnetAllocator::new(self)
    }

    #[must_use]
    pub fn interfaces(&self) -> InterfaceBinder<'_> {
        InterfaceBinder::new(self)
    }

    #[must_use]
    pub fn floating_ips(&self) -> FloatingIpManager<'_> {
        FloatingIpManager::new(self)
    }

    /// Attach in its own transaction, applying the NAT only after commit
    ///
    /// If the remote call fails the link stays committed and the error is
    /// returned; calling this again with the same arguments re-applies it.
    pub async fn attach_floating_ip(&self, floating_ip_id: u64, instance_id: u64) -> Result<AttachPlan, IpamError> {
        let mut tx = self.begin().await?;
        let plan = self.floating_ips().link(tx.as_mut(), floating_ip_id, instance_id).await?;
        tx.commit().await?;
        info!(
            "Linked floating IP {} to instance {}",
            plan.floating_ip.ip_address, instance_id
        );

        self.floating_ips().program(&plan).await?;
        Ok(plan)
    }

    pub(crate) fn membership(&self) -> &dyn Membership {
        self.membership.as_ref()
    }

    pub(crate) fn security(&self) -> &dyn SecurityRuleManager {
        self.security.as_ref()
    }

    /// Run one command on the hypervisor side
    pub(crate) async fn execute(&self, target: &HostTarget, command: &str) -> Result<(), IpamError> {
        debug!("Executing on {}: {}", target, command);
        self.actuator.execute(target, command).await.map_err(|e| {
            let error_msg = format!("Command execution on {} failed: {}", target, e);
            error!("{}", error_msg);
            IpamError::actuation(error_msg, e)
        })
    }
}

/// Host an instance runs on
pub(crate) fn instance_target(instance: &Instance) -> Result<HostTarget, IpamError> {
    match instance.hyper {
        Some(hyper) => Ok(HostTarget::Host(hyper)),
        None => {
            let error_msg = format!("Instance {} is not placed on any host", instance.id);
            error!("{}", error_msg);
            Err(IpamError::InvalidState(error_msg))
        }
    }
}
