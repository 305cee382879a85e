//! Store traits
//!
//! `IpamStore` opens transactions; `IpamTx` is the unit of work the engine
//! threads through every operation. Backends enforce the unique constraints
//! on subnet tag, subnet name and (subnet, address).

use crate::error::StoreError;
use crate::filters::*;
use crate::models::*;
use std::collections::BTreeSet;

/// Transactional store
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait IpamStore: Send + Sync {
    /// Open a new transaction
    async fn begin(&self) -> Result<Box<dyn IpamTx>, StoreError>;
}

/// One open transaction
///
/// Dropping a transaction without calling [`IpamTx::commit`] discards its
/// writes. Every method fails with [`StoreError::TransactionClosed`] once the
/// transaction has been committed or rolled back.
#[async_trait::async_trait]
pub trait IpamTx: Send {
    // Subnets
    async fn insert_subnet(&mut self, subnet: NewSubnet) -> Result<Subnet, StoreError>;
    async fn get_subnet(&mut self, id: u64) -> Result<Subnet, StoreError>;
    async fn list_subnets(&mut self, filter: &SubnetFilter) -> Result<Vec<Subnet>, StoreError>;
    async fn update_subnet(&mut self, subnet: &Subnet) -> Result<Subnet, StoreError>;
    async fn delete_subnet(&mut self, id: u64) -> Result<(), StoreError>;
    /// Tags of all existing subnets
    async fn used_tags(&mut self) -> Result<BTreeSet<u32>, StoreError>;

    // Addresses
    /// Insert a batch of address rows, returning how many were written
    async fn insert_addresses(&mut self, rows: Vec<NewAddress>) -> Result<usize, StoreError>;
    async fn get_address(&mut self, id: u64) -> Result<Address, StoreError>;
    async fn list_addresses(&mut self, filter: &AddressFilter) -> Result<Vec<Address>, StoreError>;
    /// Count free, unreserved rows of a subnet other than `gateway`
    async fn count_idle(&mut self, subnet_id: u64, gateway: &str) -> Result<u64, StoreError>;
    /// Atomically claim one free address, `None` when nothing matches
    async fn claim_address(&mut self, claim: &AddressClaim) -> Result<Option<Address>, StoreError>;
    async fn update_address(&mut self, address: &Address) -> Result<Address, StoreError>;
    /// Clear allocation and binding fields; releasing a free row is a no-op
    async fn release_address(&mut self, id: u64) -> Result<Address, StoreError>;
    /// Delete every address row of a subnet
    async fn delete_addresses(&mut self, subnet_id: u64) -> Result<usize, StoreError>;

    // Interfaces
    async fn insert_interface(&mut self, iface: NewInterface) -> Result<Interface, StoreError>;
    async fn get_interface(&mut self, id: u64) -> Result<Interface, StoreError>;
    async fn list_interfaces(&mut self, filter: &InterfaceFilter) -> Result<Vec<Interface>, StoreError>;
    async fn update_interface(&mut self, iface: &Interface) -> Result<Interface, StoreError>;
    async fn delete_interface(&mut self, id: u64) -> Result<(), StoreError>;

    // Floating IPs
    async fn insert_floating_ip(&mut self, fip: NewFloatingIp) -> Result<FloatingIp, StoreError>;
    async fn get_floating_ip(&mut self, id: u64) -> Result<FloatingIp, StoreError>;
    /// Read a floating IP for update, serializing writers of the same row
    async fn lock_floating_ip(&mut self, id: u64) -> Result<FloatingIp, StoreError>;
    async fn list_floating_ips(&mut self, filter: &FloatingIpFilter) -> Result<Vec<FloatingIp>, StoreError>;
    async fn update_floating_ip(&mut self, fip: &FloatingIp) -> Result<FloatingIp, StoreError>;
    async fn delete_floating_ip(&mut self, id: u64) -> Result<(), StoreError>;

    // Referenced entities
    async fn get_instance(&mut self, id: u64) -> Result<Instance, StoreError>;
    async fn get_router(&mut self, id: u64) -> Result<Router, StoreError>;
    async fn get_load_balancer(&mut self, id: u64) -> Result<LoadBalancer, StoreError>;

    // Security rules
    async fn insert_security_rule(&mut self, rule: NewSecurityRule) -> Result<SecurityRule, StoreError>;
    async fn list_security_rules(&mut self, security_group_id: u64) -> Result<Vec<SecurityRule>, StoreError>;

    /// Publish all writes
    async fn commit(&mut self) -> Result<(), StoreError>;
    /// Discard all writes
    async fn rollback(&mut self) -> Result<(), StoreError>;
}
