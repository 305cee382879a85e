//! In-memory IPAM store
//!
//! Reference implementation of [`IpamStore`] that keeps every table in
//! memory. It backs the engine's tests and the reconciliation controller,
//! which loads and saves it as a JSON snapshot.
//!
//! Transactions are serializable: `begin` takes an exclusive lock on the
//! state and hands the transaction a private working copy; `commit` swaps the
//! copy in, `rollback` (or drop) throws it away.
//!
//! The store is organized into domain-specific modules:
//! - `subnets.rs` - subnets and tag uniqueness
//! - `addresses.rs` - address rows and the atomic claim
//! - `interfaces.rs` - interfaces
//! - `floating_ips.rs` - floating IPs
//! - `references.rs` - instances, routers, load balancers, security rules

mod addresses;
mod floating_ips;
mod interfaces;
mod references;
mod subnets;

use crate::error::StoreError;
use crate::filters::*;
use crate::models::*;
use crate::store_trait::{IpamStore, IpamTx};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Every table of the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub(crate) subnets: BTreeMap<u64, Subnet>,
    pub(crate) addresses: BTreeMap<u64, Address>,
    pub(crate) interfaces: BTreeMap<u64, Interface>,
    pub(crate) floating_ips: BTreeMap<u64, FloatingIp>,
    pub(crate) instances: BTreeMap<u64, Instance>,
    pub(crate) routers: BTreeMap<u64, Router>,
    pub(crate) load_balancers: BTreeMap<u64, LoadBalancer>,
    pub(crate) security_rules: BTreeMap<u64, SecurityRule>,
    // Counter for generating IDs
    pub(crate) next_id: u64,
}

impl StoreState {
    /// Generate next ID
    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from a JSON snapshot
    pub fn from_snapshot(json: &str) -> Result<Self, StoreError> {
        let state: StoreState = serde_json::from_str(json)?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Serialize the committed state as JSON
    pub async fn snapshot(&self) -> Result<String, StoreError> {
        let state = self.state.lock().await;
        Ok(serde_json::to_string_pretty(&*state)?)
    }

    /// Add an instance to the store (for setup)
    pub async fn add_instance(&self, instance: Instance) {
        self.state.lock().await.instances.insert(instance.id, instance);
    }

    /// Add a router to the store (for setup)
    pub async fn add_router(&self, router: Router) {
        self.state.lock().await.routers.insert(router.id, router);
    }

    /// Add a load balancer to the store (for setup)
    pub async fn add_load_balancer(&self, load_balancer: LoadBalancer) {
        self.state
            .lock()
            .await
            .load_balancers
            .insert(load_balancer.id, load_balancer);
    }
}

#[async_trait::async_trait]
impl IpamStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn IpamTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        debug!("Opened in-memory transaction");
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            working,
        }))
    }
}

/// Transaction on a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<StoreState>>,
    working: StoreState,
}

impl MemoryTx {
    fn state(&mut self) -> Result<&mut StoreState, StoreError> {
        if self.guard.is_none() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(&mut self.working)
    }
}

#[async_trait::async_trait]
impl IpamTx for MemoryTx {
    async fn insert_subnet(&mut self, subnet: NewSubnet) -> Result<Subnet, StoreError> {
        subnets::insert_subnet(self.state()?, subnet)
    }

    async fn get_subnet(&mut self, id: u64) -> Result<Subnet, StoreError> {
        subnets::get_subnet(self.state()?, id)
    }

    async fn list_subnets(&mut self, filter: &SubnetFilter) -> Result<Vec<Subnet>, StoreError> {
        Ok(subnets::list_subnets(self.state()?, filter))
    }

    async fn update_subnet(&mut self, subnet: &Subnet) -> Result<Subnet, StoreError> {
        subnets::update_subnet(self.state()?, subnet)
    }

    async fn delete_subnet(&mut self, id: u64) -> Result<(), StoreError> {
        subnets::delete_subnet(self.state()?, id)
    }

    async fn used_tags(&mut self) -> Result<BTreeSet<u32>, StoreError> {
        Ok(subnets::used_tags(self.state()?))
    }

    async fn insert_addresses(&mut self, rows: Vec<NewAddress>) -> Result<usize, StoreError> {
        addresses::insert_addresses(self.state()?, rows)
    }

    async fn get_address(&mut self, id: u64) -> Result<Address, StoreError> {
        addresses::get_address(self.state()?, id)
    }

    async fn list_addresses(&mut self, filter: &AddressFilter) -> Result<Vec<Address>, StoreError> {
        Ok(addresses::list_addresses(self.state()?, filter))
    }

    async fn count_idle(&mut self, subnet_id: u64, gateway: &str) -> Result<u64, StoreError> {
        Ok(addresses::count_idle(self.state()?, subnet_id, gateway))
    }

    async fn claim_address(&mut self, claim: &AddressClaim) -> Result<Option<Address>, StoreError> {
        Ok(addresses::claim_address(self.state()?, claim))
    }

    async fn update_address(&mut self, address: &Address) -> Result<Address, StoreError> {
        addresses::update_address(self.state()?, address)
    }

    async fn release_address(&mut self, id: u64) -> Result<Address, StoreError> {
        addresses::release_address(self.state()?, id)
    }

    async fn delete_addresses(&mut self, subnet_id: u64) -> Result<usize, StoreError> {
        Ok(addresses::delete_addresses(self.state()?, subnet_id))
    }

    async fn insert_interface(&mut self, iface: NewInterface) -> Result<Interface, StoreError> {
        Ok(interfaces::insert_interface(self.state()?, iface))
    }

    async fn get_interface(&mut self, id: u64) -> Result<Interface, StoreError> {
        interfaces::get_interface(self.state()?, id)
    }

    async fn list_interfaces(&mut self, filter: &InterfaceFilter) -> Result<Vec<Interface>, StoreError> {
        Ok(interfaces::list_interfaces(self.state()?, filter))
    }

    async fn update_interface(&mut self, iface: &Interface) -> Result<Interface, StoreError> {
        interfaces::update_interface(self.state()?, iface)
    }

    async fn delete_interface(&mut self, id: u64) -> Result<(), StoreError> {
        interfaces::delete_interface(self.state()?, id)
    }

    async fn insert_floating_ip(&mut self, fip: NewFloatingIp) -> Result<FloatingIp, StoreError> {
        Ok(floating_ips::insert_floating_ip(self.state()?, fip))
    }

    async fn get_floating_ip(&mut self, id: u64) -> Result<FloatingIp, StoreError> {
        floating_ips::get_floating_ip(self.state()?, id)
    }

    async fn lock_floating_ip(&mut self, id: u64) -> Result<FloatingIp, StoreError> {
        // The whole transaction already holds the store lock
        floating_ips::get_floating_ip(self.state()?, id)
    }

    async fn list_floating_ips(&mut self, filter: &FloatingIpFilter) -> Result<Vec<FloatingIp>, StoreError> {
        Ok(floating_ips::list_floating_ips(self.state()?, filter))
    }

    async fn update_floating_ip(&mut self, fip: &FloatingIp) -> Result<FloatingIp, StoreError> {
        floating_ips::update_floating_ip(self.state()?, fip)
    }

    async fn delete_floating_ip(&mut self, id: u64) -> Result<(), StoreError> {
        floating_ips::delete_floating_ip(self.state()?, id)
    }

    async fn get_instance(&mut self, id: u64) -> Result<Instance, StoreError> {
        references::get_instance(self.state()?, id)
    }

    async fn get_router(&mut self, id: u64) -> Result<Router, StoreError> {
        references::get_router(self.state()?, id)
    }

    async fn get_load_balancer(&mut self, id: u64) -> Result<LoadBalancer, StoreError> {
        references::get_load_balancer(self.state()?, id)
    }

    async fn insert_security_rule(&mut self, rule: NewSecurityRule) -> Result<SecurityRule, StoreError> {
        Ok(references::insert_security_rule(self.state()?, rule))
    }

    async fn list_security_rules(&mut self, security_group_id: u64) -> Result<Vec<SecurityRule>, StoreError> {
        Ok(references::list_security_rules(self.state()?, security_group_id))
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        *guard = std::mem::take(&mut self.working);
        debug!("Committed in-memory transaction");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.guard.take().ok_or(StoreError::TransactionClosed)?;
        self.working = StoreState::default();
        debug!("Rolled back in-memory transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_subnet(name: &str, vlan: u32) -> NewSubnet {
        NewSubnet {
            name: name.to_string(),
            owner: 1,
            network: "10.0.0.0/28".to_string(),
            netmask: "255.255.255.240".to_string(),
            gateway: "10.0.0.1/28".to_string(),
            start: "10.0.0.2".to_string(),
            end: "10.0.0.14".to_string(),
            vlan,
            subnet_type: SubnetType::Internal,
            router_id: None,
            group_id: None,
            dhcp: false,
            dns: String::new(),
            domain: String::new(),
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_subnet(new_subnet("a", 5000)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let subnets = tx.list_subnets(&SubnetFilter::default()).await.unwrap();
        assert_eq!(subnets.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_subnet(new_subnet("a", 5000)).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_subnet(new_subnet("b", 5001)).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.used_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_transaction_rejects_calls() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
        let result = tx.get_subnet(1).await;
        assert!(matches!(result, Err(StoreError::TransactionClosed)));
        assert!(matches!(tx.commit().await, Err(StoreError::TransactionClosed)));
    }

    #[tokio::test]
    async fn test_snapshot_restores_state() {
        let store = MemoryStore::new();
        store
            .add_router(Router {
                id: 7,
                name: "r1".to_string(),
                owner: 1,
                hyper: Some(1),
                peer: None,
                default_security_group: Some(3),
            })
            .await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_subnet(new_subnet("a", 5000)).await.unwrap();
        tx.commit().await.unwrap();

        let json = store.snapshot().await.unwrap();
        let restored = MemoryStore::from_snapshot(&json).unwrap();
        let mut tx = restored.begin().await.unwrap();
        assert_eq!(tx.get_router(7).await.unwrap().name, "r1");
        assert!(tx.used_tags().await.unwrap().contains(&5000));

        // ids keep counting from the restored value
        let second = tx.insert_subnet(new_subnet("b", 5001)).await.unwrap();
        assert!(second.id > 1);
    }
}
