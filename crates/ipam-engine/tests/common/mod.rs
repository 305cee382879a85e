//! Shared fixture for engine tests: an in-memory store seeded with a router,
//! a VPC instance, a classic instance and a load balancer, and a recording
//! actuator.

#![allow(dead_code)]

use hypervisor_client::MockActuator;
use ipam_engine::{CreateInterface, CreateSubnet, EngineConfig, InterfaceOwner, Ipam, StaticMembership};
use ipam_store::{
    Instance, InstanceStatus, Interface, IpamStore, LoadBalancer, LoadBalancerStatus, MemoryStore, Router, Subnet,
    SubnetType, VrrpEndpoint,
};
use std::sync::Arc;

pub const ORG: u64 = 1;
pub const ROUTER: u64 = 9001;
pub const SECURITY_GROUP: u64 = 77;
pub const VPC_INSTANCE: u64 = 9101;
pub const CLASSIC_INSTANCE: u64 = 9102;
pub const PENDING_INSTANCE: u64 = 9103;
pub const LOAD_BALANCER: u64 = 9201;

pub struct Fixture {
    pub ipam: Ipam,
    pub store: Arc<MemoryStore>,
    pub actuator: Arc<MockActuator>,
}

pub async fn fixture() -> Fixture {
    fixture_with(EngineConfig::default()).await
}

pub async fn fixture_with(config: EngineConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    store
        .add_router(Router {
            id: ROUTER,
            name: "router-a".to_string(),
            owner: ORG,
            hyper: Some(1),
            peer: Some(2),
            default_security_group: Some(SECURITY_GROUP),
        })
        .await;
    for (id, hostname, status, router_id, hyper) in [
        (VPC_INSTANCE, "vpc-vm", InstanceStatus::Running, Some(ROUTER), Some(3)),
        (CLASSIC_INSTANCE, "classic-vm", InstanceStatus::Running, None, Some(4)),
        (PENDING_INSTANCE, "pending-vm", InstanceStatus::Pending, Some(ROUTER), Some(3)),
    ] {
        store
            .add_instance(Instance {
                id,
                hostname: hostname.to_string(),
                owner: ORG,
                status,
                router_id,
                hyper,
                os_code: "linux".to_string(),
            })
            .await;
    }
    store
        .add_load_balancer(LoadBalancer {
            id: LOAD_BALANCER,
            name: "lb-a".to_string(),
            owner: ORG,
            status: LoadBalancerStatus::Available,
            router_id: ROUTER,
            vrrp_instance_id: 12,
            vrrp_vlan: 4300,
            hyper_group: "group-vrrp-12".to_string(),
            primary: VrrpEndpoint {
                hyper: Some(5),
                mac: "52:54:00:00:05:01".to_string(),
                address: "192.168.250.2/24".to_string(),
            },
            backup: VrrpEndpoint {
                hyper: Some(6),
                mac: "52:54:00:00:06:01".to_string(),
                address: "192.168.250.3/24".to_string(),
            },
        })
        .await;

    let actuator = Arc::new(MockActuator::new());
    let ipam = Ipam::new(
        store.clone(),
        actuator.clone(),
        Arc::new(StaticMembership::admin(ORG)),
        config,
    )
    .unwrap();
    Fixture { ipam, store, actuator }
}

/// Create and commit a subnet
pub async fn subnet(ipam: &Ipam, params: CreateSubnet) -> Subnet {
    let mut tx = ipam.begin().await.unwrap();
    let subnet = ipam.subnets().create(tx.as_mut(), &params).await.unwrap();
    tx.commit().await.unwrap();
    subnet
}

pub fn public_params(name: &str, network: &str) -> CreateSubnet {
    CreateSubnet {
        name: name.to_string(),
        network: network.to_string(),
        subnet_type: SubnetType::Public,
        ..Default::default()
    }
}

pub fn vpc_params(name: &str, network: &str) -> CreateSubnet {
    CreateSubnet {
        name: name.to_string(),
        network: network.to_string(),
        subnet_type: SubnetType::Internal,
        router_id: Some(ROUTER),
        ..Default::default()
    }
}

/// Give an instance a NIC in `subnet` and commit
pub async fn nic(ipam: &Ipam, instance_id: u64, subnet: &Subnet) -> Interface {
    let mut tx = ipam.begin().await.unwrap();
    let (iface, _) = ipam
        .interfaces()
        .create_interface(
            tx.as_mut(),
            InterfaceOwner::Instance(instance_id),
            std::slice::from_ref(subnet),
            &CreateInterface {
                security_groups: vec![SECURITY_GROUP],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
    iface
}

pub async fn idle(ipam: &Ipam, subnet_id: u64) -> u64 {
    let mut tx = ipam.begin().await.unwrap();
    ipam.subnets().count_idle_addresses(tx.as_mut(), subnet_id).await.unwrap()
}

/// Open a read transaction directly on the store
pub async fn read(store: &MemoryStore) -> Box<dyn ipam_store::IpamTx> {
    store.begin().await.unwrap()
}
