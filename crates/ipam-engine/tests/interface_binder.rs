mod common;

use common::*;
use ipam_engine::{
    CreateInterface, CreateSubnet, DesiredAddresses, EngineConfig, InterfaceOwner, InterfaceUpdate, IpamError,
};
use ipam_store::{AddressFilter, FloatingIpFilter, FloatingIpType, InterfaceFilter, Subnet, SubnetType};

fn tiny_vpc(name: &str, network: &str, ip: &str) -> CreateSubnet {
    CreateSubnet {
        start: Some(ip.to_string()),
        end: Some(ip.to_string()),
        ..vpc_params(name, network)
    }
}

async fn try_nic(f: &Fixture, owner: InterfaceOwner, candidates: &[Subnet], params: CreateInterface) -> Result<ipam_store::Interface, IpamError> {
    let mut tx = f.ipam.begin().await.unwrap();
    let (iface, _) = f
        .ipam
        .interfaces()
        .create_interface(tx.as_mut(), owner, candidates, &params)
        .await?;
    tx.commit().await.unwrap();
    Ok(iface)
}

#[tokio::test]
async fn test_candidates_tried_in_order() {
    let f = fixture().await;
    let small = subnet(&f.ipam, tiny_vpc("vpc-small", "192.168.10.0/29", "192.168.10.2")).await;
    let large = subnet(&f.ipam, vpc_params("vpc-large", "192.168.11.0/28")).await;
    let candidates = vec![small.clone(), large.clone()];

    let owner = InterfaceOwner::Instance(VPC_INSTANCE);
    let eth0 = try_nic(&f, owner, &candidates, CreateInterface::default()).await.unwrap();
    assert_eq!(eth0.subnet_id, small.id);
    assert_eq!(eth0.name, "eth0");
    assert!(eth0.primary_if);
    assert_eq!(eth0.mtu, 1450);
    assert!(eth0.mac.starts_with("52:54:"));

    let eth1 = try_nic(&f, owner, &candidates, CreateInterface::default()).await.unwrap();
    assert_eq!(eth1.subnet_id, large.id);
    assert_eq!(eth1.name, "eth1");

    // the miss on the small subnet left no interface behind
    let mut tx = read(&f.store).await;
    let ifaces = tx
        .list_interfaces(&InterfaceFilter {
            instance_id: Some(VPC_INSTANCE),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(ifaces.len(), 2);
}

#[tokio::test]
async fn test_exhausted_candidates_fail_with_capacity() {
    let f = fixture().await;
    let small = subnet(&f.ipam, tiny_vpc("vpc-small", "192.168.10.0/29", "192.168.10.2")).await;
    let owner = InterfaceOwner::Instance(VPC_INSTANCE);
    try_nic(&f, owner, std::slice::from_ref(&small), CreateInterface::default()).await.unwrap();
    let err = try_nic(&f, owner, std::slice::from_ref(&small), CreateInterface::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IpamError::InsufficientCapacity(_)));
}

#[tokio::test]
async fn test_instance_nic_rules() {
    let f = fixture().await;
    let site = subnet(
        &f.ipam,
        CreateSubnet {
            subnet_type: SubnetType::Site,
            ..public_params("site-a", "172.16.0.0/29")
        },
    )
    .await;
    let public = subnet(&f.ipam, public_params("pub-a", "10.2.0.0/28")).await;
    let vpc = subnet(&f.ipam, vpc_params("vpc-a", "192.168.10.0/28")).await;

    let err = try_nic(&f, InterfaceOwner::Instance(CLASSIC_INSTANCE), &[site], CreateInterface::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IpamError::InvalidParameter(_)));

    // VPC instance must stay on its router
    let err = try_nic(&f, InterfaceOwner::Instance(VPC_INSTANCE), &[vpc.clone(), public], CreateInterface::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IpamError::InvalidParameter(_)));

    let err = try_nic(
        &f,
        InterfaceOwner::Instance(VPC_INSTANCE),
        std::slice::from_ref(&vpc),
        CreateInterface {
            mac: Some("not-a-mac".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IpamError::InvalidParameter(_)));

    let err = try_nic(
        &f,
        InterfaceOwner::Instance(VPC_INSTANCE),
        std::slice::from_ref(&vpc),
        CreateInterface {
            inbound: 1_000_000,
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IpamError::InvalidParameter(_)));

    let iface = try_nic(
        &f,
        InterfaceOwner::Instance(VPC_INSTANCE),
        std::slice::from_ref(&vpc),
        CreateInterface {
            mac: Some("52:54:aa:bb:cc:dd".to_string()),
            address: Some("192.168.10.9".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(iface.mac, "52:54:aa:bb:cc:dd");
    let mut tx = f.ipam.begin().await.unwrap();
    let details = f.ipam.interfaces().details(tx.as_mut(), iface.id).await.unwrap();
    assert_eq!(details.address.address, "192.168.10.9/28");
    assert_eq!(details.subnet.id, vpc.id);
}

#[tokio::test]
async fn test_interface_cap_per_instance() {
    let config = EngineConfig {
        max_instance_interfaces: 2,
        ..EngineConfig::default()
    };
    let f = fixture_with(config).await;
    let vpc = subnet(&f.ipam, vpc_params("vpc-a", "192.168.10.0/28")).await;
    nic(&f.ipam, VPC_INSTANCE, &vpc).await;
    nic(&f.ipam, VPC_INSTANCE, &vpc).await;
    let err = try_nic(&f, InterfaceOwner::Instance(VPC_INSTANCE), &[vpc], CreateInterface::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IpamError::InvalidParameter(_)));
}

#[tokio::test]
async fn test_public_nic_gets_native_shadow() {
    let f = fixture().await;
    let public_a = subnet(&f.ipam, public_params("pub-a", "10.2.0.0/28")).await;
    let public_b = subnet(&f.ipam, public_params("pub-b", "10.2.1.0/28")).await;
    nic(&f.ipam, CLASSIC_INSTANCE, &public_a).await;
    let eth1 = nic(&f.ipam, CLASSIC_INSTANCE, &public_b).await;

    let native = FloatingIpFilter {
        fip_type: Some(FloatingIpType::Native),
        instance_id: Some(CLASSIC_INSTANCE),
        ..Default::default()
    };
    let mut tx = f.ipam.begin().await.unwrap();
    let shadows = tx.list_floating_ips(&native).await.unwrap();
    assert_eq!(shadows.len(), 2);
    assert!(shadows.iter().any(|s| s.fip_address == "10.2.0.2/28"));
    assert!(shadows.iter().all(|s| s.interface_id.is_none()));

    f.ipam.interfaces().delete_interface(tx.as_mut(), eth1.id).await.unwrap();
    let shadows = tx.list_floating_ips(&native).await.unwrap();
    assert_eq!(shadows.len(), 1);
    assert_eq!(shadows[0].subnet_id, Some(public_a.id));
    tx.commit().await.unwrap();
    assert_eq!(idle(&f.ipam, public_b.id).await, 13);
}

#[tokio::test]
async fn test_primary_interface_can_not_be_deleted() {
    let f = fixture().await;
    let vpc = subnet(&f.ipam, vpc_params("vpc-a", "192.168.10.0/28")).await;
    let eth0 = nic(&f.ipam, VPC_INSTANCE, &vpc).await;
    let mut tx = f.ipam.begin().await.unwrap();
    let err = f.ipam.interfaces().delete_interface(tx.as_mut(), eth0.id).await.unwrap_err();
    assert!(matches!(err, IpamError::InvalidState(_)));
}

#[tokio::test]
async fn test_update_grows_and_shrinks_secondaries() {
    let f = fixture().await;
    let vpc = subnet(&f.ipam, vpc_params("vpc-a", "192.168.10.0/28")).await;
    let eth0 = nic(&f.ipam, VPC_INSTANCE, &vpc).await;
    let mut update = InterfaceUpdate {
        name: None,
        inbound: 100,
        outbound: 100,
        allow_spoofing: false,
        security_groups: vec![SECURITY_GROUP],
        addresses: DesiredAddresses {
            subnets: vec![vpc.clone()],
            secondary_count: 2,
            ..Default::default()
        },
    };

    let mut tx = f.ipam.begin().await.unwrap();
    let grown = f
        .ipam
        .interfaces()
        .update(tx.as_mut(), VPC_INSTANCE, eth0.id, &update)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(grown.secondary.len(), 2);
    assert_eq!(grown.interface.inbound, 100);
    assert_eq!(f.actuator.count_containing("sync_nic_info.sh"), 1);
    let clears: Vec<_> = f
        .actuator
        .executed()
        .into_iter()
        .filter(|c| c.command.contains("clear_second_ips.sh"))
        .collect();
    assert_eq!(clears.len(), 1);
    assert_eq!(clears[0].target.to_string(), "inter=3");
    assert!(clears[0].command.ends_with("'true'<<EOF\n[]\nEOF"));

    update.addresses.secondary_count = 1;
    let mut tx = f.ipam.begin().await.unwrap();
    let shrunk = f
        .ipam
        .interfaces()
        .update(tx.as_mut(), VPC_INSTANCE, eth0.id, &update)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(shrunk.secondary.len(), 1);
    assert_eq!(shrunk.secondary[0].id, grown.secondary[0].id);
    // bandwidth unchanged: no second sync
    assert_eq!(f.actuator.count_containing("sync_nic_info.sh"), 1);
    assert_eq!(f.actuator.count_containing("clear_second_ips.sh"), 2);

    let mut tx = read(&f.store).await;
    let dropped = tx.get_address(grown.secondary[1].id).await.unwrap();
    assert!(!dropped.allocated);
}

#[tokio::test]
async fn test_update_rejects_foreign_tags_and_empty_groups() {
    let f = fixture().await;
    let vpc = subnet(&f.ipam, vpc_params("vpc-a", "192.168.10.0/28")).await;
    let other = subnet(&f.ipam, vpc_params("vpc-b", "192.168.11.0/28")).await;
    let eth0 = nic(&f.ipam, VPC_INSTANCE, &vpc).await;

    let mut update = InterfaceUpdate {
        security_groups: vec![SECURITY_GROUP],
        addresses: DesiredAddresses {
            subnets: vec![other],
            secondary_count: 1,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut tx = f.ipam.begin().await.unwrap();
    let err = f
        .ipam
        .interfaces()
        .update(tx.as_mut(), VPC_INSTANCE, eth0.id, &update)
        .await
        .unwrap_err();
    assert!(matches!(err, IpamError::InvalidParameter(_)));

    update.security_groups.clear();
    let err = f
        .ipam
        .interfaces()
        .update(tx.as_mut(), VPC_INSTANCE, eth0.id, &update)
        .await
        .unwrap_err();
    assert!(matches!(err, IpamError::InvalidParameter(_)));
}

#[tokio::test]
async fn test_secondary_shortfall_reports_count() {
    let f = fixture().await;
    let vpc = subnet(&f.ipam, vpc_params("vpc-a", "192.168.10.0/28")).await;
    let tiny = subnet(&f.ipam, tiny_vpc("vpc-tiny", "192.168.11.0/29", "192.168.11.2")).await;
    let eth0 = nic(&f.ipam, VPC_INSTANCE, &vpc).await;

    let mut tx = f.ipam.begin().await.unwrap();
    let instance = tx.get_instance(VPC_INSTANCE).await.unwrap();
    let err = f
        .ipam
        .interfaces()
        .allocate_secondary_addresses(tx.as_mut(), &instance, &eth0, &[tiny], 2)
        .await
        .unwrap_err();
    match err {
        IpamError::InsufficientCapacity(msg) => assert_eq!(msg, "Only 1 addresses can be allocated"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_change_addresses_rebinds_site_subnets() {
    let f = fixture().await;
    let vpc = subnet(&f.ipam, vpc_params("vpc-a", "192.168.10.0/28")).await;
    let site = subnet(
        &f.ipam,
        CreateSubnet {
            subnet_type: SubnetType::Site,
            ..public_params("site-a", "172.16.0.0/29")
        },
    )
    .await;
    let eth0 = nic(&f.ipam, VPC_INSTANCE, &vpc).await;

    let mut tx = f.ipam.begin().await.unwrap();
    let instance = tx.get_instance(VPC_INSTANCE).await.unwrap();
    let mut desired = DesiredAddresses {
        subnets: vec![vpc.clone()],
        site_subnets: vec![site.clone()],
        ..Default::default()
    };
    let details = f
        .ipam
        .interfaces()
        .change_addresses(tx.as_mut(), &instance, eth0.id, &desired)
        .await
        .unwrap();
    assert_eq!(details.site_subnets.len(), 1);
    assert_eq!(tx.get_subnet(site.id).await.unwrap().interface_id, Some(eth0.id));

    desired.site_subnets.clear();
    let details = f
        .ipam
        .interfaces()
        .change_addresses(tx.as_mut(), &instance, eth0.id, &desired)
        .await
        .unwrap();
    assert!(details.site_subnets.is_empty());
    assert_eq!(tx.get_subnet(site.id).await.unwrap().interface_id, None);

    let bound = tx
        .list_addresses(&AddressFilter {
            second_interface_id: Some(eth0.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(bound.is_empty());
}

#[tokio::test]
async fn test_named_address_can_not_take_the_gateway() {
    let f = fixture().await;
    let public = subnet(&f.ipam, public_params("pub-x", "10.9.0.0/28")).await;
    let err = try_nic(
        &f,
        InterfaceOwner::Instance(CLASSIC_INSTANCE),
        std::slice::from_ref(&public),
        CreateInterface {
            address: Some("10.9.0.1".to_string()),
            security_groups: vec![SECURITY_GROUP],
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IpamError::InsufficientCapacity(_)));
    assert_eq!(idle(&f.ipam, public.id).await, 13);

    let mut tx = read(&f.store).await;
    let gateway = tx
        .list_addresses(&AddressFilter {
            subnet_id: Some(public.id),
            ..Default::default()
        })
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.address == "10.9.0.1/28")
        .unwrap();
    assert!(!gateway.allocated);
}

#[tokio::test]
async fn test_nic_name_reuses_freed_slot() {
    let f = fixture().await;
    let vpc = subnet(&f.ipam, vpc_params("vpc-a", "192.168.10.0/28")).await;
    nic(&f.ipam, VPC_INSTANCE, &vpc).await;
    let eth1 = nic(&f.ipam, VPC_INSTANCE, &vpc).await;
    let eth2 = nic(&f.ipam, VPC_INSTANCE, &vpc).await;
    assert_eq!(eth2.name, "eth2");

    let mut tx = f.ipam.begin().await.unwrap();
    f.ipam.interfaces().delete_interface(tx.as_mut(), eth1.id).await.unwrap();
    tx.commit().await.unwrap();

    let added = nic(&f.ipam, VPC_INSTANCE, &vpc).await;
    assert_eq!(added.name, "eth1");

    let mut tx = read(&f.store).await;
    let mut names: Vec<String> = tx
        .list_interfaces(&InterfaceFilter {
            instance_id: Some(VPC_INSTANCE),
            ..Default::default()
        })
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    names.sort();
    assert_eq!(names, ["eth0", "eth1", "eth2"]);
}
