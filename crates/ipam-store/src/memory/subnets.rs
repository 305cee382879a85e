//! Subnet operations for MemoryStore

use super::StoreState;
use crate::error::StoreError;
use crate::filters::SubnetFilter;
use crate::models::*;
use chrono::Utc;
use std::collections::BTreeSet;
use uuid::Uuid;

fn check_unique(state: &StoreState, id: u64, name: &str, vlan: u32) -> Result<(), StoreError> {
    for other in state.subnets.values().filter(|s| s.id != id) {
        if other.vlan == vlan {
            return Err(StoreError::UniqueViolation(format!(
                "subnet tag {} already used by subnet {}",
                vlan, other.id
            )));
        }
        if other.name == name {
            return Err(StoreError::UniqueViolation(format!(
                "subnet name {} already used by subnet {}",
                name, other.id
            )));
        }
    }
    Ok(())
}

pub(crate) fn insert_subnet(state: &mut StoreState, subnet: NewSubnet) -> Result<Subnet, StoreError> {
    check_unique(state, 0, &subnet.name, subnet.vlan)?;

    let id = state.next_id();
    let now = Utc::now();
    let row = Subnet {
        id,
        uuid: Uuid::new_v4(),
        name: subnet.name,
        owner: subnet.owner,
        network: subnet.network,
        netmask: subnet.netmask,
        gateway: subnet.gateway,
        start: subnet.start,
        end: subnet.end,
        vlan: subnet.vlan,
        subnet_type: subnet.subnet_type,
        router_id: subnet.router_id,
        group_id: subnet.group_id,
        dhcp: subnet.dhcp,
        dns: subnet.dns,
        domain: subnet.domain,
        interface_id: None,
        created_at: now,
        updated_at: now,
    };
    state.subnets.insert(id, row.clone());
    Ok(row)
}

pub(crate) fn get_subnet(state: &StoreState, id: u64) -> Result<Subnet, StoreError> {
    state
        .subnets
        .get(&id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Subnet {} not found", id)))
}

pub(crate) fn list_subnets(state: &StoreState, filter: &SubnetFilter) -> Vec<Subnet> {
    state
        .subnets
        .values()
        .filter(|s| filter.matches(s))
        .cloned()
        .collect()
}

pub(crate) fn update_subnet(state: &mut StoreState, subnet: &Subnet) -> Result<Subnet, StoreError> {
    if !state.subnets.contains_key(&subnet.id) {
        return Err(StoreError::NotFound(format!("Subnet {} not found", subnet.id)));
    }
    check_unique(state, subnet.id, &subnet.name, subnet.vlan)?;

    let mut row = subnet.clone();
    row.updated_at = Utc::now();
    state.subnets.insert(row.id, row.clone());
    Ok(row)
}

pub(crate) fn delete_subnet(state: &mut StoreState, id: u64) -> Result<(), StoreError> {
    state
        .subnets
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(format!("Subnet {} not found", id)))
}

pub(crate) fn used_tags(state: &StoreState) -> BTreeSet<u32> {
    state.subnets.values().map(|s| s.vlan).collect()
}
