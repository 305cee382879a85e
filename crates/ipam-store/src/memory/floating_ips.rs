//! Floating IP operations for MemoryStore

use super::StoreState;
use crate::error::StoreError;
use crate::filters::FloatingIpFilter;
use crate::models::*;
use chrono::Utc;
use uuid::Uuid;

pub(crate) fn insert_floating_ip(state: &mut StoreState, fip: NewFloatingIp) -> FloatingIp {
    let id = state.next_id();
    let now = Utc::now();
    let row = FloatingIp {
        id,
        uuid: Uuid::new_v4(),
        name: fip.name,
        owner: fip.owner,
        fip_type: fip.fip_type,
        fip_address: fip.fip_address,
        ip_address: fip.ip_address,
        int_address: fip.int_address,
        instance_id: fip.instance_id,
        router_id: fip.router_id,
        load_balancer_id: fip.load_balancer_id,
        interface_id: None,
        subnet_id: fip.subnet_id,
        group_id: fip.group_id,
        inbound: fip.inbound,
        outbound: fip.outbound,
        created_at: now,
        updated_at: now,
    };
    state.floating_ips.insert(id, row.clone());
    row
}

pub(crate) fn get_floating_ip(state: &StoreState, id: u64) -> Result<FloatingIp, StoreError> {
    state
        .floating_ips
        .get(&id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Floating IP {} not found", id)))
}

pub(crate) fn list_floating_ips(state: &StoreState, filter: &FloatingIpFilter) -> Vec<FloatingIp> {
    state
        .floating_ips
        .values()
        .filter(|f| filter.matches(f))
        .cloned()
        .collect()
}

pub(crate) fn update_floating_ip(state: &mut StoreState, fip: &FloatingIp) -> Result<FloatingIp, StoreError> {
    let row = state
        .floating_ips
        .get_mut(&fip.id)
        .ok_or_else(|| StoreError::NotFound(format!("Floating IP {} not found", fip.id)))?;
    *row = fip.clone();
    row.updated_at = Utc::now();
    Ok(row.clone())
}

pub(crate) fn delete_floating_ip(state: &mut StoreState, id: u64) -> Result<(), StoreError> {
    state
        .floating_ips
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(format!("Floating IP {} not found", id)))
}
