//! Interface operations for MemoryStore

use super::StoreState;
use crate::error::StoreError;
use crate::filters::InterfaceFilter;
use crate::models::*;
use chrono::Utc;
use uuid::Uuid;

pub(crate) fn insert_interface(state: &mut StoreState, iface: NewInterface) -> Interface {
    let id = state.next_id();
    let now = Utc::now();
    let row = Interface {
        id,
        uuid: Uuid::new_v4(),
        name: iface.name,
        owner: iface.owner,
        kind: iface.kind,
        owner_id: iface.owner_id,
        instance_id: iface.instance_id,
        mac: iface.mac,
        mtu: iface.mtu,
        primary_if: iface.primary_if,
        inbound: iface.inbound,
        outbound: iface.outbound,
        allow_spoofing: iface.allow_spoofing,
        security_groups: iface.security_groups,
        subnet_id: iface.subnet_id,
        hyper: iface.hyper,
        created_at: now,
        updated_at: now,
    };
    state.interfaces.insert(id, row.clone());
    row
}

pub(crate) fn get_interface(state: &StoreState, id: u64) -> Result<Interface, StoreError> {
    state
        .interfaces
        .get(&id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Interface {} not found", id)))
}

pub(crate) fn list_interfaces(state: &StoreState, filter: &InterfaceFilter) -> Vec<Interface> {
    state
        .interfaces
        .values()
        .filter(|i| filter.matches(i))
        .cloned()
        .collect()
}

pub(crate) fn update_interface(state: &mut StoreState, iface: &Interface) -> Result<Interface, StoreError> {
    let row = state
        .interfaces
        .get_mut(&iface.id)
        .ok_or_else(|| StoreError::NotFound(format!("Interface {} not found", iface.id)))?;
    *row = iface.clone();
    row.updated_at = Utc::now();
    Ok(row.clone())
}

pub(crate) fn delete_interface(state: &mut StoreState, id: u64) -> Result<(), StoreError> {
    state
        .interfaces
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(format!("Interface {} not found", id)))
}
