//! Referenced entities and security rules for MemoryStore

use super::StoreState;
use crate::error::StoreError;
use crate::models::*;
use chrono::Utc;

pub(crate) fn get_instance(state: &StoreState, id: u64) -> Result<Instance, StoreError> {
    state
        .instances
        .get(&id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Instance {} not found", id)))
}

pub(crate) fn get_router(state: &StoreState, id: u64) -> Result<Router, StoreError> {
    state
        .routers
        .get(&id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Router {} not found", id)))
}

pub(crate) fn get_load_balancer(state: &StoreState, id: u64) -> Result<LoadBalancer, StoreError> {
    state
        .load_balancers
        .get(&id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Load balancer {} not found", id)))
}

pub(crate) fn insert_security_rule(state: &mut StoreState, rule: NewSecurityRule) -> SecurityRule {
    let id = state.next_id();
    let row = SecurityRule {
        id,
        security_group_id: rule.security_group_id,
        direction: rule.direction,
        protocol: rule.protocol,
        remote_cidr: rule.remote_cidr,
        port_min: rule.port_min,
        port_max: rule.port_max,
        created_at: Utc::now(),
    };
    state.security_rules.insert(id, row.clone());
    row
}

pub(crate) fn list_security_rules(state: &StoreState, security_group_id: u64) -> Vec<SecurityRule> {
    state
        .security_rules
        .values()
        .filter(|r| r.security_group_id == security_group_id)
        .cloned()
        .collect()
}
