//! Address operations for MemoryStore
//!
//! `claim_address` is the only way an address becomes allocated. It finds and
//! flips the row inside one call, so two transactions can never both observe
//! the same row as free.

use super::StoreState;
use crate::error::StoreError;
use crate::filters::AddressFilter;
use crate::models::*;
use chrono::Utc;
use std::collections::BTreeSet;

pub(crate) fn insert_addresses(state: &mut StoreState, rows: Vec<NewAddress>) -> Result<usize, StoreError> {
    let mut seen: BTreeSet<(u64, String)> = state
        .addresses
        .values()
        .map(|a| (a.subnet_id, a.address.clone()))
        .collect();
    for row in &rows {
        if !seen.insert((row.subnet_id, row.address.clone())) {
            return Err(StoreError::UniqueViolation(format!(
                "address {} already exists in subnet {}",
                row.address, row.subnet_id
            )));
        }
    }

    let count = rows.len();
    let now = Utc::now();
    for row in rows {
        let id = state.next_id();
        state.addresses.insert(
            id,
            Address {
                id,
                address: row.address,
                netmask: row.netmask,
                ip_version: row.ip_version,
                subnet_id: row.subnet_id,
                allocated: false,
                reserved: false,
                role: None,
                interface_id: None,
                second_interface_id: None,
                created_at: now,
                updated_at: now,
            },
        );
    }
    Ok(count)
}

pub(crate) fn get_address(state: &StoreState, id: u64) -> Result<Address, StoreError> {
    state
        .addresses
        .get(&id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(format!("Address {} not found", id)))
}

pub(crate) fn list_addresses(state: &StoreState, filter: &AddressFilter) -> Vec<Address> {
    state
        .addresses
        .values()
        .filter(|a| filter.matches(a))
        .cloned()
        .collect()
}

pub(crate) fn count_idle(state: &StoreState, subnet_id: u64, gateway: &str) -> u64 {
    let gateway = strip_prefix_len(gateway);
    state
        .addresses
        .values()
        .filter(|a| a.subnet_id == subnet_id && !a.allocated && !a.reserved && a.ip() != gateway)
        .count() as u64
}

pub(crate) fn claim_address(state: &mut StoreState, claim: &AddressClaim) -> Option<Address> {
    let wanted = claim.address.as_deref().map(strip_prefix_len);
    let exclude = claim.exclude.as_deref().map(strip_prefix_len);

    let row = state.addresses.values_mut().find(|a| {
        if a.subnet_id != claim.subnet_id || a.allocated || exclude == Some(a.ip()) {
            return false;
        }
        match wanted {
            Some(ip) => a.ip() == ip,
            None => !a.reserved,
        }
    })?;

    row.allocated = true;
    row.role = Some(claim.role);
    match claim.role {
        AddressRole::Native => row.interface_id = Some(claim.interface_id),
        AddressRole::Second => row.second_interface_id = Some(claim.interface_id),
    }
    row.updated_at = Utc::now();
    Some(row.clone())
}

pub(crate) fn update_address(state: &mut StoreState, address: &Address) -> Result<Address, StoreError> {
    let row = state
        .addresses
        .get_mut(&address.id)
        .ok_or_else(|| StoreError::NotFound(format!("Address {} not found", address.id)))?;
    *row = address.clone();
    row.updated_at = Utc::now();
    Ok(row.clone())
}

pub(crate) fn release_address(state: &mut StoreState, id: u64) -> Result<Address, StoreError> {
    let row = state
        .addresses
        .get_mut(&id)
        .ok_or_else(|| StoreError::NotFound(format!("Address {} not found", id)))?;
    if row.allocated || row.is_bound() {
        row.allocated = false;
        row.role = None;
        row.interface_id = None;
        row.second_interface_id = None;
        row.updated_at = Utc::now();
    }
    Ok(row.clone())
}

pub(crate) fn delete_addresses(state: &mut StoreState, subnet_id: u64) -> usize {
    let before = state.addresses.len();
    state.addresses.retain(|_, a| a.subnet_id != subnet_id);
    before - state.addresses.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(state: &mut StoreState, subnet_id: u64, ips: &[&str]) {
        let rows = ips
            .iter()
            .map(|ip| NewAddress {
                address: format!("{}/29", ip),
                netmask: "255.255.255.248".to_string(),
                ip_version: IpVersion::V4,
                subnet_id,
            })
            .collect();
        insert_addresses(state, rows).unwrap();
    }

    fn claim(subnet_id: u64, interface_id: u64) -> AddressClaim {
        AddressClaim {
            subnet_id,
            interface_id,
            role: AddressRole::Native,
            address: None,
            exclude: Some("10.1.0.1/29".to_string()),
        }
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let mut state = StoreState::default();
        seed(&mut state, 1, &["10.1.0.2"]);
        let err = insert_addresses(
            &mut state,
            vec![NewAddress {
                address: "10.1.0.2/29".to_string(),
                netmask: "255.255.255.248".to_string(),
                ip_version: IpVersion::V4,
                subnet_id: 1,
            }],
        )
        .unwrap_err();
        assert!(err.is_unique_violation());
        // same address in another subnet is fine
        seed(&mut state, 2, &["10.1.0.2"]);
    }

    #[test]
    fn test_claim_skips_gateway_and_reserved() {
        let mut state = StoreState::default();
        seed(&mut state, 1, &["10.1.0.1", "10.1.0.2", "10.1.0.3"]);
        let reserved_id = state
            .addresses
            .values()
            .find(|a| a.ip() == "10.1.0.2")
            .map(|a| a.id)
            .unwrap();
        state.addresses.get_mut(&reserved_id).unwrap().reserved = true;

        let got = claim_address(&mut state, &claim(1, 9)).unwrap();
        assert_eq!(got.ip(), "10.1.0.3");
        assert_eq!(got.interface_id, Some(9));
        assert!(claim_address(&mut state, &claim(1, 10)).is_none());
    }

    #[test]
    fn test_claim_specific_address() {
        let mut state = StoreState::default();
        seed(&mut state, 1, &["10.1.0.1", "10.1.0.2", "10.1.0.3"]);
        let mut specific = claim(1, 4);
        specific.address = Some("10.1.0.3".to_string());
        let got = claim_address(&mut state, &specific).unwrap();
        assert_eq!(got.ip(), "10.1.0.3");
        // already taken
        assert!(claim_address(&mut state, &specific).is_none());
    }

    #[test]
    fn test_named_claim_honours_exclude() {
        let mut state = StoreState::default();
        seed(&mut state, 1, &["10.1.0.1", "10.1.0.2"]);
        let mut gateway = claim(1, 4);
        gateway.address = Some("10.1.0.1/29".to_string());
        assert!(claim_address(&mut state, &gateway).is_none());

        gateway.exclude = None;
        let got = claim_address(&mut state, &gateway).unwrap();
        assert_eq!(got.ip(), "10.1.0.1");
        assert_eq!(got.interface_id, Some(4));
    }

    #[test]
    fn test_second_claim_binds_second_interface() {
        let mut state = StoreState::default();
        seed(&mut state, 1, &["10.1.0.2"]);
        let mut second = claim(1, 5);
        second.role = AddressRole::Second;
        let got = claim_address(&mut state, &second).unwrap();
        assert_eq!(got.second_interface_id, Some(5));
        assert_eq!(got.interface_id, None);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut state = StoreState::default();
        seed(&mut state, 1, &["10.1.0.2"]);
        let got = claim_address(&mut state, &claim(1, 5)).unwrap();
        assert_eq!(count_idle(&state, 1, "10.1.0.1/29"), 0);

        let released = release_address(&mut state, got.id).unwrap();
        assert!(!released.allocated);
        assert_eq!(released.interface_id, None);
        let again = release_address(&mut state, got.id).unwrap();
        assert_eq!(again, released);
        assert_eq!(count_idle(&state, 1, "10.1.0.1/29"), 1);
    }

    #[test]
    fn test_count_idle_excludes_gateway() {
        let mut state = StoreState::default();
        seed(&mut state, 1, &["10.1.0.1", "10.1.0.2", "10.1.0.3"]);
        assert_eq!(count_idle(&state, 1, "10.1.0.1/29"), 2);
        assert_eq!(count_idle(&state, 2, "10.1.0.1/29"), 0);
    }
}
