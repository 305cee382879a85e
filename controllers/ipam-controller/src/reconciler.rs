//! Reconciliation logic for floating IP programming.
//!
//! Attaching a floating IP commits the link before its NAT rule is applied,
//! so a failed or interrupted apply leaves a linked floating IP without a
//! rule. Each pass re-applies every attached `Floating` and `Site` IP that
//! has not been confirmed by this process, backing off per floating IP
//! after failures.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use ipam_engine::Ipam;
use ipam_store::{FloatingIp, FloatingIpFilter, FloatingIpType, SubnetFilter, SubnetType};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Apply state of one attached floating IP
#[derive(Debug)]
struct ApplyState {
    instance_id: u64,
    confirmed: bool,
    retry_at: Option<Instant>,
    backoff: FibonacciBackoff,
}

impl ApplyState {
    fn new(instance_id: u64) -> Self {
        Self {
            instance_id,
            confirmed: false,
            retry_at: None,
            backoff: FibonacciBackoff::default(),
        }
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub applied: usize,
    pub failed: usize,
    /// Still backing off from an earlier failure
    pub deferred: usize,
}

/// Idle capacity of one public or site subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetCapacity {
    pub subnet_id: u64,
    pub name: String,
    pub subnet_type: SubnetType,
    pub idle: u64,
}

/// Re-applies floating IP programming.
#[derive(Debug)]
pub struct Reconciler {
    ipam: Ipam,
    states: HashMap<u64, ApplyState>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(ipam: Ipam) -> Self {
        Self {
            ipam,
            states: HashMap::new(),
        }
    }

    async fn attached_floating_ips(&self) -> Result<Vec<FloatingIp>, ControllerError> {
        let mut tx = self.ipam.begin().await?;
        let mut attached = Vec::new();
        for fip_type in [FloatingIpType::Floating, FloatingIpType::Site] {
            let fips = tx
                .list_floating_ips(&FloatingIpFilter {
                    fip_type: Some(fip_type),
                    ..Default::default()
                })
                .await?;
            attached.extend(fips.into_iter().filter(FloatingIp::is_attached));
        }
        Ok(attached)
    }

    /// Runs one pass at `now`.
    ///
    /// A floating IP relinked to another instance starts over as
    /// unconfirmed. Entries of floating IPs no longer attached are dropped.
    pub async fn reconcile(&mut self, now: Instant) -> Result<ReconcileReport, ControllerError> {
        let attached = self.attached_floating_ips().await?;
        self.states
            .retain(|id, state| attached.iter().any(|f| f.id == *id && f.instance_id == Some(state.instance_id)));

        let mut report = ReconcileReport::default();
        for fip in &attached {
            let Some(instance_id) = fip.instance_id else {
                continue;
            };
            let state = self.states.entry(fip.id).or_insert_with(|| ApplyState::new(instance_id));
            if state.confirmed {
                continue;
            }
            if state.retry_at.is_some_and(|at| at > now) {
                report.deferred += 1;
                continue;
            }

            match self.ipam.attach_floating_ip(fip.id, instance_id).await {
                Ok(plan) => {
                    state.confirmed = true;
                    state.retry_at = None;
                    state.backoff.reset();
                    report.applied += 1;
                    debug!("Confirmed floating IP {} on {}", fip.ip_address, plan.target);
                }
                Err(e) => {
                    let delay = state.backoff.next_backoff();
                    state.retry_at = Some(now + delay);
                    report.failed += 1;
                    warn!(
                        "Failed to apply floating IP {} for instance {} (code {}), retrying in {}s: {}",
                        fip.ip_address,
                        instance_id,
                        e.code().as_u32(),
                        delay.as_secs(),
                        e
                    );
                }
            }
        }

        info!(
            "Reconciled {} attached floating IPs: {} applied, {} failed, {} deferred",
            attached.len(),
            report.applied,
            report.failed,
            report.deferred
        );
        Ok(report)
    }

    /// Logs and returns idle capacity of every public and site subnet.
    pub async fn report_capacity(&self) -> Result<Vec<SubnetCapacity>, ControllerError> {
        let mut tx = self.ipam.begin().await?;
        let mut capacity = Vec::new();
        for subnet_type in [SubnetType::Public, SubnetType::Site] {
            let subnets = tx
                .list_subnets(&SubnetFilter {
                    subnet_type: Some(subnet_type),
                    ..Default::default()
                })
                .await?;
            for subnet in subnets {
                let idle = self.ipam.address_pool().count_idle(tx.as_mut(), &subnet).await?;
                info!("{} subnet {} ({}): {} idle addresses", subnet_type, subnet.name, subnet.network, idle);
                capacity.push(SubnetCapacity {
                    subnet_id: subnet.id,
                    name: subnet.name,
                    subnet_type,
                    idle,
                });
            }
        }
        Ok(capacity)
    }
}
