//! Floating IP manager.
//!
//! A floating IP owns an interface in a public (or site) subnet and, when
//! attached, a NAT rule on the host of the instance it serves. What an
//! operation may do to a floating IP depends on its type; see [`state`].

mod load_balancer;
mod public;
pub mod state;

pub use public::PublicIp;

use crate::error::IpamError;
use crate::interface_binder::{CreateInterface, InterfaceOwner};
use crate::permission::{require_owner, require_permission, Role};
use crate::{instance_target, Ipam};
use chrono::Utc;
use hypervisor_client::HostTarget;
use ipam_store::{
    FloatingIp, FloatingIpFilter, FloatingIpType, Instance, InstanceStatus, IpamTx, LoadBalancerStatus, NewFloatingIp,
    Subnet, SubnetFilter, SubnetType, strip_prefix_len,
};
use state::{DetachAction, FloatingIpOp};
use tracing::{debug, error, info};

/// Parameters of a floating IP batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateFloatingIps {
    pub name: String,
    pub inbound: u32,
    pub outbound: u32,
    /// Floating IPs drawn from the public subnets
    pub count: u32,
    /// Public candidates; every public subnet when empty
    pub public_subnets: Vec<u64>,
    /// Claim exactly this public address
    pub public_ip: Option<String>,
    /// Each contributes one floating IP per idle address
    pub site_subnets: Vec<u64>,
    pub instance_id: Option<u64>,
    pub load_balancer_id: Option<u64>,
    pub group_id: Option<u64>,
}

/// Relinking and regrouping of a floating IP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FloatingIpUpdate {
    /// Instance to attach to after detaching
    pub instance_id: Option<u64>,
    /// New IP group, `Some(None)` to clear it
    pub group_id: Option<Option<u64>>,
}

/// A committed link waiting for its NAT rule
#[derive(Debug, Clone)]
pub struct AttachPlan {
    pub floating_ip: FloatingIp,
    pub target: HostTarget,
    pub command: String,
}

/// Floating IP operations
#[derive(Debug, Clone, Copy)]
pub struct FloatingIpManager<'a> {
    ipam: &'a Ipam,
}

impl<'a> FloatingIpManager<'a> {
    pub(crate) fn new(ipam: &'a Ipam) -> Self {
        Self { ipam }
    }

    pub async fn get(&self, tx: &mut dyn IpamTx, id: u64) -> Result<FloatingIp, IpamError> {
        Ok(tx.get_floating_ip(id).await?)
    }

    /// Lock a floating IP and check the caller may apply `op` to it
    async fn acquire(&self, tx: &mut dyn IpamTx, id: u64, op: FloatingIpOp) -> Result<FloatingIp, IpamError> {
        let fip = tx.lock_floating_ip(id).await?;
        state::require(&fip, op)?;
        require_owner(
            self.ipam.membership(),
            Role::Writer,
            fip.owner,
            &format!("{} the floating IP", op),
        )?;
        Ok(fip)
    }

    fn validate_create(&self, req: &CreateFloatingIps) -> Result<(), IpamError> {
        let config = self.ipam.config();
        config.check_bandwidth(req.inbound, req.outbound)?;
        if req.public_ip.is_some() && (req.count > 1 || !req.site_subnets.is_empty()) {
            let error_msg = "Public ip and subnets cannot be specified at the same time".to_string();
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }
        let site_only = req.count == 0 && !req.site_subnets.is_empty();
        if !site_only && !(1..=config.max_floating_ip_batch).contains(&req.count) {
            let error_msg = format!(
                "Floating IP count {} must be between 1 and {}",
                req.count, config.max_floating_ip_batch
            );
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }
        if req.instance_id.is_some() && req.load_balancer_id.is_some() {
            let error_msg = "A floating IP serves either an instance or a load balancer".to_string();
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }
        Ok(())
    }

    async fn candidate_subnets(
        &self,
        tx: &mut dyn IpamTx,
        ids: &[u64],
        subnet_type: SubnetType,
    ) -> Result<Vec<Subnet>, IpamError> {
        let mut subnets = Vec::with_capacity(ids.len());
        for id in ids {
            let subnet = tx.get_subnet(*id).await?;
            if subnet.subnet_type != subnet_type {
                let error_msg = format!("Subnet {} must be {}", subnet.name, subnet_type);
                error!("{}", error_msg);
                return Err(IpamError::InvalidParameter(error_msg));
            }
            subnets.push(subnet);
        }
        Ok(subnets)
    }

    /// Create a batch of floating IPs, attaching each to the instance if one
    /// is given
    ///
    /// The batch is all or nothing: the first unit that fails aborts the
    /// operation and the caller's rollback undoes the units before it.
    /// Remote calls made for earlier units are not undone.
    pub async fn create(&self, tx: &mut dyn IpamTx, req: &CreateFloatingIps) -> Result<Vec<FloatingIp>, IpamError> {
        require_permission(self.ipam.membership(), Role::Writer, "create floating IPs")?;
        self.validate_create(req)?;
        debug!("Creating floating IPs {:?}", req);

        let mut public_subnets = self.candidate_subnets(tx, &req.public_subnets, SubnetType::Public).await?;
        if req.count > 0 {
            if public_subnets.is_empty() {
                public_subnets = tx
                    .list_subnets(&SubnetFilter {
                        subnet_type: Some(SubnetType::Public),
                        ..Default::default()
                    })
                    .await?;
                if public_subnets.is_empty() {
                    let error_msg = "No public subnets available".to_string();
                    error!("{}", error_msg);
                    return Err(IpamError::InsufficientCapacity(error_msg));
                }
            }
            let mut idle_total = 0;
            for subnet in &public_subnets {
                idle_total += self.ipam.address_pool().count_idle(tx, subnet).await?;
            }
            if idle_total < u64::from(req.count) {
                let error_msg = format!(
                    "Not enough idle addresses for public subnets, idle: {}, requested: {}",
                    idle_total, req.count
                );
                error!("{}", error_msg);
                return Err(IpamError::InsufficientCapacity(error_msg));
            }
        }

        let site_subnets = self.candidate_subnets(tx, &req.site_subnets, SubnetType::Site).await?;
        let mut site_idle = Vec::with_capacity(site_subnets.len());
        for subnet in &site_subnets {
            let idle = self.ipam.address_pool().count_idle(tx, subnet).await?;
            if idle == 0 {
                let error_msg = format!("Site subnet {} has no idle address", subnet.name);
                error!("{}", error_msg);
                return Err(IpamError::InsufficientCapacity(error_msg));
            }
            site_idle.push(idle);
        }

        let instance = match req.instance_id {
            Some(id) => {
                let instance = tx.get_instance(id).await?;
                require_owner(self.ipam.membership(), Role::Writer, instance.owner, "attach to the instance")?;
                Some(instance)
            }
            None => None,
        };
        let (fip_type, router_id) = match req.load_balancer_id {
            Some(id) => {
                let lb = tx.get_load_balancer(id).await?;
                require_owner(self.ipam.membership(), Role::Writer, lb.owner, "add a floating IP to the load balancer")?;
                if lb.status != LoadBalancerStatus::Available {
                    let error_msg = format!("Load balancer {} is not available", lb.name);
                    error!("{}", error_msg);
                    return Err(IpamError::InvalidState(error_msg));
                }
                (FloatingIpType::LoadBalancer, Some(lb.router_id))
            }
            None => (FloatingIpType::Floating, None),
        };

        let mut created = Vec::new();
        for i in 0..req.count {
            let fip = self
                .create_one(tx, req, i, &public_subnets, fip_type, router_id, instance.as_ref())
                .await?;
            created.push(fip);
        }

        for (subnet, idle) in site_subnets.iter().zip(site_idle) {
            let site = std::slice::from_ref(subnet);
            for i in 0..idle {
                let unit = u32::try_from(i).unwrap_or(u32::MAX);
                let fip = self
                    .create_one(tx, req, unit, site, FloatingIpType::Site, None, instance.as_ref())
                    .await?;
                if i == 0 {
                    if let Some(instance) = &instance {
                        self.bind_site_subnet_to_instance(tx, subnet.id, instance.id).await?;
                    }
                }
                created.push(fip);
            }
        }

        if let Some(lb_id) = req.load_balancer_id {
            self.regenerate_vrrp_conf(tx, lb_id).await?;
        }
        info!("Created {} floating IPs named {}", created.len(), req.name);
        Ok(created)
    }

    #[expect(
        clippy::too_many_arguments,
        reason = "a unit needs the request, its index, candidates, type, router and instance"
    )]
    async fn create_one(
        &self,
        tx: &mut dyn IpamTx,
        req: &CreateFloatingIps,
        unit: u32,
        candidates: &[Subnet],
        fip_type: FloatingIpType,
        router_id: Option<u64>,
        instance: Option<&Instance>,
    ) -> Result<FloatingIp, IpamError> {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut fip = tx
            .insert_floating_ip(NewFloatingIp {
                name: format!("{}-{}-{}", req.name, unit, nanos),
                owner: self.ipam.membership().org_id(),
                fip_type,
                fip_address: String::new(),
                ip_address: String::new(),
                int_address: String::new(),
                instance_id: None,
                router_id,
                load_balancer_id: req.load_balancer_id,
                subnet_id: None,
                group_id: req.group_id,
                inbound: req.inbound,
                outbound: req.outbound,
            })
            .await?;

        let params = CreateInterface {
            address: req.public_ip.clone(),
            inbound: req.inbound,
            outbound: req.outbound,
            ..Default::default()
        };
        let (iface, address) = self
            .ipam
            .interfaces()
            .create_interface(tx, InterfaceOwner::FloatingIp(fip.id), candidates, &params)
            .await?;
        fip.fip_address = address.address.clone();
        fip.ip_address = strip_prefix_len(&address.address).to_string();
        fip.interface_id = Some(iface.id);
        fip.subnet_id = Some(address.subnet_id);
        let fip = tx.update_floating_ip(&fip).await?;
        debug!("Allocated floating IP {} as {}", fip.fip_address, fip.name);

        match instance {
            Some(instance) => self.attach(tx, fip.id, instance.id).await,
            None => Ok(fip),
        }
    }

    /// Bind a site subnet to an instance's primary interface
    ///
    /// Binding to the interface it is already bound to is a no-op; a subnet
    /// bound elsewhere is left alone and reported.
    pub async fn bind_site_subnet_to_instance(
        &self,
        tx: &mut dyn IpamTx,
        site_subnet_id: u64,
        instance_id: u64,
    ) -> Result<Subnet, IpamError> {
        let mut subnet = tx.get_subnet(site_subnet_id).await?;
        if subnet.subnet_type != SubnetType::Site {
            let error_msg = format!("Subnet {} is not a site subnet", subnet.name);
            error!("{}", error_msg);
            return Err(IpamError::InvalidParameter(error_msg));
        }
        let primary = self.ipam.interfaces().primary_interface(tx, instance_id).await?;
        match subnet.interface_id {
            Some(bound) if bound == primary.id => Ok(subnet),
            Some(bound) => {
                let error_msg = format!("Site subnet {} is already bound to interface {}", subnet.name, bound);
                error!("{}", error_msg);
                Err(IpamError::InvalidState(error_msg))
            }
            None => {
                subnet.interface_id = Some(primary.id);
                let subnet = tx.update_subnet(&subnet).await?;
                info!(
                    "Bound site subnet {} to interface {} of instance {}",
                    subnet.name, primary.name, instance_id
                );
                Ok(subnet)
            }
        }
    }

    /// Link a floating IP to an instance and program its NAT rule
    pub async fn attach(&self, tx: &mut dyn IpamTx, id: u64, instance_id: u64) -> Result<FloatingIp, IpamError> {
        let plan = self.link(tx, id, instance_id).await?;
        self.program(&plan).await?;
        Ok(plan.floating_ip)
    }

    /// Database half of an attach
    ///
    /// Relinking to the instance a floating IP is already attached to
    /// refreshes the internal address and yields the same command again.
    pub async fn link(&self, tx: &mut dyn IpamTx, id: u64, instance_id: u64) -> Result<AttachPlan, IpamError> {
        require_permission(self.ipam.membership(), Role::Writer, "attach a floating IP")?;
        let mut fip = self.acquire(tx, id, FloatingIpOp::Attach).await?;
        if let Some(current) = fip.instance_id {
            if current != instance_id {
                let error_msg = format!(
                    "Floating IP {} is already attached to instance {}",
                    fip.ip_address, current
                );
                error!("{}", error_msg);
                return Err(IpamError::InvalidState(error_msg));
            }
        }

        let instance = tx.get_instance(instance_id).await?;
        if instance.status != InstanceStatus::Running {
            let error_msg = format!("Instance {} must be running", instance.hostname);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        }
        let Some(router_id) = instance.router_id else {
            let error_msg = format!("Instance {} has no router", instance.hostname);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        };
        let router = tx.get_router(router_id).await?;
        let target = instance_target(&instance)?;
        let primary = self.ipam.interfaces().primary_interface(tx, instance.id).await?;
        let primary = self.ipam.interfaces().details(tx, primary.id).await?;
        let Some(subnet_id) = fip.subnet_id else {
            let error_msg = format!("Floating IP {} has no address", fip.name);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        };
        let public_subnet = tx.get_subnet(subnet_id).await?;

        fip.int_address = primary.address.address.clone();
        fip.instance_id = Some(instance.id);
        fip.router_id = Some(router.id);
        let fip = tx.update_floating_ip(&fip).await?;

        let command = self.ipam.commands().create_floating(
            router.id,
            &fip,
            &public_subnet,
            &primary.address.address,
            primary.subnet.vlan,
        );
        Ok(AttachPlan {
            floating_ip: fip,
            target,
            command,
        })
    }

    /// Remote half of an attach
    pub async fn program(&self, plan: &AttachPlan) -> Result<(), IpamError> {
        self.ipam.execute(&plan.target, &plan.command).await?;
        info!(
            "Programmed floating IP {} for {}",
            plan.floating_ip.ip_address, plan.floating_ip.int_address
        );
        Ok(())
    }

    /// Unlink a floating IP from its instance
    ///
    /// Returns `None` when the row itself went away (native shadows).
    pub async fn detach(&self, tx: &mut dyn IpamTx, id: u64) -> Result<Option<FloatingIp>, IpamError> {
        require_permission(self.ipam.membership(), Role::Writer, "detach a floating IP")?;
        let mut fip = self.acquire(tx, id, FloatingIpOp::Detach).await?;

        match state::detach_action(fip.fip_type) {
            DetachAction::DeleteRecord => {
                tx.delete_floating_ip(fip.id).await?;
                info!("Deleted native floating IP {}", fip.ip_address);
                Ok(None)
            }
            DetachAction::SoftDetach => {
                fip.instance_id = None;
                fip.int_address.clear();
                fip.fip_type = FloatingIpType::Floating;
                let fip = tx.update_floating_ip(&fip).await?;
                info!("Released reserved floating IP {}", fip.ip_address);
                Ok(Some(fip))
            }
            DetachAction::ClearLink => {
                if let Some(instance_id) = fip.instance_id {
                    let instance = tx.get_instance(instance_id).await?;
                    let target = instance_target(&instance)?;
                    let primary = self.ipam.interfaces().primary_interface(tx, instance_id).await?;
                    let primary = self.ipam.interfaces().details(tx, primary.id).await?;
                    let command = self.ipam.commands().clear_floating(&fip, primary.subnet.vlan);
                    self.ipam.execute(&target, &command).await?;
                    info!("Detached floating IP {} from instance {}", fip.ip_address, instance.hostname);
                }
                fip.instance_id = None;
                fip.int_address.clear();
                Ok(Some(tx.update_floating_ip(&fip).await?))
            }
        }
    }

    /// Regroup, detach and optionally reattach, all in the caller's transaction
    pub async fn update(&self, tx: &mut dyn IpamTx, id: u64, update: &FloatingIpUpdate) -> Result<FloatingIp, IpamError> {
        require_permission(self.ipam.membership(), Role::Writer, "update a floating IP")?;
        let mut fip = self.acquire(tx, id, FloatingIpOp::Update).await?;
        if let Some(group_id) = update.group_id {
            fip.group_id = group_id;
            tx.update_floating_ip(&fip).await?;
        }

        self.detach(tx, id).await?;
        match update.instance_id {
            Some(instance_id) => self.attach(tx, id, instance_id).await,
            None => Ok(tx.get_floating_ip(id).await?),
        }
    }

    /// Detach if needed, free the address and drop the row
    pub async fn delete(&self, tx: &mut dyn IpamTx, id: u64) -> Result<(), IpamError> {
        require_permission(self.ipam.membership(), Role::Writer, "delete a floating IP")?;
        let fip = self.acquire(tx, id, FloatingIpOp::Delete).await?;
        if fip.is_attached() {
            self.detach(tx, id).await?;
        }
        let public_subnet = match fip.subnet_id {
            Some(subnet_id) => Some(tx.get_subnet(subnet_id).await?),
            None => None,
        };

        self.deallocate(tx, fip.id).await?;

        if let Some(lb_id) = fip.load_balancer_id {
            self.regenerate_vrrp_conf(tx, lb_id).await?;
            let vlan = public_subnet.map(|s| s.vlan).unwrap_or_default();
            self.clear_lb_floating(tx, lb_id, &fip, vlan).await?;
        }
        info!("Deleted floating IP {}", fip.ip_address);
        Ok(())
    }

    /// Park an unattached floating IP as reserved
    pub async fn reserve(&self, tx: &mut dyn IpamTx, id: u64) -> Result<FloatingIp, IpamError> {
        require_permission(self.ipam.membership(), Role::Writer, "reserve a floating IP")?;
        let mut fip = self.acquire(tx, id, FloatingIpOp::Reserve).await?;
        if fip.is_attached() {
            let error_msg = format!("Floating IP {} is attached and can not be reserved", fip.ip_address);
            error!("{}", error_msg);
            return Err(IpamError::InvalidState(error_msg));
        }
        fip.fip_type = FloatingIpType::Reserved;
        let fip = tx.update_floating_ip(&fip).await?;
        info!("Reserved floating IP {}", fip.ip_address);
        Ok(fip)
    }

    /// Delete a floating IP's interfaces, freeing their addresses, then the row
    pub(crate) async fn deallocate(&self, tx: &mut dyn IpamTx, id: u64) -> Result<(), IpamError> {
        let removed = self
            .ipam
            .interfaces()
            .delete_owner_interfaces(tx, InterfaceOwner::FloatingIp(id))
            .await?;
        tx.delete_floating_ip(id).await?;
        debug!("Deallocated floating IP {} with {} interfaces", id, removed);
        Ok(())
    }

    /// Floating IPs attached to `instance_id`
    pub async fn list_for_instance(&self, tx: &mut dyn IpamTx, instance_id: u64) -> Result<Vec<FloatingIp>, IpamError> {
        Ok(tx
            .list_floating_ips(&FloatingIpFilter {
                instance_id: Some(instance_id),
                ..Default::default()
            })
            .await?)
    }
}
