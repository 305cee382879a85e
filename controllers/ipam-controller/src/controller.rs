//! Main controller implementation.
//!
//! Loads the store from its JSON snapshot, runs the reconciler on a fixed
//! interval and writes the snapshot back after every pass and on shutdown.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use hypervisor_client::HypervisorClient;
use ipam_engine::{EngineConfig, Ipam, StaticMembership};
use ipam_store::MemoryStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Organization the controller acts in; admins act across organizations
const CONTROLLER_ORG: u64 = 0;

/// Controller settings read from the environment
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub hypervisor_url: String,
    pub hypervisor_token: String,
    pub state_file: PathBuf,
    pub interval: Duration,
}

/// Main controller for floating IP reconciliation.
#[derive(Debug)]
pub struct Controller {
    store: Arc<MemoryStore>,
    reconciler: Reconciler,
    state_file: PathBuf,
    interval: Duration,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig, engine: EngineConfig) -> Result<Self, ControllerError> {
        info!("Initializing IPAM Controller");

        let store = Arc::new(load_store(&config.state_file).await?);
        let actuator = HypervisorClient::new(config.hypervisor_url, config.hypervisor_token)?;
        let ipam = Ipam::new(
            store.clone(),
            Arc::new(actuator),
            Arc::new(StaticMembership::admin(CONTROLLER_ORG)),
            engine,
        )?;

        Ok(Self {
            store,
            reconciler: Reconciler::new(ipam),
            state_file: config.state_file,
            interval: config.interval,
        })
    }

    /// Runs the controller until Ctrl-C.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("IPAM Controller running, reconciling every {}s", self.interval.as_secs());
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.pass().await;
                    self.save().await?;
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutting down IPAM Controller");
                    break;
                }
            }
        }

        self.save().await
    }

    async fn pass(&mut self) {
        if let Err(e) = self.reconciler.reconcile(Instant::now()).await {
            error!("Reconciliation failed: {}", e);
        }
        if let Err(e) = self.reconciler.report_capacity().await {
            error!("Capacity report failed: {}", e);
        }
    }

    async fn save(&self) -> Result<(), ControllerError> {
        let json = self.store.snapshot().await?;
        tokio::fs::write(&self.state_file, json)
            .await
            .map_err(|source| ControllerError::StateFile {
                path: self.state_file.clone(),
                source,
            })
    }
}

async fn load_store(path: &Path) -> Result<MemoryStore, ControllerError> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => {
            let store = MemoryStore::from_snapshot(&json)?;
            info!("Loaded IPAM state from {}", path.display());
            Ok(store)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("State file {} does not exist, starting empty", path.display());
            Ok(MemoryStore::new())
        }
        Err(source) => Err(ControllerError::StateFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}
