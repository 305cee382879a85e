//! IPAM Controller
//!
//! Keeps floating IP NAT programming converged with the IPAM store and
//! reports the idle capacity of public and site subnets.

mod backoff;
mod controller;
mod error;
mod reconciler;

use crate::controller::{Controller, ControllerConfig};
use crate::error::ControllerError;
use anyhow::Context;
use ipam_engine::EngineConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn load_config() -> Result<ControllerConfig, ControllerError> {
    let hypervisor_url = env::var("HYPERVISOR_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let hypervisor_token = env::var("HYPERVISOR_TOKEN")
        .map_err(|_| ControllerError::InvalidConfig(
            "HYPERVISOR_TOKEN environment variable is required".to_string()
        ))?;
    let state_file = env::var("IPAM_STATE_FILE")
        .map(PathBuf::from)
        .map_err(|_| ControllerError::InvalidConfig(
            "IPAM_STATE_FILE environment variable is required".to_string()
        ))?;
    let interval_secs = match env::var("RECONCILE_INTERVAL_SECS") {
        Ok(value) => value.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
            ControllerError::InvalidConfig(format!("RECONCILE_INTERVAL_SECS must be a positive number, got {}", value))
        })?,
        Err(_) => 60,
    };

    Ok(ControllerConfig {
        hypervisor_url,
        hypervisor_token,
        state_file,
        interval: Duration::from_secs(interval_secs),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting IPAM Controller");

    let config = load_config()?;
    let engine = EngineConfig::from_env().context("invalid engine configuration")?;

    info!("Configuration:");
    info!("  Hypervisor URL: {}", config.hypervisor_url);
    info!("  State file: {}", config.state_file.display());
    info!("  Interval: {}s", config.interval.as_secs());

    let controller = Controller::new(config, engine).await?;
    controller.run().await.context("IPAM controller stopped")?;

    Ok(())
}
