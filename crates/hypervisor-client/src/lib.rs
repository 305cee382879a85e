//! Hypervisor Actuation Client
//!
//! Client for applying network changes on hypervisor hosts. A change is an
//! opaque shell-style command plus a [`HostTarget`] selecting where it runs:
//! one host, every host of a group, or any host matching resource
//! constraints.
//!
//! # Example
//!
//! ```no_run
//! use hypervisor_client::{HostTarget, HypervisorClient, NetworkActuator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HypervisorClient::new(
//!     "http://hyper-control:8080".to_string(),
//!     "your-api-token".to_string(),
//! )?;
//!
//! client
//!     .execute(&HostTarget::Host(3), "/opt/ipam/scripts/backend/clear_floating.sh '1' '203.0.113.5/24' '10.0.0.2/24' '5001' '9'")
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod actuator_trait;
pub mod target;
#[cfg(feature = "test-util")]
pub mod mock;

pub use actuator_trait::NetworkActuator;
pub use client::HypervisorClient;
pub use error::ActuatorError;
#[cfg(feature = "test-util")]
pub use mock::{ExecutedCommand, MockActuator};
pub use target::{HostTarget, ResourceConstraints};
