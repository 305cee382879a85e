//! IPAM Store
//!
//! Data model and transactional store abstraction used by the IPAM engine.
//! The engine never talks to a database directly: every read and write goes
//! through an [`IpamTx`] opened from an [`IpamStore`].
//!
//! # Example
//!
//! ```no_run
//! use ipam_store::{IpamStore, MemoryStore, SubnetFilter, SubnetType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//!
//! let mut tx = store.begin().await?;
//! let public = tx
//!     .list_subnets(&SubnetFilter {
//!         subnet_type: Some(SubnetType::Public),
//!         ..Default::default()
//!     })
//!     .await?;
//! tx.commit().await?;
//!
//! println!("{} public subnets", public.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Unique constraints**: subnet tag, subnet name, and (subnet, address)
//! - **Atomic claim**: [`IpamTx::claim_address`] tests and sets the
//!   allocation flag in one step
//! - **Serializable transactions**: [`MemoryStore`] runs one transaction at a
//!   time against a private working copy
//! - **Snapshots**: [`MemoryStore`] state round-trips through JSON

pub mod error;
pub mod filters;
pub mod memory;
pub mod models;
#[path = "trait.rs"]
pub mod store_trait;

pub use error::StoreError;
pub use filters::*;
pub use memory::{MemoryStore, MemoryTx};
pub use models::*;
pub use store_trait::{IpamStore, IpamTx};
