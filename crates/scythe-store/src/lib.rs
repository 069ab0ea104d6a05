//! Repair bookkeeping storage for Scythe.
//!
//! This crate defines the [`RepairStore`] trait that tracks clusters, tables,
//! repair runs and their segments, along with two concrete backends:
//!
//! - [`MemoryStore`]: volatile storage behind `RwLock`ed maps.
//! - [`FjallStore`]: persistent storage in Fjall keyspaces, values encoded
//!   with postcard.
//!
//! Both hand out ids from monotonically increasing counters starting at 1.

mod error;
mod fjall_store;
mod memory_store;
mod traits;

pub use error::StoreError;
pub use fjall_store::FjallStore;
pub use memory_store::MemoryStore;
pub use traits::RepairStore;
