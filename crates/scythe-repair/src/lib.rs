//! Repair run scheduling for Scythe.
//!
//! This crate provides:
//!
//! - [`RepairRunner`]: drives repair runs segment by segment through a
//!   bounded pool of concurrent repairs, retrying failed segments.
//! - [`SegmentRepairer`]: the seam that actually repairs one segment, so
//!   tests and dry runs can stand in for a real cluster connection.

pub mod error;
pub mod repairer;
pub mod runner;

pub use error::RepairError;
pub use repairer::SegmentRepairer;
pub use runner::{RepairRunner, RunnerConfig};

#[cfg(test)]
mod tests;
