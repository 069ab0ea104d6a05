//! Ring ranges and segment generation for Scythe.
//!
//! A ring-partitioned store assigns every key a position on a modular integer
//! keyspace. This crate models contiguous arcs on that keyspace and splits the
//! whole ring into repair segments:
//!
//! - [`RingRange`]: an immutable half-open arc `(start, end]` that may wrap
//!   around zero, with [`span`](RingRange::span) and
//!   [`encloses`](RingRange::encloses).
//! - [`comparator`]: the ordering helpers every wraparound test is built from.
//! - [`Partitioner`]: the token space of a cluster (Murmur3 or Random) and the
//!   mapping between signed tokens and non-negative ring positions.
//! - [`SegmentGenerator`]: tiles the ring into repair segments from a
//!   cluster's token list and verifies full coverage.
//!
//! All arithmetic uses arbitrary-precision integers: token spaces reach 2^127.

pub mod comparator;
mod decimal;
mod error;
mod partitioner;
mod range;
mod segment;

pub use error::RingError;
pub use malachite::{Integer, Natural};
pub use partitioner::{Partitioner, parse_token};
pub use range::RingRange;
pub use segment::SegmentGenerator;
