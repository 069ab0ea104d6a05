//! Token spaces and the mapping from tokens to ring positions.

use std::fmt;
use std::str::FromStr;

use malachite::{Integer, Natural};
use serde::{Deserialize, Serialize};

use crate::comparator::{greater_than, lower_than};
use crate::error::RingError;

/// The token space a cluster hashes keys into.
///
/// Tokens are signed (Murmur3 covers `[-2^63, 2^63 - 1]`), while
/// [`RingRange`](crate::RingRange) works on non-negative positions. A position
/// is a token minus the partitioner's minimum token, so positions always lie
/// in `[0, ring_size)` and order the same way tokens do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partitioner {
    /// 64-bit Murmur3 hashing, tokens in `[-2^63, 2^63 - 1]`.
    Murmur3,
    /// MD5-based hashing, tokens in `[0, 2^127 - 1]`.
    Random,
}

impl Partitioner {
    /// Recognize a partitioner from its (possibly fully qualified) class name.
    pub fn from_class_name(name: &str) -> Result<Self, RingError> {
        let name = name.trim();
        if name.ends_with("Murmur3Partitioner") {
            Ok(Self::Murmur3)
        } else if name.ends_with("RandomPartitioner") {
            Ok(Self::Random)
        } else {
            Err(RingError::UnknownPartitioner(name.to_string()))
        }
    }

    /// Fully qualified class name as reported by the data store.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Murmur3 => "org.apache.cassandra.dht.Murmur3Partitioner",
            Self::Random => "org.apache.cassandra.dht.RandomPartitioner",
        }
    }

    /// Smallest valid token.
    pub fn min_token(&self) -> Integer {
        match self {
            Self::Murmur3 => -(Integer::from(1u32) << 63u64),
            Self::Random => Integer::from(0u32),
        }
    }

    /// Largest valid token.
    pub fn max_token(&self) -> Integer {
        match self {
            Self::Murmur3 => (Integer::from(1u32) << 63u64) - Integer::from(1u32),
            Self::Random => (Integer::from(1u32) << 127u64) - Integer::from(1u32),
        }
    }

    /// Number of distinct positions on the ring.
    pub fn ring_size(&self) -> Natural {
        match self {
            Self::Murmur3 => Natural::from(1u32) << 64u64,
            Self::Random => Natural::from(1u32) << 127u64,
        }
    }

    /// Whether `token` lies inside this token space.
    pub fn contains_token(&self, token: &Integer) -> bool {
        !lower_than(token, &self.min_token()) && !greater_than(token, &self.max_token())
    }

    /// Map a token to its position in `[0, ring_size)`.
    pub fn to_position(&self, token: &Integer) -> Result<Natural, RingError> {
        if !self.contains_token(token) {
            return Err(self.out_of_range(token));
        }
        Natural::try_from(token - self.min_token()).map_err(|_| self.out_of_range(token))
    }

    /// Map a ring position back to its token.
    pub fn to_token(&self, position: &Natural) -> Integer {
        Integer::from(position) + self.min_token()
    }

    fn out_of_range(&self, token: &Integer) -> RingError {
        RingError::TokenOutOfRange {
            token: token.to_string(),
            min: self.min_token().to_string(),
            max: self.max_token().to_string(),
        }
    }
}

impl FromStr for Partitioner {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "murmur3" => Ok(Self::Murmur3),
            "random" => Ok(Self::Random),
            _ => Self::from_class_name(s),
        }
    }
}

impl fmt::Display for Partitioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

/// Parse a decimal token as reported by the data store.
pub fn parse_token(s: &str) -> Result<Integer, RingError> {
    s.trim()
        .parse()
        .map_err(|_| RingError::InvalidToken(s.to_string()))
}
