//! Tiling the ring into repair segments.

use malachite::{Integer, Natural};
use tracing::debug;

use crate::comparator::{greater_than, lower_than_or_equal};
use crate::error::RingError;
use crate::partitioner::Partitioner;
use crate::range::RingRange;

/// Splits a cluster's token ranges into repair segments.
///
/// Each node owns the range between its token and the next one. That range is
/// cut into a number of segments proportional to its share of the ring, so
/// that roughly `total_segment_count` segments cover the whole ring. Output
/// ranges are in position space (see [`Partitioner::to_position`]).
#[derive(Debug, Clone)]
pub struct SegmentGenerator {
    partitioner: Partitioner,
    range_min: Integer,
    range_max: Integer,
    range_size: Natural,
}

impl SegmentGenerator {
    /// Create a generator for the given token space.
    pub fn new(partitioner: Partitioner) -> Self {
        Self {
            partitioner,
            range_min: partitioner.min_token(),
            range_max: partitioner.max_token(),
            range_size: partitioner.ring_size(),
        }
    }

    /// The token space this generator tiles.
    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    /// Number of positions on the ring.
    pub fn ring_size(&self) -> &Natural {
        &self.range_size
    }

    /// Generate segments covering the whole ring.
    ///
    /// `ring_tokens` must be sorted in ascending order. The last token's range
    /// wraps around to the first. A single token owns the whole ring.
    pub fn generate_segments(
        &self,
        total_segment_count: u64,
        ring_tokens: &[Integer],
    ) -> Result<Vec<RingRange>, RingError> {
        if ring_tokens.is_empty() {
            return Err(RingError::NoTokens);
        }
        if total_segment_count == 0 {
            return Err(RingError::ZeroSegments);
        }

        let token_range_count = ring_tokens.len();
        let ring_size = Integer::from(&self.range_size);
        let total = Integer::from(total_segment_count);
        let zero = Integer::from(0u32);
        let mut segments = Vec::new();

        for i in 0..token_range_count {
            let start = &ring_tokens[i];
            let stop = &ring_tokens[(i + 1) % token_range_count];

            self.check_token(start)?;
            self.check_token(stop)?;
            if start == stop && token_range_count != 1 {
                return Err(RingError::DuplicateToken(start.to_string()));
            }

            let mut range_size = stop - start;
            if lower_than_or_equal(&range_size, &zero) {
                range_size += &ring_size;
            }

            // ceil(range_size / ring_size * total_segment_count)
            let scaled = &range_size * &total;
            let mut segment_count = &scaled / &ring_size;
            if greater_than(&(&scaled % &ring_size), &zero) {
                segment_count += Integer::from(1u32);
            }

            let mut endpoints = Vec::new();
            for j in 0..=total_segment_count {
                let j = Integer::from(j);
                if greater_than(&j, &segment_count) {
                    break;
                }
                let offset = &range_size * &j / &segment_count;
                let mut token = start + offset;
                if greater_than(&token, &self.range_max) {
                    token -= &ring_size;
                }
                endpoints.push(self.partitioner.to_position(&token)?);
            }

            for pair in endpoints.windows(2) {
                segments.push(RingRange::new(pair[0].clone(), pair[1].clone()));
            }
        }

        self.verify_coverage(&segments)?;
        debug!(
            segments = segments.len(),
            tokens = token_range_count,
            partitioner = %self.partitioner,
            "generated repair segments"
        );
        Ok(segments)
    }

    /// The ranges owned by each token, `(t[i], t[i + 1]]`, in position space.
    pub fn token_ranges(&self, ring_tokens: &[Integer]) -> Result<Vec<RingRange>, RingError> {
        if ring_tokens.is_empty() {
            return Err(RingError::NoTokens);
        }
        let n = ring_tokens.len();
        (0..n)
            .map(|i| {
                let start = self.partitioner.to_position(&ring_tokens[i])?;
                let end = self.partitioner.to_position(&ring_tokens[(i + 1) % n])?;
                Ok(RingRange::new(start, end))
            })
            .collect()
    }

    fn check_token(&self, token: &Integer) -> Result<(), RingError> {
        if self.partitioner.contains_token(token) {
            Ok(())
        } else {
            Err(RingError::TokenOutOfRange {
                token: token.to_string(),
                min: self.range_min.to_string(),
                max: self.range_max.to_string(),
            })
        }
    }

    fn verify_coverage(&self, segments: &[RingRange]) -> Result<(), RingError> {
        let mut covered = Natural::from(0u32);
        for segment in segments {
            covered += segment.span(&self.range_size);
        }
        if covered != self.range_size {
            return Err(RingError::IncompleteCoverage {
                covered: covered.to_string(),
                ring_size: self.range_size.to_string(),
            });
        }
        Ok(())
    }
}
