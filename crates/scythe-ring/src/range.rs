//! The half-open ring arc `(start, end]`.

use std::fmt;

use malachite::Natural;
use serde::{Deserialize, Serialize};

use crate::comparator::{greater_than_or_equal, lower_than_or_equal};

/// A contiguous arc on a modular keyspace, from just after `start` up to and
/// including `end`, walking forward.
///
/// The arc wraps through zero when `end <= start`. The ring size is not
/// stored: callers track it and pass it to [`span`](Self::span). Construction
/// performs no bounds checks; both positions must lie in `[0, ring_size)` for
/// whatever ring the caller measures against, and ranges compared with
/// [`encloses`](Self::encloses) must come from the same ring.
///
/// `start == end` is not special-cased. [`span`](Self::span) reports a full
/// revolution for it; whether that means "whole ring" or "empty" is the
/// convention of whoever builds the range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingRange {
    #[serde(with = "crate::decimal")]
    start: Natural,
    #[serde(with = "crate::decimal")]
    end: Natural,
}

impl RingRange {
    /// Create a range from two positions on the same ring.
    pub fn new(start: Natural, end: Natural) -> Self {
        Self { start, end }
    }

    /// Exclusive lower bound.
    pub fn start(&self) -> &Natural {
        &self.start
    }

    /// Inclusive upper bound.
    pub fn end(&self) -> &Natural {
        &self.end
    }

    /// Length of the arc on a ring of `ring_size` positions.
    ///
    /// Non-wrapping arcs measure `end - start`; wrapping arcs (including
    /// `start == end`) measure `end - start + ring_size`. The result lies in
    /// `[0, ring_size]`.
    ///
    /// # Panics
    ///
    /// Panics if `ring_size` is smaller than the distance the arc wraps by,
    /// which can only happen when `start` is not a valid position on that ring.
    pub fn span(&self, ring_size: &Natural) -> Natural {
        if greater_than_or_equal(&self.start, &self.end) {
            // Add before subtracting: the integer type is unsigned.
            &self.end + ring_size - &self.start
        } else {
            &self.end - &self.start
        }
    }

    /// Whether `other` lies entirely inside this arc.
    ///
    /// Wraparound is honoured independently for both ranges:
    ///
    /// 1. this range does not wrap: plain interval containment;
    /// 2. this range wraps and `other` does not: `other` must sit in the part
    ///    before the wrap point or the part after it;
    /// 3. both wrap: plain containment again, since both pass through zero.
    pub fn encloses(&self, other: &RingRange) -> bool {
        if lower_than_or_equal(&self.start, &self.end) {
            greater_than_or_equal(&other.start, &self.start)
                && lower_than_or_equal(&other.end, &self.end)
        } else if lower_than_or_equal(&other.start, &other.end) {
            greater_than_or_equal(&other.start, &self.start)
                || lower_than_or_equal(&other.end, &self.end)
        } else {
            greater_than_or_equal(&other.start, &self.start)
                && lower_than_or_equal(&other.end, &self.end)
        }
    }

    /// Whether this arc is a sub-arc of `owner` when both are walked forward
    /// on a ring of `ring_size` positions.
    ///
    /// Unlike [`encloses`](Self::encloses), this measures the arc from
    /// `owner.start`, so an arc ending at zero is only inside the owner that
    /// actually reaches zero.
    pub fn lies_within(&self, owner: &RingRange, ring_size: &Natural) -> bool {
        let offset = (&self.start + ring_size - &owner.start) % ring_size;
        lower_than_or_equal(&(offset + self.span(ring_size)), &owner.span(ring_size))
    }
}

impl fmt::Display for RingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> RingRange {
        RingRange::new(Natural::from(start), Natural::from(end))
    }

    fn n(v: u64) -> Natural {
        Natural::from(v)
    }

    #[test]
    fn test_span_non_wrapping() {
        assert_eq!(range(10, 40).span(&n(100)), n(30));
    }

    #[test]
    fn test_span_wrapping() {
        // 90 -> 100 is 10, then 0 -> 10 is another 10.
        assert_eq!(range(90, 10).span(&n(100)), n(20));
    }

    #[test]
    fn test_span_equal_bounds_is_full_ring() {
        assert_eq!(range(37, 37).span(&n(100)), n(100));
        assert_eq!(range(0, 0).span(&n(100)), n(100));
    }

    #[test]
    fn test_span_stays_within_ring() {
        let ring_size = 17u64;
        for start in 0..ring_size {
            for end in 0..ring_size {
                let span = range(start, end).span(&n(ring_size));
                assert!(span <= n(ring_size), "{} spans {span}", range(start, end));
            }
        }
    }

    #[test]
    fn test_span_on_127_bit_ring() {
        let ring_size = Natural::from(1u32) << 127u64;
        let start = &ring_size - Natural::from(5u32);
        let r = RingRange::new(start, Natural::from(5u32));
        assert_eq!(r.span(&ring_size), n(10));
    }

    #[test]
    fn test_encloses_itself() {
        for r in [range(10, 40), range(90, 10), range(0, 0), range(5, 5)] {
            assert!(r.encloses(&r), "{r} should enclose itself");
        }
    }

    #[test]
    fn test_encloses_non_wrapping() {
        assert!(range(0, 100).encloses(&range(10, 40)));
        assert!(!range(10, 40).encloses(&range(0, 100)));
        assert!(!range(10, 40).encloses(&range(30, 50)));
    }

    #[test]
    fn test_wrapping_outer_non_wrapping_inner() {
        // Tail part of the outer arc.
        assert!(range(90, 10).encloses(&range(92, 97)));
        // Head part of the outer arc.
        assert!(range(90, 10).encloses(&range(2, 8)));
        // Outside both parts.
        assert!(!range(90, 10).encloses(&range(20, 50)));
    }

    #[test]
    fn test_both_wrapping() {
        assert!(range(90, 10).encloses(&range(95, 5)));
        assert!(range(80, 20).encloses(&range(90, 10)));
        assert!(!range(90, 10).encloses(&range(80, 20)));
    }

    #[test]
    fn test_single_point_other() {
        assert!(range(10, 40).encloses(&range(20, 20)));
        assert!(range(90, 10).encloses(&range(95, 95)));
        assert!(!range(10, 40).encloses(&range(50, 50)));
    }

    #[test]
    fn test_full_ring_this() {
        // (0,0] falls into the non-wrapping branch: only ranges starting
        // at or after 0 and ending at or before 0 qualify.
        assert!(range(0, 0).encloses(&range(0, 0)));
        assert!(!range(0, 0).encloses(&range(10, 40)));
    }

    #[test]
    fn test_straddling_other_against_non_wrapping_this() {
        // A wrapping arc that reaches below this range's start or past its
        // end is rejected.
        assert!(!range(10, 50).encloses(&range(5, 3)));
        assert!(!range(10, 50).encloses(&range(60, 55)));
        // The non-wrapping branch compares bounds only, so a wrapping arc
        // whose bounds both fall inside is still reported as enclosed.
        assert!(range(10, 90).encloses(&range(95, 5)));
        assert!(range(0, 99).encloses(&range(95, 5)));
        // A wrapping range across the same point encloses it properly.
        assert!(range(94, 6).encloses(&range(95, 5)));
        assert!(!range(96, 6).encloses(&range(95, 5)));
    }

    #[test]
    fn test_lies_within_follows_the_owner_around_the_ring() {
        let ring_size = n(100);
        assert!(range(10, 40).lies_within(&range(10, 40), &ring_size));
        assert!(range(20, 30).lies_within(&range(10, 40), &ring_size));
        assert!(!range(30, 50).lies_within(&range(10, 40), &ring_size));
        // Both parts of a wrapping owner.
        assert!(range(92, 97).lies_within(&range(90, 10), &ring_size));
        assert!(range(2, 8).lies_within(&range(90, 10), &ring_size));
        assert!(range(95, 5).lies_within(&range(90, 10), &ring_size));
        assert!(!range(20, 50).lies_within(&range(90, 10), &ring_size));
    }

    #[test]
    fn test_arc_ending_at_zero_has_one_owner() {
        let ring_size = n(100);
        let owners = [range(0, 30), range(30, 60), range(60, 0)];
        let tail = range(80, 0);
        // `encloses` accepts it everywhere on bounds alone.
        assert!(owners.iter().all(|o| o.encloses(&tail)));
        let within: Vec<_> = owners
            .iter()
            .filter(|o| tail.lies_within(o, &ring_size))
            .collect();
        assert_eq!(within, vec![&range(60, 0)]);
    }

    #[test]
    fn test_lies_within_full_ring_owner() {
        let ring_size = n(100);
        let whole = range(42, 42);
        assert!(range(90, 10).lies_within(&whole, &ring_size));
        assert!(range(42, 42).lies_within(&whole, &ring_size));
        assert!(range(0, 42).lies_within(&whole, &ring_size));
    }

    #[test]
    fn test_display() {
        assert_eq!(range(10, 40).to_string(), "(10,40]");
        let big = Natural::from(1u32) << 100u64;
        assert_eq!(
            RingRange::new(big, n(0)).to_string(),
            "(1267650600228229401496703205376,0]"
        );
    }

    #[test]
    fn test_tiling_spans_sum_to_ring_size() {
        let ring_size = n(100);
        let tiling = [range(0, 25), range(25, 60), range(60, 95), range(95, 0)];
        let total = tiling
            .iter()
            .fold(n(0), |acc, r| acc + r.span(&ring_size));
        assert_eq!(total, ring_size);
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let big = Natural::from(1u32) << 127u64;
        let r = RingRange::new(big.clone(), n(3));
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(
            json,
            r#"{"start":"170141183460469231731687303715884105728","end":"3"}"#
        );
        let back: RingRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
