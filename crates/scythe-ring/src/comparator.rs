//! Ordering helpers for ring positions and tokens.
//!
//! These are ordinary integer comparisons. The "ring" semantics come entirely
//! from how [`RingRange`](crate::RingRange) and the segment generator combine
//! them, so every wraparound test in the crate is expressed through this
//! module.

/// Whether `a` is at or after `b`.
pub fn greater_than_or_equal<T: Ord + ?Sized>(a: &T, b: &T) -> bool {
    a >= b
}

/// Whether `a` is at or before `b`.
pub fn lower_than_or_equal<T: Ord + ?Sized>(a: &T, b: &T) -> bool {
    a <= b
}

/// Whether `a` is strictly after `b`.
pub fn greater_than<T: Ord + ?Sized>(a: &T, b: &T) -> bool {
    a > b
}

/// Whether `a` is strictly before `b`.
pub fn lower_than<T: Ord + ?Sized>(a: &T, b: &T) -> bool {
    a < b
}

#[cfg(test)]
mod tests {
    use malachite::{Integer, Natural};

    use super::*;

    #[test]
    fn test_reflexive() {
        let n = Natural::from(42u32);
        assert!(greater_than_or_equal(&n, &n));
        assert!(lower_than_or_equal(&n, &n));
        assert!(!greater_than(&n, &n));
        assert!(!lower_than(&n, &n));
    }

    #[test]
    fn test_relations_are_mirrored() {
        let values = [0u32, 1, 7, 99, 100];
        for a in values {
            for b in values {
                let (a, b) = (Natural::from(a), Natural::from(b));
                assert_eq!(
                    lower_than_or_equal(&a, &b),
                    greater_than_or_equal(&b, &a),
                    "mismatch for {a} and {b}"
                );
                assert_eq!(lower_than(&a, &b), greater_than(&b, &a));
            }
        }
    }

    #[test]
    fn test_beyond_machine_words() {
        let big = Natural::from(1u32) << 127u64;
        let bigger = &big + Natural::from(1u32);
        assert!(greater_than(&bigger, &big));
        assert!(lower_than_or_equal(&big, &bigger));
    }

    #[test]
    fn test_signed_tokens() {
        let low = -(Integer::from(1u32) << 63u64);
        let zero = Integer::from(0);
        assert!(lower_than(&low, &zero));
        assert!(greater_than_or_equal(&zero, &low));
    }
}
