//! Error types for token parsing and segment generation.

/// Errors raised while interpreting tokens or tiling the ring.
///
/// [`RingRange`](crate::RingRange) itself never fails; these come from the
/// partitioner and the segment generator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// The partitioner class name is not one we know how to tile.
    #[error("unknown partitioner: {0}")]
    UnknownPartitioner(String),

    /// A token string is not a decimal integer.
    #[error("invalid token: {0:?}")]
    InvalidToken(String),

    /// A token lies outside the partitioner's token space.
    #[error("token {token} outside of partitioner range [{min}, {max}]")]
    TokenOutOfRange {
        /// The offending token.
        token: String,
        /// Smallest valid token.
        min: String,
        /// Largest valid token.
        max: String,
    },

    /// Two consecutive tokens are equal in a ring with more than one token.
    #[error("duplicate token {0} in ring")]
    DuplicateToken(String),

    /// The ring has no tokens at all.
    #[error("ring has no tokens")]
    NoTokens,

    /// Zero segments were requested.
    #[error("segment count must be positive")]
    ZeroSegments,

    /// The generated segments do not add up to the whole ring.
    #[error("segments cover {covered} of a ring of size {ring_size}")]
    IncompleteCoverage {
        /// Sum of all segment spans.
        covered: String,
        /// Size of the ring.
        ring_size: String,
    },
}
