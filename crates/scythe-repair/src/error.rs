//! Error types for repair operations.

use scythe_types::{RunId, RunState};

/// Errors that can occur while creating or running repairs.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// Failed to access the repair store.
    #[error("store error: {0}")]
    Store(#[from] scythe_store::StoreError),

    /// Bad ring layout or segment request.
    #[error("ring error: {0}")]
    Ring(#[from] scythe_ring::RingError),

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: &'static str,
        /// The missing key.
        id: String,
    },

    /// The run is not in a state that allows the requested action.
    #[error("cannot {action} repair run {run_id} in state {state:?}")]
    InvalidState {
        /// The run.
        run_id: RunId,
        /// Its current state.
        state: RunState,
        /// What was attempted.
        action: &'static str,
    },

    /// Intensity must lie in `(0, 1]`.
    #[error("invalid intensity {0}: must be in (0, 1]")]
    InvalidIntensity(f64),

    /// More segments were requested than the runner allows.
    #[error("segment count {requested} exceeds the limit of {max}")]
    TooManySegments {
        /// What was asked for.
        requested: u64,
        /// The configured cap.
        max: u64,
    },

    /// The repair of a segment failed on the cluster side.
    #[error("segment repair failed: {0}")]
    Transport(String),
}
