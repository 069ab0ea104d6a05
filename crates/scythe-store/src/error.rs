//! Error types for repair storage operations.

/// Errors that can occur during repair storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind (`"cluster"`, `"repair run"`, ...).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// An entity with the same identity is already stored.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Entity kind.
        kind: &'static str,
        /// Conflicting identifier.
        id: String,
    },

    /// Fjall database error.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// I/O error (e.g. from Fjall guard operations).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] postcard::Error),
}
