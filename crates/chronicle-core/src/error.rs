//! Domain error types.

use thiserror::Error;

use crate::datetime::Datetime;
use crate::identifier::Identifier;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Identifier),

    /// Optimistic concurrency conflict: the stored history moved past the
    /// writer's view of the aggregate.
    #[error(
        "optimistic lock conflict on emitter {emitter_id}: last recorded event at {last_recorded}, attempted write at {attempted}"
    )]
    OptimisticLockConflict {
        /// The emitter whose stream was written concurrently.
        emitter_id: Identifier,
        /// Timestamp of the most recent event already in storage.
        last_recorded: Datetime,
        /// Timestamp of the last pending event being written.
        attempted: Datetime,
    },

    /// A comparison operator outside the supported vocabulary.
    #[error("unsupported comparison operator: {0}")]
    UnsupportedOperator(String),

    /// A composite expression type outside the supported vocabulary.
    #[error("unsupported composite expression: {0}")]
    UnsupportedComposite(String),

    /// A collection could not be morphed or decoded into the requested kind.
    #[error("invalid collection type: {0}")]
    InvalidCollectionType(String),

    /// A normalized payload could not be decoded.
    #[error("payload decode error: {0}")]
    PayloadDecode(String),

    /// An identifier (or event emitter) was assigned twice.
    #[error("identifier already assigned: {0}")]
    IdentifierImmutable(Identifier),

    /// A bounded wait elapsed without the awaited condition holding.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::PayloadDecode(err.to_string())
    }
}
