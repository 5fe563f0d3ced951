use crate::{TxHash, UtxoId};

/// A result type for indexer operations.
pub type IndexResult<T, E> = Result<T, IndexError<E>>;

/// Error type for indexer operations.
///
/// Generic over the KV backend error, which is propagated unchanged
/// through the [`Storage`](IndexError::Storage) variant. Everything else
/// is a domain error: the caller should discard the enclosing transaction
/// on any error other than the swallowed [`NotFound`](IndexError::NotFound)
/// cases inside the composite delete fan-out.
#[derive(Debug, thiserror::Error)]
pub enum IndexError<E: std::error::Error> {
    /// A key expected to exist was absent.
    ///
    /// Surfaced on point-get paths; swallowed inside the composite's
    /// idempotent delete fan-out (an evicted entry may already be gone).
    #[error("entry not found")]
    NotFound,

    /// The transaction is already indexed.
    #[error("transaction {0} is already indexed")]
    Duplicate(TxHash),

    /// A transaction listed the same UTXO more than once. Consuming one
    /// output twice is malformed, so nothing is written.
    #[error("utxo {0} repeated in reference list")]
    DuplicateUtxo(UtxoId),

    /// Epoch zero is reserved; no expiry threshold could ever sweep it.
    #[error("expiration epoch must be nonzero")]
    ZeroEpoch,

    /// Detected inconsistency between key families. Fatal; the store
    /// contents are not trustworthy past this point.
    #[error("index invariant violated: {0}")]
    Invariant(&'static str),

    /// Error from the KV layer, propagated unchanged.
    #[error("{0}")]
    Storage(#[from] E),
}

impl<E: std::error::Error> IndexError<E> {
    /// True for the absent-entry case swallowed by idempotent deletes.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
