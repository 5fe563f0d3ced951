use crate::model::{KvError, KvReadError, KvScan};
use std::borrow::Cow;

/// Trait for transactional key-value stores.
///
/// This is the top-level trait for KV backends, providing transactional
/// access through read-only and read-write transactions over a single
/// lexicographically ordered key space.
///
/// Consumers hold a store handle and open one transaction per unit of
/// work; all mutations inside a transaction commit atomically via
/// [`KvWrite::raw_commit`], or are discarded when the transaction is
/// dropped.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait KvStore {
    /// The read-only transaction type.
    type RoTx: KvRead;

    /// The read-write transaction type.
    type RwTx: KvWrite;

    /// Create a read-only transaction.
    fn reader(&self) -> Result<Self::RoTx, KvError>;

    /// Create a read-write transaction.
    ///
    /// Backends must enforce single-writer semantics.
    ///
    /// # Returns
    ///
    /// - `Ok(tx)` if the write transaction was created successfully.
    /// - [`Err(KvError::WriteLocked)`] if there is already a write
    ///   transaction in progress.
    /// - [`Err(KvError::Inner)`] if there was an error creating the
    ///   transaction.
    ///
    /// [`Err(KvError::Inner)`]: KvError::Inner
    /// [`Err(KvError::WriteLocked)`]: KvError::WriteLocked
    fn writer(&self) -> Result<Self::RwTx, KvError>;
}

/// Trait for read transactions.
///
/// Provides point gets and ordered cursors. On a write transaction, both
/// observe queued writes merged with committed state (read-your-writes).
pub trait KvRead {
    /// Error type for read operations.
    type Error: KvReadError;

    /// The cursor type for traversing the key space.
    type Scan<'a>: KvScan<Self::Error>
    where
        Self: 'a;

    /// Get a raw value by key.
    ///
    /// The returned borrow is valid until the next operation on this
    /// transaction. Callers that retain the value must copy it first.
    fn raw_get<'a>(&'a self, key: &[u8]) -> Result<Option<Cow<'a, [u8]>>, Self::Error>;

    /// Open a cursor over the key space.
    fn raw_scan(&self) -> Result<Self::Scan<'_>, Self::Error>;
}

/// Trait for write transactions.
///
/// This extends [`KvRead`] with queued mutations. Queued operations are
/// applied in order on [`raw_commit`](KvWrite::raw_commit); dropping the
/// transaction without committing discards them all.
pub trait KvWrite: KvRead {
    /// Queue a put operation.
    ///
    /// The key and value are copied before the call returns; the caller's
    /// buffers are not retained.
    fn queue_raw_put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error>;

    /// Queue a delete operation. Deleting an absent key is a no-op.
    fn queue_raw_delete(&self, key: &[u8]) -> Result<(), Self::Error>;

    /// Commit the queued operations atomically.
    fn raw_commit(self) -> Result<(), Self::Error>;
}
