//! Composite indexer over the pending transaction pool.

use crate::{
    Epoch, EpochConstrainedList, IndexResult, InsertionOrderIndex, OrderedIter, RefLinker, TxHash,
    UtxoId,
    keys::prefix,
};
use pendex_kv::{KvRead, KvWrite};

/// Default cap on the number of pending transactions that may reference
/// one UTXO.
///
/// Kept to a small single digit to bound mempool amplification: every
/// referrer past the first is a potential double-spend that will be
/// purged when one of them is mined.
pub const DEFAULT_MAX_UTXO_REFS: u32 = 4;

/// Configuration for the pending transaction indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerConfig {
    max_utxo_refs: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexerConfig {
    /// Create a configuration with default values.
    pub const fn new() -> Self {
        Self { max_utxo_refs: DEFAULT_MAX_UTXO_REFS }
    }

    /// Set the per-UTXO reference cap.
    pub const fn with_max_utxo_refs(mut self, max_utxo_refs: u32) -> Self {
        self.max_utxo_refs = max_utxo_refs;
        self
    }

    /// The per-UTXO reference cap.
    pub const fn max_utxo_refs(&self) -> u32 {
        self.max_utxo_refs
    }
}

/// The indexer for the pending transaction pool.
///
/// Holds the three secondary indices and fans every operation out to them
/// in a fixed order, so that the set of indexed transactions stays
/// identical across all three at every commit. The indexer is the
/// exclusive owner of its key prefixes; the caller owns the enclosing
/// transaction and decides whether to commit or discard it.
///
/// Deletion through [`delete_one`](Self::delete_one) is idempotent by
/// design: an eviction during [`add`](Self::add) already removes part of
/// an entry, so the full fan-out must tolerate partial state.
#[derive(Debug, Clone, Copy)]
pub struct PendingTxIndexer {
    order: InsertionOrderIndex,
    reflink: RefLinker,
    expiration: EpochConstrainedList,
}

impl PendingTxIndexer {
    /// Create an indexer with the given configuration.
    pub const fn new(config: IndexerConfig) -> Self {
        Self {
            order: InsertionOrderIndex::new(prefix::ORDER, prefix::ORDER_REV),
            reflink: RefLinker::new(
                prefix::UTXO_REF,
                prefix::UTXO_REF_REV,
                prefix::UTXO_REF_COUNT,
                config.max_utxo_refs,
            ),
            expiration: EpochConstrainedList::new(prefix::EPOCH_LIST, prefix::EPOCH_LIST_REV),
        }
    }

    /// Index a pending transaction expiring at `epoch` and consuming
    /// `utxo_ids`.
    ///
    /// Returns the transactions evicted to keep every referenced UTXO
    /// within the reference cap; each has already been removed from all
    /// three indices. The returned hashes are owned by the caller.
    pub fn add<W: KvWrite>(
        &self,
        txn: &W,
        epoch: Epoch,
        tx_hash: TxHash,
        utxo_ids: &[UtxoId],
    ) -> IndexResult<Vec<TxHash>, W::Error> {
        self.order.add(txn, tx_hash)?;
        let evicted = self.reflink.add(txn, tx_hash, utxo_ids)?;
        for victim in &evicted {
            self.delete_one(txn, *victim)?;
        }
        self.expiration.append(txn, epoch, tx_hash)?;
        Ok(evicted)
    }

    /// Remove one transaction from all three indices.
    ///
    /// Absent sub-entries are tolerated, so deleting an already purged or
    /// partially purged transaction succeeds and leaves state unchanged.
    pub fn delete_one<W: KvWrite>(&self, txn: &W, tx_hash: TxHash) -> IndexResult<(), W::Error> {
        swallow_not_found(self.reflink.delete(txn, tx_hash))?;
        swallow_not_found(self.order.delete(txn, tx_hash))?;
        swallow_not_found(self.expiration.drop(txn, tx_hash))?;
        Ok(())
    }

    /// Remove a mined transaction and every pending transaction that
    /// referenced a UTXO it consumed (they are now provably invalid).
    ///
    /// Returns the removed hashes (the mined one included) and the
    /// consumed UTXO ids.
    pub fn delete_mined<W: KvWrite>(
        &self,
        txn: &W,
        tx_hash: TxHash,
    ) -> IndexResult<(Vec<TxHash>, Vec<UtxoId>), W::Error> {
        let (mut victims, utxo_ids) = self.reflink.delete_mined(txn, tx_hash)?;
        victims.push(tx_hash);
        for victim in &victims {
            self.delete_one(txn, *victim)?;
        }
        Ok((victims, utxo_ids))
    }

    /// Remove every transaction expiring before `epoch`, returning the
    /// removed hashes.
    pub fn drop_before<W: KvWrite>(
        &self,
        txn: &W,
        epoch: Epoch,
    ) -> IndexResult<Vec<TxHash>, W::Error> {
        let victims = self.expiration.drop_before(txn, epoch)?;
        for victim in &victims {
            self.delete_one(txn, *victim)?;
        }
        Ok(victims)
    }

    /// The epoch at which `tx_hash` expires.
    pub fn get_epoch<R: KvRead>(&self, txn: &R, tx_hash: TxHash) -> IndexResult<Epoch, R::Error> {
        self.expiration.get_epoch(txn, tx_hash)
    }

    /// Open an iterator over the pending transactions in insertion order.
    pub fn ordered_iter<'a, R: KvRead>(
        &self,
        txn: &'a R,
    ) -> IndexResult<OrderedIter<'a, R>, R::Error> {
        self.order.iter(txn)
    }
}

/// Recover `NotFound` locally; everything else propagates.
fn swallow_not_found<T, E: std::error::Error>(
    result: IndexResult<T, E>,
) -> IndexResult<Option<T>, E> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexError;

    #[test]
    fn config_defaults_and_builder() {
        let config = IndexerConfig::default();
        assert_eq!(config.max_utxo_refs(), DEFAULT_MAX_UTXO_REFS);

        let config = config.with_max_utxo_refs(3);
        assert_eq!(config.max_utxo_refs(), 3);
    }

    #[test]
    fn swallow_not_found_passes_other_errors() {
        let ok: IndexResult<u8, std::io::Error> = Ok(7);
        assert_eq!(swallow_not_found(ok).unwrap(), Some(7));

        let missing: IndexResult<u8, std::io::Error> = Err(IndexError::NotFound);
        assert_eq!(swallow_not_found(missing).unwrap(), None);

        let fatal: IndexResult<u8, std::io::Error> = Err(IndexError::ZeroEpoch);
        assert!(swallow_not_found(fatal).is_err());
    }
}
