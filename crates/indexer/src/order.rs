//! Insertion-order index over the pending transaction set.

use crate::{
    IndexError, IndexResult, TxHash,
    keys::{Prefix, decode_hash, decode_seq, next_seq},
};
use pendex_kv::{KvRead, KvScan, KvWrite};

/// Assigns each indexed transaction a strictly increasing sequence number,
/// allowing enumeration in insertion order.
///
/// Two key families: forward (`prefix ‖ seq` to tx hash) and reverse
/// (`rev_prefix ‖ txHash` to seq). The last-used sequence number is itself
/// a KV entry at the bare forward prefix, allocated inside the caller's
/// transaction: aborting the transaction releases the number, while
/// committed allocations remain monotone for the lifetime of the store.
#[derive(Debug, Clone, Copy)]
pub struct InsertionOrderIndex {
    prefix: Prefix,
    rev_prefix: Prefix,
}

impl InsertionOrderIndex {
    /// Create an index over the given forward and reverse key families.
    pub const fn new(prefix: Prefix, rev_prefix: Prefix) -> Self {
        Self { prefix, rev_prefix }
    }

    /// Index `tx_hash`, returning its newly allocated sequence number.
    ///
    /// Fails with [`IndexError::Duplicate`] if the hash is already
    /// indexed.
    pub fn add<W: KvWrite>(&self, txn: &W, tx_hash: TxHash) -> IndexResult<u64, W::Error> {
        let rev_key = self.rev_prefix.key(tx_hash.as_slice());
        if txn.raw_get(&rev_key)?.is_some() {
            return Err(IndexError::Duplicate(tx_hash));
        }

        let seq = next_seq(txn, self.prefix)?;
        txn.queue_raw_put(&self.prefix.key(&seq.to_be_bytes()), tx_hash.as_slice())?;
        txn.queue_raw_put(&rev_key, &seq.to_be_bytes())?;
        Ok(seq)
    }

    /// Remove `tx_hash` from the index.
    ///
    /// Fails with [`IndexError::NotFound`] if the hash is not indexed.
    pub fn delete<W: KvWrite>(&self, txn: &W, tx_hash: TxHash) -> IndexResult<(), W::Error> {
        let rev_key = self.rev_prefix.key(tx_hash.as_slice());
        let Some(raw) = txn.raw_get(&rev_key)? else {
            return Err(IndexError::NotFound);
        };
        let seq = decode_seq(&raw)?;

        txn.queue_raw_delete(&self.prefix.key(&seq.to_be_bytes()))?;
        txn.queue_raw_delete(&rev_key)?;
        Ok(())
    }

    /// Open an iterator over the indexed hashes, in insertion order.
    ///
    /// The iterator is restartable by constructing a new one.
    pub fn iter<'a, R: KvRead>(&self, txn: &'a R) -> IndexResult<OrderedIter<'a, R>, R::Error> {
        let scan = txn.raw_scan()?;
        Ok(OrderedIter { scan, prefix: self.prefix, started: false })
    }
}

/// Iterator over indexed transaction hashes, in insertion order.
///
/// Yielded hashes are owned copies, safe to retain past the transaction.
pub struct OrderedIter<'a, R: KvRead + 'a> {
    scan: R::Scan<'a>,
    prefix: Prefix,
    started: bool,
}

impl<R: KvRead> core::fmt::Debug for OrderedIter<'_, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OrderedIter").field("started", &self.started).finish()
    }
}

impl<R: KvRead> OrderedIter<'_, R> {
    /// Advance to the next transaction hash, or `None` past the end.
    ///
    /// The first call seeks past the counter key to the lowest sequence
    /// entry; later calls step the underlying cursor.
    pub fn next_hash(&mut self) -> IndexResult<Option<TxHash>, R::Error> {
        let entry = if self.started {
            self.scan.read_next()?
        } else {
            self.started = true;
            self.scan.lower_bound(&self.prefix.key(&0u64.to_be_bytes()))?
        };

        let Some((key, value)) = entry else {
            return Ok(None);
        };
        if !key.starts_with(self.prefix.as_bytes()) {
            return Ok(None);
        }
        Ok(Some(decode_hash(&value)?))
    }

    /// Drain the remaining hashes into a vector.
    pub fn collect_hashes(&mut self) -> IndexResult<Vec<TxHash>, R::Error> {
        let mut out = Vec::new();
        while let Some(hash) = self.next_hash()? {
            out.push(hash);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::prefix;
    use pendex_kv::{KvStore, mem::MemKv};

    const INDEX: InsertionOrderIndex = InsertionOrderIndex::new(prefix::ORDER, prefix::ORDER_REV);

    fn hash(byte: u8) -> TxHash {
        TxHash::repeat_byte(byte)
    }

    #[test]
    fn sequences_increase_across_commits() {
        let kv = MemKv::new();

        let seq1 = {
            let txn = kv.writer().unwrap();
            let seq = INDEX.add(&txn, hash(1)).unwrap();
            txn.raw_commit().unwrap();
            seq
        };
        let seq2 = {
            let txn = kv.writer().unwrap();
            let seq = INDEX.add(&txn, hash(2)).unwrap();
            txn.raw_commit().unwrap();
            seq
        };

        assert!(seq1 < seq2);
    }

    #[test]
    fn aborted_allocation_is_released() {
        let kv = MemKv::new();

        {
            let txn = kv.writer().unwrap();
            INDEX.add(&txn, hash(1)).unwrap();
            // Dropped without commit
        }
        let txn = kv.writer().unwrap();
        let seq = INDEX.add(&txn, hash(2)).unwrap();
        txn.raw_commit().unwrap();

        assert_eq!(seq, 1);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        INDEX.add(&txn, hash(1)).unwrap();
        assert!(matches!(INDEX.add(&txn, hash(1)), Err(IndexError::Duplicate(h)) if h == hash(1)));
    }

    #[test]
    fn delete_then_delete_again_reports_not_found() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        INDEX.add(&txn, hash(1)).unwrap();
        INDEX.delete(&txn, hash(1)).unwrap();
        assert!(matches!(INDEX.delete(&txn, hash(1)), Err(IndexError::NotFound)));
    }

    #[test]
    fn iterates_in_insertion_order() {
        let kv = MemKv::new();

        {
            let txn = kv.writer().unwrap();
            for byte in [3, 1, 2] {
                INDEX.add(&txn, hash(byte)).unwrap();
            }
            txn.raw_commit().unwrap();
        }

        let txn = kv.reader().unwrap();
        let hashes = INDEX.iter(&txn).unwrap().collect_hashes().unwrap();
        assert_eq!(hashes, vec![hash(3), hash(1), hash(2)]);
    }

    #[test]
    fn iterator_skips_deleted_entries() {
        let kv = MemKv::new();

        {
            let txn = kv.writer().unwrap();
            INDEX.add(&txn, hash(1)).unwrap();
            INDEX.add(&txn, hash(2)).unwrap();
            INDEX.add(&txn, hash(3)).unwrap();
            INDEX.delete(&txn, hash(2)).unwrap();
            txn.raw_commit().unwrap();
        }

        let txn = kv.reader().unwrap();
        let hashes = INDEX.iter(&txn).unwrap().collect_hashes().unwrap();
        assert_eq!(hashes, vec![hash(1), hash(3)]);
    }
}
