//! Bounded many-to-many index between transactions and the UTXOs they
//! consume.

use crate::{
    IndexError, IndexResult, TxHash, UtxoId,
    keys::{Prefix, collect_family, decode_count, decode_hash, decode_seq, next_seq, to_owned_entry},
};
use pendex_kv::{KvRead, KvScan, KvWrite};

/// Tracks which pending transactions reference which UTXOs, with a hard
/// per-UTXO cap on the number of referrers.
///
/// Three key families: forward edges (`prefix ‖ utxoId ‖ seq` to tx hash),
/// reverse edges (`rev_prefix ‖ txHash ‖ utxoId` to seq), and per-UTXO
/// counts (`count_prefix ‖ utxoId`). The sequence number embedded in the
/// forward key is allocated per added transaction and strictly increases,
/// so the store's lexicographic scan over a UTXO's forward family *is*
/// its referrers in oldest-first order; eviction needs no separate
/// priority structure.
///
/// When adding a reference pushes a UTXO's count past the cap, the oldest
/// referrer is reported as evicted. The composite indexer then removes
/// the evicted transaction from every index, which decrements the count
/// back within bounds.
#[derive(Debug, Clone, Copy)]
pub struct RefLinker {
    prefix: Prefix,
    rev_prefix: Prefix,
    count_prefix: Prefix,
    max_refs: u32,
}

impl RefLinker {
    /// Create a linker over the given key families with the given
    /// per-UTXO reference cap.
    pub const fn new(
        prefix: Prefix,
        rev_prefix: Prefix,
        count_prefix: Prefix,
        max_refs: u32,
    ) -> Self {
        Self { prefix, rev_prefix, count_prefix, max_refs }
    }

    /// Record that `tx_hash` consumes each UTXO in `utxo_ids`.
    ///
    /// Returns the transactions evicted by cap overflow, oldest referrer
    /// first, deduplicated. The caller must purge each one from all
    /// indices. A repeated UTXO in `utxo_ids` fails with
    /// [`IndexError::DuplicateUtxo`] before anything is written.
    pub fn add<W: KvWrite>(
        &self,
        txn: &W,
        tx_hash: TxHash,
        utxo_ids: &[UtxoId],
    ) -> IndexResult<Vec<TxHash>, W::Error> {
        for (i, utxo) in utxo_ids.iter().enumerate() {
            if utxo_ids[..i].contains(utxo) {
                return Err(IndexError::DuplicateUtxo(*utxo));
            }
        }

        let seq = next_seq(txn, self.prefix)?;
        let mut evicted: Vec<TxHash> = Vec::new();
        for utxo in utxo_ids {
            let count_key = self.count_prefix.key(utxo.as_slice());
            let count = match txn.raw_get(&count_key)? {
                Some(raw) => decode_count(&raw)?,
                None => 0,
            };

            txn.queue_raw_put(&self.fwd_key(utxo, seq), tx_hash.as_slice())?;
            txn.queue_raw_put(&self.rev_key(&tx_hash, utxo), &seq.to_be_bytes())?;

            let count =
                count.checked_add(1).ok_or(IndexError::Invariant("reference count overflow"))?;
            txn.queue_raw_put(&count_key, &count.to_be_bytes())?;

            if count > self.max_refs {
                // The count sits one above the cap until the composite
                // layer purges the victim.
                let victim = self
                    .oldest_referrer(txn, utxo, &tx_hash)?
                    .ok_or(IndexError::Invariant("overflowing utxo has no prior referrer"))?;
                tracing::debug!(
                    target: "pendex::reflink",
                    utxo = %utxo,
                    victim = %victim,
                    "reference cap exceeded, evicting oldest referrer"
                );
                if !evicted.contains(&victim) {
                    evicted.push(victim);
                }
            }
        }
        Ok(evicted)
    }

    /// Remove every reference edge owned by `tx_hash`, decrementing the
    /// count of each touched UTXO and deleting counts that reach zero.
    ///
    /// Fails with [`IndexError::NotFound`] if the transaction owns no
    /// edges.
    pub fn delete<W: KvWrite>(&self, txn: &W, tx_hash: TxHash) -> IndexResult<(), W::Error> {
        let rev_family = self.rev_prefix.key(tx_hash.as_slice());
        let edges = collect_family(txn, &rev_family)?;
        if edges.is_empty() {
            return Err(IndexError::NotFound);
        }

        for (rev_key, raw_seq) in edges {
            let utxo = decode_hash(&rev_key[rev_family.len()..])?;
            let seq = decode_seq(&raw_seq)?;
            txn.queue_raw_delete(&self.fwd_key(&utxo, seq))?;
            txn.queue_raw_delete(&rev_key)?;
            self.decrement(txn, &utxo)?;
        }
        Ok(())
    }

    /// Collect the fallout of `tx_hash` being mined: every *other* pending
    /// transaction referencing any UTXO it consumed is now a double-spend.
    ///
    /// Returns `(victims, utxo_ids)`, both deduplicated; nothing is
    /// deleted here. The composite layer removes the mined transaction
    /// and each victim from all indices, keeping them consistent. A mined
    /// transaction with no indexed references yields empty vectors.
    pub fn delete_mined<R: KvRead>(
        &self,
        txn: &R,
        tx_hash: TxHash,
    ) -> IndexResult<(Vec<TxHash>, Vec<UtxoId>), R::Error> {
        let rev_family = self.rev_prefix.key(tx_hash.as_slice());
        let edges = collect_family(txn, &rev_family)?;
        if edges.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut utxo_ids = Vec::with_capacity(edges.len());
        for (rev_key, _) in &edges {
            utxo_ids.push(decode_hash::<R::Error>(&rev_key[rev_family.len()..])?);
        }

        let mut victims: Vec<TxHash> = Vec::new();
        for utxo in &utxo_ids {
            for (_, raw_hash) in collect_family(txn, &self.prefix.key(utxo.as_slice()))? {
                let rival = decode_hash(&raw_hash)?;
                // A rival referencing several of the same UTXOs is
                // collected once.
                if rival != tx_hash && !victims.contains(&rival) {
                    victims.push(rival);
                }
            }
        }

        tracing::debug!(
            target: "pendex::reflink",
            mined = %tx_hash,
            victims = victims.len(),
            utxos = utxo_ids.len(),
            "collected double-spend victims of mined transaction"
        );
        Ok((victims, utxo_ids))
    }

    /// The oldest transaction referencing `utxo`, skipping `inserted`.
    ///
    /// The inserted transaction holds the maximum sequence number, so it
    /// can never be the oldest referrer; the skip guards against it
    /// regardless.
    fn oldest_referrer<R: KvRead>(
        &self,
        txn: &R,
        utxo: &UtxoId,
        inserted: &TxHash,
    ) -> IndexResult<Option<TxHash>, R::Error> {
        let family = self.prefix.key(utxo.as_slice());
        let mut scan = txn.raw_scan()?;
        let mut entry = scan.lower_bound(&family)?.map(to_owned_entry);
        while let Some((key, raw_hash)) = entry {
            if !key.starts_with(&family) {
                return Ok(None);
            }
            let referrer = decode_hash(&raw_hash)?;
            if referrer != *inserted {
                return Ok(Some(referrer));
            }
            entry = scan.read_next()?.map(to_owned_entry);
        }
        Ok(None)
    }

    fn decrement<W: KvWrite>(&self, txn: &W, utxo: &UtxoId) -> IndexResult<(), W::Error> {
        let count_key = self.count_prefix.key(utxo.as_slice());
        let Some(raw) = txn.raw_get(&count_key)? else {
            return Err(IndexError::Invariant("reference edge present without a count"));
        };
        match decode_count(&raw)? {
            0 => Err(IndexError::Invariant("reference count underflow")),
            1 => {
                txn.queue_raw_delete(&count_key)?;
                Ok(())
            }
            count => {
                txn.queue_raw_put(&count_key, &(count - 1).to_be_bytes())?;
                Ok(())
            }
        }
    }

    fn fwd_key(&self, utxo: &UtxoId, seq: u64) -> Vec<u8> {
        let mut key = self.prefix.key(utxo.as_slice());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn rev_key(&self, tx_hash: &TxHash, utxo: &UtxoId) -> Vec<u8> {
        let mut key = self.rev_prefix.key(tx_hash.as_slice());
        key.extend_from_slice(utxo.as_slice());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::prefix;
    use pendex_kv::{KvStore, mem::MemKv};

    const LINKER: RefLinker =
        RefLinker::new(prefix::UTXO_REF, prefix::UTXO_REF_REV, prefix::UTXO_REF_COUNT, 3);

    fn hash(byte: u8) -> TxHash {
        TxHash::repeat_byte(byte)
    }

    fn utxo(byte: u8) -> UtxoId {
        UtxoId::repeat_byte(byte)
    }

    fn count_of<R: KvRead>(txn: &R, id: UtxoId) -> Option<u32> {
        txn.raw_get(&prefix::UTXO_REF_COUNT.key(id.as_slice()))
            .unwrap()
            .map(|raw| u32::from_be_bytes(raw.as_ref().try_into().unwrap()))
    }

    #[test]
    fn counts_track_references() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        LINKER.add(&txn, hash(1), &[utxo(0xA1)]).unwrap();
        LINKER.add(&txn, hash(2), &[utxo(0xA2)]).unwrap();
        LINKER.add(&txn, hash(3), &[utxo(0xA1), utxo(0xA3)]).unwrap();

        assert_eq!(count_of(&txn, utxo(0xA1)), Some(2));
        assert_eq!(count_of(&txn, utxo(0xA2)), Some(1));
        assert_eq!(count_of(&txn, utxo(0xA3)), Some(1));
    }

    #[test]
    fn duplicate_utxo_in_one_add_is_rejected() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        let err = LINKER.add(&txn, hash(1), &[utxo(0xA1), utxo(0xA1)]).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateUtxo(u) if u == utxo(0xA1)));

        // Nothing was written
        assert_eq!(count_of(&txn, utxo(0xA1)), None);
    }

    #[test]
    fn overflow_evicts_oldest_referrer() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        for byte in 1..=3 {
            assert!(LINKER.add(&txn, hash(byte), &[utxo(0xA1)]).unwrap().is_empty());
        }

        let evicted = LINKER.add(&txn, hash(4), &[utxo(0xA1)]).unwrap();
        assert_eq!(evicted, vec![hash(1)]);

        // The count stays one over the cap until the victim is purged
        assert_eq!(count_of(&txn, utxo(0xA1)), Some(4));
        LINKER.delete(&txn, hash(1)).unwrap();
        assert_eq!(count_of(&txn, utxo(0xA1)), Some(3));
    }

    #[test]
    fn shared_victim_is_reported_once() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        // hash(1) is the oldest referrer of both UTXOs
        LINKER.add(&txn, hash(1), &[utxo(0xA1), utxo(0xA2)]).unwrap();
        for byte in 2..=3 {
            LINKER.add(&txn, hash(byte), &[utxo(0xA1), utxo(0xA2)]).unwrap();
        }

        let evicted = LINKER.add(&txn, hash(4), &[utxo(0xA1), utxo(0xA2)]).unwrap();
        assert_eq!(evicted, vec![hash(1)]);
    }

    #[test]
    fn delete_removes_edges_and_zero_counts() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        LINKER.add(&txn, hash(1), &[utxo(0xA1), utxo(0xA2)]).unwrap();
        LINKER.add(&txn, hash(2), &[utxo(0xA1)]).unwrap();

        LINKER.delete(&txn, hash(1)).unwrap();
        assert_eq!(count_of(&txn, utxo(0xA1)), Some(1));
        assert_eq!(count_of(&txn, utxo(0xA2)), None);

        assert!(matches!(LINKER.delete(&txn, hash(1)), Err(IndexError::NotFound)));
    }

    #[test]
    fn delete_mined_collects_rivals() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        LINKER.add(&txn, hash(1), &[utxo(0xA1)]).unwrap();
        LINKER.add(&txn, hash(2), &[utxo(0xA2)]).unwrap();
        LINKER.add(&txn, hash(3), &[utxo(0xA1), utxo(0xA3)]).unwrap();

        let (victims, utxos) = LINKER.delete_mined(&txn, hash(1)).unwrap();
        assert_eq!(victims, vec![hash(3)]);
        assert_eq!(utxos, vec![utxo(0xA1)]);
    }

    #[test]
    fn delete_mined_without_references_is_empty() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        let (victims, utxos) = LINKER.delete_mined(&txn, hash(9)).unwrap();
        assert!(victims.is_empty());
        assert!(utxos.is_empty());
    }

    #[test]
    fn works_across_committed_transactions() {
        let kv = MemKv::new();

        {
            let txn = kv.writer().unwrap();
            for byte in 1..=3 {
                LINKER.add(&txn, hash(byte), &[utxo(0xA1)]).unwrap();
            }
            txn.raw_commit().unwrap();
        }

        let txn = kv.writer().unwrap();
        let evicted = LINKER.add(&txn, hash(4), &[utxo(0xA1)]).unwrap();
        assert_eq!(evicted, vec![hash(1)]);
    }
}
