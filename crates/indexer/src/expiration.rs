//! Epoch-scoped expiration list over the pending transaction set.

use crate::{
    Epoch, IndexError, IndexResult, TxHash,
    keys::{Prefix, decode_hash, next_seq, to_owned_entry},
};
use pendex_kv::{KvRead, KvScan, KvWrite};

/// Width of the `epoch ‖ seq` suffix and reverse value.
const LOC_LEN: usize = 4 + 8;

/// An epoch-keyed multimap of transaction hashes supporting bulk expiry.
///
/// Forward entries live under `prefix ‖ epoch ‖ seq`, so iteration is
/// strictly (epoch ascending, insertion order ascending) and expiring
/// everything before a threshold is a single bounded forward scan. The
/// reverse family maps a hash back to its `epoch ‖ seq` location for
/// point deletes and epoch lookups.
#[derive(Debug, Clone, Copy)]
pub struct EpochConstrainedList {
    prefix: Prefix,
    rev_prefix: Prefix,
}

impl EpochConstrainedList {
    /// Create a list over the given forward and reverse key families.
    pub const fn new(prefix: Prefix, rev_prefix: Prefix) -> Self {
        Self { prefix, rev_prefix }
    }

    /// Record that `tx_hash` expires at `epoch`.
    ///
    /// Fails with [`IndexError::ZeroEpoch`] for the reserved zero epoch
    /// and [`IndexError::Duplicate`] if the hash is already listed.
    pub fn append<W: KvWrite>(
        &self,
        txn: &W,
        epoch: Epoch,
        tx_hash: TxHash,
    ) -> IndexResult<(), W::Error> {
        if epoch == 0 {
            return Err(IndexError::ZeroEpoch);
        }
        let rev_key = self.rev_prefix.key(tx_hash.as_slice());
        if txn.raw_get(&rev_key)?.is_some() {
            return Err(IndexError::Duplicate(tx_hash));
        }

        let seq = next_seq(txn, self.prefix)?;
        let loc = encode_loc(epoch, seq);
        txn.queue_raw_put(&self.prefix.key(&loc), tx_hash.as_slice())?;
        txn.queue_raw_put(&rev_key, &loc)?;
        Ok(())
    }

    /// Remove `tx_hash` from the list.
    ///
    /// Fails with [`IndexError::NotFound`] if the hash is not listed.
    pub fn drop<W: KvWrite>(&self, txn: &W, tx_hash: TxHash) -> IndexResult<(), W::Error> {
        let rev_key = self.rev_prefix.key(tx_hash.as_slice());
        let Some(raw) = txn.raw_get(&rev_key)? else {
            return Err(IndexError::NotFound);
        };
        let loc = decode_loc(&raw)?;

        txn.queue_raw_delete(&self.prefix.key(&loc))?;
        txn.queue_raw_delete(&rev_key)?;
        Ok(())
    }

    /// The epoch at which `tx_hash` expires.
    ///
    /// Fails with [`IndexError::NotFound`] if the hash is not listed.
    pub fn get_epoch<R: KvRead>(&self, txn: &R, tx_hash: TxHash) -> IndexResult<Epoch, R::Error> {
        let rev_key = self.rev_prefix.key(tx_hash.as_slice());
        let Some(raw) = txn.raw_get(&rev_key)? else {
            return Err(IndexError::NotFound);
        };
        let loc = decode_loc(&raw)?;
        Ok(u32::from_be_bytes([loc[0], loc[1], loc[2], loc[3]]))
    }

    /// Remove every entry with epoch strictly less than `epoch`, returning
    /// the removed hashes in (epoch, insertion-order) order.
    ///
    /// Cost is proportional to the number of removed entries. Entries are
    /// collected first and deleted after, so the cursor never observes its
    /// own mutations.
    pub fn drop_before<W: KvWrite>(
        &self,
        txn: &W,
        epoch: Epoch,
    ) -> IndexResult<Vec<TxHash>, W::Error> {
        let mut expired: Vec<(Vec<u8>, TxHash)> = Vec::new();
        {
            let mut scan = txn.raw_scan()?;
            let mut entry = scan.lower_bound(&self.prefix.key(&[0u8; LOC_LEN]))?.map(to_owned_entry);
            while let Some((key, raw_hash)) = entry {
                if !key.starts_with(self.prefix.as_bytes()) {
                    break;
                }
                let suffix = &key[self.prefix.len()..];
                if suffix.len() != LOC_LEN {
                    return Err(IndexError::Invariant("malformed expiration entry"));
                }
                let entry_epoch =
                    u32::from_be_bytes([suffix[0], suffix[1], suffix[2], suffix[3]]);
                if entry_epoch >= epoch {
                    break;
                }
                let hash = decode_hash(&raw_hash)?;
                expired.push((key, hash));
                entry = scan.read_next()?.map(to_owned_entry);
            }
        }

        let mut victims = Vec::with_capacity(expired.len());
        for (key, hash) in expired {
            txn.queue_raw_delete(&key)?;
            txn.queue_raw_delete(&self.rev_prefix.key(hash.as_slice()))?;
            victims.push(hash);
        }
        if !victims.is_empty() {
            tracing::debug!(
                target: "pendex::expiration",
                before = epoch,
                dropped = victims.len(),
                "swept expired entries"
            );
        }
        Ok(victims)
    }
}

fn encode_loc(epoch: Epoch, seq: u64) -> [u8; LOC_LEN] {
    let mut loc = [0u8; LOC_LEN];
    loc[..4].copy_from_slice(&epoch.to_be_bytes());
    loc[4..].copy_from_slice(&seq.to_be_bytes());
    loc
}

fn decode_loc<E: std::error::Error>(data: &[u8]) -> Result<[u8; LOC_LEN], IndexError<E>> {
    data.try_into().map_err(|_| IndexError::Invariant("malformed expiration location"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::prefix;
    use pendex_kv::{KvStore, mem::MemKv};

    const LIST: EpochConstrainedList =
        EpochConstrainedList::new(prefix::EPOCH_LIST, prefix::EPOCH_LIST_REV);

    fn hash(byte: u8) -> TxHash {
        TxHash::repeat_byte(byte)
    }

    #[test]
    fn zero_epoch_is_rejected() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        assert!(matches!(LIST.append(&txn, 0, hash(1)), Err(IndexError::ZeroEpoch)));
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        LIST.append(&txn, 5, hash(1)).unwrap();
        let err = LIST.append(&txn, 6, hash(1)).unwrap_err();
        assert!(matches!(err, IndexError::Duplicate(h) if h == hash(1)));
    }

    #[test]
    fn get_epoch_roundtrip() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        LIST.append(&txn, 7, hash(1)).unwrap();
        assert_eq!(LIST.get_epoch(&txn, hash(1)).unwrap(), 7);
        assert!(matches!(LIST.get_epoch(&txn, hash(2)), Err(IndexError::NotFound)));
    }

    #[test]
    fn drop_then_drop_again_reports_not_found() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        LIST.append(&txn, 5, hash(1)).unwrap();
        LIST.drop(&txn, hash(1)).unwrap();
        assert!(matches!(LIST.drop(&txn, hash(1)), Err(IndexError::NotFound)));
        assert!(matches!(LIST.get_epoch(&txn, hash(1)), Err(IndexError::NotFound)));
    }

    #[test]
    fn drop_before_is_strict() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        LIST.append(&txn, 1, hash(0xA1)).unwrap();
        LIST.append(&txn, 2, hash(0xA2)).unwrap();
        LIST.append(&txn, 3, hash(0xA3)).unwrap();

        let victims = LIST.drop_before(&txn, 3).unwrap();
        assert_eq!(victims, vec![hash(0xA1), hash(0xA2)]);

        // The threshold epoch itself survives
        assert_eq!(LIST.get_epoch(&txn, hash(0xA3)).unwrap(), 3);
        assert!(matches!(LIST.get_epoch(&txn, hash(0xA1)), Err(IndexError::NotFound)));
    }

    #[test]
    fn drop_before_orders_within_epoch_by_insertion() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        LIST.append(&txn, 2, hash(3)).unwrap();
        LIST.append(&txn, 1, hash(2)).unwrap();
        LIST.append(&txn, 2, hash(1)).unwrap();

        let victims = LIST.drop_before(&txn, 9).unwrap();
        assert_eq!(victims, vec![hash(2), hash(3), hash(1)]);
    }

    #[test]
    fn drop_before_on_empty_list_is_empty() {
        let kv = MemKv::new();
        let txn = kv.writer().unwrap();

        assert!(LIST.drop_before(&txn, 10).unwrap().is_empty());
    }
}
