//! Key layout of the indexer's persisted state.
//!
//! The key space is partitioned into families by short static prefixes.
//! Every numeric field is big-endian fixed-width, so lexicographic byte
//! order equals numeric order and every "oldest first" or "per epoch in
//! insertion order" query is a plain forward scan.
//!
//! | Family | Key | Value |
//! |---|---|---|
//! | order forward | `ORDER ‖ seq:u64` | tx hash |
//! | order reverse | `ORDER_REV ‖ txHash` | seq:u64 |
//! | ref forward | `UTXO_REF ‖ utxoId ‖ seq:u64` | tx hash |
//! | ref reverse | `UTXO_REF_REV ‖ txHash ‖ utxoId` | seq:u64 |
//! | ref count | `UTXO_REF_COUNT ‖ utxoId` | count:u32 |
//! | epoch forward | `EPOCH_LIST ‖ epoch:u32 ‖ seq:u64` | tx hash |
//! | epoch reverse | `EPOCH_LIST_REV ‖ txHash` | epoch:u32 ‖ seq:u64 |
//!
//! Each index that allocates sequence numbers persists its counter at the
//! **bare prefix** of its forward family. The bare prefix is strictly
//! shorter than every composite key under it, so it sorts before them all
//! and range scans that start at `prefix ‖ zeros` never observe it.

use crate::{IndexError, IndexResult, TxHash};
use pendex_kv::{KvRead, KvScan, KvWrite};

/// A static byte prefix namespacing one key family.
///
/// Prefixes are 2 to 4 bytes. The indexer owns its prefixes exclusively;
/// no other subsystem may write keys under them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix(&'static [u8]);

impl Prefix {
    /// Create a prefix from a static byte string of 2 to 4 bytes.
    pub const fn new(bytes: &'static [u8]) -> Self {
        assert!(bytes.len() >= 2 && bytes.len() <= 4, "key prefixes are 2 to 4 bytes");
        Self(bytes)
    }

    /// The raw prefix bytes.
    pub const fn as_bytes(&self) -> &'static [u8] {
        self.0
    }

    /// The prefix length in bytes.
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; prefixes are non-empty by construction.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Build a key under this prefix.
    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.0.len() + suffix.len());
        key.extend_from_slice(self.0);
        key.extend_from_slice(suffix);
        key
    }

    /// The bare-prefix key holding this family's sequence counter.
    pub const fn counter_key(&self) -> &'static [u8] {
        self.0
    }
}

/// Key family prefixes of the pending transaction indexer.
pub mod prefix {
    use super::Prefix;

    /// Insertion-order forward entries, plus the order sequence counter.
    pub const ORDER: Prefix = Prefix::new(b"io");

    /// Insertion-order reverse entries (tx hash to sequence number).
    pub const ORDER_REV: Prefix = Prefix::new(b"ir");

    /// UTXO reference forward edges, plus the reference sequence counter.
    pub const UTXO_REF: Prefix = Prefix::new(b"uf");

    /// UTXO reference reverse edges (tx hash to consumed UTXOs).
    pub const UTXO_REF_REV: Prefix = Prefix::new(b"ur");

    /// Per-UTXO reference counts.
    pub const UTXO_REF_COUNT: Prefix = Prefix::new(b"uc");

    /// Epoch-ordered expiration entries, plus the expiration counter.
    pub const EPOCH_LIST: Prefix = Prefix::new(b"ef");

    /// Expiration reverse entries (tx hash to epoch and sequence).
    pub const EPOCH_LIST_REV: Prefix = Prefix::new(b"er");
}

/// Allocate the next sequence number for a family, inside `txn`.
///
/// The last-used value is persisted at the family's bare-prefix key, so
/// aborting the transaction releases the allocation while committed
/// allocations stay strictly increasing across process restarts.
pub(crate) fn next_seq<W: KvWrite>(txn: &W, family: Prefix) -> IndexResult<u64, W::Error> {
    let key = family.counter_key();
    let last = match txn.raw_get(key)? {
        Some(raw) => decode_seq(&raw)?,
        None => 0,
    };
    let seq = last.checked_add(1).ok_or(IndexError::Invariant("sequence counter exhausted"))?;
    txn.queue_raw_put(key, &seq.to_be_bytes())?;
    Ok(seq)
}

/// Collect every `(key, value)` pair under `scan_prefix`, as owned bytes.
///
/// Owned output lets callers mutate the transaction afterwards without
/// holding a cursor across the writes.
pub(crate) fn collect_family<R: KvRead>(
    txn: &R,
    scan_prefix: &[u8],
) -> IndexResult<Vec<(Vec<u8>, Vec<u8>)>, R::Error> {
    let mut scan = txn.raw_scan()?;
    let mut out = Vec::new();
    let mut entry = scan.lower_bound(scan_prefix)?.map(to_owned_entry);
    while let Some((key, value)) = entry {
        if !key.starts_with(scan_prefix) {
            break;
        }
        out.push((key, value));
        entry = scan.read_next()?.map(to_owned_entry);
    }
    Ok(out)
}

pub(crate) fn to_owned_entry(entry: pendex_kv::RawKeyValue<'_>) -> (Vec<u8>, Vec<u8>) {
    (entry.0.into_owned(), entry.1.into_owned())
}

/// Decode a big-endian `u64` sequence value.
pub(crate) fn decode_seq<E: std::error::Error>(data: &[u8]) -> Result<u64, IndexError<E>> {
    let bytes: [u8; 8] =
        data.try_into().map_err(|_| IndexError::Invariant("malformed sequence value"))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Decode a big-endian `u32` reference count value.
pub(crate) fn decode_count<E: std::error::Error>(data: &[u8]) -> Result<u32, IndexError<E>> {
    let bytes: [u8; 4] =
        data.try_into().map_err(|_| IndexError::Invariant("malformed reference count"))?;
    Ok(u32::from_be_bytes(bytes))
}

/// Decode a stored 32-byte hash (tx hash or UTXO id).
pub(crate) fn decode_hash<E: std::error::Error>(data: &[u8]) -> Result<TxHash, IndexError<E>> {
    TxHash::try_from(data).map_err(|_| IndexError::Invariant("malformed 32-byte hash"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_keys_sort_after_their_counter() {
        let counter = prefix::ORDER.counter_key().to_vec();
        let first_entry = prefix::ORDER.key(&0u64.to_be_bytes());
        assert!(counter < first_entry);
    }

    #[test]
    fn big_endian_keys_sort_numerically() {
        let low = prefix::ORDER.key(&7u64.to_be_bytes());
        let high = prefix::ORDER.key(&300u64.to_be_bytes());
        assert!(low < high);
    }

    #[test]
    fn prefixes_are_distinct() {
        let all = [
            prefix::ORDER,
            prefix::ORDER_REV,
            prefix::UTXO_REF,
            prefix::UTXO_REF_REV,
            prefix::UTXO_REF_COUNT,
            prefix::EPOCH_LIST,
            prefix::EPOCH_LIST_REV,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.as_bytes(), b.as_bytes());
            }
        }
    }
}
