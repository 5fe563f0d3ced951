//! In-memory key-value store implementation.
//!
//! This is not a good implementation for production use, but is useful for
//! testing.

use crate::model::{KvError, KvRead, KvScan, KvStore, KvWrite, RawKeyValue, RawValue};
use bytes::Bytes;
use std::{
    borrow::Cow,
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Committed store contents.
type Store = BTreeMap<Box<[u8]>, Bytes>;

/// Operations queued on a write transaction.
type TxOps = BTreeMap<Box<[u8]>, QueuedOp>;

/// A simple in-memory key-value store using a [`BTreeMap`].
///
/// The store is backed by an [`RwLock`]. As a result, this implementation
/// supports multiple concurrent read transactions, but write transactions
/// are exclusive, and cannot overlap with other read or write
/// transactions.
///
/// This implementation is primarily intended for testing and development
/// purposes.
#[derive(Clone)]
pub struct MemKv {
    map: Arc<RwLock<Store>>,
}

impl core::fmt::Debug for MemKv {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKv").finish()
    }
}

impl MemKv {
    /// Create a new empty in-memory KV store.
    pub fn new() -> Self {
        Self { map: Arc::new(RwLock::new(BTreeMap::new())) }
    }
}

impl Default for MemKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemKv {
    type RoTx = MemKvRoTx;
    type RwTx = MemKvRwTx;

    fn reader(&self) -> Result<Self::RoTx, KvError> {
        let guard =
            self.map.try_read().map_err(|_| KvError::Inner("failed to acquire read lock".into()))?;

        // SAFETY: This is safe-ish, as we ensure the map is not dropped until
        // the guard is also dropped.
        let guard: RwLockReadGuard<'static, Store> = unsafe { std::mem::transmute(guard) };

        Ok(MemKvRoTx { guard, _store: self.map.clone() })
    }

    fn writer(&self) -> Result<Self::RwTx, KvError> {
        let guard = self.map.try_write().map_err(|_| KvError::WriteLocked)?;

        // SAFETY: This is safe-ish, as we ensure the map is not dropped until
        // the guard is also dropped.
        let guard: RwLockWriteGuard<'static, Store> = unsafe { std::mem::transmute(guard) };

        Ok(MemKvRwTx { guard, queued: Mutex::new(TxOps::new()), _store: self.map.clone() })
    }
}

/// Queued key-value operation.
#[derive(Debug, Clone)]
enum QueuedOp {
    Delete,
    Put(Bytes),
}

/// Read-only transaction for [`MemKv`].
pub struct MemKvRoTx {
    guard: RwLockReadGuard<'static, Store>,

    // Keep the store alive while the transaction exists
    _store: Arc<RwLock<Store>>,
}

impl core::fmt::Debug for MemKvRoTx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKvRoTx").finish()
    }
}

// SAFETY: MemKvRoTx holds a read guard which ensures the data remains valid
unsafe impl Send for MemKvRoTx {}
unsafe impl Sync for MemKvRoTx {}

impl KvRead for MemKvRoTx {
    type Error = KvError;

    type Scan<'a>
        = MemKvCursor<'a>
    where
        Self: 'a;

    fn raw_get<'a>(&'a self, key: &[u8]) -> Result<Option<Cow<'a, [u8]>>, Self::Error> {
        Ok(self.guard.get(key).map(|bytes| Cow::Borrowed(bytes.as_ref())))
    }

    fn raw_scan(&self) -> Result<Self::Scan<'_>, Self::Error> {
        Ok(MemKvCursor { store: &*self.guard, current: None })
    }
}

/// Read-write transaction for [`MemKv`].
///
/// Mutations are queued and applied to the store on
/// [`raw_commit`](KvWrite::raw_commit). Dropping the transaction discards
/// the queue and releases the write lock.
pub struct MemKvRwTx {
    guard: RwLockWriteGuard<'static, Store>,
    queued: Mutex<TxOps>,

    // Keep the store alive while the transaction exists
    _store: Arc<RwLock<Store>>,
}

impl core::fmt::Debug for MemKvRwTx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKvRwTx").finish()
    }
}

// SAFETY: MemKvRwTx holds a write guard which ensures exclusive access
unsafe impl Send for MemKvRwTx {}

impl KvRead for MemKvRwTx {
    type Error = KvError;

    type Scan<'a>
        = MemKvCursorMut<'a>
    where
        Self: 'a;

    fn raw_get<'a>(&'a self, key: &[u8]) -> Result<Option<Cow<'a, [u8]>>, Self::Error> {
        // Check queued operations first (read-your-writes consistency)
        match self.queued.lock().unwrap().get(key) {
            Some(QueuedOp::Put(value)) => return Ok(Some(Cow::Owned(value.to_vec()))),
            Some(QueuedOp::Delete) => return Ok(None),
            None => {}
        }

        Ok(self.guard.get(key).map(|bytes| Cow::Borrowed(bytes.as_ref())))
    }

    fn raw_scan(&self) -> Result<Self::Scan<'_>, Self::Error> {
        Ok(MemKvCursorMut { store: &*self.guard, queued: &self.queued, current: None })
    }
}

impl KvWrite for MemKvRwTx {
    fn queue_raw_put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error> {
        self.queued.lock().unwrap().insert(key.into(), QueuedOp::Put(Bytes::copy_from_slice(value)));
        Ok(())
    }

    fn queue_raw_delete(&self, key: &[u8]) -> Result<(), Self::Error> {
        self.queued.lock().unwrap().insert(key.into(), QueuedOp::Delete);
        Ok(())
    }

    fn raw_commit(mut self) -> Result<(), Self::Error> {
        let ops = std::mem::take(self.queued.get_mut().unwrap());
        for (key, op) in ops {
            match op {
                QueuedOp::Put(value) => {
                    self.guard.insert(key, value);
                }
                QueuedOp::Delete => {
                    self.guard.remove(&key);
                }
            }
        }

        // The write guard is dropped here, releasing the lock
        Ok(())
    }
}

/// Cursor over the committed contents of a read-only transaction.
pub struct MemKvCursor<'a> {
    store: &'a Store,
    current: Option<Box<[u8]>>,
}

impl core::fmt::Debug for MemKvCursor<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKvCursor").finish()
    }
}

impl KvScan<KvError> for MemKvCursor<'_> {
    fn first(&mut self) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let Some((key, value)) = self.store.first_key_value() else {
            self.current = None;
            return Ok(None);
        };
        self.current = Some(key.clone());
        Ok(Some((Cow::Borrowed(key), Cow::Borrowed(value.as_ref()))))
    }

    fn last(&mut self) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let Some((key, value)) = self.store.last_key_value() else {
            self.current = None;
            return Ok(None);
        };
        self.current = Some(key.clone());
        Ok(Some((Cow::Borrowed(key), Cow::Borrowed(value.as_ref()))))
    }

    fn exact(&mut self, key: &[u8]) -> Result<Option<RawValue<'_>>, KvError> {
        self.current = Some(key.into());
        Ok(self.store.get(key).map(|value| Cow::Borrowed(value.as_ref())))
    }

    fn lower_bound(&mut self, key: &[u8]) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let range = (Bound::Included(key), Bound::Unbounded);
        let Some((found, value)) = self.store.range::<[u8], _>(range).next() else {
            self.current = None;
            return Ok(None);
        };
        self.current = Some(found.clone());
        Ok(Some((Cow::Borrowed(found), Cow::Borrowed(value.as_ref()))))
    }

    fn read_next(&mut self) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let Some(current) = self.current.as_deref() else {
            return self.first();
        };
        let range = (Bound::Excluded(current), Bound::Unbounded);
        let Some((found, value)) = self.store.range::<[u8], _>(range).next() else {
            return Ok(None);
        };
        self.current = Some(found.clone());
        Ok(Some((Cow::Borrowed(found), Cow::Borrowed(value.as_ref()))))
    }

    fn read_prev(&mut self) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let Some(current) = self.current.as_deref() else {
            return Ok(None);
        };
        let range = (Bound::Unbounded, Bound::Excluded(current));
        let Some((found, value)) = self.store.range::<[u8], _>(range).next_back() else {
            return Ok(None);
        };
        self.current = Some(found.clone());
        Ok(Some((Cow::Borrowed(found), Cow::Borrowed(value.as_ref()))))
    }
}

/// Cursor over a write transaction.
///
/// Merges queued operations with committed data, giving precedence to
/// queued ops for read-your-writes consistency. Entries deleted in the
/// queue are skipped; entries put in the queue shadow committed values.
pub struct MemKvCursorMut<'a> {
    store: &'a Store,
    queued: &'a Mutex<TxOps>,
    current: Option<Vec<u8>>,
}

impl core::fmt::Debug for MemKvCursorMut<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemKvCursorMut").finish()
    }
}

fn as_ref_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_slice()),
        Bound::Excluded(key) => Bound::Excluded(key.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl MemKvCursorMut<'_> {
    /// Find the first live entry above `lower`, merging queued ops with
    /// committed data. Queued ops win ties; queued deletes are skipped.
    fn next_live(&self, mut lower: Bound<Vec<u8>>) -> Option<(Box<[u8]>, Bytes)> {
        let queued = self.queued.lock().unwrap();
        loop {
            let range = (as_ref_bound(&lower), Bound::Unbounded);
            let q = queued.range::<[u8], _>(range).next();
            let c = self.store.range::<[u8], _>(range).next();

            match (q, c) {
                (None, None) => return None,

                // The queued candidate is at or before the committed one.
                // Note: if the committed key is shadowed in the queue, the
                // queued entry for it is the candidate seen here.
                (Some((qk, op)), c) if c.is_none_or(|(ck, _)| qk.as_ref() <= ck.as_ref()) => {
                    match op {
                        QueuedOp::Put(value) => return Some((qk.clone(), value.clone())),
                        QueuedOp::Delete => lower = Bound::Excluded(qk.to_vec()),
                    }
                }

                (_, Some((ck, value))) => return Some((ck.clone(), value.clone())),

                (Some(_), None) => unreachable!("guard above matches whenever c is None"),
            }
        }
    }

    /// Find the last live entry below `upper`. Mirror of `next_live`.
    fn prev_live(&self, mut upper: Bound<Vec<u8>>) -> Option<(Box<[u8]>, Bytes)> {
        let queued = self.queued.lock().unwrap();
        loop {
            let range = (Bound::Unbounded, as_ref_bound(&upper));
            let q = queued.range::<[u8], _>(range).next_back();
            let c = self.store.range::<[u8], _>(range).next_back();

            match (q, c) {
                (None, None) => return None,

                (Some((qk, op)), c) if c.is_none_or(|(ck, _)| qk.as_ref() >= ck.as_ref()) => {
                    match op {
                        QueuedOp::Put(value) => return Some((qk.clone(), value.clone())),
                        QueuedOp::Delete => upper = Bound::Excluded(qk.to_vec()),
                    }
                }

                (_, Some((ck, value))) => return Some((ck.clone(), value.clone())),

                (Some(_), None) => unreachable!("guard above matches whenever c is None"),
            }
        }
    }

    fn yield_entry(&mut self, found: Option<(Box<[u8]>, Bytes)>) -> Option<RawKeyValue<'_>> {
        let (key, value) = found?;
        self.current = Some(key.to_vec());
        Some((Cow::Owned(key.into_vec()), Cow::Owned(value.to_vec())))
    }
}

impl KvScan<KvError> for MemKvCursorMut<'_> {
    fn first(&mut self) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let found = self.next_live(Bound::Unbounded);
        if found.is_none() {
            self.current = None;
        }
        Ok(self.yield_entry(found))
    }

    fn last(&mut self) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let found = self.prev_live(Bound::Unbounded);
        if found.is_none() {
            self.current = None;
        }
        Ok(self.yield_entry(found))
    }

    fn exact(&mut self, key: &[u8]) -> Result<Option<RawValue<'_>>, KvError> {
        self.current = Some(key.to_vec());
        match self.queued.lock().unwrap().get(key) {
            Some(QueuedOp::Put(value)) => return Ok(Some(Cow::Owned(value.to_vec()))),
            Some(QueuedOp::Delete) => return Ok(None),
            None => {}
        }
        Ok(self.store.get(key).map(|value| Cow::Owned(value.to_vec())))
    }

    fn lower_bound(&mut self, key: &[u8]) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let found = self.next_live(Bound::Included(key.to_vec()));
        if found.is_none() {
            self.current = None;
        }
        Ok(self.yield_entry(found))
    }

    fn read_next(&mut self) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let found = match self.current.as_ref() {
            Some(current) => self.next_live(Bound::Excluded(current.clone())),
            None => self.next_live(Bound::Unbounded),
        };
        Ok(self.yield_entry(found))
    }

    fn read_prev(&mut self) -> Result<Option<RawKeyValue<'_>>, KvError> {
        let Some(current) = self.current.as_ref() else {
            return Ok(None);
        };
        let found = self.prev_live(Bound::Excluded(current.clone()));
        Ok(self.yield_entry(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[test]
    fn test_new_store() {
        let store = MemKv::new();
        let reader = store.reader().unwrap();

        // Empty store should return None for any key
        assert!(reader.raw_get(&[1, 2, 3]).unwrap().is_none());
    }

    #[test]
    fn test_basic_put_get() {
        let store = MemKv::new();

        // Write some data
        {
            let writer = store.writer().unwrap();
            writer.queue_raw_put(&[1, 2, 3], b"value1").unwrap();
            writer.queue_raw_put(&[4, 5, 6], b"value2").unwrap();
            writer.raw_commit().unwrap();
        }

        // Read the data back
        {
            let reader = store.reader().unwrap();
            let value1 = reader.raw_get(&[1, 2, 3]).unwrap();
            let value2 = reader.raw_get(&[4, 5, 6]).unwrap();
            let missing = reader.raw_get(&[7, 8, 9]).unwrap();

            assert_eq!(value1.as_deref(), Some(b"value1" as &[u8]));
            assert_eq!(value2.as_deref(), Some(b"value2" as &[u8]));
            assert!(missing.is_none());
        }
    }

    #[test]
    fn test_read_your_writes() {
        let store = MemKv::new();
        let writer = store.writer().unwrap();

        // Queue some operations but don't commit yet
        writer.queue_raw_put(&[1], b"queued_value").unwrap();

        // Should be able to read the queued value
        let value = writer.raw_get(&[1]).unwrap();
        assert_eq!(value.as_deref(), Some(b"queued_value" as &[u8]));

        writer.raw_commit().unwrap();

        // After commit, other readers should see it
        {
            let reader = store.reader().unwrap();
            let value = reader.raw_get(&[1]).unwrap();
            assert_eq!(value.as_deref(), Some(b"queued_value" as &[u8]));
        }
    }

    #[test]
    fn test_merged_cursor_shadows_and_skips() {
        let store = MemKv::new();

        {
            let writer = store.writer().unwrap();
            writer.queue_raw_put(&[1], b"one").unwrap();
            writer.queue_raw_put(&[2], b"two").unwrap();
            writer.queue_raw_put(&[3], b"three").unwrap();
            writer.raw_commit().unwrap();
        }

        let writer = store.writer().unwrap();
        writer.queue_raw_delete(&[2]).unwrap();
        writer.queue_raw_put(&[3], b"replaced").unwrap();
        writer.queue_raw_put(&[4], b"queued").unwrap();

        let mut scan = writer.raw_scan().unwrap();
        let mut seen = Vec::new();
        let mut entry = scan.first().unwrap();
        while let Some((key, value)) = entry {
            seen.push((key.into_owned(), value.into_owned()));
            entry = scan.read_next().unwrap();
        }

        assert_eq!(
            seen,
            vec![
                (vec![1], b"one".to_vec()),
                (vec![3], b"replaced".to_vec()),
                (vec![4], b"queued".to_vec()),
            ]
        );
    }

    #[test]
    fn test_conformance() {
        conformance::conformance(&MemKv::new());
    }
}
