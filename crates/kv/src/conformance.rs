//! Conformance tests for key-value backends.
//!
//! Free functions, each taking a fresh store. Backends run the umbrella
//! [`conformance`] in their own test modules to check the transactional
//! contract: atomic commit, rollback on drop, single-writer exclusivity,
//! read-your-writes, and cursor ordering.

use crate::model::{KvError, KvRead, KvScan, KvStore, KvWrite};

/// Run all conformance tests against a [`KvStore`] implementation.
///
/// Tests share the provided store instance; keys are namespaced per test.
pub fn conformance<T: KvStore>(kv: &T) {
    test_put_get_roundtrip(kv);
    test_overwrite(kv);
    test_delete(kv);
    test_read_your_writes_scan(kv);
    test_cursor_order(kv);
    test_cursor_backward(kv);
    test_prefix_scan_stays_in_family(kv);
    test_rollback_on_drop(kv);
    test_write_lock_exclusive(kv);
}

/// Dump every committed entry of the store, in key order.
///
/// Used by rollback tests (here and in consumers) to compare byte-level
/// state before and after a discarded transaction.
pub fn dump_store<T: KvStore>(kv: &T) -> Vec<(Vec<u8>, Vec<u8>)> {
    let reader = kv.reader().unwrap();
    let mut scan = reader.raw_scan().unwrap();
    let mut out = Vec::new();
    let mut entry = scan.first().unwrap();
    while let Some((key, value)) = entry {
        out.push((key.into_owned(), value.into_owned()));
        entry = scan.read_next().unwrap();
    }
    out
}

/// Test that committed puts are visible to later readers.
pub fn test_put_get_roundtrip<T: KvStore>(kv: &T) {
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"rt/a", b"alpha").unwrap();
        writer.queue_raw_put(b"rt/b", b"beta").unwrap();
        writer.raw_commit().unwrap();
    }

    let reader = kv.reader().unwrap();
    assert_eq!(reader.raw_get(b"rt/a").unwrap().as_deref(), Some(b"alpha" as &[u8]));
    assert_eq!(reader.raw_get(b"rt/b").unwrap().as_deref(), Some(b"beta" as &[u8]));
    assert!(reader.raw_get(b"rt/c").unwrap().is_none());
}

/// Test that a later put replaces the committed value.
pub fn test_overwrite<T: KvStore>(kv: &T) {
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"ow/key", b"original").unwrap();
        writer.raw_commit().unwrap();
    }
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"ow/key", b"updated").unwrap();
        writer.raw_commit().unwrap();
    }

    let reader = kv.reader().unwrap();
    assert_eq!(reader.raw_get(b"ow/key").unwrap().as_deref(), Some(b"updated" as &[u8]));
}

/// Test committed deletes, including deleting an absent key.
pub fn test_delete<T: KvStore>(kv: &T) {
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"del/key", b"value").unwrap();
        writer.raw_commit().unwrap();
    }
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_delete(b"del/key").unwrap();
        writer.queue_raw_delete(b"del/absent").unwrap();
        writer.raw_commit().unwrap();
    }

    let reader = kv.reader().unwrap();
    assert!(reader.raw_get(b"del/key").unwrap().is_none());
}

/// Test that cursors on a write transaction observe queued operations.
pub fn test_read_your_writes_scan<T: KvStore>(kv: &T) {
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"ryw/a", b"committed-a").unwrap();
        writer.queue_raw_put(b"ryw/b", b"committed-b").unwrap();
        writer.raw_commit().unwrap();
    }

    let writer = kv.writer().unwrap();
    writer.queue_raw_delete(b"ryw/a").unwrap();
    writer.queue_raw_put(b"ryw/b", b"shadowed").unwrap();
    writer.queue_raw_put(b"ryw/c", b"queued").unwrap();

    // Point gets
    assert!(writer.raw_get(b"ryw/a").unwrap().is_none());
    assert_eq!(writer.raw_get(b"ryw/b").unwrap().as_deref(), Some(b"shadowed" as &[u8]));
    assert_eq!(writer.raw_get(b"ryw/c").unwrap().as_deref(), Some(b"queued" as &[u8]));

    // Cursor: deleted key skipped, shadowed value replaced, queued key seen
    let mut scan = writer.raw_scan().unwrap();
    let mut seen = Vec::new();
    let mut entry = scan.lower_bound(b"ryw/").unwrap();
    while let Some((key, value)) = entry {
        if !key.starts_with(b"ryw/") {
            break;
        }
        seen.push((key.into_owned(), value.into_owned()));
        entry = scan.read_next().unwrap();
    }
    assert_eq!(
        seen,
        vec![
            (b"ryw/b".to_vec(), b"shadowed".to_vec()),
            (b"ryw/c".to_vec(), b"queued".to_vec()),
        ]
    );
}

/// Test forward cursor ordering and lower-bound seeks.
pub fn test_cursor_order<T: KvStore>(kv: &T) {
    {
        let writer = kv.writer().unwrap();
        // Inserted out of order; iteration must be lexicographic
        writer.queue_raw_put(b"ord/3", b"three").unwrap();
        writer.queue_raw_put(b"ord/1", b"one").unwrap();
        writer.queue_raw_put(b"ord/2", b"two").unwrap();
        writer.raw_commit().unwrap();
    }

    let reader = kv.reader().unwrap();
    let mut scan = reader.raw_scan().unwrap();

    let (key, value) = scan.lower_bound(b"ord/").unwrap().unwrap();
    assert_eq!(key.as_ref(), b"ord/1");
    assert_eq!(value.as_ref(), b"one");

    let (key, _) = scan.read_next().unwrap().unwrap();
    assert_eq!(key.as_ref(), b"ord/2");
    let (key, _) = scan.read_next().unwrap().unwrap();
    assert_eq!(key.as_ref(), b"ord/3");

    // Seeking between keys lands on the next populated one
    let (key, _) = scan.lower_bound(b"ord/15").unwrap().unwrap();
    assert_eq!(key.as_ref(), b"ord/2");
}

/// Test backward traversal with `read_prev` and `last`.
pub fn test_cursor_backward<T: KvStore>(kv: &T) {
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"zz/back/1", b"one").unwrap();
        writer.queue_raw_put(b"zz/back/2", b"two").unwrap();
        writer.raw_commit().unwrap();
    }

    let reader = kv.reader().unwrap();
    let mut scan = reader.raw_scan().unwrap();

    // The zz/ namespace sorts last in the conformance key set
    let (key, _) = scan.last().unwrap().unwrap();
    assert_eq!(key.as_ref(), b"zz/back/2");
    let (key, _) = scan.read_prev().unwrap().unwrap();
    assert_eq!(key.as_ref(), b"zz/back/1");
}

/// Test that a prefix scan terminates at the end of its key family.
pub fn test_prefix_scan_stays_in_family<T: KvStore>(kv: &T) {
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"pfx/a/1", b"a1").unwrap();
        writer.queue_raw_put(b"pfx/a/2", b"a2").unwrap();
        writer.queue_raw_put(b"pfx/b/1", b"b1").unwrap();
        writer.raw_commit().unwrap();
    }

    let reader = kv.reader().unwrap();
    let mut scan = reader.raw_scan().unwrap();
    let mut in_family = Vec::new();
    let mut entry = scan.lower_bound(b"pfx/a/").unwrap();
    while let Some((key, _)) = entry {
        if !key.starts_with(b"pfx/a/") {
            break;
        }
        in_family.push(key.into_owned());
        entry = scan.read_next().unwrap();
    }
    assert_eq!(in_family, vec![b"pfx/a/1".to_vec(), b"pfx/a/2".to_vec()]);
}

/// Test that dropping a write transaction discards every queued mutation.
pub fn test_rollback_on_drop<T: KvStore>(kv: &T) {
    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"rb/keep", b"kept").unwrap();
        writer.raw_commit().unwrap();
    }

    let before = dump_store(kv);

    {
        let writer = kv.writer().unwrap();
        writer.queue_raw_put(b"rb/new", b"discarded").unwrap();
        writer.queue_raw_delete(b"rb/keep").unwrap();
        // Dropped without commit
    }

    assert_eq!(dump_store(kv), before);
}

/// Test that at most one write transaction can be open at a time.
pub fn test_write_lock_exclusive<T: KvStore>(kv: &T) {
    let writer = kv.writer().unwrap();
    assert!(matches!(kv.writer(), Err(KvError::WriteLocked)));
    drop(writer);

    // Lock released; a new writer can start
    let writer = kv.writer().unwrap();
    writer.raw_commit().unwrap();
}
