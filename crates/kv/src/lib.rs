//! Transactional key-value model for the pendex indexer.
//!
//! This crate defines the storage contract the indexer is written against:
//! a key-value store with a single lexicographically ordered key space,
//! accessed through read-only and read-write transactions. The indexer
//! performs every mutation inside one caller-supplied write transaction;
//! the transaction either commits atomically or is dropped, discarding all
//! queued mutations.
//!
//! # Trait Hierarchy
//!
//! ```text
//! KvStore                  ← Transaction factory
//!   ├─ reader() → KvRead       ← Read-only transactions
//!   └─ writer() → KvWrite      ← Read-write transactions (single writer)
//!
//! KvRead::raw_scan() → KvScan  ← Ordered cursors over the key space
//! ```
//!
//! Writes are queued on the transaction and applied on
//! [`raw_commit`](model::KvWrite::raw_commit). Queued writes are visible
//! to subsequent reads and cursors on the same transaction
//! (read-your-writes). Backends must provide serializable single-writer
//! semantics: at most one write transaction is open at a time, and
//! [`writer`](model::KvStore::writer) fails with
//! [`KvError::WriteLocked`](model::KvError::WriteLocked) while one is.
//!
//! # Feature Flags
//!
//! - **`in-memory`**: Enables the [`mem`] module, providing an in-memory
//!   [`KvStore`](model::KvStore) backend for testing.
//! - **`test-utils`**: Enables the [`conformance`] module with backend
//!   conformance tests. Implies `in-memory`.

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod model;
pub use model::{
    KvError, KvRead, KvReadError, KvResult, KvScan, KvStore, KvWrite, RawKeyValue, RawValue,
};

#[cfg(any(test, feature = "in-memory"))]
pub mod mem;

/// Conformance tests for key-value backends.
#[cfg(any(test, feature = "test-utils"))]
pub mod conformance;
