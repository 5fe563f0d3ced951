//! Transactional secondary indices for the pending transaction pool.
//!
//! The pending pool holds transactions that are valid but not yet mined.
//! Three secondary indices are maintained over that set, all inside the
//! same caller-supplied write transaction:
//!
//! - [`InsertionOrderIndex`]: assigns each transaction a monotone sequence
//!   number, so the pool can be enumerated in insertion order.
//! - [`RefLinker`]: a bounded many-to-many index between transactions and
//!   the UTXOs they consume. A per-UTXO reference cap bounds mempool
//!   amplification; exceeding it evicts the oldest referrer.
//! - [`EpochConstrainedList`]: an epoch-keyed multimap supporting bulk
//!   expiry of everything older than a threshold epoch.
//!
//! [`PendingTxIndexer`] composes the three and keeps them mutually
//! consistent: every transaction indexed by one is indexed by all, and
//! removal through any path (explicit delete, eviction, mined cascade,
//! epoch expiry) removes it from all three.
//!
//! All state lives in the key-value store behind [`pendex_kv`]'s
//! transaction traits. The indexer owns its key prefixes (see [`keys`])
//! exclusively, holds no locks, and spawns nothing: atomicity and
//! isolation come entirely from the single-writer transaction contract.

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

mod error;
pub use error::{IndexError, IndexResult};

pub mod keys;

mod order;
pub use order::{InsertionOrderIndex, OrderedIter};

mod reflink;
pub use reflink::RefLinker;

mod expiration;
pub use expiration::EpochConstrainedList;

mod pending;
pub use pending::{DEFAULT_MAX_UTXO_REFS, IndexerConfig, PendingTxIndexer};

/// The 32-byte content address of a pending transaction.
pub type TxHash = alloy::primitives::B256;

/// The 32-byte identifier of an unspent transaction output.
pub type UtxoId = alloy::primitives::B256;

/// The protocol-time bucket in which a pending transaction expires.
pub type Epoch = u32;
