//! Core traits and types of the key-value model.
//!
//! The model is deliberately small: raw byte keys and values, one ordered
//! key space, and queued writes that commit atomically. Anything typed —
//! key layout, prefixes, value encodings — belongs to the layer above.

mod error;
pub use error::{KvError, KvReadError, KvResult};

mod scan;
pub use scan::{KvScan, RawKeyValue, RawValue};

mod traits;
pub use traits::{KvRead, KvStore, KvWrite};
