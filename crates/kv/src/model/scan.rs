use std::borrow::Cow;

/// A raw key-value pair yielded by a cursor.
///
/// The borrows are valid until the cursor is advanced again. Callers that
/// retain data across cursor steps must copy it first.
pub type RawKeyValue<'a> = (Cow<'a, [u8]>, Cow<'a, [u8]>);

/// A raw value yielded by a point lookup on a cursor.
pub type RawValue<'a> = Cow<'a, [u8]>;

/// Cursor over the lexicographically ordered key space of a transaction.
///
/// A cursor tracks a current position. `read_next` / `read_prev` move
/// relative to it; `first`, `last`, `exact`, and `lower_bound` reposition
/// it absolutely. A fresh cursor has no position: `read_next` behaves like
/// `first`, and `read_prev` yields nothing.
///
/// Cursors opened on a write transaction observe queued writes merged with
/// committed state. A cursor is invalidated by mutating the same
/// transaction while it is open; callers that delete while scanning must
/// collect first and mutate afterwards.
pub trait KvScan<E> {
    /// Position at the first entry of the key space.
    fn first(&mut self) -> Result<Option<RawKeyValue<'_>>, E>;

    /// Position at the last entry of the key space.
    fn last(&mut self) -> Result<Option<RawKeyValue<'_>>, E>;

    /// Point lookup. Positions the cursor at `key` whether or not an entry
    /// exists there.
    fn exact(&mut self, key: &[u8]) -> Result<Option<RawValue<'_>>, E>;

    /// Position at the first entry with key `>= key`.
    fn lower_bound(&mut self, key: &[u8]) -> Result<Option<RawKeyValue<'_>>, E>;

    /// Advance to the entry strictly after the current position.
    fn read_next(&mut self) -> Result<Option<RawKeyValue<'_>>, E>;

    /// Step back to the entry strictly before the current position.
    fn read_prev(&mut self) -> Result<Option<RawKeyValue<'_>>, E>;
}
