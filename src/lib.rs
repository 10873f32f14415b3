//! hashopen: an open-addressing hash table whose slots chain every element
//! sharing one exact hash, addressed through stable handles.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a low-level building block for indexes and caches. Callers hash
//!   their own keys to `u32` and decide equality themselves; the table only
//!   organises elements by hash.
//! - Layers:
//!   - `chain`: doubly-linked chains of nodes living in a generational arena
//!     (`slotmap`). O(1) head insert, tail insert and unlink.
//!   - `buckets`: the power-of-two slot array grouped into 64-byte lines,
//!     and the linear probe mapping a hash to its slot.
//!   - `HashOpen<T>`: element operations, the three counters and the
//!     grow/shrink policy.
//!
//! Slots
//! - Each slot is `Empty`, `Deleted` (tombstone) or the head of the chain for
//!   one hash. Distinct hashes never share a slot; equal hashes always do.
//! - A probe starts at `hash & mask_cache`, the first slot of a cache line,
//!   and walks forward wrapping at the end of the array. It stops at an empty
//!   slot or at the chain for its hash. Tombstones are walked over.
//! - A new chain takes the first tombstone seen on its walk, else the empty
//!   slot that ended it.
//!
//! Resizing
//! - Grow when filled plus tombstoned slots reach half the array; the new
//!   size keeps the committed slots under half load.
//! - Shrink when filled slots fall to an eighth of the array, never below the
//!   configured minimum.
//! - A resize moves whole chains and drops every tombstone. Nodes do not move,
//!   so handles stay valid.
//! - Storage for a grow is allocated before the insert mutates anything; a
//!   failed allocation returns the payload and leaves the table as it was.
//!
//! Constraints
//! - Single-threaded: no internal locking. Mutation needs `&mut self`.
//! - Not-found is `None`, never an error.
//! - Handles are generational: a handle to a removed element never resolves,
//!   even after its arena slot is reused.
//!
//! Notes and non-goals
//! - No hashing of keys, no generic key type, no iteration order.

mod buckets;
mod chain;
pub mod error;
pub mod hash_open;
mod hash_open_proptest;

// Public surface
pub use buckets::{LINE_BIT, LINE_BYTES, MAX_BIT, SLOTS_PER_LINE};
pub use error::{InsertError, TableError};
pub use hash_open::{Bucket, Handle, HashOpen, TableStats, DEFAULT_MIN_BIT};
