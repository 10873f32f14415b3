//! HashOpen: open-addressing bucket array whose slots chain same-hash nodes.

use crate::buckets::{Buckets, Chain, Probe, Slot, LINE_BIT, MAX_BIT};
use crate::chain::{self, Node, Nodes};
use crate::error::{InsertError, TableError};
use core::fmt;
use core::mem::size_of;
use log::{debug, trace, warn};
use slotmap::DefaultKey;

/// Minimum bucket bit used by `HashOpen::new`.
pub const DEFAULT_MIN_BIT: u32 = 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    pub(crate) fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
    pub(crate) fn raw_handle(&self) -> DefaultKey {
        self.0
    }

    pub fn value<'a, T>(&self, table: &'a HashOpen<T>) -> Option<&'a T> {
        table.get(*self)
    }

    pub fn value_mut<'a, T>(&self, table: &'a mut HashOpen<T>) -> Option<&'a mut T> {
        table.get_mut(*self)
    }
}

/// Snapshot of the table's counters and geometry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableStats {
    pub bucket_bit: u32,
    pub bucket_max: usize,
    pub min_bit: u32,
    /// Live elements.
    pub count: usize,
    /// Slots holding a chain.
    pub filled_count: usize,
    /// Tombstoned slots.
    pub deleted_count: usize,
}

impl TableStats {
    /// Committed fraction of the bucket array, tombstones included.
    pub fn load_factor(&self) -> f64 {
        (self.filled_count + self.deleted_count) as f64 / self.bucket_max as f64
    }
}

/// Hash table keyed by caller-computed `u32` hashes.
///
/// Every slot of the bucket array holds either nothing, a tombstone, or the
/// chain of all elements inserted with one exact hash. Elements are addressed
/// by `Handle`s that stay valid across resizes until the element is removed.
pub struct HashOpen<T> {
    buckets: Buckets,
    nodes: Nodes<T>,
    filled_count: usize,
    deleted_count: usize,
    min_bit: u32,
}

impl<T> HashOpen<T> {
    pub fn new() -> Self {
        Self::with_min_bit(DEFAULT_MIN_BIT)
    }

    /// Creates a table that never shrinks below `2^min_bit` slots.
    ///
    /// # Panics
    ///
    /// If `min_bit` is outside `LINE_BIT..=MAX_BIT`.
    pub fn with_min_bit(min_bit: u32) -> Self {
        if let Err(e) = check_min_bit(min_bit) {
            panic!("{e}");
        }
        Self::from_buckets(Buckets::alloc(min_bit), min_bit)
    }

    /// Fallible variant of `with_min_bit`.
    pub fn try_with_min_bit(min_bit: u32) -> Result<Self, TableError> {
        check_min_bit(min_bit)?;
        Ok(Self::from_buckets(Buckets::try_alloc(min_bit)?, min_bit))
    }

    fn from_buckets(buckets: Buckets, min_bit: u32) -> Self {
        debug!("hashopen created with {} buckets", buckets.max());
        Self {
            buckets,
            nodes: Nodes::new(),
            filled_count: 0,
            deleted_count: 0,
            min_bit,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            bucket_bit: self.buckets.bit(),
            bucket_max: self.buckets.max(),
            min_bit: self.min_bit,
            count: self.nodes.len(),
            filled_count: self.filled_count,
            deleted_count: self.deleted_count,
        }
    }

    /// Bytes used by the bucket array plus the nodes of live elements.
    pub fn memory_usage(&self) -> usize {
        self.buckets.byte_size() + self.nodes.len() * size_of::<Node<T>>()
    }

    /// Inserts `payload` under `hash`. Elements with an equal hash are chained
    /// in insertion order.
    ///
    /// Fails when growing the bucket array cannot allocate, or when it would
    /// need more than `2^MAX_BIT` slots. The payload then comes back inside the
    /// error and the table is unchanged.
    pub fn insert(&mut self, hash: u32, payload: T) -> Result<Handle, InsertError<T>> {
        let probe = self.buckets.probe(hash);
        let committed = self.filled_count
            + self.deleted_count
            + matches!(probe, Probe::Vacant { tombstone: false, .. }) as usize;

        // Allocate before touching anything so a failure leaves no trace.
        let grown = match self.grow_step(committed) {
            Ok(grown) => grown,
            Err(source) => return Err(InsertError { payload, source }),
        };

        let k = self
            .nodes
            .insert_with_key(|k| Node::new(payload, hash, k));
        match probe {
            Probe::Found { index, head } => {
                trace!("insert hash {hash:#010x}: append to chain at {index}");
                chain::insert_tail_not_empty(&mut self.nodes, head, k);
            }
            Probe::Vacant { index, tombstone } => {
                trace!("insert hash {hash:#010x}: new chain at {index} (tombstone: {tombstone})");
                let head = chain::insert_first(&mut self.nodes, k);
                *self.buckets.slot_mut(index) = Slot {
                    chain: Chain::Head(head),
                    hash,
                };
                self.filled_count += 1;
                if tombstone {
                    self.deleted_count -= 1;
                }
            }
        }

        if let Some(b) = grown {
            self.rehash_into(b);
        }
        Ok(Handle::new(k))
    }

    /// Removes the element behind `handle` and returns its payload.
    ///
    /// `handle` must come from this table. Staleness is detected only against
    /// the table that issued it: a removed element's handle yields `None` and
    /// changes nothing, but a handle from another `HashOpen` may resolve to an
    /// unrelated element here.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let k = handle.raw_handle();
        let hash = self.nodes.get(k)?.hash;

        let index = self.buckets.locate(hash);
        let head = match self.buckets.slot(index).chain {
            Chain::Head(head) => head,
            Chain::Empty | Chain::Deleted => {
                unreachable!("live element with hash {hash:#010x} has no chain")
            }
        };
        self.unlink(index, head, k)
    }

    /// Removes the first element with `hash` whose payload satisfies `is_match`,
    /// walking the chain in insertion order.
    pub fn remove_matching<F>(&mut self, hash: u32, mut is_match: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let index = self.buckets.locate(hash);
        let head = match self.buckets.slot(index).chain {
            Chain::Head(head) => head,
            Chain::Empty | Chain::Deleted => return None,
        };
        let (k, _) = chain::Iter::new(&self.nodes, Some(head))
            .find(|(_, n)| is_match(&n.payload))?;
        self.unlink(index, head, k)
    }

    fn unlink(&mut self, index: usize, head: DefaultKey, k: DefaultKey) -> Option<T> {
        debug_assert_eq!(self.buckets.slot(index).hash, self.nodes[k].hash);
        let slot = self.buckets.slot_mut(index);
        match chain::remove_existing(&mut self.nodes, head, k) {
            Some(new_head) => slot.chain = Chain::Head(new_head),
            None => {
                trace!("chain at {index} emptied, leaving a tombstone");
                slot.chain = Chain::Deleted;
                self.filled_count -= 1;
                self.deleted_count += 1;
            }
        }
        let node = self.nodes.remove(k)?;
        self.shrink_step();
        Some(node.payload)
    }

    /// First element with `hash` whose payload satisfies `is_match`.
    pub fn search<F>(&self, hash: u32, mut is_match: F) -> Option<&T>
    where
        F: FnMut(&T) -> bool,
    {
        self.bucket(hash).map(|(_, v)| v).find(|v| is_match(*v))
    }

    pub fn search_mut<F>(&mut self, hash: u32, is_match: F) -> Option<&mut T>
    where
        F: FnMut(&T) -> bool,
    {
        let h = self.find(hash, is_match)?;
        self.get_mut(h)
    }

    /// Handle of the first element with `hash` whose payload satisfies `is_match`.
    pub fn find<F>(&self, hash: u32, mut is_match: F) -> Option<Handle>
    where
        F: FnMut(&T) -> bool,
    {
        self.bucket(hash)
            .find(|(_, v)| is_match(*v))
            .map(|(h, _)| h)
    }

    /// All elements inserted with `hash`, in insertion order.
    pub fn bucket(&self, hash: u32) -> Bucket<'_, T> {
        let head = match self.buckets.slot(self.buckets.locate(hash)).chain {
            Chain::Head(head) => Some(head),
            Chain::Empty | Chain::Deleted => None,
        };
        Bucket {
            it: chain::Iter::new(&self.nodes, head),
        }
    }

    pub fn contains_hash(&self, hash: u32) -> bool {
        matches!(
            self.buckets.slot(self.buckets.locate(hash)).chain,
            Chain::Head(_)
        )
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.nodes.get(handle.raw_handle()).map(|n| &n.payload)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.nodes
            .get_mut(handle.raw_handle())
            .map(|n| &mut n.payload)
    }

    pub fn hash_of(&self, handle: Handle) -> Option<u32> {
        self.nodes.get(handle.raw_handle()).map(|n| n.hash)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.nodes.contains_key(handle.raw_handle())
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            it: self.nodes.iter(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            it: self.nodes.iter_mut(),
        }
    }

    /// Drops every element and returns to the minimum bucket array.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.buckets = Buckets::alloc(self.min_bit);
        self.filled_count = 0;
        self.deleted_count = 0;
    }

    /// Grows ahead of time so `additional` new hashes fit without a resize.
    ///
    /// Fails with `CapacityOverflow` when the request cannot fit below half
    /// load at `2^MAX_BIT` slots; the table is then unchanged.
    pub fn reserve(&mut self, additional: usize) -> Result<(), TableError> {
        let overflow = || TableError::CapacityOverflow {
            requested: additional,
        };
        let committed = self
            .filled_count
            .checked_add(self.deleted_count)
            .and_then(|c| c.checked_add(additional))
            .ok_or_else(overflow)?;
        if committed < self.buckets.max() / 2 {
            return Ok(());
        }
        let needed = self
            .filled_count
            .checked_add(additional)
            .ok_or_else(overflow)?;
        let bit = bit_for(needed)?.max(self.buckets.bit());
        self.resize(bit)
    }

    /// Rebuilds at the smallest size the shrink policy allows, dropping all
    /// tombstones.
    pub fn shrink_to_fit(&mut self) -> Result<(), TableError> {
        let bit = bit_for(self.filled_count)?.max(self.min_bit);
        if bit == self.buckets.bit() && self.deleted_count == 0 {
            return Ok(());
        }
        self.resize(bit)
    }

    /// Storage to rebuild into once `committed` slots reach half load.
    fn grow_step(&self, committed: usize) -> Result<Option<Buckets>, TableError> {
        if committed < self.buckets.max() / 2 {
            return Ok(None);
        }
        Buckets::try_alloc(bit_for(committed)?).map(Some)
    }

    fn shrink_step(&mut self) {
        if self.filled_count <= self.buckets.max() / 8 && self.buckets.bit() > self.min_bit {
            let min_bit = self.min_bit;
            let res = bit_for(self.filled_count).and_then(|bit| self.resize(bit.max(min_bit)));
            if let Err(e) = res {
                warn!("shrink skipped: {e}");
            }
        }
    }

    fn resize(&mut self, bit: u32) -> Result<(), TableError> {
        let fresh = Buckets::try_alloc(bit)?;
        self.rehash_into(fresh);
        Ok(())
    }

    /// Moves every chain into `fresh` as a unit. Nodes are not touched, so
    /// handles stay valid.
    fn rehash_into(&mut self, mut fresh: Buckets) {
        debug!(
            "hashopen resize 2^{} -> 2^{} (count {}, filled {}, deleted {})",
            self.buckets.bit(),
            fresh.bit(),
            self.nodes.len(),
            self.filled_count,
            self.deleted_count
        );
        for (_, s) in self.buckets.heads() {
            fresh.place(*s);
        }
        self.buckets = fresh;
        self.deleted_count = 0;
    }
}

/// Bit count whose capacity leaves `n` committed slots under half load.
fn bit_for(n: usize) -> Result<u32, TableError> {
    n.checked_add(1)
        .and_then(usize::checked_next_power_of_two)
        .map(|p| p.trailing_zeros() + 1)
        .filter(|&bit| bit <= MAX_BIT)
        .ok_or(TableError::CapacityOverflow { requested: n })
}

fn check_min_bit(bit: u32) -> Result<(), TableError> {
    if (LINE_BIT..=MAX_BIT).contains(&bit) {
        Ok(())
    } else {
        Err(TableError::InvalidMinBit {
            bit,
            min: LINE_BIT,
            max: MAX_BIT,
        })
    }
}

impl<T> Default for HashOpen<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HashOpen<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashOpen")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Iterator over the elements sharing one hash.
pub struct Bucket<'a, T> {
    it: chain::Iter<'a, T>,
}

impl<'a, T> Iterator for Bucket<'a, T> {
    type Item = (Handle, &'a T);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(k, n)| (Handle::new(k), &n.payload))
    }
}

/// Iterator over all elements, in no particular order.
pub struct Iter<'a, T> {
    it: slotmap::basic::Iter<'a, DefaultKey, Node<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Handle, u32, &'a T);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .next()
            .map(|(k, n)| (Handle::new(k), n.hash, &n.payload))
    }
}

/// Mutable iterator over all elements, in no particular order.
pub struct IterMut<'a, T> {
    it: slotmap::basic::IterMut<'a, DefaultKey, Node<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = (Handle, u32, &'a mut T);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .next()
            .map(|(k, n)| (Handle::new(k), n.hash, &mut n.payload))
    }
}

#[cfg(test)]
impl<T> HashOpen<T> {
    /// Panics unless counters, chains and probe paths are mutually consistent.
    pub(crate) fn check_invariants(&self) {
        let mut filled = 0;
        let mut deleted = 0;
        let mut reached = 0;
        for (i, s) in self.buckets.iter() {
            match s.chain {
                Chain::Empty => {}
                Chain::Deleted => deleted += 1,
                Chain::Head(head) => {
                    filled += 1;
                    assert_eq!(
                        self.buckets.locate(s.hash),
                        i,
                        "hash {:#x} not reachable",
                        s.hash
                    );
                    for (_, n) in chain::Iter::new(&self.nodes, Some(head)) {
                        assert_eq!(n.hash, s.hash, "chain at {i} mixes hashes");
                        reached += 1;
                    }
                }
            }
        }
        assert_eq!(filled, self.filled_count);
        assert_eq!(deleted, self.deleted_count);
        assert_eq!(reached, self.nodes.len(), "every element sits in exactly one chain");
        assert!(self.filled_count <= self.nodes.len());
        assert!(self.filled_count + self.deleted_count < self.buckets.max());
        assert!(self.buckets.bit() >= self.min_bit);
    }
}
