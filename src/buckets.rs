//! Bucket storage, cache-line layout and the probe that maps a hash to its slot.
//!
//! Slots are grouped into 64-byte lines. A probe for `hash` starts at
//! `hash & mask_cache`, i.e. at the first slot of a line, and walks forward
//! wrapping at `max`. The first few comparisons of every probe therefore
//! touch a single cache line.

use crate::error::TableError;
use core::mem::size_of;
use slotmap::DefaultKey;

/// Bytes per cache line.
pub const LINE_BYTES: usize = 64;

/// Largest supported bucket bit.
pub const MAX_BIT: u32 = 31;

/// State of one bucket slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Chain {
    Empty,
    Deleted,
    Head(DefaultKey),
}

#[derive(Copy, Clone, Debug)]
#[repr(C, align(16))]
pub(crate) struct Slot {
    pub(crate) chain: Chain,
    /// Hash of every node in `chain`; stale once the slot is not a `Head`.
    pub(crate) hash: u32,
}

impl Slot {
    const EMPTY: Slot = Slot {
        chain: Chain::Empty,
        hash: 0,
    };
}

/// Slots per cache line.
pub const SLOTS_PER_LINE: usize = LINE_BYTES / size_of::<Slot>();

/// log2 of `SLOTS_PER_LINE`; also the smallest accepted bucket bit.
pub const LINE_BIT: u32 = SLOTS_PER_LINE.trailing_zeros();

const _: () = assert!(LINE_BYTES % size_of::<Slot>() == 0);
const _: () = assert!(SLOTS_PER_LINE.is_power_of_two());

#[repr(C, align(64))]
struct Line {
    slots: [Slot; SLOTS_PER_LINE],
}

const _: () = assert!(size_of::<Line>() == LINE_BYTES);

impl Line {
    const EMPTY: Line = Line {
        slots: [Slot::EMPTY; SLOTS_PER_LINE],
    };
}

/// Where a chain for a hash lives, or where it would be created.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Probe {
    /// Slot holding the chain for the hash.
    Found { index: usize, head: DefaultKey },
    /// No chain for the hash. `index` is the slot a new chain takes: the
    /// first tombstone on the walk, or else the terminating empty slot.
    Vacant { index: usize, tombstone: bool },
}

/// Power-of-two array of slots laid out in aligned cache lines.
pub(crate) struct Buckets {
    lines: Vec<Line>,
    bit: u32,
    mask: usize,
    mask_cache: usize,
}

impl Buckets {
    /// Allocates `2^bit` empty slots, reporting allocation failure.
    pub(crate) fn try_alloc(bit: u32) -> Result<Self, TableError> {
        debug_assert!((LINE_BIT..=MAX_BIT).contains(&bit));
        let max = 1usize << bit;
        let n_lines = max / SLOTS_PER_LINE;
        let mut lines = Vec::new();
        lines
            .try_reserve_exact(n_lines)
            .map_err(|source| TableError::Alloc { bit, source })?;
        lines.resize_with(n_lines, || Line::EMPTY);
        Ok(Self::from_lines(lines, bit))
    }

    /// Allocates `2^bit` empty slots; aborts on allocation failure like `Vec`.
    pub(crate) fn alloc(bit: u32) -> Self {
        debug_assert!((LINE_BIT..=MAX_BIT).contains(&bit));
        let n_lines = (1usize << bit) / SLOTS_PER_LINE;
        let mut lines = Vec::with_capacity(n_lines);
        lines.resize_with(n_lines, || Line::EMPTY);
        Self::from_lines(lines, bit)
    }

    fn from_lines(lines: Vec<Line>, bit: u32) -> Self {
        let mask = (1usize << bit) - 1;
        Self {
            lines,
            bit,
            mask,
            // first slot of the enclosing line
            mask_cache: mask & !(SLOTS_PER_LINE - 1),
        }
    }

    #[inline]
    pub(crate) fn bit(&self) -> u32 {
        self.bit
    }

    #[inline]
    pub(crate) fn max(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    pub(crate) fn start(&self, hash: u32) -> usize {
        hash as usize & self.mask_cache
    }

    #[inline]
    pub(crate) fn slot(&self, i: usize) -> &Slot {
        &self.lines[i / SLOTS_PER_LINE].slots[i % SLOTS_PER_LINE]
    }

    #[inline]
    pub(crate) fn slot_mut(&mut self, i: usize) -> &mut Slot {
        &mut self.lines[i / SLOTS_PER_LINE].slots[i % SLOTS_PER_LINE]
    }

    /// Index of the slot holding the chain for `hash`, or of the empty slot
    /// ending the walk when there is none. Tombstones are skipped.
    ///
    /// Terminates as long as at least one slot is empty.
    pub(crate) fn locate(&self, hash: u32) -> usize {
        let mut i = self.start(hash);
        loop {
            let s = self.slot(i);
            match s.chain {
                Chain::Empty => return i,
                Chain::Head(_) if s.hash == hash => return i,
                _ => {}
            }
            i = (i + 1) & self.mask;
        }
    }

    /// Same walk as `locate`, remembering the first tombstone passed so an
    /// insert can reuse it.
    pub(crate) fn probe(&self, hash: u32) -> Probe {
        let mut i = self.start(hash);
        let mut tombstone = None;
        loop {
            let s = self.slot(i);
            match s.chain {
                Chain::Empty => {
                    return match tombstone {
                        Some(index) => Probe::Vacant {
                            index,
                            tombstone: true,
                        },
                        None => Probe::Vacant {
                            index: i,
                            tombstone: false,
                        },
                    };
                }
                Chain::Head(head) if s.hash == hash => {
                    return Probe::Found { index: i, head };
                }
                Chain::Deleted if tombstone.is_none() => tombstone = Some(i),
                _ => {}
            }
            i = (i + 1) & self.mask;
        }
    }

    /// Copies `slot` into the first empty slot of its walk. Only valid while
    /// rebuilding into a table with no tombstones and no slot with this hash.
    pub(crate) fn place(&mut self, slot: Slot) -> usize {
        let mut i = self.start(slot.hash);
        while self.slot(i).chain != Chain::Empty {
            i = (i + 1) & self.mask;
        }
        *self.slot_mut(i) = slot;
        i
    }

    /// Every slot in index order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &Slot)> + '_ {
        self.lines.iter().flat_map(|l| l.slots.iter()).enumerate()
    }

    /// Occupied slots in index order.
    pub(crate) fn heads(&self) -> impl Iterator<Item = (usize, &Slot)> + '_ {
        self.iter().filter(|(_, s)| matches!(s.chain, Chain::Head(_)))
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.max() * size_of::<Slot>()
    }

    /// Address of slot 0, for alignment checks.
    #[cfg(test)]
    pub(crate) fn base_addr(&self) -> usize {
        self.lines.as_ptr() as usize
    }
}
