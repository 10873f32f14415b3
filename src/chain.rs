//! Chains of same-hash nodes linked through a generational arena.
//!
//! A chain is identified by its head key. Nodes are doubly linked: `next`
//! walks toward the tail and `prev` walks toward the head, except that the
//! head's `prev` points at the tail. That makes tail insertion O(1) without
//! the bucket slot having to store a second key.

use slotmap::{DefaultKey, SlotMap};

pub(crate) type Nodes<T> = SlotMap<DefaultKey, Node<T>>;

#[derive(Debug)]
pub(crate) struct Node<T> {
    pub(crate) payload: T,
    pub(crate) hash: u32,
    next: Option<DefaultKey>,
    prev: DefaultKey,
}

impl<T> Node<T> {
    /// Creates an unlinked node; `prev` is patched by the link functions.
    pub(crate) fn new(payload: T, hash: u32, key_hint: DefaultKey) -> Self {
        Self {
            payload,
            hash,
            next: None,
            prev: key_hint,
        }
    }
}

/// Makes `key` the head of a new single-node chain and returns the head.
pub(crate) fn insert_first<T>(nodes: &mut Nodes<T>, key: DefaultKey) -> DefaultKey {
    let n = &mut nodes[key];
    n.next = None;
    n.prev = key;
    key
}

/// Appends `key` to the non-empty chain starting at `head`.
pub(crate) fn insert_tail_not_empty<T>(
    nodes: &mut Nodes<T>,
    head: DefaultKey,
    key: DefaultKey,
) {
    debug_assert_ne!(head, key, "node is already the chain head");
    let tail = nodes[head].prev;
    nodes[tail].next = Some(key);
    {
        let n = &mut nodes[key];
        n.prev = tail;
        n.next = None;
    }
    nodes[head].prev = key;
}

/// Unlinks `key` from the chain starting at `head`. Returns the new head, or
/// `None` when the chain became empty.
///
/// `key` must be a member of that chain.
pub(crate) fn remove_existing<T>(
    nodes: &mut Nodes<T>,
    head: DefaultKey,
    key: DefaultKey,
) -> Option<DefaultKey> {
    debug_assert!(contains(nodes, head, key), "node is not a member of this chain");
    let (prev, next) = {
        let n = &nodes[key];
        (n.prev, n.next)
    };

    if key == head {
        // `prev` of the old head is the tail, which the new head inherits.
        if let Some(next) = next {
            nodes[next].prev = prev;
        }
        return next;
    }

    nodes[prev].next = next;
    match next {
        Some(next) => nodes[next].prev = prev,
        None => nodes[head].prev = prev,
    }
    Some(head)
}

pub(crate) fn contains<T>(nodes: &Nodes<T>, head: DefaultKey, key: DefaultKey) -> bool {
    Iter::new(nodes, Some(head)).any(|(k, _)| k == key)
}

/// Forward iterator over a chain, from head to tail.
pub(crate) struct Iter<'a, T> {
    nodes: &'a Nodes<T>,
    next: Option<DefaultKey>,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(nodes: &'a Nodes<T>, head: Option<DefaultKey>) -> Self {
        Self { nodes, next: head }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (DefaultKey, &'a Node<T>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.next?;
        let n = &self.nodes[k];
        self.next = n.next;
        Some((k, n))
    }
}
