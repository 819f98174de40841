//! Fixed-height 6-way trie with an embedded Levenshtein band per node.
//!
//! Every node stores the last few symbols of its path packed 3 bits each and
//! one diagonal band of the dynamic-programming table for the query that last
//! walked through it. Leaves are not nodes: the child slots of nodes at depth
//! `height - 1` hold record indices.

mod search;


use crate::alphabet::{insert_code, NUM_CHILDREN};
use crate::error::{StarcodeError, StarcodeResult};
use crate::stack::Stack;

pub const MAX_TAU: u8 = 8;
pub const MAX_HEIGHT: usize = 1023;

pub(crate) const CACHE_WIDTH: usize = 2 * MAX_TAU as usize + 1;
pub(crate) const CENTER: usize = MAX_TAU as usize;
pub(crate) const EMPTY: u32 = u32::MAX;
pub(crate) const PATH_BITS: u32 = 3;
pub(crate) const PATH_MASK: u32 = (1 << PATH_BITS) - 1;

/// Band of a node nobody has aligned against yet: `|offset|` on every diagonal.
pub(crate) const INIT_CACHE: [u8; CACHE_WIDTH] = {
    let mut cache = [0u8; CACHE_WIDTH];
    let mut i = 0;
    while i < CACHE_WIDTH {
        cache[i] = CENTER.abs_diff(i) as u8;
        i += 1;
    }
    cache
};

const ROOT: u32 = 0;

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) children: [u32; NUM_CHILDREN],
    pub(crate) path: u32,
    pub(crate) cache: [u8; CACHE_WIDTH],
}

impl Node {
    fn new(path: u32) -> Self {
        Self {
            children: [EMPTY; NUM_CHILDREN],
            path,
            cache: INIT_CACHE,
        }
    }
}

/// Where a record index goes once its path is in the trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeafSlot {
    node: u32,
    code: u8,
}

pub struct Trie {
    nodes: Vec<Node>,
    height: usize,
    max_tau: u8,
    arena_limit: Option<usize>,
    pebbles: Vec<Stack<u32>>,
}

impl Trie {
    pub fn new(height: usize, max_tau: u8) -> StarcodeResult<Self> {
        if height < 1 {
            return Err(StarcodeError::HeightTooSmall);
        }
        if height > MAX_HEIGHT {
            return Err(StarcodeError::HeightTooLarge {
                height,
                max: MAX_HEIGHT,
            });
        }
        if max_tau > MAX_TAU {
            return Err(StarcodeError::DistanceTooLarge {
                tau: max_tau,
                max: MAX_TAU,
            });
        }
        Ok(Self {
            nodes: vec![Node::new(0)],
            height,
            max_tau,
            arena_limit: None,
            pebbles: Vec::new(),
        })
    }

    /// A trie whose node arena is allocated up front and never grows past
    /// `capacity` nodes besides the root.
    ///
    /// Size it with [`count_arena_nodes`]; inserts past the limit fail with
    /// [`StarcodeError::ArenaExhausted`].
    pub fn with_arena(height: usize, max_tau: u8, capacity: usize) -> StarcodeResult<Self> {
        let mut trie = Self::new(height, max_tau)?;
        trie.nodes
            .try_reserve_exact(capacity)
            .map_err(|_| StarcodeError::AllocationFailure { what: "node arena" })?;
        trie.arena_limit = Some(capacity + 1);
        Ok(trie)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn max_tau(&self) -> u8 {
        self.max_tau
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Adds the path of `seq` and returns its leaf slot, which stays empty
    /// until [`Trie::set_leaf`] writes it.
    pub fn insert_path(&mut self, seq: &[u8]) -> StarcodeResult<LeafSlot> {
        if seq.len() != self.height {
            return Err(StarcodeError::LengthMismatch {
                expected: self.height,
                found: seq.len(),
            });
        }
        let (last, inner) = match seq.split_last() {
            Some(split) => split,
            None => return Err(StarcodeError::HeightTooSmall),
        };
        let mut node = ROOT;
        for &b in inner {
            let code = insert_code(b);
            let child = self.nodes[node as usize].children[code as usize];
            node = if child == EMPTY {
                self.append_child(node, code)?
            } else {
                child
            };
        }
        Ok(LeafSlot {
            node,
            code: insert_code(*last),
        })
    }

    fn append_child(&mut self, parent: u32, code: u8) -> StarcodeResult<u32> {
        if let Some(limit) = self.arena_limit {
            if self.nodes.len() >= limit {
                return Err(StarcodeError::ArenaExhausted {
                    capacity: limit - 1,
                });
            }
        } else {
            self.nodes
                .try_reserve(1)
                .map_err(|_| StarcodeError::AllocationFailure { what: "trie nodes" })?;
        }
        let idx = self.nodes.len() as u32;
        let path = (self.nodes[parent as usize].path << PATH_BITS) | code as u32;
        self.nodes.push(Node::new(path));
        self.nodes[parent as usize].children[code as usize] = idx;
        Ok(idx)
    }

    pub fn leaf(&self, slot: LeafSlot) -> Option<u32> {
        match self.nodes[slot.node as usize].children[slot.code as usize] {
            EMPTY => None,
            record => Some(record),
        }
    }

    /// Writes `record` into an empty leaf slot.
    pub fn set_leaf(&mut self, slot: LeafSlot, record: u32) -> StarcodeResult<()> {
        let cell = &mut self.nodes[slot.node as usize].children[slot.code as usize];
        if *cell != EMPTY {
            return Err(StarcodeError::DuplicateSequence { record: *cell });
        }
        *cell = record;
        Ok(())
    }

    pub fn insert(&mut self, seq: &[u8], record: u32) -> StarcodeResult<()> {
        let slot = self.insert_path(seq)?;
        self.set_leaf(slot, record)
    }

    /// Hands every stored record index to `on_leaf`, then releases the trie.
    pub fn destroy_with<F: FnMut(u32)>(mut self, mut on_leaf: F) {
        self.pebbles.clear();
        self.visit_leaves(ROOT, 1, &mut on_leaf);
    }

    fn visit_leaves<F: FnMut(u32)>(&self, node: u32, depth: usize, on_leaf: &mut F) {
        for &child in &self.nodes[node as usize].children {
            if child == EMPTY {
                continue;
            }
            if depth == self.height {
                on_leaf(child);
            } else {
                self.visit_leaves(child, depth + 1, on_leaf);
            }
        }
    }

    fn ensure_pebbles(&mut self) -> StarcodeResult<()> {
        if !self.pebbles.is_empty() {
            return Ok(());
        }
        let mut pebbles = Vec::new();
        pebbles
            .try_reserve_exact(self.height + 1)
            .map_err(|_| StarcodeError::AllocationFailure { what: "pebbles" })?;
        pebbles.resize_with(self.height + 1, Stack::new);
        if !pebbles[0].push(ROOT) {
            return Err(StarcodeError::AllocationFailure { what: "pebbles" });
        }
        self.pebbles = pebbles;
        Ok(())
    }
}

#[inline]
pub(crate) fn path_symbol(path: u32, back: usize) -> u8 {
    ((path >> (PATH_BITS * (back as u32 - 1))) & PATH_MASK) as u8
}

/// Length of the longest common prefix of `a` and `b`.
pub fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Nodes (root excluded) a trie of `height` needs to hold `sorted`.
///
/// Exact for sorted, distinct sequences; an upper bound when ambiguous
/// symbols collapse onto the same code.
pub fn count_arena_nodes<'a, I>(height: usize, sorted: I) -> usize
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let inner = height.saturating_sub(1);
    let mut prev: Option<&[u8]> = None;
    let mut count = 0;
    for seq in sorted {
        let shared = prev.map_or(0, |p| common_prefix(p, seq).min(inner));
        count += inner - shared;
        prev = Some(seq);
    }
    count
}
