//! Compressed binary trie over IP prefixes.
//!
//! The trie stores variable-length prefixes of both address families in one
//! structure: keys are left-aligned 128-bit words (see [`PrefixKey`]), and
//! chains of single-child nodes are collapsed, so each node holds an entire
//! prefix rather than a single bit. Insertion creates at most two nodes and
//! lookup visits at most `address width` nodes, independent of how many
//! entries the trie holds.
//!
//! Every node carries four outcome slots — {transport, client-subnet} x
//! {v4, v6} — so overlapping v4/v6 prefixes share path structure without
//! sharing outcomes. Slot writes go through [`TrieNode::set_if_unset`]: a
//! slot, once decided, is never overwritten.

use crate::key::{bit_at, common_prefix, mask_bits, Action, PrefixKey, SLOT_COUNT};

/// An outcome recorded in a node slot, tagged with the insertion sequence
/// number that produced it. Sequence numbers are bookkeeping for merges only;
/// they never influence match precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotEntry {
    pub(crate) action: Action,
    pub(crate) seq: u64,
}

/// A node in the compressed trie.
///
/// Owns its children outright; a node is reachable only through its parent,
/// so dropping the root tears down the whole trie.
#[derive(Debug)]
pub struct TrieNode {
    bits: u128,
    len: u8,
    children: [Option<Box<TrieNode>>; 2],
    slots: [Option<SlotEntry>; SLOT_COUNT],
}

impl TrieNode {
    fn new(bits: u128, len: u8) -> Self {
        Self {
            bits: mask_bits(bits, len),
            len,
            children: [None, None],
            slots: [None; SLOT_COUNT],
        }
    }

    /// The prefix length this node represents.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    /// The left-aligned prefix bits this node represents.
    #[must_use]
    pub fn prefix_bits(&self) -> u128 {
        self.bits
    }

    /// Record `action` in `slot` unless the slot is already decided.
    ///
    /// Returns whether the slot was newly set. "Already set" is the normal
    /// first-write-wins outcome, not an error.
    pub(crate) fn set_if_unset(&mut self, slot: usize, action: Action, seq: u64) -> bool {
        if self.slots[slot].is_some() {
            return false;
        }
        self.slots[slot] = Some(SlotEntry { action, seq });
        true
    }

    /// The outcome decided for `slot`, if any.
    #[must_use]
    pub fn action(&self, slot: usize) -> Option<Action> {
        self.slots[slot].map(|e| e.action)
    }

    pub(crate) fn entry(&self, slot: usize) -> Option<SlotEntry> {
        self.slots[slot]
    }

    /// Whether any of the four slots is decided.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.slots.iter().any(Option::is_some)
    }
}

/// Outcome of probing an existing node against a key, computed before any
/// mutable borrow is taken.
enum Step {
    /// Prefixes identical; reuse the node.
    Here,
    /// Node's prefix is a strict prefix of the key; descend this child.
    Child(usize),
    /// Key ends at, or diverges inside, the node's prefix; restructure.
    Split,
}

/// A compressed binary trie mapping IP prefixes to per-slot outcomes.
#[derive(Debug, Default)]
pub struct PrefixTrie {
    root: Option<Box<TrieNode>>,
    nodes: usize,
}

impl PrefixTrie {
    /// Create an empty trie.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes currently allocated (including structural branch
    /// nodes created by splits).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Whether the trie holds no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert `key`, returning the node that represents it.
    ///
    /// If a node for the exact prefix already exists it is returned
    /// unchanged; otherwise at most two nodes are created (a leaf, plus a
    /// branch node when the key diverges from an existing prefix partway
    /// through).
    pub fn insert(&mut self, key: PrefixKey) -> &mut TrieNode {
        let nodes = &mut self.nodes;
        Self::insert_at(&mut self.root, key.bits(), key.len(), nodes)
    }

    fn insert_at<'a>(
        link: &'a mut Option<Box<TrieNode>>,
        bits: u128,
        len: u8,
        nodes: &mut usize,
    ) -> &'a mut TrieNode {
        if link.is_none() {
            *nodes += 1;
            *link = Some(Box::new(TrieNode::new(bits, len)));
            return link.as_deref_mut().expect("link was just filled");
        }

        let step = {
            let node = link.as_deref().expect("checked above");
            let common = common_prefix(node.bits, bits, node.len.min(len));
            if common == node.len && node.len == len {
                Step::Here
            } else if common == node.len {
                Step::Child(bit_at(bits, node.len))
            } else {
                Step::Split
            }
        };

        match step {
            Step::Here => link.as_deref_mut().expect("probed above"),
            Step::Child(branch) => {
                let node = link.as_deref_mut().expect("probed above");
                Self::insert_at(&mut node.children[branch], bits, len, nodes)
            }
            Step::Split => {
                let old = link.take().expect("probed above");
                let common = common_prefix(old.bits, bits, old.len.min(len));
                if common == len {
                    // Key is a strict prefix of the existing node: the new
                    // node becomes its parent.
                    *nodes += 1;
                    let mut parent = Box::new(TrieNode::new(bits, len));
                    let old_bit = bit_at(old.bits, len);
                    parent.children[old_bit] = Some(old);
                    *link = Some(parent);
                    link.as_deref_mut().expect("link was just filled")
                } else {
                    // Prefixes diverge before either ends: create a branch
                    // node at the divergence point with the old subtree on
                    // one side and a fresh leaf for the key on the other.
                    *nodes += 2;
                    let old_bit = bit_at(old.bits, common);
                    let new_bit = bit_at(bits, common);
                    debug_assert_ne!(old_bit, new_bit);
                    let mut branch = Box::new(TrieNode::new(bits, common));
                    branch.children[old_bit] = Some(old);
                    branch.children[new_bit] = Some(Box::new(TrieNode::new(bits, len)));
                    let branch = link.insert(branch);
                    branch.children[new_bit]
                        .as_deref_mut()
                        .expect("leaf was just attached")
                }
            }
        }
    }

    /// Longest-prefix lookup for `slot`.
    ///
    /// Walks the address's bit path, remembering the deepest node whose
    /// prefix fully matches the address and whose `slot` is decided. Returns
    /// `None` when no ancestor on the path has that slot set. A length-0
    /// node, if present, is an ancestor of every address and acts as the
    /// default.
    #[must_use]
    pub fn lookup(&self, bits: u128, width: u8, slot: usize) -> Option<Action> {
        let mut best = None;
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            if node.len > width || common_prefix(node.bits, bits, node.len) < node.len {
                break;
            }
            if let Some(entry) = node.entry(slot) {
                best = Some(entry.action);
            }
            if node.len == width {
                break;
            }
            cur = node.children[bit_at(bits, node.len)].as_deref();
        }
        best
    }

    /// Preorder walk over every node.
    pub(crate) fn walk<F: FnMut(&TrieNode)>(&self, mut visit: F) {
        fn go<F: FnMut(&TrieNode)>(node: &TrieNode, visit: &mut F) {
            visit(node);
            for child in node.children.iter().flatten() {
                go(child, visit);
            }
        }
        if let Some(root) = self.root.as_deref() {
            go(root, &mut visit);
        }
    }
}
