//! Persistent hash maps built as hash array mapped tries.
//!
//! Every trie level consumes 5 bits of the key's 32-bit hash, starting from the
//! lowest bits; the seventh level only has the remaining 2 bits. A node stores a
//! 32-bit occupancy bitmap and a compacted array with one entry per set bit.
//! Keys whose full hashes are equal are kept in a collision chain, which is a
//! [`PersistentList`] from the pool's own [`ListPool`].
//!
//! Updates copy the path from the root to the changed node and share all other
//! entries. Roots are reference-counted and unreachable nodes are reclaimed by
//! [`MapPool::gc`], the same way [`ListPool::gc`] does for lists.


use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fnv::FnvHashMap;
use tracing::debug;

use crate::chunk::{ChunkBox, SlotId};
use crate::list::{ListPool, PersistentList};

/// Keys usable in a [`PersistentMap`].
///
/// Keys that compare equal must have equal hashes.
pub trait TrieKey: PartialEq {
    fn trie_hash(&self) -> u32;
}

const BITS_PER_LEVEL: u32 = 5;
const LEVEL_MASK: u32 = (1 << BITS_PER_LEVEL) - 1;
/// The last level. It only has 2 bits of the hash left.
const MAX_LEVEL: u32 = 6;

fn fragment(hash: u32, level: u32) -> u32 {
    (hash >> (level * BITS_PER_LEVEL)) & LEVEL_MASK
}

/// Position of `bit` in the compacted entry array of a node with `bitmap`.
fn slot_index(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

enum Entry<K, V> {
    Child(SlotId),
    Leaf(SlotId),
    Collision(PersistentList<(K, V)>),
}

impl<K, V> Clone for Entry<K, V> {
    fn clone(&self) -> Self {
        match self {
            Entry::Child(id) => Entry::Child(*id),
            Entry::Leaf(id) => Entry::Leaf(*id),
            Entry::Collision(chain) => Entry::Collision(chain.clone()),
        }
    }
}

struct TrieNode<K, V> {
    bitmap: u32,
    entries: Vec<Entry<K, V>>,
}

struct MapPoolInner<K, V> {
    nodes: RefCell<ChunkBox<TrieNode<K, V>>>,
    leaves: RefCell<ChunkBox<(K, V)>>,
    /// Number of live handles for every node that is the root of a map.
    roots: RefCell<FnvHashMap<SlotId, usize>>,
    chains: ListPool<(K, V)>,
}

/// Storage shared by every map created from it.
pub struct MapPool<K, V>(Rc<MapPoolInner<K, V>>);

impl<K, V> Clone for MapPool<K, V> {
    fn clone(&self) -> Self {
        MapPool(self.0.clone())
    }
}

impl<K: TrieKey + Clone, V: Clone> Default for MapPool<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MapPool<K, V> {
    fn same_pool(&self, other: &MapPool<K, V>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn add_ref(&self, node: SlotId) {
        *self.0.roots.borrow_mut().entry(node).or_insert(0) += 1;
    }

    fn remove_ref(&self, node: SlotId) {
        if let Some(count) = self.0.roots.borrow_mut().get_mut(&node) {
            debug_assert!(*count > 0, "root count was decreased below 0");
            *count = count.saturating_sub(1);
        }
    }

    fn root_count(&self, node: SlotId) -> usize {
        self.0.roots.borrow().get(&node).copied().unwrap_or(0)
    }

    fn handle(&self, root: Option<SlotId>, len: usize) -> PersistentMap<K, V> {
        if let Some(root) = root {
            self.add_ref(root);
        }
        PersistentMap {
            root,
            len,
            pool: self.clone(),
        }
    }

    fn alloc_node(&self, bitmap: u32, entries: Vec<Entry<K, V>>) -> SlotId {
        debug_assert_eq!(bitmap.count_ones() as usize, entries.len());
        self.0
            .nodes
            .borrow_mut()
            .reserve_element(TrieNode { bitmap, entries })
    }

    fn alloc_leaf(&self, key: K, value: V) -> SlotId {
        self.0.leaves.borrow_mut().reserve_element((key, value))
    }

    fn read_node(&self, node: SlotId) -> (u32, Vec<Entry<K, V>>) {
        self.0
            .nodes
            .borrow()
            .get(node)
            .map(|n| (n.bitmap, n.entries.clone()))
            .unwrap_or_default()
    }

    /// The collision chain pool used by this map pool.
    pub fn chain_pool(&self) -> &ListPool<(K, V)> {
        &self.0.chains
    }

    /// Reclaim every trie node and leaf that is not reachable from a counted
    /// root, then collect the collision chains released by them.
    ///
    /// Returns the number of slots reclaimed.
    pub fn gc(&self) -> usize {
        let (dead_nodes, dead_leaves) = {
            let mut roots = self.0.roots.borrow_mut();
            roots.retain(|_, count| *count > 0);

            let mut nodes = self.0.nodes.borrow_mut();
            let mut leaves = self.0.leaves.borrow_mut();
            nodes.reset_marks();
            leaves.reset_marks();

            let mut stack = roots.keys().copied().collect::<Vec<_>>();
            while let Some(id) = stack.pop() {
                if !nodes.mark(id) {
                    continue;
                }
                let Some(node) = nodes.get(id) else { continue };
                for entry in &node.entries {
                    match entry {
                        Entry::Child(child) => stack.push(*child),
                        Entry::Leaf(leaf) => {
                            leaves.mark(*leaf);
                        }
                        // Chains hold their own root in the chain pool.
                        Entry::Collision(_) => {}
                    }
                }
            }

            (nodes.collect_chunks(), leaves.collect_chunks())
        };

        let reclaimed = dead_nodes.len() + dead_leaves.len();
        drop(dead_nodes);
        drop(dead_leaves);
        let chains = self.0.chains.gc();

        debug!(
            reclaimed,
            chains,
            live = self.live_size_bytes(),
            "map pool collected"
        );
        reclaimed + chains
    }

    /// Drop every node and leaf of this pool.
    pub fn clear(&self) {
        let nodes = self.0.nodes.borrow_mut().drain();
        let leaves = self.0.leaves.borrow_mut().drain();
        self.0.roots.borrow_mut().clear();
        drop(nodes);
        drop(leaves);
        self.0.chains.clear();
    }

    /// Number of trie nodes plus leaves currently allocated.
    pub fn slot_count(&self) -> usize {
        self.0.nodes.borrow().len() + self.0.leaves.borrow().len()
    }

    pub fn reserved_size_bytes(&self) -> usize {
        self.0.nodes.borrow().reserved_size_bytes()
            + self.0.leaves.borrow().reserved_size_bytes()
            + self.0.chains.reserved_size_bytes()
    }

    pub fn live_size_bytes(&self) -> usize {
        self.0.nodes.borrow().live_size_bytes()
            + self.0.leaves.borrow().live_size_bytes()
            + self.0.chains.live_size_bytes()
    }
}

impl<K: TrieKey + Clone, V: Clone> MapPool<K, V> {
    pub fn new() -> Self {
        MapPool(Rc::new(MapPoolInner {
            nodes: RefCell::new(ChunkBox::new()),
            leaves: RefCell::new(ChunkBox::new()),
            roots: RefCell::new(FnvHashMap::default()),
            chains: ListPool::new(),
        }))
    }

    /// Create an empty map.
    pub fn new_map(&self) -> PersistentMap<K, V> {
        self.handle(None, 0)
    }

    /// Create a map from key-value pairs. Later pairs overwrite earlier ones.
    pub fn map_from<I: IntoIterator<Item = (K, V)>>(&self, pairs: I) -> PersistentMap<K, V> {
        pairs
            .into_iter()
            .fold(self.new_map(), |map, (key, value)| map.add(key, value))
    }

    fn leaf(&self, leaf: SlotId) -> Option<(K, V)> {
        self.0.leaves.borrow().get(leaf).cloned()
    }

    fn leaf_has_key(&self, leaf: SlotId, key: &K) -> bool {
        self.0
            .leaves
            .borrow()
            .get(leaf)
            .map_or(false, |(k, _)| k == key)
    }

    fn leaf_value(&self, leaf: SlotId, key: &K) -> Option<V> {
        let leaves = self.0.leaves.borrow();
        let (k, v) = leaves.get(leaf)?;
        (k == key).then(|| v.clone())
    }

    /// Push every pair reachable from `entry` into `out`.
    fn collect_pairs(&self, entry: &Entry<K, V>, out: &mut Vec<(K, V)>) {
        match entry {
            Entry::Leaf(leaf) => out.extend(self.leaf(*leaf)),
            Entry::Collision(chain) => out.extend(chain.iter()),
            Entry::Child(child) => {
                let (_, entries) = self.read_node(*child);
                for entry in &entries {
                    self.collect_pairs(entry, out);
                }
            }
        }
    }

    /// Build the entry holding `a` and `b`, whose hashes agree on every level
    /// before `level`.
    fn merge(&self, level: u32, a: (Entry<K, V>, u32), b: (Entry<K, V>, u32)) -> Entry<K, V> {
        let ((a, hash_a), (b, hash_b)) = (a, b);
        if hash_a == hash_b || level > MAX_LEVEL {
            let mut pairs = Vec::new();
            self.collect_pairs(&a, &mut pairs);
            self.collect_pairs(&b, &mut pairs);
            return Entry::Collision(self.0.chains.list_from(pairs));
        }

        let frag_a = fragment(hash_a, level);
        let frag_b = fragment(hash_b, level);
        let node = if frag_a == frag_b {
            let child = self.merge(level + 1, (a, hash_a), (b, hash_b));
            self.alloc_node(1 << frag_a, vec![child])
        } else {
            let entries = if frag_a < frag_b { vec![a, b] } else { vec![b, a] };
            self.alloc_node((1 << frag_a) | (1 << frag_b), entries)
        };
        Entry::Child(node)
    }

    /// Insert into the subtree at `node`, returning the copied node and whether
    /// a new key was added.
    fn insert(&self, node: SlotId, level: u32, hash: u32, key: K, value: V) -> (SlotId, bool) {
        let (bitmap, mut entries) = self.read_node(node);
        let bit = 1 << fragment(hash, level);
        let idx = slot_index(bitmap, bit);

        if bitmap & bit == 0 {
            entries.insert(idx, Entry::Leaf(self.alloc_leaf(key, value)));
            return (self.alloc_node(bitmap | bit, entries), true);
        }

        let (entry, added) = match entries[idx].clone() {
            Entry::Child(child) => {
                let (child, added) = self.insert(child, level + 1, hash, key, value);
                (Entry::Child(child), added)
            }
            Entry::Leaf(leaf) => match self.leaf(leaf) {
                Some((old_key, _)) if old_key != key => {
                    let old_hash = old_key.trie_hash();
                    let new_leaf = Entry::Leaf(self.alloc_leaf(key, value));
                    let merged = self.merge(level + 1, (Entry::Leaf(leaf), old_hash), (new_leaf, hash));
                    (merged, true)
                }
                _ => (Entry::Leaf(self.alloc_leaf(key, value)), false),
            },
            Entry::Collision(chain) => {
                let chain_hash = chain.first().map_or(hash, |(k, _)| k.trie_hash());
                if chain_hash == hash || level == MAX_LEVEL {
                    match chain.iter().position(|(k, _)| k == key) {
                        Some(pos) => (Entry::Collision(chain.remove_at(pos).add((key, value))), false),
                        None => (Entry::Collision(chain.add((key, value))), true),
                    }
                } else {
                    let new_leaf = Entry::Leaf(self.alloc_leaf(key, value));
                    let merged = self.merge(level + 1, (Entry::Collision(chain), chain_hash), (new_leaf, hash));
                    (merged, true)
                }
            }
        };

        entries[idx] = entry;
        (self.alloc_node(bitmap, entries), added)
    }

    /// Remove `key` from the subtree at `node`, returning the new contents of
    /// the copied node, or `None` if the key is absent.
    fn remove_in(
        &self,
        node: SlotId,
        level: u32,
        hash: u32,
        key: &K,
    ) -> Option<(u32, Vec<Entry<K, V>>)> {
        let (mut bitmap, mut entries) = self.read_node(node);
        let bit = 1 << fragment(hash, level);
        if bitmap & bit == 0 {
            return None;
        }
        let idx = slot_index(bitmap, bit);

        let replacement = match &entries[idx] {
            Entry::Child(child) => {
                let (child_bitmap, mut child_entries) =
                    self.remove_in(*child, level + 1, hash, key)?;
                match child_entries.len() {
                    0 => None,
                    // A lone leaf or chain moves up into this node.
                    1 if !matches!(child_entries[0], Entry::Child(_)) => child_entries.pop(),
                    _ => Some(Entry::Child(self.alloc_node(child_bitmap, child_entries))),
                }
            }
            Entry::Leaf(leaf) => {
                if !self.leaf_has_key(*leaf, key) {
                    return None;
                }
                None
            }
            Entry::Collision(chain) => {
                let pos = chain.iter().position(|(k, _)| &k == key)?;
                let rest = chain.remove_at(pos);
                if rest.len() == 1 {
                    rest.first().map(|(k, v)| Entry::Leaf(self.alloc_leaf(k, v)))
                } else {
                    Some(Entry::Collision(rest))
                }
            }
        };

        match replacement {
            Some(entry) => entries[idx] = entry,
            None => {
                entries.remove(idx);
                bitmap &= !bit;
            }
        }
        Some((bitmap, entries))
    }
}

/// A handle to an immutable map stored in a [`MapPool`].
pub struct PersistentMap<K, V> {
    root: Option<SlotId>,
    len: usize,
    pool: MapPool<K, V>,
}

impl<K, V> PersistentMap<K, V> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pool(&self) -> &MapPool<K, V> {
        &self.pool
    }

    /// Number of live handles sharing this map's root node.
    pub fn ref_count(&self) -> usize {
        self.root.map_or(0, |root| self.pool.root_count(root))
    }

    /// Whether both maps share the same root node of the same pool.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.root == other.root && self.pool.same_pool(&other.pool)
    }
}

impl<K: TrieKey + Clone, V: Clone> PersistentMap<K, V> {
    pub fn get(&self, key: &K) -> Option<V> {
        let hash = key.trie_hash();
        let mut node = self.root?;
        let mut level = 0;
        loop {
            let entry = {
                let nodes = self.pool.0.nodes.borrow();
                let current = nodes.get(node)?;
                let bit = 1 << fragment(hash, level);
                if current.bitmap & bit == 0 {
                    return None;
                }
                current.entries[slot_index(current.bitmap, bit)].clone()
            };

            match entry {
                Entry::Child(child) => {
                    node = child;
                    level += 1;
                }
                Entry::Leaf(leaf) => return self.pool.leaf_value(leaf, key),
                Entry::Collision(chain) => {
                    let found = chain.iter().find(|(k, _)| k == key);
                    return found.map(|(_, v)| v);
                }
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Return a new map with `key` bound to `value`.
    pub fn add(&self, key: K, value: V) -> Self {
        let hash = key.trie_hash();
        let (root, added) = match self.root {
            Some(root) => self.pool.insert(root, 0, hash, key, value),
            None => {
                let leaf = Entry::Leaf(self.pool.alloc_leaf(key, value));
                (self.pool.alloc_node(1 << fragment(hash, 0), vec![leaf]), true)
            }
        };
        self.pool.handle(Some(root), self.len + usize::from(added))
    }

    /// Return a new map without `key`. A missing key returns this map unchanged.
    pub fn remove(&self, key: &K) -> Self {
        let Some(root) = self.root else {
            return self.clone();
        };
        match self.pool.remove_in(root, 0, key.trie_hash(), key) {
            None => self.clone(),
            Some((_, entries)) if entries.is_empty() => self.pool.handle(None, 0),
            Some((bitmap, entries)) => {
                let root = self.pool.alloc_node(bitmap, entries);
                self.pool.handle(Some(root), self.len - 1)
            }
        }
    }

    /// Rebind `key` only if it is already present.
    pub fn try_replace_value(&self, key: K, value: V) -> Option<Self> {
        if self.contains_key(&key) {
            Some(self.add(key, value))
        } else {
            None
        }
    }

    /// All pairs of this map, in trie order.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> {
        let mut pairs = Vec::with_capacity(self.len);
        if let Some(root) = self.root {
            self.pool.collect_pairs(&Entry::Child(root), &mut pairs);
        }
        pairs.into_iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = V> {
        self.iter().map(|(_, v)| v)
    }
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        if let Some(root) = self.root {
            self.pool.add_ref(root);
        }
        PersistentMap {
            root: self.root,
            len: self.len,
            pool: self.pool.clone(),
        }
    }
}

impl<K, V> Drop for PersistentMap<K, V> {
    fn drop(&mut self) {
        if let Some(root) = self.root {
            self.pool.remove_ref(root);
        }
    }
}

impl<K: TrieKey + Clone, V: Clone + PartialEq> PartialEq for PersistentMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        self.ptr_eq(other)
            || self
                .iter()
                .all(|(k, v)| other.get(&k).map_or(false, |other_v| other_v == v))
    }
}

impl<K: TrieKey + Clone + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
