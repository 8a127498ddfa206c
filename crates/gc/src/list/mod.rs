//! Persistent singly-linked lists.
//!
//! Lists are handles into a shared [`ListPool`]. Adding to a list allocates a
//! single node in front of the existing chain, so any number of lists may share
//! a common tail. Only the heads of live handles are reference-counted; the
//! nodes behind them are kept alive by being reachable from a counted head and
//! are reclaimed only when [`ListPool::gc`] runs.

#[cfg(test)]
mod test;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fnv::FnvHashMap;
use tracing::debug;

use crate::chunk::{ChunkBox, SlotId};

struct ListNode<T> {
    data: T,
    next: Option<SlotId>,
}

struct ListPoolInner<T> {
    nodes: RefCell<ChunkBox<ListNode<T>>>,
    /// Number of live handles for every node that heads a list.
    roots: RefCell<FnvHashMap<SlotId, usize>>,
}

/// Storage shared by every list created from it.
pub struct ListPool<T>(Rc<ListPoolInner<T>>);

impl<T> Clone for ListPool<T> {
    fn clone(&self) -> Self {
        ListPool(self.0.clone())
    }
}

impl<T: Clone> Default for ListPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListPool<T> {
    fn same_pool(&self, other: &ListPool<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn add_ref(&self, node: SlotId) {
        *self.0.roots.borrow_mut().entry(node).or_insert(0) += 1;
    }

    pub(crate) fn remove_ref(&self, node: SlotId) {
        if let Some(count) = self.0.roots.borrow_mut().get_mut(&node) {
            debug_assert!(*count > 0, "root count was decreased below 0");
            *count = count.saturating_sub(1);
        }
    }

    fn root_count(&self, node: SlotId) -> usize {
        self.0.roots.borrow().get(&node).copied().unwrap_or(0)
    }

    fn alloc(&self, data: T, next: Option<SlotId>) -> SlotId {
        self.0
            .nodes
            .borrow_mut()
            .reserve_element(ListNode { data, next })
    }

    fn next_of(&self, node: SlotId) -> Option<SlotId> {
        self.0.nodes.borrow().get(node).and_then(|n| n.next)
    }

    /// Create a handle for the chain starting at `head`, counting it as a root.
    fn handle(&self, head: Option<SlotId>, len: usize) -> PersistentList<T> {
        if let Some(head) = head {
            self.add_ref(head);
        }
        PersistentList {
            head,
            len,
            pool: self.clone(),
        }
    }

    /// Reclaim every node that is not reachable from a counted root.
    ///
    /// Returns the number of nodes reclaimed.
    pub fn gc(&self) -> usize {
        let swept = {
            let mut roots = self.0.roots.borrow_mut();
            roots.retain(|_, count| *count > 0);

            let mut nodes = self.0.nodes.borrow_mut();
            nodes.reset_marks();
            for &root in roots.keys() {
                let mut cursor = Some(root);
                while let Some(id) = cursor {
                    // An already marked node means the rest of the chain is marked too.
                    if !nodes.mark(id) {
                        break;
                    }
                    cursor = nodes.get(id).and_then(|n| n.next);
                }
            }
            nodes.collect_chunks()
        };

        // Dropping swept data may release roots of other lists, so this must
        // happen after the borrows above are gone.
        let reclaimed = swept.len();
        drop(swept);

        debug!(
            reclaimed,
            live = self.live_size_bytes(),
            "list pool collected"
        );
        reclaimed
    }

    /// Drop every node of this pool. Handles that outlive this call read as
    /// truncated lists.
    pub fn clear(&self) {
        let drained = self.0.nodes.borrow_mut().drain();
        self.0.roots.borrow_mut().clear();
        drop(drained);
    }

    /// Number of nodes currently allocated.
    pub fn node_count(&self) -> usize {
        self.0.nodes.borrow().len()
    }

    pub fn reserved_size_bytes(&self) -> usize {
        self.0.nodes.borrow().reserved_size_bytes()
    }

    pub fn live_size_bytes(&self) -> usize {
        self.0.nodes.borrow().live_size_bytes()
    }
}

impl<T: Clone> ListPool<T> {
    pub fn new() -> Self {
        ListPool(Rc::new(ListPoolInner {
            nodes: RefCell::new(ChunkBox::new()),
            roots: RefCell::new(FnvHashMap::default()),
        }))
    }

    /// Create an empty list.
    pub fn new_list(&self) -> PersistentList<T> {
        self.handle(None, 0)
    }

    /// Create a list holding `items` in iteration order.
    pub fn list_from<I: IntoIterator<Item = T>>(&self, items: I) -> PersistentList<T> {
        let items = items.into_iter().collect::<Vec<_>>();
        let len = items.len();
        let mut head = None;
        for item in items.into_iter().rev() {
            head = Some(self.alloc(item, head));
        }
        self.handle(head, len)
    }

    fn data_of(&self, node: SlotId) -> Option<T> {
        self.0.nodes.borrow().get(node).map(|n| n.data.clone())
    }
}

/// A handle to an immutable list stored in a [`ListPool`].
pub struct PersistentList<T> {
    head: Option<SlotId>,
    len: usize,
    pool: ListPool<T>,
}

impl<T> PersistentList<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn pool(&self) -> &ListPool<T> {
        &self.pool
    }

    /// Number of live handles sharing this list's head node.
    pub fn ref_count(&self) -> usize {
        self.head.map_or(0, |head| self.pool.root_count(head))
    }

    /// Whether both lists start at the same node of the same pool.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.head == other.head && self.pool.same_pool(&other.pool)
    }
}

impl<T: Clone> PersistentList<T> {
    /// Return a new list with `value` in front of this one.
    pub fn add(&self, value: T) -> Self {
        let head = self.pool.alloc(value, self.head);
        self.pool.handle(Some(head), self.len + 1)
    }

    /// Return a new list without the element at `index`.
    ///
    /// Every node before `index` is copied; everything after it is shared.
    /// An out-of-range index returns this list unchanged.
    pub fn remove_at(&self, index: usize) -> Self {
        if index >= self.len {
            return self.clone();
        }

        let mut prefix = Vec::with_capacity(index);
        let mut cursor = self.head;
        for _ in 0..index {
            let Some(id) = cursor else { break };
            prefix.extend(self.pool.data_of(id));
            cursor = self.pool.next_of(id);
        }

        let mut head = cursor.and_then(|removed| self.pool.next_of(removed));
        for data in prefix.into_iter().rev() {
            head = Some(self.pool.alloc(data, head));
        }
        self.pool.handle(head, self.len - 1)
    }

    pub fn first(&self) -> Option<T> {
        self.head.and_then(|head| self.pool.data_of(head))
    }

    /// The list without its first element, sharing all remaining nodes.
    pub fn rest(&self) -> Self {
        match self.head {
            Some(head) => self.pool.handle(self.pool.next_of(head), self.len - 1),
            None => self.clone(),
        }
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T> Clone for PersistentList<T> {
    fn clone(&self) -> Self {
        if let Some(head) = self.head {
            self.pool.add_ref(head);
        }
        PersistentList {
            head: self.head,
            len: self.len,
            pool: self.pool.clone(),
        }
    }
}

impl<T> Drop for PersistentList<T> {
    fn drop(&mut self) {
        if let Some(head) = self.head {
            self.pool.remove_ref(head);
        }
    }
}

impl<T: Clone + PartialEq> PartialEq for PersistentList<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        self.ptr_eq(other) || self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for PersistentList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over clones of a list's elements.
pub struct Iter<'a, T> {
    list: &'a PersistentList<T>,
    cursor: Option<SlotId>,
    remaining: usize,
}

impl<'a, T: Clone> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let (data, next) = {
            let nodes = self.list.pool.0.nodes.borrow();
            let node = nodes.get(id)?;
            (node.data.clone(), node.next)
        };
        self.cursor = next;
        self.remaining = self.remaining.saturating_sub(1);
        Some(data)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<'a, T: Clone> IntoIterator for &'a PersistentList<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
