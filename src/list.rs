//! Doubly linked list whose nodes live in a `Heap` and link through handles.
//!
//! Ownership runs forward: the list owns the head, each node owns its
//! successor through `next`, and `prev` is a `WeakHandle` used only for
//! walking backwards. A chain therefore never keeps itself alive.

use crate::error::NullAccessError;
use crate::handle::{Heap, ManagedHandle, WeakHandle};
use crate::registry::Registry;
use crate::sort::{self, SortAlgorithm};
use core::fmt;
use core::marker::PhantomData;

pub struct Node<T> {
    pub(crate) value: T,
    pub(crate) next: ManagedHandle<Node<T>>,
    pub(crate) prev: WeakHandle<Node<T>>,
}

/// Handle to a list node.
pub type NodeHandle<T> = ManagedHandle<Node<T>>;

impl<T> Node<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            next: ManagedHandle::null(),
            prev: WeakHandle::null(),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn next(&self) -> &NodeHandle<T> {
        &self.next
    }

    pub fn prev(&self) -> &WeakHandle<Node<T>> {
        &self.prev
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        // Unlink successors this node alone owns so freeing one does not
        // recurse into the rest of the chain. A successor still aliased
        // elsewhere keeps its suffix intact. Runs after the heap borrow that
        // vacated this node has ended.
        let mut cur = core::mem::take(&mut self.next);
        while cur.refcount() == 1 {
            match cur.replace_next(ManagedHandle::null()) {
                Ok(next) => cur = next,
                Err(_) => break,
            }
        }
    }
}

impl<T: Default> Default for Node<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("value", &self.value)
            .field("next", &self.next.identity())
            .field("prev", &self.prev.identity())
            .finish()
    }
}

impl<T> ManagedHandle<Node<T>> {
    /// Successor node, null at the end of the chain.
    pub fn next(&self) -> Result<Self, NullAccessError> {
        self.with(|n| n.next.clone())
    }

    /// Predecessor node, null at the start of the chain.
    pub fn prev(&self) -> Result<Self, NullAccessError> {
        self.with(|n| n.prev.upgrade())
    }

    pub fn value(&self) -> Result<T, NullAccessError>
    where
        T: Clone,
    {
        self.with(|n| n.value.clone())
    }

    pub fn set_value(&self, value: T) -> Result<(), NullAccessError> {
        let old = self.with_mut(|n| core::mem::replace(&mut n.value, value))?;
        drop(old);
        Ok(())
    }

    /// Exchange the values stored in two nodes; the nodes stay where they are.
    pub fn swap_values(&self, other: &Self) -> Result<(), NullAccessError> {
        self.with_pair_mut(other, |a, b| core::mem::swap(&mut a.value, &mut b.value))?;
        Ok(())
    }

    /// Replace the forward link, handing back the old one so the caller can
    /// drop it outside the heap borrow.
    pub(crate) fn replace_next(&self, next: Self) -> Result<Self, NullAccessError> {
        self.with_mut(|n| core::mem::replace(&mut n.next, next))
    }

    pub(crate) fn set_prev(&self, prev: WeakHandle<Node<T>>) -> Result<(), NullAccessError> {
        self.with_mut(|n| n.prev = prev)
    }
}

pub struct DoublyLinkedList<T> {
    heap: Heap<Node<T>>,
    head: NodeHandle<T>,
    tail: NodeHandle<T>,
    len: usize,
}

impl<T> DoublyLinkedList<T> {
    /// Empty list with its own node heap registered in `registry`.
    pub fn new(registry: &Registry) -> Self {
        Self::in_heap(Heap::new(registry))
    }

    /// Empty list allocating its nodes from `heap`.
    pub fn in_heap(heap: Heap<Node<T>>) -> Self {
        Self {
            heap,
            head: ManagedHandle::null(),
            tail: ManagedHandle::null(),
            len: 0,
        }
    }

    pub fn heap(&self) -> &Heap<Node<T>> {
        &self.heap
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    pub fn head(&self) -> NodeHandle<T> {
        self.head.clone()
    }

    pub fn tail(&self) -> NodeHandle<T> {
        self.tail.clone()
    }

    /// Add `value` after the current tail and return the new node.
    pub fn append(&mut self, value: T) -> NodeHandle<T> {
        let node = self.heap.alloc(Node::new(value));
        if self.head.is_null() {
            self.head = node.clone();
            self.tail = node.clone();
        } else {
            let back = self.tail.downgrade();
            let previous = self.tail.replace_next(node.clone());
            debug_assert!(matches!(previous, Ok(ref old) if old.is_null()));
            drop(previous);
            let linked = node.set_prev(back);
            debug_assert!(linked.is_ok());
            self.tail.assign_handle(&node);
        }
        self.len += 1;
        node
    }

    /// Values from head to tail. Each call starts a fresh walk.
    pub fn values(&self) -> Values<'_, T>
    where
        T: Clone,
    {
        Values {
            cursor: self.head.clone(),
            _list: PhantomData,
        }
    }

    /// Node handles from head to tail.
    pub fn handles(&self) -> Handles<'_, T> {
        Handles {
            cursor: self.head.clone(),
            _list: PhantomData,
        }
    }

    /// Sort the list's values in place with `algorithm`.
    pub fn sort(&self, algorithm: SortAlgorithm) -> Result<(), NullAccessError>
    where
        T: PartialOrd + Clone,
    {
        match algorithm {
            SortAlgorithm::Quick => sort::quick_sort(&self.head, &self.tail),
            SortAlgorithm::Bubble => sort::bubble_sort(&self.head),
            SortAlgorithm::Insertion => sort::insertion_sort(&self.head),
        }
    }
}

impl<T> Extend<T> for DoublyLinkedList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.append(value);
        }
    }
}

impl<T> Drop for DoublyLinkedList<T> {
    fn drop(&mut self) {
        // Tail first, so the head's release sees the last node as uniquely
        // owned by the chain.
        self.tail = ManagedHandle::null();
        self.head = ManagedHandle::null();
    }
}

impl<T: fmt::Debug + Clone> fmt::Debug for DoublyLinkedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values()).finish()
    }
}

/// Lazy walk over list values.
pub struct Values<'a, T> {
    cursor: NodeHandle<T>,
    _list: PhantomData<&'a DoublyLinkedList<T>>,
}

impl<'a, T: Clone> Iterator for Values<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let (value, next) = self
            .cursor
            .with(|n| (n.value.clone(), n.next.clone()))
            .ok()?;
        self.cursor = next;
        Some(value)
    }
}

/// Lazy walk over node handles.
pub struct Handles<'a, T> {
    cursor: NodeHandle<T>,
    _list: PhantomData<&'a DoublyLinkedList<T>>,
}

impl<'a, T> Iterator for Handles<'a, T> {
    type Item = NodeHandle<T>;

    fn next(&mut self) -> Option<NodeHandle<T>> {
        let next = self.cursor.next().ok()?;
        Some(core::mem::replace(&mut self.cursor, next))
    }
}
