//! Heap and ManagedHandle: refcounted access to registry-tracked slots.
//!
//! A `Heap<T>` owns slot storage for values of one type. Every slot is
//! registered with the heap's `Registry` when allocated and deregistered in
//! the same step that frees it. `ManagedHandle<T>` is the owning pointer:
//! cloning aliases the slot and bumps its count, dropping decrements, and the
//! last drop frees. `WeakHandle<T>` names a slot without owning it.

use crate::counted_slots::{CountedHandle, CountedSlots};
use crate::error::NullAccessError;
use crate::registry::{HandleId, Registry};
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use core::hash::{Hash, Hasher};
use slotmap::DefaultKey;
use std::rc::{Rc, Weak};

struct Slot<T> {
    id: HandleId,
    value: T,
}

struct HeapInner<T> {
    slots: RefCell<CountedSlots<Slot<T>>>,
    registry: Registry,
    type_name: &'static str,
}

impl<T> HeapInner<T> {
    /// Return one counted reference. At zero the slot is vacated and its
    /// identity deregistered before the value is dropped, so the value's own
    /// destructor may release further handles into this heap.
    fn release(&self, counted: CountedHandle<'static>, id: HandleId) {
        let key = counted.key();
        let now_zero = match self.slots.try_borrow() {
            Ok(slots) => slots.release(counted),
            Err(_) => {
                core::mem::forget(counted);
                panic!("handle {id} released while its heap is mutably borrowed");
            }
        };
        if !now_zero {
            return;
        }
        let vacated = self.slots.borrow_mut().remove(key);
        debug_assert_eq!(vacated.as_ref().map(|slot| slot.id), Some(id));
        self.registry.release(id);
        drop(vacated);
    }
}

/// Allocator for managed slots of one type. Clones share the same storage.
pub struct Heap<T> {
    inner: Rc<HeapInner<T>>,
}

impl<T> Heap<T> {
    pub fn new(registry: &Registry) -> Self {
        Self::with_capacity(registry, 0)
    }

    pub fn with_capacity(registry: &Registry, capacity: usize) -> Self {
        Self {
            inner: Rc::new(HeapInner {
                slots: RefCell::new(CountedSlots::with_capacity(capacity)),
                registry: registry.clone(),
                type_name: core::any::type_name::<T>(),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a slot holding `value` and return its first handle.
    pub fn alloc(&self, value: T) -> ManagedHandle<T> {
        let id = self.inner.registry.register(self.inner.type_name);
        let counted = self.inner.slots.borrow_mut().insert(Slot { id, value });
        ManagedHandle {
            live: Some(Live {
                heap: Rc::clone(&self.inner),
                counted,
                id,
            }),
        }
    }

    pub fn alloc_default(&self) -> ManagedHandle<T>
    where
        T: Default,
    {
        self.alloc(T::default())
    }

    pub fn ptr_eq(&self, other: &Heap<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Heap<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("type_name", &self.inner.type_name)
            .field("len", &self.len())
            .finish()
    }
}

struct Live<T> {
    heap: Rc<HeapInner<T>>,
    counted: CountedHandle<'static>,
    id: HandleId,
}

impl<T> Live<T> {
    #[inline]
    fn key(&self) -> DefaultKey {
        self.counted.key()
    }
}

/// Owning, refcounted pointer to one heap slot, or null.
///
/// Clones alias the same slot and share its identity. Two handles are equal
/// when they reference the same slot; compare contents with `equals_value`.
pub struct ManagedHandle<T> {
    live: Option<Live<T>>,
}

impl<T> ManagedHandle<T> {
    /// A handle with no slot. Every dereference fails with `NullAccessError`.
    pub const fn null() -> Self {
        Self { live: None }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.live.is_none()
    }

    /// Identity shared by all aliases of the slot; `HandleId::NULL` for null.
    #[inline]
    pub fn identity(&self) -> HandleId {
        self.live.as_ref().map_or(HandleId::NULL, |l| l.id)
    }

    /// Current number of handles aliasing the slot; 0 for null.
    pub fn refcount(&self) -> usize {
        self.live.as_ref().map_or(0, |l| {
            l.heap.slots.borrow().refcount(l.key()).unwrap_or(0)
        })
    }

    fn live(&self) -> Result<&Live<T>, NullAccessError> {
        self.live.as_ref().ok_or(NullAccessError)
    }

    /// Shared borrow of the slot value.
    ///
    /// The guard borrows the whole heap: while it is held, `get_mut` on any
    /// handle of the same heap panics.
    pub fn get(&self) -> Result<Ref<'_, T>, NullAccessError> {
        let live = self.live()?;
        let key = live.key();
        Ref::filter_map(live.heap.slots.borrow(), |s| s.value(key).map(|slot| &slot.value))
            .map_err(|_| NullAccessError)
    }

    /// Exclusive borrow of the slot value.
    ///
    /// While the guard is held, any other access to the same heap (including
    /// cloning or dropping its handles) panics.
    pub fn get_mut(&self) -> Result<RefMut<'_, T>, NullAccessError> {
        let live = self.live()?;
        let key = live.key();
        RefMut::filter_map(live.heap.slots.borrow_mut(), |s| {
            s.value_mut(key).map(|slot| &mut slot.value)
        })
        .map_err(|_| NullAccessError)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, NullAccessError> {
        let guard = self.get()?;
        Ok(f(&guard))
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, NullAccessError> {
        let mut guard = self.get_mut()?;
        Ok(f(&mut guard))
    }

    /// Overwrite the slot value. Refcount and identity are unchanged.
    ///
    /// The previous value is dropped after the heap borrow is released.
    pub fn assign_value(&self, value: T) -> Result<(), NullAccessError> {
        let old = self.with_mut(|v| core::mem::replace(v, value))?;
        drop(old);
        Ok(())
    }

    /// Make this handle alias `other`'s slot.
    ///
    /// The current slot is released first (and freed if this was its last
    /// handle). When both already reference the same slot nothing changes.
    pub fn assign_handle(&mut self, other: &ManagedHandle<T>) {
        if self.equals_handle(other) {
            return;
        }
        drop(core::mem::take(self));
        *self = other.clone();
    }

    /// Compare the slot value against `value`.
    pub fn equals_value(&self, value: &T) -> Result<bool, NullAccessError>
    where
        T: PartialEq,
    {
        self.with(|v| v == value)
    }

    /// Identity comparison: true when both reference the same slot, or both are null.
    pub fn equals_handle(&self, other: &ManagedHandle<T>) -> bool {
        match (&self.live, &other.live) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(&a.heap, &b.heap) && a.key() == b.key(),
            _ => false,
        }
    }

    /// Run `f` with mutable access to both slots.
    ///
    /// Returns `Ok(None)` without calling `f` when both handles alias one slot.
    pub fn with_pair_mut<R>(
        &self,
        other: &ManagedHandle<T>,
        f: impl FnOnce(&mut T, &mut T) -> R,
    ) -> Result<Option<R>, NullAccessError> {
        let a = self.live()?;
        let b = other.live()?;
        if Rc::ptr_eq(&a.heap, &b.heap) {
            if a.key() == b.key() {
                return Ok(None);
            }
            let mut slots = a.heap.slots.borrow_mut();
            let (x, y) = slots.pair_mut(a.key(), b.key()).ok_or(NullAccessError)?;
            Ok(Some(f(&mut x.value, &mut y.value)))
        } else {
            let mut x = self.get_mut()?;
            let mut y = other.get_mut()?;
            Ok(Some(f(&mut x, &mut y)))
        }
    }

    /// Non-owning reference to the same slot.
    pub fn downgrade(&self) -> WeakHandle<T> {
        match &self.live {
            None => WeakHandle::null(),
            Some(l) => WeakHandle {
                target: Some((Rc::downgrade(&l.heap), l.key())),
                id: l.id,
            },
        }
    }
}

impl<T> Clone for ManagedHandle<T> {
    fn clone(&self) -> Self {
        match &self.live {
            None => Self::null(),
            Some(l) => {
                let counted = l.heap.slots.borrow().get(&l.counted);
                Self {
                    live: Some(Live {
                        heap: Rc::clone(&l.heap),
                        counted,
                        id: l.id,
                    }),
                }
            }
        }
    }
}

impl<T> Drop for ManagedHandle<T> {
    fn drop(&mut self) {
        if let Some(Live { heap, counted, id }) = self.live.take() {
            heap.release(counted, id);
        }
    }
}

impl<T> Default for ManagedHandle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> PartialEq for ManagedHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.equals_handle(other)
    }
}

impl<T> Eq for ManagedHandle<T> {}

impl<T> Hash for ManagedHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.live {
            None => HandleId::NULL.hash(state),
            Some(l) => {
                (Rc::as_ptr(&l.heap) as *const () as usize).hash(state);
                l.key().hash(state);
            }
        }
    }
}

impl<T> fmt::Debug for ManagedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.live {
            None => f.write_str("ManagedHandle(null)"),
            Some(l) => f
                .debug_struct("ManagedHandle")
                .field("id", &l.id)
                .field("type_name", &l.heap.type_name)
                .finish(),
        }
    }
}

/// Non-owning reference to a slot; does not keep the slot alive.
///
/// The slot key is generational, so upgrading after the slot was freed
/// yields null even if its storage has been reused.
pub struct WeakHandle<T> {
    target: Option<(Weak<HeapInner<T>>, DefaultKey)>,
    id: HandleId,
}

impl<T> WeakHandle<T> {
    pub const fn null() -> Self {
        Self {
            target: None,
            id: HandleId::NULL,
        }
    }

    /// True when this never referenced a slot. A dangling weak handle is not null.
    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    pub fn identity(&self) -> HandleId {
        self.id
    }

    /// An owning handle to the slot if it is still live, otherwise null.
    pub fn upgrade(&self) -> ManagedHandle<T> {
        let Some((heap, key)) = &self.target else {
            return ManagedHandle::null();
        };
        let Some(heap) = heap.upgrade() else {
            return ManagedHandle::null();
        };
        let counted = heap.slots.borrow().upgrade(*key);
        match counted {
            Some(counted) => ManagedHandle {
                live: Some(Live {
                    heap,
                    counted,
                    id: self.id,
                }),
            },
            None => ManagedHandle::null(),
        }
    }

    /// True when `handle` references the slot this points at (or both are null).
    pub fn points_to(&self, handle: &ManagedHandle<T>) -> bool {
        match (&self.target, &handle.live) {
            (None, None) => true,
            (Some((heap, key)), Some(l)) => {
                core::ptr::eq(heap.as_ptr(), Rc::as_ptr(&l.heap)) && *key == l.key()
            }
            _ => false,
        }
    }
}

impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            id: self.id,
        }
    }
}

impl<T> Default for WeakHandle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for WeakHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            None => f.write_str("WeakHandle(null)"),
            Some(_) => f.debug_struct("WeakHandle").field("id", &self.id).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_registers_and_last_drop_frees() {
        let registry = Registry::new();
        let heap: Heap<i32> = Heap::new(&registry);
        let h = heap.alloc(3);
        let id = h.identity();
        assert!(registry.is_live(id));
        assert_eq!(heap.len(), 1);
        let h2 = h.clone();
        assert_eq!(h.refcount(), 2);
        drop(h);
        assert!(registry.is_live(id));
        assert_eq!(*h2.get().unwrap(), 3);
        drop(h2);
        assert!(!registry.is_live(id));
        assert!(heap.is_empty());
        assert_eq!(registry.violations(), 0);
    }

    #[test]
    fn weak_upgrade_follows_slot_liveness() {
        let registry = Registry::new();
        let heap = Heap::new(&registry);
        let h = heap.alloc(String::from("x"));
        let w = h.downgrade();
        assert!(w.points_to(&h));
        let up = w.upgrade();
        assert!(up.equals_handle(&h));
        assert_eq!(h.refcount(), 2);
        drop(up);
        drop(h);
        assert!(w.upgrade().is_null());
        assert!(!w.is_null());

        // Storage reuse must not revive the stale reference.
        let reused = heap.alloc(String::from("y"));
        assert!(w.upgrade().is_null());
        assert!(!w.points_to(&reused));
    }

    #[test]
    fn weak_outliving_heap_upgrades_to_null() {
        let registry = Registry::new();
        let w = {
            let heap = Heap::new(&registry);
            let h = heap.alloc(1u8);
            h.downgrade()
        };
        assert!(w.upgrade().is_null());
        assert_eq!(registry.diagnostic_sweep(), 0);
    }

    #[test]
    fn pair_mut_on_aliases_is_skipped() {
        let registry = Registry::new();
        let heap = Heap::new(&registry);
        let a = heap.alloc(1);
        let b = heap.alloc(2);
        let a2 = a.clone();
        assert_eq!(a.with_pair_mut(&a2, |_, _| ()).unwrap(), None);
        a.with_pair_mut(&b, core::mem::swap).unwrap();
        assert_eq!(*a.get().unwrap(), 2);
        assert_eq!(*b.get().unwrap(), 1);
    }

    #[test]
    fn pair_mut_across_heaps() {
        let registry = Registry::new();
        let h1 = Heap::new(&registry);
        let h2 = Heap::new(&registry);
        let a = h1.alloc(10);
        let b = h2.alloc(20);
        assert!(!a.equals_handle(&b));
        a.with_pair_mut(&b, core::mem::swap).unwrap();
        assert_eq!(*a.get().unwrap(), 20);
        assert_eq!(*b.get().unwrap(), 10);
    }

    #[test]
    fn nested_handles_release_in_cascade() {
        let registry = Registry::new();
        let inner_heap = Heap::new(&registry);
        let outer_heap = Heap::new(&registry);
        let inner = inner_heap.alloc(5u32);
        let outer = outer_heap.alloc(inner.clone());
        drop(inner);
        assert_eq!(registry.diagnostic_sweep(), 2);
        drop(outer);
        assert_eq!(registry.diagnostic_sweep(), 0);
        assert!(inner_heap.is_empty());
    }

    #[test]
    fn null_handle_fails_every_access() {
        let h: ManagedHandle<i32> = ManagedHandle::null();
        assert!(h.is_null());
        assert_eq!(h.identity(), HandleId::NULL);
        assert_eq!(h.refcount(), 0);
        assert!(h.get().is_err());
        assert!(h.get_mut().is_err());
        assert_eq!(h.assign_value(1), Err(NullAccessError));
        assert_eq!(h.equals_value(&0), Err(NullAccessError));
        assert!(h.downgrade().upgrade().is_null());
        assert_eq!(h.clone(), ManagedHandle::default());
    }
}
