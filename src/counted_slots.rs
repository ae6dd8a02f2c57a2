//! CountedSlots: generational slot storage with per-slot reference counts.
//!
//! Every stored value carries a `SlotCount`. A `CountedHandle` pairs a slot
//! key with a linear token minted by that slot's counter, so each handle in
//! circulation accounts for exactly one unit of the count. Returning the
//! last handle leaves the slot at zero; the caller then removes it.

use crate::reentrancy::DebugReentrancy;
use crate::tokens::{Count, SlotCount, Token};
use slotmap::{DefaultKey, SlotMap};

#[derive(Debug)]
struct Counted<V> {
    refcount: SlotCount,
    value: V,
}

pub struct CountedSlots<V> {
    slots: SlotMap<DefaultKey, Counted<V>>,
    reentrancy: DebugReentrancy,
}

/// Slot key carrying a linear token branded to its slot's counter.
pub struct CountedHandle<'a> {
    pub(crate) key: DefaultKey,
    pub(crate) token: Token<'a, SlotCount>,
}

impl<'a> CountedHandle<'a> {
    #[inline]
    pub fn key(&self) -> DefaultKey {
        self.key
    }

    #[cfg(any(test, feature = "bench_internal"))]
    pub fn value_ref<'m, V>(&self, slots: &'m CountedSlots<V>) -> Option<&'m V> {
        slots.value(self.key)
    }

    #[cfg(any(test, feature = "bench_internal"))]
    pub fn value_mut<'m, V>(&self, slots: &'m mut CountedSlots<V>) -> Option<&'m mut V> {
        slots.value_mut(self.key)
    }
}

/// Result of returning a handle with `put`.
#[cfg(any(test, feature = "bench_internal"))]
pub enum PutResult<V> {
    Live,
    Removed(V),
}

impl<V> CountedSlots<V> {
    #[cfg(any(test, feature = "bench_internal"))]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(any(test, feature = "bench_internal"))]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[cfg(any(test, feature = "bench_internal"))]
    pub fn contains(&self, key: DefaultKey) -> bool {
        self.slots.contains_key(key)
    }

    /// Store a value and mint the first handle for it.
    pub fn insert(&mut self, value: V) -> CountedHandle<'static> {
        let _g = self.reentrancy.enter();
        let key = self.slots.insert(Counted {
            refcount: SlotCount::new(),
            value,
        });
        let token = self.slots[key].refcount.get();
        CountedHandle { key, token }
    }

    /// Mint another handle for the slot `h` refers to.
    pub fn get(&self, h: &CountedHandle<'_>) -> CountedHandle<'static> {
        let _g = self.reentrancy.enter();
        let entry = self
            .slots
            .get(h.key)
            .expect("counted handle must refer to a live slot");
        CountedHandle {
            key: h.key,
            token: entry.refcount.get(),
        }
    }

    /// Mint a handle for `key` if the slot is still live with a nonzero count.
    ///
    /// Keys are generational, so a key whose slot was freed and reused by a
    /// later insert does not resolve.
    pub fn upgrade(&self, key: DefaultKey) -> Option<CountedHandle<'static>> {
        let _g = self.reentrancy.enter();
        let entry = self.slots.get(key)?;
        if entry.refcount.current() == 0 {
            return None;
        }
        Some(CountedHandle {
            key,
            token: entry.refcount.get(),
        })
    }

    /// Return a handle's token without removing anything.
    ///
    /// Returns true when this was the last handle; the slot then stays in
    /// storage at count zero until `remove` is called.
    pub fn release(&self, h: CountedHandle<'_>) -> bool {
        let _g = self.reentrancy.enter();
        let CountedHandle { key, token } = h;
        let entry = self
            .slots
            .get(key)
            .expect("counted handle must refer to a live slot when released");
        entry.refcount.put(token)
    }

    /// Remove a slot whose count reached zero.
    pub fn remove(&mut self, key: DefaultKey) -> Option<V> {
        let _g = self.reentrancy.enter();
        debug_assert_eq!(
            self.slots.get(key).map(|e| e.refcount.current()),
            Some(0),
            "only slots at count zero may be removed"
        );
        self.slots.remove(key).map(|e| e.value)
    }

    /// Return a handle; removes and yields the value when the count hits zero.
    #[cfg(any(test, feature = "bench_internal"))]
    pub fn put(&mut self, h: CountedHandle<'_>) -> PutResult<V> {
        let key = h.key;
        if self.release(h) {
            match self.remove(key) {
                Some(v) => PutResult::Removed(v),
                None => PutResult::Live,
            }
        } else {
            PutResult::Live
        }
    }

    pub fn refcount(&self, key: DefaultKey) -> Option<usize> {
        self.slots.get(key).map(|e| e.refcount.current())
    }

    pub fn value(&self, key: DefaultKey) -> Option<&V> {
        self.slots.get(key).map(|e| &e.value)
    }

    pub fn value_mut(&mut self, key: DefaultKey) -> Option<&mut V> {
        self.slots.get_mut(key).map(|e| &mut e.value)
    }

    /// Mutable access to two distinct slots at once.
    pub fn pair_mut(&mut self, a: DefaultKey, b: DefaultKey) -> Option<(&mut V, &mut V)> {
        let _g = self.reentrancy.enter();
        let [x, y] = self.slots.get_disjoint_mut([a, b])?;
        Some((&mut x.value, &mut y.value))
    }

    #[cfg(any(test, feature = "bench_internal"))]
    pub fn iter(&self) -> impl Iterator<Item = (DefaultKey, &V)> {
        self.slots.iter().map(|(k, e)| (k, &e.value))
    }
}

#[cfg(any(test, feature = "bench_internal"))]
impl<V> Default for CountedSlots<V> {
    fn default() -> Self {
        Self::new()
    }
}
