// ManagedHandle integration tests.
//
// Invariants exercised:
// - Aliasing: clones and `assign_handle` share one slot and one identity.
// - Lifecycle: the registry's live count drops back to baseline exactly when
//   the last alias of a slot is dropped.
// - Null: every value access on a null handle reports NullAccessError.
use managed_handle::{HandleId, Heap, ManagedHandle, NullAccessError, Registry};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

// Test: assigning one handle to another aliases the slot.
// Verifies: writes through B are visible through A, identities match.
#[test]
fn assigned_handle_shares_slot_and_identity() {
    let registry = Registry::new();
    let heap = Heap::new(&registry);
    let a = heap.alloc(20);
    let mut b = heap.alloc_default();
    assert_ne!(a.identity(), b.identity());

    b.assign_handle(&a);
    assert_eq!(*b.get().unwrap(), 20);
    b.assign_value(99).unwrap();
    assert_eq!(*a.get().unwrap(), 99);
    assert_eq!(a.identity(), b.identity());
    assert_eq!(a.refcount(), 2);
}

// Test: assign_handle releases the previous slot first.
// Verifies: B's original slot is freed and deregistered.
#[test]
fn assign_handle_releases_previous_slot() {
    let registry = Registry::new();
    let heap = Heap::new(&registry);
    let a = heap.alloc(1);
    let mut b = heap.alloc(2);
    let old = b.identity();
    b.assign_handle(&a);
    assert!(!registry.is_live(old));
    assert_eq!(heap.len(), 1);
    assert_eq!(registry.diagnostic_sweep(), 1);
}

// Test: self-assignment through an alias.
// Verifies: no decrement/increment happens and nothing is freed.
#[test]
fn assigning_an_alias_is_a_no_op() {
    let registry = Registry::new();
    let heap = Heap::new(&registry);
    let mut a = heap.alloc(String::from("same"));
    let a2 = a.clone();
    a.assign_handle(&a2);
    assert_eq!(a.refcount(), 2);
    assert!(registry.is_live(a.identity()));

    let mut n: ManagedHandle<String> = ManagedHandle::null();
    n.assign_handle(&ManagedHandle::null());
    assert!(n.is_null());
}

// Test: assigning null into a handle releases its slot.
#[test]
fn assigning_null_releases() {
    let registry = Registry::new();
    let heap = Heap::new(&registry);
    let mut a = heap.alloc(5u64);
    a.assign_handle(&ManagedHandle::null());
    assert!(a.is_null());
    assert_eq!(registry.diagnostic_sweep(), 0);
}

// Test: independently created handles get distinct, increasing identities.
#[test]
fn fresh_allocations_get_distinct_identities() {
    let registry = Registry::new();
    let heap = Heap::new(&registry);
    let a = heap.alloc(1);
    let b = heap.alloc(1);
    assert!(a.identity() < b.identity());
    assert!(a.equals_value(&1).unwrap());
    assert!(b.equals_value(&1).unwrap());
    assert!(!a.equals_handle(&b));
    assert_ne!(a, b);
}

// Test: refcount lifecycle with N aliases dropped in a mixed order.
// Verifies: no premature free, no leak.
#[test]
fn lifecycle_returns_to_baseline_on_last_drop() {
    let registry = Registry::new();
    let keep = Heap::new(&registry).alloc(0u8);
    let baseline = registry.diagnostic_sweep();

    let heap = Heap::new(&registry);
    let h = heap.alloc(7i64);
    let mut aliases: Vec<_> = (0..5).map(|_| h.clone()).collect();
    aliases.push(h);
    assert_eq!(aliases[0].refcount(), 6);

    for i in [3, 0, 4, 1, 2] {
        let _ = aliases.remove(i.min(aliases.len() - 1));
        assert_eq!(registry.diagnostic_sweep(), baseline + 1);
    }
    drop(aliases);
    assert_eq!(registry.diagnostic_sweep(), baseline);
    assert_eq!(registry.violations(), 0);
    drop(keep);
}

// Test: null handle semantics.
#[test]
fn null_handle_semantics() {
    let h: ManagedHandle<i32> = ManagedHandle::null();
    assert!(h.is_null());
    assert!(h == ManagedHandle::null());
    assert_eq!(h.identity(), HandleId::NULL);
    assert_eq!(h.get().err(), Some(NullAccessError));
    assert_eq!(h.with(|v| *v), Err(NullAccessError));
    assert_eq!(h.equals_value(&0), Err(NullAccessError));

    let registry = Registry::new();
    let live = Heap::new(&registry).alloc(0);
    assert!(!live.is_null());
    assert!(live != h);
    assert_eq!(live.with_pair_mut(&h, |_, _| ()), Err(NullAccessError));
}

// Test: Eq/Hash follow slot identity.
#[test]
fn equality_and_hash_follow_identity() {
    let registry = Registry::new();
    let heap = Heap::new(&registry);
    let a = heap.alloc(3);
    let a2 = a.clone();
    let b = heap.alloc(3);

    let hash = |h: &ManagedHandle<i32>| {
        let mut s = DefaultHasher::new();
        h.hash(&mut s);
        s.finish()
    };
    assert!(a == a2);
    assert_eq!(hash(&a), hash(&a2));
    assert!(a != b);
}

// Test: mutation through get_mut and with_mut.
#[test]
fn mutable_access_writes_the_shared_slot() {
    let registry = Registry::new();
    let heap = Heap::new(&registry);
    let a = heap.alloc(vec![1, 2]);
    let b = a.clone();
    a.get_mut().unwrap().push(3);
    b.with_mut(|v| v.push(4)).unwrap();
    assert_eq!(*a.get().unwrap(), vec![1, 2, 3, 4]);
}

// Test: heaps sharing one registry are tracked together.
#[test]
fn heaps_share_a_registry() {
    let registry = Registry::new();
    let ints = Heap::new(&registry);
    let strings = Heap::new(&registry);
    let i = ints.alloc(1);
    let s = strings.alloc("one");
    assert!(ints.registry().ptr_eq(strings.registry()));
    let entries = registry.live_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, i.identity());
    assert_eq!(entries[1].id, s.identity());
    assert!(entries[1].type_name.contains("str"));
}

// Test: a handle outlives the Heap value it came from.
#[test]
fn handle_keeps_storage_alive_after_heap_drop() {
    let registry = Registry::new();
    let h = {
        let heap = Heap::new(&registry);
        heap.alloc(String::from("still here"))
    };
    assert_eq!(h.get().unwrap().as_str(), "still here");
    drop(h);
    assert_eq!(registry.diagnostic_sweep(), 0);
}

// Test: holding a mutable guard while cloning a handle of the same heap is a
// borrow conflict and panics instead of corrupting counts.
#[test]
fn clone_during_mutable_borrow_panics() {
    let registry = Registry::new();
    let heap = Heap::new(&registry);
    let a = heap.alloc(1);
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = a.get_mut().unwrap();
        let _b = a.clone();
    }));
    assert!(res.is_err());
    assert_eq!(a.refcount(), 1);
}
