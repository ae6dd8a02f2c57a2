//! managed-handle: refcounted handles to registry-tracked slots, a doubly
//! linked list built only from those handles, and in-place sorts that walk
//! the list by chasing handles.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: deterministic, refcount-driven slot lifetimes with an identity
//!   ledger for diagnostics, in layers that can each be checked alone.
//! - Layers:
//!   - CountedSlots<V>: generational slot storage where every slot carries
//!     its own count and every counted reference is a linear token; a
//!     debug-only reentrancy guard covers its critical sections.
//!   - Heap<T> / ManagedHandle<T>: the allocator and the owning pointer.
//!     Clone aliases, drop decrements, the last drop frees the slot and
//!     deregisters its identity in the same step.
//!   - Registry: ledger of live identities shared by any number of heaps.
//!     It never frees anything.
//!   - DoublyLinkedList<T> and the sorts on top.
//!
//! Ownership of the list
//! - `next` links are owning handles, `prev` links are `WeakHandle`s whose
//!   generational key goes stale once the node is freed. A chain never owns
//!   itself, so dropping the head handle releases every node.
//! - Freeing a node unlinks the successors it alone owns one by one rather
//!   than recursing down the chain, whether the last owner was the list or
//!   a caller's handle.
//!
//! Sorting
//! - Quicksort (Lomuto, last element as pivot), bubble sort and insertion
//!   sort all move values between nodes and never relink. A handle held by a
//!   caller keeps naming the same node while its value changes.
//!
//! Constraints
//! - Single-threaded: everything is `!Send`/`!Sync` (`Rc`, `Cell`, `RefCell`).
//! - A `get_mut` guard borrows the whole heap. Cloning, dropping or reading
//!   another handle of the same heap while it is held panics, as `RefCell`
//!   does.
//! - Reference-count overflow aborts, matching `Rc`.
//!
//! Errors and logging
//! - Null dereference is `NullAccessError`. Registry inconsistencies are
//!   `InvariantViolation`; on the release path they panic or are logged
//!   per `ViolationPolicy`.
//! - Events go through `tracing`; no subscriber is installed here.

#[cfg(feature = "bench_internal")]
pub mod counted_slots;
#[cfg(not(feature = "bench_internal"))]
mod counted_slots;
mod error;
mod handle;
mod list;
mod reentrancy;
mod registry;
mod sort;
pub mod tokens;

pub use error::{InvariantViolation, NullAccessError};
pub use handle::{Heap, ManagedHandle, WeakHandle};
pub use list::{DoublyLinkedList, Handles, Node, NodeHandle, Values};
pub use registry::{HandleId, LiveEntry, Registry, RegistryConfig, ViolationPolicy};
pub use sort::{bubble_sort, insertion_sort, quick_sort, SortAlgorithm};
