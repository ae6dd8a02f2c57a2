//! Registry: ledger of live slot identities.
//!
//! The registry only records which identities are live and what type they
//! were allocated for. It owns no slot memory and never frees anything;
//! slots are released by their heap when the last handle goes away, and the
//! heap deregisters the identity in the same step.

use crate::error::InvariantViolation;
use core::cell::{Cell, RefCell};
use core::fmt;
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{debug, error, trace};

/// Identity shared by every handle aliasing one slot.
///
/// Identities are assigned in increasing order starting at 1 and are never
/// reused by the same registry. `HandleId::NULL` is carried by null handles.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub const NULL: HandleId = HandleId(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the release path does when deregistration finds no entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ViolationPolicy {
    Panic,
    Log,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ViolationPolicy::Panic
        } else {
            ViolationPolicy::Log
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RegistryConfig {
    pub on_violation: ViolationPolicy,
    /// Number of live identities to reserve room for up front.
    pub capacity: usize,
}

/// Snapshot of one ledger entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LiveEntry {
    pub id: HandleId,
    pub type_name: &'static str,
}

struct Ledger {
    next_id: u64,
    live: HashMap<HandleId, &'static str>,
}

struct Inner {
    ledger: RefCell<Ledger>,
    violations: Cell<usize>,
    config: RegistryConfig,
}

/// Shared ledger of live identities. Cloning shares the same ledger.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Rc::new(Inner {
                ledger: RefCell::new(Ledger {
                    next_id: 1,
                    live: HashMap::with_capacity(config.capacity),
                }),
                violations: Cell::new(0),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Record a fresh identity for a slot holding a `type_name` value.
    pub fn register(&self, type_name: &'static str) -> HandleId {
        let mut ledger = self.inner.ledger.borrow_mut();
        let id = HandleId(ledger.next_id);
        ledger.next_id += 1;
        ledger.live.insert(id, type_name);
        trace!(%id, type_name, live = ledger.live.len(), "registered");
        id
    }

    /// Remove `id` from the ledger.
    ///
    /// An unknown identity leaves the ledger untouched, bumps the violation
    /// counter and reports `InvariantViolation::UnknownIdentity`.
    pub fn deregister(&self, id: HandleId) -> Result<(), InvariantViolation> {
        let mut ledger = self.inner.ledger.borrow_mut();
        match ledger.live.remove(&id) {
            Some(type_name) => {
                trace!(%id, type_name, live = ledger.live.len(), "deregistered");
                Ok(())
            }
            None => {
                self.inner.violations.set(self.inner.violations.get() + 1);
                Err(InvariantViolation::UnknownIdentity(id))
            }
        }
    }

    /// Deregistration on the slot release path; violations follow the
    /// configured policy.
    pub(crate) fn release(&self, id: HandleId) {
        if let Err(violation) = self.deregister(id) {
            match self.inner.config.on_violation {
                ViolationPolicy::Panic => panic!("registry invariant violated: {violation}"),
                ViolationPolicy::Log => error!(%violation, "registry invariant violated"),
            }
        }
    }

    /// Count live identities. Purely informational.
    pub fn diagnostic_sweep(&self) -> usize {
        let ledger = self.inner.ledger.borrow();
        let live = ledger.live.len();
        debug!(live, violations = self.inner.violations.get(), "diagnostic sweep");
        for (id, type_name) in ledger.live.iter() {
            trace!(%id, type_name, "live");
        }
        live
    }

    pub fn live_entries(&self) -> Vec<LiveEntry> {
        let ledger = self.inner.ledger.borrow();
        let mut entries: Vec<LiveEntry> = ledger
            .live
            .iter()
            .map(|(&id, &type_name)| LiveEntry { id, type_name })
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    pub fn is_live(&self, id: HandleId) -> bool {
        self.inner.ledger.borrow().live.contains_key(&id)
    }

    /// Number of failed deregistrations seen so far.
    pub fn violations(&self) -> usize {
        self.inner.violations.get()
    }

    pub fn ptr_eq(&self, other: &Registry) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.inner.ledger.borrow();
        f.debug_struct("Registry")
            .field("live", &ledger.live.len())
            .field("next_id", &ledger.next_id)
            .field("violations", &self.inner.violations.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_are_unique_and_increasing() {
        let r = Registry::new();
        let a = r.register("i32");
        let b = r.register("i32");
        let c = r.register("String");
        assert!(a < b && b < c);
        assert!(!a.is_null());
        assert_eq!(r.diagnostic_sweep(), 3);
    }

    #[test]
    fn deregister_removes_exactly_once() {
        let r = Registry::new();
        let a = r.register("i32");
        assert_eq!(r.deregister(a), Ok(()));
        assert!(!r.is_live(a));
        assert_eq!(r.deregister(a), Err(InvariantViolation::UnknownIdentity(a)));
        assert_eq!(r.violations(), 1);
        assert_eq!(r.diagnostic_sweep(), 0);
    }

    #[test]
    fn unknown_identity_leaves_ledger_untouched() {
        let r = Registry::new();
        let a = r.register("i32");
        let _ = r.deregister(HandleId::NULL);
        assert!(r.is_live(a));
        assert_eq!(r.violations(), 1);
    }

    #[test]
    fn sweep_has_no_side_effects() {
        let r = Registry::new();
        let ids: Vec<_> = (0..4).map(|_| r.register("u8")).collect();
        assert_eq!(r.diagnostic_sweep(), 4);
        assert_eq!(r.diagnostic_sweep(), 4);
        let listed: Vec<_> = r.live_entries().into_iter().map(|e| e.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn repeated_cycles_do_not_accumulate_entries() {
        let r = Registry::new();
        for _ in 0..1000 {
            let id = r.register("u64");
            r.deregister(id).unwrap();
        }
        assert_eq!(r.diagnostic_sweep(), 0);
        assert_eq!(r.violations(), 0);
    }

    #[test]
    fn release_with_log_policy_does_not_panic() {
        let r = Registry::with_config(RegistryConfig {
            on_violation: ViolationPolicy::Log,
            capacity: 0,
        });
        r.release(HandleId(42));
        assert_eq!(r.violations(), 1);
    }

    #[test]
    fn release_with_panic_policy_panics() {
        let r = Registry::with_config(RegistryConfig {
            on_violation: ViolationPolicy::Panic,
            capacity: 0,
        });
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| r.release(HandleId(7))));
        assert!(res.is_err(), "expected unknown identity to panic");
    }

    #[test]
    fn clones_share_one_ledger() {
        let r = Registry::new();
        let r2 = r.clone();
        let id = r.register("i32");
        assert!(r2.is_live(id));
        assert!(r.ptr_eq(&r2));
        assert!(!r.ptr_eq(&Registry::new()));
    }
}
