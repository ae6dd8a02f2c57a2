//! Linear tokens and the per-slot reference counter.
//!
//! A token is a zero-sized proof that one reference was acquired from a
//! particular counter. Dropping a token panics; the only valid way to get
//! rid of one is to hand it back with `Count::put`.

use core::cell::Cell;
use core::marker::PhantomData;

/// Zero-sized, linear token tied to its originating counter.
pub struct Token<'a, C: ?Sized> {
    _lt: PhantomData<&'a ()>,
    _ctr: PhantomData<*const C>,
}

impl<'a, C: ?Sized> Token<'a, C> {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            _lt: PhantomData,
            _ctr: PhantomData,
        }
    }
}

impl<'a, C: ?Sized> Drop for Token<'a, C> {
    fn drop(&mut self) {
        panic!("Token dropped without Count::put");
    }
}

/// A source of counted references, enforced by linear token flow.
pub trait Count {
    type Token<'a>: Sized
    where
        Self: 'a;

    /// Acquire one counted reference.
    fn get(&self) -> Self::Token<'static>;

    /// Return a previously acquired token. Returns true if the count is now zero.
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool;
}

/// Single-threaded reference counter stored next to each slot.
#[derive(Debug)]
pub struct SlotCount {
    count: Cell<usize>,
}

impl SlotCount {
    pub fn new() -> Self {
        Self {
            count: Cell::new(0),
        }
    }

    /// Number of tokens currently outstanding.
    #[inline]
    pub fn current(&self) -> usize {
        self.count.get()
    }
}

impl Default for SlotCount {
    fn default() -> Self {
        Self::new()
    }
}

impl Count for SlotCount {
    type Token<'a>
        = Token<'a, Self>
    where
        Self: 'a;

    #[inline]
    fn get(&self) -> Self::Token<'static> {
        let n = self.count.get().wrapping_add(1);
        self.count.set(n);
        if n == 0 {
            // Same as Rc: overflowing the count is not survivable.
            std::process::abort();
        }
        Token::new()
    }

    #[inline]
    fn put<'a>(&'a self, t: Self::Token<'a>) -> bool {
        let c = self.count.get();
        assert!(c > 0, "SlotCount underflow");
        self.count.set(c - 1);
        core::mem::forget(t);
        c == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_tracks_outstanding_tokens() {
        let c = SlotCount::new();
        let t1 = c.get();
        let t2 = c.get();
        assert_eq!(c.current(), 2);
        assert!(!c.put(t1));
        assert!(c.put(t2));
        assert_eq!(c.current(), 0);
    }

    #[test]
    fn dropping_a_token_panics() {
        let c = SlotCount::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let t = c.get();
            drop(t);
        }));
        assert!(res.is_err());
    }
}
