use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Storage for a single metrics counter.
///
/// Implemented for `Cell<u64>` (one thread owns the counters) and for `AtomicU64` (counters shared
/// between ring workers and the reporting thread). All operations take `&self` so the counting
/// logic in `Metrics` is written once for both.
pub trait Counter: Default {
    fn add(&self, val: u64);
    fn load(&self) -> u64;
    fn reset(&self);
    /// Returns the current value and zeroes the counter in one step.
    fn take(&self) -> u64;
}

impl Counter for Cell<u64> {
    #[inline]
    fn add(&self, val: u64) {
        self.set(self.get().wrapping_add(val));
    }

    #[inline]
    fn load(&self) -> u64 {
        self.get()
    }

    #[inline]
    fn reset(&self) {
        self.set(0);
    }

    #[inline]
    fn take(&self) -> u64 {
        self.replace(0)
    }
}

// Relaxed is enough: counters carry no ordering obligations towards other memory.
impl Counter for AtomicU64 {
    #[inline]
    fn add(&self, val: u64) {
        self.fetch_add(val, Ordering::Relaxed);
    }

    #[inline]
    fn load(&self) -> u64 {
        AtomicU64::load(self, Ordering::Relaxed)
    }

    #[inline]
    fn reset(&self) {
        self.store(0, Ordering::Relaxed);
    }

    #[inline]
    fn take(&self) -> u64 {
        self.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<C: Counter>() {
        let c = C::default();
        assert_eq!(c.load(), 0);
        c.add(5);
        c.add(7);
        assert_eq!(c.load(), 12);
        c.reset();
        assert_eq!(c.load(), 0);
        c.add(3);
        assert_eq!(c.take(), 3);
        assert_eq!(c.load(), 0);
        assert_eq!(c.take(), 0);
    }

    #[test]
    fn plain_counter() {
        exercise::<Cell<u64>>();
    }

    #[test]
    fn atomic_counter() {
        exercise::<AtomicU64>();
    }
}
