//! Exclusivity guard: at most one deployment operation at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Arc<ExclusivityGuard>> = OnceLock::new();

/// One process-wide "deployment active" flag.
///
/// The guard does not lock out unrelated store traffic; it only keeps two
/// deployment operations from overlapping.
#[derive(Debug, Default)]
pub struct ExclusivityGuard {
    active: AtomicBool,
}

impl ExclusivityGuard {
    /// Creates a released guard.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    /// The guard shared by every service in this process.
    #[must_use]
    pub fn global() -> Arc<ExclusivityGuard> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ExclusivityGuard::new())))
    }

    /// Sets the flag if it is clear.
    ///
    /// Returns `None` immediately if another operation holds the guard.
    /// Dropping the permit releases the guard on every exit path.
    pub fn try_acquire(&self) -> Option<GuardPermit<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardPermit { guard: self })
    }

    /// Clears the flag.
    pub fn release(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Returns true while an operation holds the guard.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Proof of holding the [`ExclusivityGuard`]; releases it on drop.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct GuardPermit<'a> {
    guard: &'a ExclusivityGuard,
}

impl Drop for GuardPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let guard = ExclusivityGuard::new();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_held());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn released_on_panic() {
        let guard = ExclusivityGuard::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = guard.try_acquire().unwrap();
            panic!("stage blew up");
        }));
        assert!(result.is_err());
        assert!(!guard.is_held());
    }

    #[test]
    fn global_is_shared() {
        let a = ExclusivityGuard::global();
        let b = ExclusivityGuard::global();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn contended_acquire_admits_one() {
        let guard = Arc::new(ExclusivityGuard::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // leak the permit so winners stay visible
                    guard.try_acquire().map(std::mem::forget).is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(guard.is_held());
    }
}
