//! Blocking counting semaphore bounding concurrent hash-bucket verifications.
//!
//! The orchestrating thread calls [`CountBudget::acquire`] before spawning a
//! bucket task and moves the returned [`CountPermit`] into it; the permit is
//! released when the task finishes and the permit drops.
//!
//! ```
//! use dupefiles::duplicates::budget::CountBudget;
//!
//! let budget = CountBudget::new(2);
//! std::thread::scope(|scope| {
//!     for bucket in 0..8 {
//!         let permit = budget.acquire();
//!         scope.spawn(move || {
//!             let _permit = permit;
//!             println!("verifying bucket {bucket}");
//!         });
//!     }
//! });
//! assert_eq!(budget.available(), 2);
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Fixed-capacity blocking permit counter.
#[derive(Debug)]
pub struct CountBudget {
    total: usize,
    avail: Mutex<usize>,
    cv: Condvar,
}

impl CountBudget {
    /// Create a budget with `total` permits. A capacity of 0 is raised to 1.
    #[must_use]
    pub fn new(total: usize) -> Self {
        let total = total.max(1);
        Self {
            total,
            avail: Mutex::new(total),
            cv: Condvar::new(),
        }
    }

    /// Total capacity.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Snapshot of currently available permits.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.lock()
    }

    // A panic elsewhere must not wedge permit accounting.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.avail.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is free and take it.
    pub fn acquire(&self) -> CountPermit<'_> {
        let mut avail = self.lock();
        while *avail == 0 {
            avail = self.cv.wait(avail).unwrap_or_else(PoisonError::into_inner);
        }
        *avail -= 1;
        CountPermit { budget: self }
    }

    fn release(&self) {
        let mut avail = self.lock();
        debug_assert!(*avail < self.total, "permit over-release");
        *avail = (*avail + 1).min(self.total);
        drop(avail);
        self.cv.notify_one();
    }
}

/// RAII permit; returns itself to the budget on drop.
#[derive(Debug)]
pub struct CountPermit<'a> {
    budget: &'a CountBudget,
}

impl Drop for CountPermit<'_> {
    fn drop(&mut self) {
        self.budget.release();
    }
}
