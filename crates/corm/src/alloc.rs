//! Allocator override for materialized results.
//!
//! Every byte the engine hands to a caller (copied strings, copied blobs,
//! instance buffers) is charged to the handle's [`Allocator`] before it is
//! created and released back to the same allocator when the owning result
//! is freed. The default [`SystemAllocator`] admits everything; a
//! [`BudgetAllocator`] enforces a hard byte limit.
//!
//! ## Accounting
//!
//! - Charges are made by the result tracker, never by callers directly
//! - A refused charge surfaces as an `Allocation` error
//! - Each result keeps the allocator it was charged against, so swapping
//!   the handle's allocator never mismatches a release

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Admission and release of tracked bytes.
pub trait Allocator: Send + Sync {
    /// Charge `size` bytes. Returning `false` refuses the allocation.
    fn allocate(&self, size: usize) -> bool;

    /// Return a charge previously admitted by `allocate`.
    fn release(&self, size: usize);
}

/// Admits every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, _size: usize) -> bool {
        true
    }

    fn release(&self, _size: usize) {}
}

/// A hard byte limit shared by every result charged against it.
#[derive(Debug)]
pub struct BudgetAllocator {
    limit: usize,
    used: AtomicUsize,
    peak: AtomicUsize,
}

impl BudgetAllocator {
    pub fn new(limit: usize) -> Self {
        BudgetAllocator {
            limit,
            used: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }
}

impl Allocator for BudgetAllocator {
    fn allocate(&self, size: usize) -> bool {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let Some(next) = current.checked_add(size) else {
                return false;
            };
            if next > self.limit {
                tracing::trace!(size, used = current, limit = self.limit, "budget refused");
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::AcqRel);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, size: usize) {
        let prev = self.used.fetch_sub(size, Ordering::AcqRel);
        debug_assert!(prev >= size, "released more than was charged");
    }
}

impl fmt::Display for BudgetAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} bytes (peak {})", self.used(), self.limit, self.peak())
    }
}
