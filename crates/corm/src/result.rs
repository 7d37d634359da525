//! Result containers and their allocation ledgers.
//!
//! A [`ResultSet`] owns the instances one query produced plus an
//! [`AllocationTracker`] listing every charge made while populating them:
//! copied strings, copied blobs, and the ledgers of relationship results
//! merged into it. The instance buffer itself is charged separately and
//! grows by doubling.
//!
//! Dropping a result (or passing it to `Database::free_result`) releases
//! the ledger first, then the instance buffer charge, then the container.
//! Each charge is released exactly once, to the allocator that admitted it.

use std::any::Any;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use corm_common::CormError;

use crate::alloc::Allocator;

/// What a tracked charge paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    /// A string copied out of a row.
    String,
    /// A blob copied out of a row.
    Blob,
    /// The instance buffer of a result merged in by the relationship loader.
    Instances,
}

impl fmt::Display for AllocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocKind::String => write!(f, "string"),
            AllocKind::Blob => write!(f, "blob"),
            AllocKind::Instances => write!(f, "instances"),
        }
    }
}

/// One admitted charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub kind: AllocKind,
    pub size: usize,
}

// ── Allocation Tracker ─────────────────────────────────────────────────

/// Growable ledger of charges owned by one result.
pub struct AllocationTracker {
    allocator: Arc<dyn Allocator>,
    entries: Vec<Allocation>,
    /// Ledgers merged from results charged against a different allocator.
    children: Vec<AllocationTracker>,
}

impl AllocationTracker {
    pub const DEFAULT_CAPACITY: usize = 8;

    /// Create an empty ledger with room for `capacity` entries.
    pub fn create(allocator: Arc<dyn Allocator>, capacity: usize) -> Self {
        AllocationTracker {
            allocator,
            entries: Vec::with_capacity(capacity.max(1)),
            children: Vec::new(),
        }
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    /// Record an already-admitted charge.
    ///
    /// The ledger doubles when full. If that growth fails the allocation
    /// is handed back and the caller must release it.
    pub fn track(&mut self, allocation: Allocation) -> Result<(), Allocation> {
        if self.entries.len() == self.entries.capacity() {
            let additional = self.entries.capacity().max(1);
            if self.entries.try_reserve_exact(additional).is_err() {
                return Err(allocation);
            }
        }
        self.entries.push(allocation);
        Ok(())
    }

    /// Charge `size` bytes and record them as one step. Nothing stays
    /// charged if either half fails.
    pub fn alloc(&mut self, kind: AllocKind, size: usize) -> Result<(), CormError> {
        if !self.allocator.allocate(size) {
            return Err(CormError::allocation(format!(
                "allocator refused {} bytes for {}",
                size, kind
            )));
        }
        tracing::trace!(%kind, size, "tracked allocation");
        if let Err(rejected) = self.track(Allocation { kind, size }) {
            self.allocator.release(rejected.size);
            return Err(CormError::allocation(
                "failed to grow allocation tracking list",
            ));
        }
        Ok(())
    }

    /// Take over every entry of `other`. On failure `other` is dropped,
    /// which releases its charges.
    pub fn absorb(&mut self, mut other: AllocationTracker) -> Result<(), CormError> {
        if !Arc::ptr_eq(&self.allocator, &other.allocator) {
            if self.children.try_reserve(1).is_err() {
                return Err(CormError::allocation("failed to merge allocation ledger"));
            }
            self.children.push(other);
            return Ok(());
        }
        let needed = other.entries.len();
        if self.entries.capacity() - self.entries.len() < needed {
            let additional = needed.max(self.entries.capacity());
            if self.entries.try_reserve(additional).is_err() {
                return Err(CormError::allocation("failed to merge allocation ledger"));
            }
        }
        self.entries.append(&mut other.entries);
        self.children.append(&mut other.children);
        Ok(())
    }

    /// Number of tracked charges, including merged ledgers.
    pub fn len(&self) -> usize {
        self.entries.len() + self.children.iter().map(|c| c.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total tracked bytes, including merged ledgers.
    pub fn tracked_bytes(&self) -> usize {
        self.entries.iter().map(|a| a.size).sum::<usize>()
            + self.children.iter().map(|c| c.tracked_bytes()).sum::<usize>()
    }

    /// Count of tracked charges of one kind.
    pub fn count(&self, kind: AllocKind) -> usize {
        self.entries.iter().filter(|a| a.kind == kind).count()
            + self.children.iter().map(|c| c.count(kind)).sum::<usize>()
    }

    /// Move everything into a fresh ledger, leaving this one empty.
    fn split_off(&mut self) -> AllocationTracker {
        AllocationTracker {
            allocator: Arc::clone(&self.allocator),
            entries: std::mem::take(&mut self.entries),
            children: std::mem::take(&mut self.children),
        }
    }

    fn release_all(&mut self) {
        for allocation in self.entries.drain(..) {
            self.allocator.release(allocation.size);
        }
        for mut child in self.children.drain(..) {
            child.release_all();
        }
    }
}

impl Drop for AllocationTracker {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for AllocationTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationTracker")
            .field("entries", &self.entries)
            .field("children", &self.children)
            .finish()
    }
}

// ── Result Set ─────────────────────────────────────────────────────────

/// The materialized output of one query.
pub struct ResultSet<T> {
    rows: Vec<T>,
    table: String,
    /// Bytes charged per instance slot.
    row_size: usize,
    tracker: AllocationTracker,
    /// Bytes currently charged for the instance buffer.
    buffer: usize,
}

impl<T> ResultSet<T> {
    pub(crate) fn new(table: &str, row_size: usize, tracker: AllocationTracker) -> Self {
        ResultSet {
            rows: Vec::new(),
            table: table.to_string(),
            row_size: row_size.max(1),
            tracker,
            buffer: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Table the rows were read from.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.rows.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.rows.get_mut(index)
    }

    pub fn first(&self) -> Option<&T> {
        self.rows.first()
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn tracker(&self) -> &AllocationTracker {
        &self.tracker
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut AllocationTracker {
        &mut self.tracker
    }

    /// Bytes charged for the instance buffer.
    pub fn buffer_bytes(&self) -> usize {
        self.buffer
    }

    /// Append a row, doubling the instance buffer when it is full.
    pub(crate) fn push(&mut self, row: T) -> Result<(), CormError> {
        if self.rows.len() == self.rows.capacity() {
            let new_cap = (self.rows.capacity() * 2).max(1);
            self.grow_buffer(new_cap)?;
        }
        self.rows.push(row);
        Ok(())
    }

    fn grow_buffer(&mut self, new_cap: usize) -> Result<(), CormError> {
        let bytes = new_cap.saturating_mul(self.row_size);
        let allocator = Arc::clone(self.tracker.allocator());
        if !allocator.allocate(bytes) {
            return Err(CormError::allocation(format!(
                "allocator refused {} bytes for the {} instance buffer",
                bytes, self.table
            )));
        }
        if self.rows.try_reserve_exact(new_cap - self.rows.len()).is_err() {
            allocator.release(bytes);
            return Err(CormError::allocation(format!(
                "failed to grow the {} instance buffer",
                self.table
            )));
        }
        if self.buffer > 0 {
            allocator.release(self.buffer);
        }
        self.buffer = bytes;
        Ok(())
    }

    /// Split into rows and a ledger that now also carries the instance
    /// buffer charge. Used when rows move into another result's instances.
    pub(crate) fn into_parts(mut self) -> Result<(Vec<T>, AllocationTracker), CormError> {
        let rows = std::mem::take(&mut self.rows);
        let mut tracker = self.tracker.split_off();
        let buffer = std::mem::take(&mut self.buffer);
        if buffer > 0 {
            if let Err(rejected) = tracker.track(Allocation {
                kind: AllocKind::Instances,
                size: buffer,
            }) {
                tracker.allocator().release(rejected.size);
                return Err(CormError::allocation(
                    "failed to grow allocation tracking list",
                ));
            }
        }
        Ok((rows, tracker))
    }

    fn release(&mut self) {
        self.tracker.release_all();
        if self.buffer > 0 {
            self.tracker.allocator().release(self.buffer);
            self.buffer = 0;
        }
    }
}

impl ResultSet<Box<dyn Any>> {
    /// Recover the concrete instance type of an erased result.
    pub(crate) fn downcast<T: Any>(mut self) -> Result<ResultSet<T>, CormError> {
        let erased = std::mem::take(&mut self.rows);
        let mut rows = Vec::new();
        if rows.try_reserve_exact(erased.capacity()).is_err() {
            return Err(CormError::allocation(format!(
                "failed to grow the {} instance buffer",
                self.table
            )));
        }
        for row in erased {
            match row.downcast::<T>() {
                Ok(row) => rows.push(*row),
                Err(_) => {
                    return Err(CormError::schema(format!(
                        "rows of '{}' are not of the requested type",
                        self.table
                    )))
                }
            }
        }
        Ok(ResultSet {
            rows,
            table: std::mem::take(&mut self.table),
            row_size: self.row_size,
            tracker: self.tracker.split_off(),
            buffer: std::mem::take(&mut self.buffer),
        })
    }
}

impl<T> Drop for ResultSet<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> Index<usize> for ResultSet<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.rows[index]
    }
}

impl<'a, T> IntoIterator for &'a ResultSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for ResultSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("table", &self.table)
            .field("rows", &self.rows)
            .field("tracked", &self.tracker.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alloc::BudgetAllocator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every charge and release.
    #[derive(Debug, Default)]
    pub(crate) struct CountingAllocator {
        pub allocs: AtomicUsize,
        pub frees: AtomicUsize,
        pub live_bytes: AtomicUsize,
    }

    impl Allocator for CountingAllocator {
        fn allocate(&self, size: usize) -> bool {
            self.allocs.fetch_add(1, Ordering::SeqCst);
            self.live_bytes.fetch_add(size, Ordering::SeqCst);
            true
        }

        fn release(&self, size: usize) {
            self.frees.fetch_add(1, Ordering::SeqCst);
            self.live_bytes.fetch_sub(size, Ordering::SeqCst);
        }
    }

    impl CountingAllocator {
        pub(crate) fn balanced(&self) -> bool {
            self.allocs.load(Ordering::SeqCst) == self.frees.load(Ordering::SeqCst)
                && self.live_bytes.load(Ordering::SeqCst) == 0
        }
    }

    #[test]
    fn test_tracker_releases_everything_once() {
        let counting = Arc::new(CountingAllocator::default());
        {
            let mut tracker = AllocationTracker::create(counting.clone(), 2);
            for i in 0..5 {
                tracker.alloc(AllocKind::String, 10 + i).unwrap();
            }
            tracker.alloc(AllocKind::Blob, 100).unwrap();
            assert_eq!(tracker.len(), 6);
            assert_eq!(tracker.count(AllocKind::String), 5);
            assert_eq!(tracker.tracked_bytes(), 10 + 11 + 12 + 13 + 14 + 100);
        }
        assert_eq!(counting.allocs.load(Ordering::SeqCst), 6);
        assert!(counting.balanced());
    }

    #[test]
    fn test_tracker_grows_geometrically() {
        let mut tracker = AllocationTracker::create(Arc::new(crate::alloc::SystemAllocator), 1);
        for _ in 0..9 {
            tracker
                .track(Allocation { kind: AllocKind::Blob, size: 1 })
                .unwrap();
        }
        assert_eq!(tracker.len(), 9);
        assert!(tracker.entries.capacity() >= 9);
    }

    #[test]
    fn test_refused_alloc_leaves_nothing_charged() {
        let budget = Arc::new(BudgetAllocator::new(16));
        let mut tracker = AllocationTracker::create(budget.clone(), 4);
        tracker.alloc(AllocKind::String, 10).unwrap();
        let err = tracker.alloc(AllocKind::String, 10).unwrap_err();
        assert_eq!(err.kind, corm_common::ErrorKind::Allocation);
        assert_eq!(tracker.len(), 1);
        drop(tracker);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_absorb_moves_without_double_release() {
        let counting = Arc::new(CountingAllocator::default());
        let mut parent = AllocationTracker::create(counting.clone(), 1);
        parent.alloc(AllocKind::String, 3).unwrap();
        let mut child = AllocationTracker::create(counting.clone(), 1);
        child.alloc(AllocKind::Blob, 7).unwrap();
        child.alloc(AllocKind::String, 2).unwrap();

        parent.absorb(child).unwrap();
        assert_eq!(parent.len(), 3);
        assert_eq!(counting.frees.load(Ordering::SeqCst), 0);

        drop(parent);
        assert_eq!(counting.frees.load(Ordering::SeqCst), 3);
        assert!(counting.balanced());
    }

    #[test]
    fn test_absorb_keeps_foreign_allocator_ledger() {
        let first = Arc::new(CountingAllocator::default());
        let second = Arc::new(CountingAllocator::default());
        let mut parent = AllocationTracker::create(first.clone(), 1);
        let mut child = AllocationTracker::create(second.clone(), 1);
        child.alloc(AllocKind::String, 4).unwrap();
        parent.absorb(child).unwrap();
        assert_eq!(parent.len(), 1);
        drop(parent);
        assert!(first.balanced());
        assert!(second.balanced());
        assert_eq!(second.frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_result_set_buffer_doubles_and_releases() {
        let counting = Arc::new(CountingAllocator::default());
        {
            let tracker = AllocationTracker::create(counting.clone(), 4);
            let mut rs: ResultSet<u64> = ResultSet::new("t", 8, tracker);
            for i in 0..5 {
                rs.push(i).unwrap();
            }
            assert_eq!(rs.len(), 5);
            assert_eq!(rs.buffer_bytes(), 8 * 8);
            assert_eq!(rs[4], 4);
        }
        // capacities 1, 2, 4, 8: four charges, four releases
        assert_eq!(counting.allocs.load(Ordering::SeqCst), 4);
        assert!(counting.balanced());
    }

    #[test]
    fn test_into_parts_carries_buffer_charge() {
        let counting = Arc::new(CountingAllocator::default());
        let tracker = AllocationTracker::create(counting.clone(), 4);
        let mut rs: ResultSet<u32> = ResultSet::new("t", 4, tracker);
        rs.push(1).unwrap();
        rs.tracker_mut().alloc(AllocKind::String, 5).unwrap();
        let (rows, tracker) = rs.into_parts().unwrap();
        assert_eq!(rows, vec![1]);
        assert_eq!(tracker.count(AllocKind::Instances), 1);
        assert_eq!(tracker.len(), 2);
        assert_eq!(counting.frees.load(Ordering::SeqCst), 0);
        drop(tracker);
        assert!(counting.balanced());
    }

    #[test]
    fn test_downcast_keeps_ledger() {
        let counting = Arc::new(CountingAllocator::default());
        let tracker = AllocationTracker::create(counting.clone(), 4);
        let mut rs: ResultSet<Box<dyn Any>> = ResultSet::new("t", 8, tracker);
        rs.push(Box::new(7i64)).unwrap();
        rs.tracker_mut().alloc(AllocKind::Blob, 3).unwrap();
        let typed = rs.downcast::<i64>().unwrap();
        assert_eq!(typed[0], 7);
        assert_eq!(typed.tracker().len(), 1);
        assert_eq!(counting.frees.load(Ordering::SeqCst), 0);
        drop(typed);
        assert!(counting.balanced());
    }
}
