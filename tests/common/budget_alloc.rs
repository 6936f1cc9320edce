use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Heap figures for one measured region.
#[derive(Clone, Copy, Debug)]
pub struct AllocStats {
    /// Highest live heap above the region's starting baseline.
    pub peak_bytes: usize,
    /// Allocation and reallocation calls inside the region.
    pub alloc_count: usize,
    /// Live heap left behind when the region ended, above the baseline.
    pub retained_bytes: usize,
}

/// Global allocator that tracks live bytes and their peak.
pub struct BudgetAlloc {
    current: AtomicUsize,
    peak: AtomicUsize,
    count: AtomicUsize,
}

impl BudgetAlloc {
    pub const fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
        }
    }

    /// Run `op` and report its heap use relative to the live heap at entry.
    pub fn measure<T>(&self, op: impl FnOnce() -> T) -> (T, AllocStats) {
        let baseline = self.current.load(Ordering::SeqCst);
        self.peak.store(baseline, Ordering::SeqCst);
        let count_before = self.count.load(Ordering::SeqCst);
        let out = op();
        let stats = AllocStats {
            peak_bytes: self.peak.load(Ordering::SeqCst).saturating_sub(baseline),
            alloc_count: self
                .count
                .load(Ordering::SeqCst)
                .saturating_sub(count_before),
            retained_bytes: self
                .current
                .load(Ordering::SeqCst)
                .saturating_sub(baseline),
        };
        (out, stats)
    }

    fn grow(&self, bytes: usize) {
        let now = self.current.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn shrink(&self, bytes: usize) {
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(bytes))
            });
    }
}

unsafe impl GlobalAlloc for BudgetAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        self.shrink(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.grow(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            if new_size >= layout.size() {
                self.grow(new_size - layout.size());
            } else {
                self.shrink(layout.size() - new_size);
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }
        new_ptr
    }
}
