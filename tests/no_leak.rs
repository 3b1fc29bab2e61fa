// ==============================================
// TEARDOWN LEAK CHECK (integration)
// ==============================================
//
// Every node allocation must correspond to a future free: after a create →
// churn → drop cycle the outstanding byte count returns to its baseline.
// The counting allocator wraps the system allocator for this whole test
// binary, so this file holds a single test and nothing else.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicIsize, Ordering};

use sievekit::policy::s3_fifo::S3FifoCache;
use sievekit::policy::sieve::SieveCache;

struct CountingAllocator;

static OUTSTANDING: AtomicIsize = AtomicIsize::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            OUTSTANDING.fetch_add(layout.size() as isize, Ordering::SeqCst);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        OUTSTANDING.fetch_sub(layout.size() as isize, Ordering::SeqCst);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            OUTSTANDING.fetch_add(new_size as isize - layout.size() as isize, Ordering::SeqCst);
        }
        new_ptr
    }
}

#[global_allocator]
static ALLOC: CountingAllocator = CountingAllocator;

fn churn_sieve(ops: u64) {
    let mut cache: SieveCache<u64, u64> = SieveCache::new(64);
    for i in 0..ops {
        match i % 4 {
            0 | 1 => {
                cache.insert(i % 200, i);
            },
            2 => {
                let _ = cache.get(&(i % 200));
            },
            _ => {
                let _ = cache.remove_entry(&(i % 200));
            },
        }
    }
    cache.clear();
    for i in 0..100 {
        cache.insert(i, i);
    }
    // cache drops here with entries still resident
}

fn churn_s3_fifo(ops: u64) {
    let mut cache: S3FifoCache<u64, u64> = S3FifoCache::new(64);
    for i in 0..ops {
        match i % 4 {
            0 | 1 => {
                cache.insert(i % 200, i);
            },
            2 => {
                let _ = cache.get(&(i % 200));
            },
            _ => {
                let _ = cache.remove_entry(&(i % 200));
            },
        }
    }
    cache.clear();
    for i in 0..100 {
        cache.insert(i, i);
    }
    // cache drops here with entries resident and ghost keys recorded
}

#[test]
fn teardown_frees_every_allocation() {
    let baseline = OUTSTANDING.load(Ordering::SeqCst);

    churn_sieve(10_000);
    churn_s3_fifo(10_000);

    let after = OUTSTANDING.load(Ordering::SeqCst);
    assert_eq!(
        after - baseline,
        0,
        "teardown leaked {} bytes",
        after - baseline
    );
}
