//! Thread identity used as the `owner` word (spec §3, §9)
//!
//! `std::thread::ThreadId` doesn't expose a stable integer, so each
//! thread is handed a small sequential non-negative id the first time it
//! touches the pool. That's all the CAS protocol needs: uniqueness among
//! live threads and disjointness from `UNALLOCATED` and the eviction
//! sentinel range.

use std::cell::Cell;
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_ID: AtomicI64 = AtomicI64::new(0);

thread_local! {
    static THREAD_ID: Cell<i64> = const { Cell::new(-1) };
}

/// Ownership value meaning "available for first CAS" (spec §3).
pub const UNALLOCATED: i64 = -1;

/// This thread's identity for the ownership CAS protocol. Stable for the
/// lifetime of the OS thread, unique among concurrently live threads.
pub fn current() -> i64 {
    THREAD_ID.with(|cell| {
        let id = cell.get();
        if id >= 0 {
            return id;
        }
        let fresh = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        cell.set(fresh);
        fresh
    })
}

/// The eviction job's ownership sentinel for a given thread (spec §4.5, §9):
/// disjoint from `UNALLOCATED` and from every non-negative thread id.
pub fn eviction_sentinel(thread_id: i64) -> i64 {
    -(thread_id) - 2
}

/// True if `owner` is the eviction job tearing the entry down.
pub fn is_eviction_sentinel(owner: i64) -> bool {
    owner < UNALLOCATED
}
