//! Per-table state record (spec §3 "Entry")
//!
//! `owner` is the CAS word the acquire/release/lock/evict protocols pivot
//! on (spec §4). Everything else — the cached writer, the ownership
//! reason, the cached creation error, the open lock handle — lives behind
//! a `Mutex` so Rust can prove the single-owner discipline spec.md asks
//! for in prose. Because only the thread that currently owns `owner` (or
//! the eviction job holding the eviction sentinel) ever locks it, that
//! mutex is never contended in practice; it exists to satisfy the borrow
//! checker, not to provide the real exclusion, which is `owner`'s job.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::MicroClock;
use crate::error::PoolError;
use crate::fs::LockHandle;
use crate::ident::{self, UNALLOCATED};
use crate::writer::{LifecycleManager, TableWriter};

#[derive(Default)]
pub(crate) struct EntryState {
    pub writer: Option<Box<dyn TableWriter>>,
    pub ownership_reason: Option<String>,
    pub ex: Option<PoolError>,
    pub lock: Option<LockHandle>,
}

pub struct Entry {
    pub(crate) table: String,
    pub(crate) owner: AtomicI64,
    pub(crate) state: Mutex<EntryState>,
    pub(crate) last_release_time: AtomicU64,
    /// Set by the pool immediately before calling `writer.close()`; read
    /// and cleared by `on_close` below. See `writer.rs` doc comment.
    pending_teardown: AtomicBool,
    clock: Arc<dyn MicroClock>,
}

impl Entry {
    /// A fresh entry, initially owned by `thread` (spec §4.1 step 4a: "the
    /// creating thread already owns it").
    pub(crate) fn new_owned_by(
        table: String,
        thread: i64,
        clock: Arc<dyn MicroClock>,
    ) -> Arc<Self> {
        let now = clock.now_us();
        Arc::new(Self {
            table,
            owner: AtomicI64::new(thread),
            state: Mutex::new(EntryState::default()),
            last_release_time: AtomicU64::new(now),
            pending_teardown: AtomicBool::new(false),
            clock,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn owner(&self) -> i64 {
        self.owner.load(Ordering::Acquire)
    }

    pub(crate) fn last_release_time(&self) -> u64 {
        self.last_release_time.load(Ordering::Acquire)
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().expect("entry state mutex poisoned")
    }

    /// CAS `UNALLOCATED -> thread`.
    pub(crate) fn try_claim(&self, thread: i64) -> bool {
        self.owner
            .compare_exchange(UNALLOCATED, thread, Ordering::Acquire, Ordering::Acquire)
            .is_ok()
    }

    /// CAS `UNALLOCATED -> eviction sentinel for thread`.
    pub(crate) fn try_claim_for_eviction(&self, thread: i64) -> bool {
        let sentinel = ident::eviction_sentinel(thread);
        self.owner
            .compare_exchange(UNALLOCATED, sentinel, Ordering::Acquire, Ordering::Acquire)
            .is_ok()
    }

    /// Publish the release store with the fence spec §5 requires: every
    /// field mutation above must be visible before `owner` flips back to
    /// `UNALLOCATED`.
    pub(crate) fn release_to_unallocated(&self) {
        self.owner.store(UNALLOCATED, Ordering::Release);
    }

    /// Final CAS used when a caller races the pool's own shutdown
    /// (spec §4.2 step 3).
    pub(crate) fn try_reclaim(&self, thread: i64) -> bool {
        self.owner
            .compare_exchange(UNALLOCATED, thread, Ordering::Acquire, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn stamp_release(&self) {
        let now = self.clock.now_us();
        self.last_release_time.store(now, Ordering::Release);
    }

    /// Marks that the writer about to be passed to `close()` should
    /// perform its own teardown, then invokes it.
    pub(crate) fn teardown(self: &Arc<Self>, mut writer: Box<dyn TableWriter>) {
        self.pending_teardown.store(true, Ordering::SeqCst);
        writer.close();
    }

    pub(crate) fn as_lifecycle(self: &Arc<Self>) -> Arc<dyn LifecycleManager> {
        self.clone()
    }
}

impl LifecycleManager for Entry {
    fn on_close(&self) -> bool {
        self.pending_teardown.swap(false, Ordering::SeqCst)
    }
}
