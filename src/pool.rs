//! The pool itself (spec §2, §4)
//!
//! `Pool` is meant to be shared the same way `minisql`'s
//! `TransactionManager` is — wrapped in an `Arc` and handed to every
//! thread that needs it, never behind an ambient singleton (spec §9).

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::clock::{MicroClock, SystemClock};
use crate::config::PoolConfig;
use crate::entry::Entry;
use crate::error::{PoolError, Result};
use crate::event::{NoopListener, PoolEvent, PoolEventListener};
use crate::fs::{LockFileSystem, OsLockFileSystem};
use crate::ident;
use crate::writer::{Command, TableWriter, WriterFactory};

/// Approximate occupancy counts (spec §5: "approximate counts acceptable
/// for `size`, `busy_count`, `free_count`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub len: usize,
    pub busy: usize,
    pub free: usize,
}

/// Process-wide cache of table-writer handles.
pub struct Pool {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
    factory: Arc<dyn WriterFactory>,
    fs: Arc<dyn LockFileSystem>,
    clock: Arc<dyn MicroClock>,
    config: PoolConfig,
    listener: Arc<dyn PoolEventListener>,
    closed: AtomicBool,
}

impl Pool {
    pub fn new(config: PoolConfig, factory: Arc<dyn WriterFactory>) -> Arc<Self> {
        Self::with_collaborators(
            config,
            factory,
            Arc::new(OsLockFileSystem::new()),
            Arc::new(SystemClock),
            Arc::new(NoopListener),
        )
    }

    pub fn with_collaborators(
        config: PoolConfig,
        factory: Arc<dyn WriterFactory>,
        fs: Arc<dyn LockFileSystem>,
        clock: Arc<dyn MicroClock>,
        listener: Arc<dyn PoolEventListener>,
    ) -> Arc<Self> {
        let pool = Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            factory,
            fs,
            clock,
            config,
            listener,
            closed: AtomicBool::new(false),
        });
        pool.listener.on_event("*", &PoolEvent::Open);
        pool
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        let entries = self.entries.read().expect("entry map lock poisoned");
        let len = entries.len();
        let busy = entries
            .values()
            .filter(|e| e.owner() != ident::UNALLOCATED)
            .count();
        PoolStats {
            len,
            busy,
            free: len - busy,
        }
    }

    /// Acquire the writer for `table`, creating it if nobody has yet.
    pub fn get(self: &Arc<Self>, table: &str, reason: &str) -> Result<PooledWriter> {
        assert!(!reason.is_empty(), "ownership reason must not be empty");
        self.get_inner(table, reason, None)
            .map(|w| w.expect("get() never takes the publish branch"))
    }

    /// Acquire the writer for `table`, or — if it's busy — enqueue `cmd`
    /// on whoever holds it instead of blocking (spec §4.6).
    pub fn get_or_publish_command(
        self: &Arc<Self>,
        table: &str,
        reason: &str,
        cmd: Command,
    ) -> Result<Option<PooledWriter>> {
        assert!(!reason.is_empty(), "ownership reason must not be empty");
        self.get_inner(table, reason, Some(cmd))
    }

    fn get_inner(
        self: &Arc<Self>,
        table: &str,
        reason: &str,
        mut publish: Option<Command>,
    ) -> Result<Option<PooledWriter>> {
        if !self.is_open() {
            return Err(PoolError::PoolClosed);
        }
        let thread = ident::current();

        loop {
            let (entry, fresh) = self.find_or_insert(table, thread);

            if fresh {
                return self.create_and_return(table, entry, reason).map(Some);
            }

            if entry.try_claim(thread) {
                let had_ex = { entry.lock_state().ex.clone() };
                if let Some(ex) = had_ex {
                    // Consistent failure replay (P6): a prior create by
                    // some thread left this entry stranded with a cached
                    // error. Hand back the same error and let the next
                    // acquire attempt construction afresh.
                    self.entries
                        .write()
                        .expect("entry map lock poisoned")
                        .remove(table);
                    self.listener.on_event(table, &PoolEvent::ExResend);
                    return Err(ex);
                }

                let cached = { entry.lock_state().writer.is_some() };
                if cached {
                    entry.lock_state().ownership_reason = Some(reason.to_string());
                    self.listener.on_event(table, &PoolEvent::Get);
                    return Ok(Some(PooledWriter::new(self.clone(), entry)));
                }

                return self.create_and_return(table, entry, reason).map(Some);
            }

            let owner = entry.owner();

            if ident::is_eviction_sentinel(owner) {
                std::hint::spin_loop();
                continue;
            }

            if owner == thread {
                let locked = { entry.lock_state().lock.is_some() };
                if locked {
                    let reason = self.reinterpreted_reason(&entry);
                    return Err(PoolError::EntryLocked { reason });
                }
            }

            if let Some(cmd) = publish.take() {
                self.publish_command(table, &entry, cmd)?;
                return Ok(None);
            }

            let reason = self.reinterpreted_reason(&entry);
            return Err(PoolError::EntryUnavailable { reason });
        }
    }

    /// spec §4.1 "reason reinterpretation": a second caller can observe
    /// `owner != UNALLOCATED` while `ownership_reason` is still `NONE`
    /// (the holder hasn't stamped it yet). Substitute a synthetic reason
    /// so callers never see a null reason when told the entry is busy.
    fn reinterpreted_reason(&self, entry: &Arc<Entry>) -> String {
        entry
            .lock_state()
            .ownership_reason
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn find_or_insert(&self, table: &str, thread: i64) -> (Arc<Entry>, bool) {
        {
            let entries = self.entries.read().expect("entry map lock poisoned");
            if let Some(entry) = entries.get(table) {
                return (entry.clone(), false);
            }
        }
        let fresh = Entry::new_owned_by(table.to_string(), thread, self.clock.clone());
        let mut entries = self.entries.write().expect("entry map lock poisoned");
        if let Some(existing) = entries.get(table) {
            return (existing.clone(), false);
        }
        entries.insert(table.to_string(), fresh.clone());
        (fresh, true)
    }

    fn create_and_return(
        self: &Arc<Self>,
        table: &str,
        entry: Arc<Entry>,
        reason: &str,
    ) -> Result<PooledWriter> {
        match self.factory.create(table, false, entry.as_lifecycle()) {
            Ok(writer) => {
                let mut state = entry.lock_state();
                state.writer = Some(writer);
                state.ownership_reason = Some(reason.to_string());
                drop(state);
                self.listener.on_event(table, &PoolEvent::Create);
                Ok(PooledWriter::new(self.clone(), entry))
            }
            Err(e) => {
                {
                    let mut state = entry.lock_state();
                    state.ex = Some(e.clone());
                }
                entry.release_to_unallocated();
                self.listener.on_event(
                    table,
                    &PoolEvent::CreateError {
                        message: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Spin until the busy entry's writer is observably present (it may
    /// still be under construction by its owning thread), then deliver
    /// `cmd` to it (spec §4.6).
    fn publish_command(&self, table: &str, entry: &Arc<Entry>, cmd: Command) -> Result<()> {
        let _ = table;
        loop {
            if entry.owner() == ident::UNALLOCATED {
                return Err(PoolError::EntryUnavailable {
                    reason: "please retry".to_string(),
                });
            }

            let mut state = entry.lock_state();
            if let Some(writer) = state.writer.as_deref_mut() {
                return writer.process_command_async(cmd);
            }
            drop(state);
            std::hint::spin_loop();
        }
    }

    /// Administrative lock: durable, cross-process exclusion on a table
    /// name (spec §4.3). Non-reentrant and non-blocking.
    pub fn lock(self: &Arc<Self>, table: &str, reason: &str) -> Result<()> {
        if !self.is_open() {
            return Err(PoolError::PoolClosed);
        }
        let thread = ident::current();
        let (entry, fresh) = self.find_or_insert(table, thread);

        if !fresh && !entry.try_claim(thread) {
            let reason = self.reinterpreted_reason(&entry);
            self.listener.on_event(
                table,
                &PoolEvent::LockBusy {
                    reason: reason.clone(),
                },
            );
            return Err(PoolError::EntryUnavailable { reason });
        }

        let path = self.config.lock_path(table);
        let cached = entry.lock_state().writer.take();
        if let Some(writer) = cached {
            entry.teardown(writer);
            // The torn-down writer may have been holding a lock
            // transferred to it by a prior unlock(new_table=true); its
            // on-disk registration must go with it, or the `fs.lock`
            // attempt below fails against a registration nobody holds
            // anymore (spec §4.3 is otherwise unservable a second time).
            self.fs.remove(&path);
            self.listener.on_event(
                table,
                &PoolEvent::LockClose {
                    reason: "NAME_LOCK".to_string(),
                },
            );
        }

        match self.fs.lock(&path) {
            Some(handle) => {
                let mut state = entry.lock_state();
                state.lock = Some(handle);
                state.ownership_reason = Some(reason.to_string());
                drop(state);
                self.listener.on_event(table, &PoolEvent::LockSuccess);
                Ok(())
            }
            None => {
                let msg = "missing or owned by other process".to_string();
                {
                    let mut state = entry.lock_state();
                    state.ownership_reason = Some(msg.clone());
                }
                // spec §9 open question: this store can race a concurrent
                // acquirer in on a freshly-inserted entry; left as
                // specified rather than "fixed" (see DESIGN.md).
                entry.release_to_unallocated();
                self.listener.on_event(
                    table,
                    &PoolEvent::LockBusy {
                        reason: msg.clone(),
                    },
                );
                Err(PoolError::EntryLocked { reason: msg })
            }
        }
    }

    /// Administrative unlock (spec §4.4). `writer` installs a writer in
    /// place of removing the entry — used by the create-table path so
    /// the first writer for a brand-new table is visible to every future
    /// acquirer before any other thread can observe the table directory.
    pub fn unlock(
        self: &Arc<Self>,
        table: &str,
        writer: Option<Box<dyn TableWriter>>,
        new_table: bool,
    ) -> Result<()> {
        let thread = ident::current();
        let entry = {
            let entries = self.entries.read().expect("entry map lock poisoned");
            entries.get(table).cloned()
        };
        let entry = match entry {
            Some(e) => e,
            None => return Err(PoolError::NotLocked),
        };

        if entry.owner() != thread {
            self.listener.on_event(table, &PoolEvent::NotLockOwner);
            return Err(PoolError::NotLockOwner);
        }

        if entry.lock_state().writer.is_some() {
            self.listener.on_event(table, &PoolEvent::NotLocked);
            return Err(PoolError::NotLocked);
        }

        match writer {
            Some(mut w) => {
                log::debug!(
                    "writer_pool: unlock installing writer for '{}' (new_table={})",
                    table,
                    new_table
                );
                w.set_lifecycle_manager(entry.as_lifecycle());
                let mut state = entry.lock_state();
                if let Some(lock) = state.lock.take() {
                    w.transfer_lock(lock);
                }
                state.writer = Some(w);
                state.ownership_reason = None;
                drop(state);
                entry.stamp_release();
                entry.release_to_unallocated();
                self.listener.on_event(table, &PoolEvent::Unlock);
                Ok(())
            }
            None => {
                {
                    let mut state = entry.lock_state();
                    state.lock.take();
                }
                let path = self.config.lock_path(table);
                self.fs.remove(&path);
                self.entries
                    .write()
                    .expect("entry map lock poisoned")
                    .remove(table);
                self.listener.on_event(table, &PoolEvent::Unlock);
                Ok(())
            }
        }
    }

    /// Walk entries, reclaiming writers idle past `deadline` (spec §4.5).
    /// `deadline = u64::MAX` means "pool shutdown: force-release
    /// everything". Returns `true` if anything was removed.
    pub fn release_all(self: &Arc<Self>, deadline: u64) -> bool {
        let thread = ident::current();
        let shutdown = deadline == u64::MAX;
        let tables: Vec<String> = {
            self.entries
                .read()
                .expect("entry map lock poisoned")
                .keys()
                .cloned()
                .collect()
        };

        let mut removed_any = false;

        for table in tables {
            let entry = {
                let entries = self.entries.read().expect("entry map lock poisoned");
                match entries.get(&table) {
                    Some(e) => e.clone(),
                    None => continue,
                }
            };

            let owner = entry.owner();

            if owner == ident::UNALLOCATED && entry.last_release_time() < deadline {
                if entry.try_claim_for_eviction(thread) {
                    let writer = entry.lock_state().writer.take();
                    self.entries
                        .write()
                        .expect("entry map lock poisoned")
                        .remove(&table);
                    if let Some(w) = writer {
                        entry.teardown(w);
                        // A writer installed via unlock(new_table=true)
                        // carries a transferred lock registration; an
                        // idle-evicted writer must release it too, or the
                        // table can never be administratively locked again.
                        self.fs.remove(&self.config.lock_path(&table));
                    }
                    self.listener.on_event(&table, &PoolEvent::Expire);
                    removed_any = true;
                }
                continue;
            }

            if shutdown {
                let has_lock = entry.lock_state().lock.take().is_some();
                if has_lock {
                    self.entries
                        .write()
                        .expect("entry map lock poisoned")
                        .remove(&table);
                    removed_any = true;
                    continue;
                }
            }

            if entry.lock_state().ex.is_some() {
                self.entries
                    .write()
                    .expect("entry map lock poisoned")
                    .remove(&table);
                removed_any = true;
            }
        }

        removed_any
    }

    /// Idempotent. Force-releases every entry, then emits `Closed`.
    pub fn shutdown(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        while self.release_all(u64::MAX) {}
        self.listener.on_event("*", &PoolEvent::Closed);
    }

    pub(crate) fn return_to_pool(self: &Arc<Self>, entry: Arc<Entry>) {
        let table = entry.table().to_string();
        let owner_before = entry.owner();

        let distressed = {
            let mut state = entry.lock_state();
            match state.writer.as_deref_mut() {
                Some(writer) => writer.rollback().is_err() || writer.tick(true).is_err(),
                None => false,
            }
        };

        if distressed {
            self.entries
                .write()
                .expect("entry map lock poisoned")
                .remove(&table);
            let writer = entry.lock_state().writer.take();
            if let Some(w) = writer {
                entry.teardown(w);
                // Same reasoning as the eviction path: a distressed
                // writer holding a transferred lock must give up its
                // on-disk registration, not just its in-memory state.
                self.fs.remove(&self.config.lock_path(&table));
            }
            self.listener.on_event(
                &table,
                &PoolEvent::LockClose {
                    reason: "DISTRESSED".to_string(),
                },
            );
            return;
        }

        if owner_before == ident::UNALLOCATED {
            self.listener.on_event(&table, &PoolEvent::UnexpectedClose);
            return;
        }

        {
            let mut state = entry.lock_state();
            state.ownership_reason = None;
        }
        entry.stamp_release();
        entry.release_to_unallocated();

        if !self.is_open() {
            let thread = ident::current();
            if entry.try_reclaim(thread) {
                let writer = entry.lock_state().writer.take();
                if let Some(w) = writer {
                    entry.teardown(w);
                }
                self.listener.on_event(&table, &PoolEvent::OutOfPoolClose);
                return;
            }
        }

        self.listener.on_event(&table, &PoolEvent::Return);
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Timestamp to pass to [`Pool::release_all`] to evict everything
    /// idle past the configured TTL, as of right now.
    pub fn eviction_deadline(&self) -> u64 {
        self.clock
            .now_us()
            .saturating_sub(self.config.inactive_writer_ttl_us)
    }
}

/// A writer uniquely owned by the caller, on loan from the pool.
///
/// Dropping it without calling [`PooledWriter::close`] still returns the
/// writer to the pool (spec §8 P8: "in-flight writers still close cleanly
/// when their holders release them") — `close` exists for callers who
/// want the release to happen at a precise point rather than at scope
/// exit.
pub struct PooledWriter {
    pool: Arc<Pool>,
    entry: Arc<Entry>,
    returned: bool,
}

impl PooledWriter {
    fn new(pool: Arc<Pool>, entry: Arc<Entry>) -> Self {
        Self {
            pool,
            entry,
            returned: false,
        }
    }

    pub fn table_name(&self) -> &str {
        self.entry.table()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.with_writer(|w| w.rollback())
    }

    pub fn tick(&mut self, full: bool) -> Result<()> {
        self.with_writer(|w| w.tick(full))
    }

    pub fn process_command_async(&mut self, cmd: Command) -> Result<()> {
        self.with_writer(|w| w.process_command_async(cmd))
    }

    fn with_writer<R>(&mut self, f: impl FnOnce(&mut dyn TableWriter) -> R) -> R {
        let mut state = self.entry.lock_state();
        let writer = state
            .writer
            .as_deref_mut()
            .expect("writer is present for the whole checkout");
        f(writer)
    }

    /// Return the writer to the pool now.
    pub fn close(mut self) {
        self.returned = true;
        self.pool.return_to_pool(self.entry.clone());
    }
}

impl std::fmt::Debug for PooledWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledWriter")
            .field("table", &self.entry.table())
            .field("returned", &self.returned)
            .finish()
    }
}

impl Drop for PooledWriter {
    fn drop(&mut self) {
        if !self.returned {
            self.returned = true;
            self.pool.return_to_pool(self.entry.clone());
        }
    }
}
