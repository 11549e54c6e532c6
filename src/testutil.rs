//! Test doubles exercising the writer contract (spec §6.1)
//!
//! `RecordingWriter` tracks every call it receives so tests can assert on
//! ordering and counts rather than poking at private pool state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::fs::LockHandle;
use crate::writer::{Command, LifecycleManager, TableWriter, WriterFactory};

/// Shared counters a test can inspect after writers have been dropped
/// back into the pool.
#[derive(Default)]
pub struct RecordingStats {
    pub rollbacks: AtomicUsize,
    pub ticks: AtomicUsize,
    pub full_ticks: AtomicUsize,
    pub commands: AtomicUsize,
    pub creates: AtomicUsize,
    pub closes: AtomicUsize,
    pub torn_down: AtomicUsize,
}

pub struct RecordingWriter {
    table: String,
    stats: Arc<RecordingStats>,
    lifecycle: Option<Arc<dyn LifecycleManager>>,
    lock: Option<LockHandle>,
    fail_rollback: bool,
    closed: AtomicBool,
    queue: Vec<Command>,
}

impl RecordingWriter {
    pub fn new(table: impl Into<String>, stats: Arc<RecordingStats>) -> Self {
        Self {
            table: table.into(),
            stats,
            lifecycle: None,
            lock: None,
            fail_rollback: false,
            closed: AtomicBool::new(false),
            queue: Vec::new(),
        }
    }

    /// Makes every subsequent `rollback`/`tick` call fail, simulating a
    /// distressed writer (spec §8 P7).
    pub fn distress(&mut self) {
        self.fail_rollback = true;
    }
}

impl TableWriter for RecordingWriter {
    fn rollback(&mut self) -> Result<()> {
        self.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_rollback {
            return Err(crate::error::PoolError::CreationFailed(
                "simulated distress".to_string(),
            ));
        }
        Ok(())
    }

    fn tick(&mut self, full: bool) -> Result<()> {
        self.stats.ticks.fetch_add(1, Ordering::SeqCst);
        if full {
            self.stats.full_ticks.fetch_add(1, Ordering::SeqCst);
            for cmd in std::mem::take(&mut self.queue) {
                self.stats.commands.fetch_add(1, Ordering::SeqCst);
                cmd(self);
            }
        }
        if self.fail_rollback {
            return Err(crate::error::PoolError::CreationFailed(
                "simulated distress".to_string(),
            ));
        }
        Ok(())
    }

    /// Queues `cmd` for the owning thread's next full `tick`, matching a
    /// real writer's own publish protocol rather than running inline.
    fn process_command_async(&mut self, cmd: Command) -> Result<()> {
        self.queue.push(cmd);
        Ok(())
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn transfer_lock(&mut self, lock: LockHandle) {
        self.lock = Some(lock);
    }

    fn set_lifecycle_manager(&mut self, manager: Arc<dyn LifecycleManager>) {
        self.lifecycle = Some(manager);
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        let should_teardown = self
            .lifecycle
            .as_ref()
            .map(|l| l.on_close())
            .unwrap_or(true);
        if should_teardown {
            self.stats.torn_down.fetch_add(1, Ordering::SeqCst);
            self.lock = None;
        }
    }
}

/// Opens a `RecordingWriter` per table, optionally failing creation for
/// names listed in `fail_on` (spec §8 scenario 6: consistent create
/// failure replay).
pub struct RecordingFactory {
    stats: Arc<RecordingStats>,
    fail_on: Mutex<Vec<String>>,
}

impl RecordingFactory {
    pub fn new(stats: Arc<RecordingStats>) -> Self {
        Self {
            stats,
            fail_on: Mutex::new(Vec::new()),
        }
    }

    /// Every future `create` for `table` fails until `allow` is called.
    pub fn fail_for(&self, table: &str) {
        self.fail_on.lock().unwrap().push(table.to_string());
    }

    pub fn allow(&self, table: &str) {
        self.fail_on.lock().unwrap().retain(|t| t != table);
    }
}

impl WriterFactory for RecordingFactory {
    fn create(
        &self,
        table: &str,
        _is_new_table: bool,
        lifecycle: Arc<dyn LifecycleManager>,
    ) -> Result<Box<dyn TableWriter>> {
        if self.fail_on.lock().unwrap().iter().any(|t| t == table) {
            return Err(crate::error::PoolError::CreationFailed(
                "factory configured to fail".to_string(),
            ));
        }
        self.stats.creates.fetch_add(1, Ordering::SeqCst);
        let mut writer = RecordingWriter::new(table, self.stats.clone());
        writer.set_lifecycle_manager(lifecycle);
        Ok(Box::new(writer))
    }
}
