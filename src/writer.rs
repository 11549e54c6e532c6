//! The writer contract consumed by the pool (spec §6.1)
//!
//! The table writer itself is an external collaborator — rollback, tick,
//! the command queue, and the on-close callback are specified only at
//! this boundary. Production callers plug in their own `WriterFactory`;
//! [`crate::testutil`] ships a `RecordingWriter` exercising every method
//! here for the pool's own test suite.

use std::sync::Arc;

use crate::error::Result;

/// A task enqueued on a writer that is currently owned by someone else
/// (see `Pool::get_or_publish_command`, spec §4.6). Invoked under the
/// writer's own publish protocol, never under any pool lock.
pub type Command = Box<dyn FnOnce(&mut dyn TableWriter) + Send>;

/// The pool's side of the writer's on-close callback (spec §6.1, §9).
///
/// `Entry` implements this. A writer calls `on_close` from within its own
/// `close()` to learn whether it should perform its own teardown (`true`)
/// or whether the pool already took ownership and the writer must not
/// free its resources (`false`). The pool always decides the outcome
/// before invoking `close()`, so this is a notification, not a vote.
pub trait LifecycleManager: Send + Sync {
    fn on_close(&self) -> bool;
}

/// The writer handle the pool caches per table.
pub trait TableWriter: Send {
    /// Undo any structural commands applied during the current tenure.
    fn rollback(&mut self) -> Result<()>;
    /// Process queued commands; `full` requests a complete drain (used on
    /// return-to-pool so ALTER TABLE-style commands queued by other
    /// threads via `process_command_async` are not lost).
    fn tick(&mut self, full: bool) -> Result<()>;
    /// Enqueue a command for later processing by the owning thread's tick.
    fn process_command_async(&mut self, cmd: Command) -> Result<()>;
    fn table_name(&self) -> &str;
    /// Take ownership of an already-open advisory lock (unlock-with-writer,
    /// spec §4.4): the writer is now responsible for holding the table
    /// locked for as long as it lives.
    fn transfer_lock(&mut self, lock: crate::fs::LockHandle);
    fn set_lifecycle_manager(&mut self, manager: Arc<dyn LifecycleManager>);
    /// Invokes the stored lifecycle manager's `on_close`; tears itself
    /// down only if told to.
    fn close(&mut self);
}

/// Opens writers on behalf of the pool. Opaque to the pool beyond this
/// contract — stands in for spec §6.1's
/// `new(config, name, bus, null, is_new_table, lifecycle_manager, root, metrics)`.
pub trait WriterFactory: Send + Sync {
    fn create(
        &self,
        table: &str,
        is_new_table: bool,
        lifecycle: Arc<dyn LifecycleManager>,
    ) -> Result<Box<dyn TableWriter>>;
}
