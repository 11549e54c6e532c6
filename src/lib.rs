//! Process-wide cache of table-writer handles enforcing one writer per
//! table at a time.
//!
//! ```text
//!                         +----------------------+
//!   get/lock/unlock  ---> |         Pool         | <--- release_all (eviction)
//!                         |  entries: table->Entry|
//!                         +----------+-----------+
//!                                    | owns (CAS protocol, entry.rs)
//!                                    v
//!                         +----------------------+
//!                         |        Entry         |
//!                         | owner: AtomicI64      |
//!                         | writer, lock, ex      |
//!                         +----------+-----------+
//!                                    | checked out as
//!                                    v
//!                         +----------------------+
//!                         |     PooledWriter      |--> TableWriter (caller's own type)
//!                         +----------------------+
//! ```
//!
//! `Pool` owns no I/O beyond the administrative advisory lock file
//! (`fs.rs`); everything else — opening writers, applying rollback/tick,
//! running queued commands — is delegated to the [`writer::TableWriter`]
//! and [`writer::WriterFactory`] the host application supplies. Wrap the
//! pool in an `Arc` and share it across threads the way a long-lived
//! connection manager would be shared; there is no ambient global.

pub mod clock;
pub mod config;
pub(crate) mod entry;
pub mod error;
pub mod event;
pub mod fs;
pub(crate) mod ident;
pub mod pool;
pub mod scheduler;
pub mod testutil;
pub mod writer;

pub use clock::{FakeClock, MicroClock, SystemClock};
pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use event::{LoggingListener, NoopListener, PoolEvent, PoolEventListener};
pub use fs::{LockFileSystem, LockHandle, MemoryLockFileSystem, OsLockFileSystem};
pub use pool::{Pool, PoolStats, PooledWriter};
pub use scheduler::PoolScheduler;
pub use writer::{Command, LifecycleManager, TableWriter, WriterFactory};
