//! Pool configuration (spec §6.4)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration options the pool reads at construction time.
///
/// `message_bus` and `metrics` from spec §6.4 aren't modeled as fields
/// here — they're opaque collaborators forwarded to the `WriterFactory`
/// at writer-creation time, not state the pool itself reads, so they're
/// threaded into `Pool::new` directly instead (spec §9: "do not use
/// ambient singletons; thread the pool explicitly into constructors").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Filesystem root for tables and advisory lock files.
    pub root: PathBuf,
    /// Microsecond age past which an idle entry becomes evictable.
    pub inactive_writer_ttl_us: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            // 30 seconds, a reasonable idle-writer amortisation window.
            inactive_writer_ttl_us: 30_000_000,
        }
    }
}

impl PoolConfig {
    pub fn new(root: impl Into<PathBuf>, inactive_writer_ttl_us: u64) -> Self {
        Self {
            root: root.into(),
            inactive_writer_ttl_us,
        }
    }

    pub(crate) fn lock_path(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }
}
