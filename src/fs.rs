//! The file-system contract consumed by the pool (spec §6.2)
//!
//! Only the administrative lock path touches the filesystem; everything
//! else in the pool is pure in-memory bookkeeping. `lock_fd` in spec.md's
//! data model becomes `Option<LockHandle>` here: `None` is the `-1`
//! sentinel, `Some(handle)` is an open advisory lock that closes when
//! dropped.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

/// An open advisory lock on a table's lock file. Dropping it is `close(fd)`
/// from spec §6.2's filesystem contract — it closes the descriptor, but it
/// does *not* release the lock for reacquisition: the on-disk registration
/// this handle came from (`LockFileSystem::lock`'s `path`) stays registered
/// until someone calls `LockFileSystem::remove(&path)` on it. Every caller
/// that lets a `LockHandle` go (pool.rs's lock/release_all/return_to_pool
/// teardown paths, `unlock`'s no-writer branch) must remove the path itself.
#[derive(Debug)]
pub struct LockHandle {
    // Kept for diagnostics (Debug) even though nothing reads it directly.
    #[allow(dead_code)]
    pub(crate) path: PathBuf,
    // `None` for in-memory backends that never open a real fd.
    #[allow(dead_code)]
    file: Option<File>,
}

/// Filesystem operations the administrative lock path needs.
pub trait LockFileSystem: Send + Sync {
    fn touch(&self, path: &Path) -> bool;
    fn remove(&self, path: &Path) -> bool;
    /// Attempt to acquire an exclusive advisory lock. Returns `None` on
    /// failure (already locked, or any I/O error); see `last_errno`.
    fn lock(&self, path: &Path) -> Option<LockHandle>;
    fn last_errno(&self) -> Option<i32>;
}

/// Default filesystem: advisory locks implemented as atomic exclusive
/// file creation (`O_CREAT|O_EXCL`), the same atomicity `minisql`'s
/// catalog save leans on for crash-safe renames.
#[derive(Debug, Default)]
pub struct OsLockFileSystem {
    last_errno: AtomicI32,
}

impl OsLockFileSystem {
    pub fn new() -> Self {
        Self {
            last_errno: AtomicI32::new(0),
        }
    }
}

impl LockFileSystem for OsLockFileSystem {
    fn touch(&self, path: &Path) -> bool {
        match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
        {
            Ok(_) => true,
            Err(e) => {
                self.last_errno
                    .store(e.raw_os_error().unwrap_or(-1), Ordering::Relaxed);
                false
            }
        }
    }

    fn remove(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                self.last_errno
                    .store(e.raw_os_error().unwrap_or(-1), Ordering::Relaxed);
                false
            }
        }
    }

    fn lock(&self, path: &Path) -> Option<LockHandle> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => Some(LockHandle {
                path: path.to_path_buf(),
                file: Some(file),
            }),
            Err(e) => {
                self.last_errno
                    .store(e.raw_os_error().unwrap_or(-1), Ordering::Relaxed);
                None
            }
        }
    }

    fn last_errno(&self) -> Option<i32> {
        match self.last_errno.load(Ordering::Relaxed) {
            0 => None,
            other => Some(other),
        }
    }
}

/// In-memory filesystem for tests that shouldn't touch a real disk.
#[derive(Debug, Default)]
pub struct MemoryLockFileSystem {
    locked: Mutex<std::collections::HashSet<PathBuf>>,
}

impl MemoryLockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockFileSystem for MemoryLockFileSystem {
    fn touch(&self, _path: &Path) -> bool {
        true
    }

    fn remove(&self, path: &Path) -> bool {
        self.locked.lock().unwrap().remove(path);
        true
    }

    fn lock(&self, path: &Path) -> Option<LockHandle> {
        let mut locked = self.locked.lock().unwrap();
        if !locked.insert(path.to_path_buf()) {
            return None;
        }
        Some(LockHandle {
            path: path.to_path_buf(),
            file: None,
        })
    }

    fn last_errno(&self) -> Option<i32> {
        None
    }
}
