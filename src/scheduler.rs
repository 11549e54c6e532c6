//! Background idle-writer eviction (spec §9 supplement)
//!
//! spec.md leaves calling `Pool::release_all` on a timer to the host
//! application. `PoolScheduler` is the same shape as Sandstone's own
//! background flush loop: a shutdown flag guarding a sleep-then-work
//! cycle on a dedicated thread, stopped from `Drop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::pool::Pool;

/// Runs `Pool::release_all` on an interval until dropped.
pub struct PoolScheduler {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PoolScheduler {
    pub fn spawn(pool: Arc<Pool>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_shutdown = shutdown.clone();

        let handle = thread::spawn(move || {
            log::info!(
                "writer_pool: eviction scheduler started (interval: {:?})",
                interval
            );
            let mut last_run = Instant::now();

            loop {
                if worker_shutdown.load(Ordering::SeqCst) {
                    log::info!("writer_pool: eviction scheduler shutting down");
                    break;
                }

                let elapsed = last_run.elapsed();
                if elapsed < interval {
                    thread::sleep(interval - elapsed);
                }

                pool.release_all(pool.eviction_deadline());
                last_run = Instant::now();
            }
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for PoolScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
