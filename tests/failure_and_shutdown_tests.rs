//! Creation-failure replay, distressed writers, and pool shutdown
//! (P6, P7, P8, and scenario 6).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use writer_pool::testutil::{RecordingFactory, RecordingStats, RecordingWriter};
use writer_pool::{MemoryLockFileSystem, Pool, PoolConfig, PoolError};

fn test_pool() -> (Arc<Pool>, Arc<RecordingStats>, Arc<RecordingFactory>) {
    let stats = Arc::new(RecordingStats::default());
    let factory = Arc::new(RecordingFactory::new(stats.clone()));
    let pool = Pool::with_collaborators(
        PoolConfig::default(),
        factory.clone(),
        Arc::new(MemoryLockFileSystem::new()),
        Arc::new(writer_pool::SystemClock),
        Arc::new(writer_pool::NoopListener),
    );
    (pool, stats, factory)
}

#[test]
fn a_failed_create_replays_the_same_error_once_then_tries_again() {
    let (pool, _stats, factory) = test_pool();
    factory.fail_for("t1");

    let first = pool.get("t1", "ingest").unwrap_err();
    assert!(matches!(first, PoolError::CreationFailed(_)));

    let second = pool.get("t1", "ingest").unwrap_err();
    assert_eq!(first.to_string(), second.to_string());

    factory.allow("t1");
    pool.get("t1", "ingest")
        .expect("third attempt constructs afresh");
}

#[test]
fn a_writer_that_fails_rollback_on_return_is_torn_down_and_replaced() {
    let (pool, stats, _factory) = test_pool();

    // Install a pre-distressed writer directly so its rollback fails the
    // moment the pool tries to return it.
    pool.lock("t1", "create").unwrap();
    let mut writer = RecordingWriter::new("t1", stats.clone());
    writer.distress();
    pool.unlock("t1", Some(Box::new(writer)), true).unwrap();

    let held = pool.get("t1", "ingest").unwrap();
    drop(held); // triggers rollback, which fails -> entry torn down

    assert_eq!(stats.torn_down.load(Ordering::SeqCst), 1);

    // Next acquire constructs a brand new (non-distressed) writer.
    pool.get("t1", "ingest-2")
        .expect("pool recovers with a fresh writer");
    assert_eq!(stats.creates.load(Ordering::SeqCst), 1);
}

#[test]
fn closing_the_pool_twice_is_safe_and_blocks_new_acquires() {
    let (pool, stats, _factory) = test_pool();
    let held = pool.get("t1", "ingest").unwrap();

    pool.shutdown();
    pool.shutdown(); // idempotent, must not panic

    let err = pool.get("t2", "ingest").unwrap_err();
    assert!(matches!(err, PoolError::PoolClosed));

    // The in-flight writer still closes cleanly when released.
    drop(held);
    assert_eq!(stats.closes.load(Ordering::SeqCst), 1);
}
