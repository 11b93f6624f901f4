use std::time::Duration;

use bytes::Bytes;
use fv_core::config::PoolConfig;
use fv_core::Error;
use fv_store::{KvManager, Pool};

fn pool(dir: &tempfile::TempDir, max_size: usize) -> Pool<KvManager> {
    let manager = KvManager::new(dir.path().join("nested/store.db"), Duration::from_secs(5));
    Pool::new(
        manager,
        PoolConfig {
            max_size,
            ..PoolConfig::default()
        },
    )
}

#[tokio::test]
async fn connections_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool(&dir, 4);

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    assert_ne!(a.id(), b.id());

    a.set("k", Bytes::from_static(b"v")).await.unwrap();
    assert_eq!(b.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
    assert!(dir.path().join("nested/store.db").exists());
}

#[tokio::test]
async fn close_all_fails_checked_out_connections() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool(&dir, 2);

    let held = pool.acquire().await.unwrap();
    held.set("k", Bytes::from_static(b"v")).await.unwrap();

    assert_eq!(pool.close_all().await.unwrap(), 1);
    assert!(held.is_closed());
    let err = held.get("k").await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
    drop(held);
    assert_eq!(pool.status().size, 0);

    // A fresh connection sees what was written before the close.
    let fresh = pool.acquire().await.unwrap();
    assert_eq!(fresh.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
}

#[tokio::test]
async fn exhausted_pool_queues_until_release() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool(&dir, 1);

    let held = pool.acquire().await.unwrap();
    let id = held.id();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|c| c.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.status().waiting, 1);

    drop(held);
    assert_eq!(waiter.await.unwrap().unwrap(), id);
}

#[tokio::test]
async fn unopenable_path_is_a_store_error() {
    let dir = tempfile::tempdir().unwrap();
    // A directory cannot be opened as a database file.
    std::fs::create_dir_all(dir.path().join("store.db")).unwrap();
    let manager = KvManager::new(dir.path().join("store.db"), Duration::from_secs(1));
    let pool = Pool::new(manager, PoolConfig::default());

    let err = pool.acquire().await.err().expect("acquire must fail");
    assert!(matches!(err, Error::Store { .. } | Error::Io { .. }));
    assert_eq!(pool.status().size, 0);
}
