//! Bounded connection pool with FIFO waiters.
//!
//! The pool owns up to `max_size` live connections. Available connections sit
//! on a stack so the most recently released one is handed out next. When the
//! pool is exhausted and cannot grow, callers queue and are served strictly in
//! arrival order as connections come back. [`Pool::close_all`] closes every
//! connection, including checked-out ones, and fails all queued callers.
//!
//! Bookkeeping lives behind a single mutex and is never held across an await.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use fv_core::config::PoolConfig;
use fv_core::{Error, Result};
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Opens and closes the connections a [`Pool`] manages.
#[async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    /// Open a new connection.
    async fn connect(&self) -> Result<Self::Connection>;

    /// Close a connection. Later use of the connection must fail promptly.
    async fn close(&self, conn: &Self::Connection) -> Result<()>;
}

type Waiter<M> = oneshot::Sender<Option<Pooled<M>>>;

struct Inner<M: ManageConnection> {
    /// Every live connection, available or checked out.
    all: Vec<Arc<M::Connection>>,
    /// Available connections; the top of the stack is handed out first.
    free: Vec<Arc<M::Connection>>,
    waiters: VecDeque<Waiter<M>>,
    /// Slots claimed by growth that is still connecting.
    reserved: usize,
    /// Bumped by `close_all`; handles from an older generation are discarded.
    generation: u64,
}

struct Shared<M: ManageConnection> {
    manager: M,
    config: PoolConfig,
    inner: Mutex<Inner<M>>,
}

/// Snapshot of pool bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: usize,
    /// Live connections.
    pub size: usize,
    /// Connections ready to be handed out.
    pub available: usize,
    /// Connections currently checked out.
    pub in_use: usize,
    /// Callers queued for a connection.
    pub waiting: usize,
}

/// A shareable, bounded pool of connections.
pub struct Pool<M: ManageConnection> {
    shared: Arc<Shared<M>>,
}

impl<M: ManageConnection> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A checked-out connection. Dropping it returns the connection to the pool.
pub struct Pooled<M: ManageConnection> {
    conn: Arc<M::Connection>,
    generation: u64,
    shared: Arc<Shared<M>>,
    /// Cleared once the connection has been put back by other means.
    armed: bool,
}

enum Step<M: ManageConnection> {
    Grow { by: usize, generation: u64 },
    Wait(oneshot::Receiver<Option<Pooled<M>>>),
}

impl<M: ManageConnection> Pool<M> {
    /// Create an empty pool. No connection is opened until first use.
    pub fn new(manager: M, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                manager,
                config,
                inner: Mutex::new(Inner {
                    all: Vec::new(),
                    free: Vec::new(),
                    waiters: VecDeque::new(),
                    reserved: 0,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn manager(&self) -> &M {
        &self.shared.manager
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.max_size
    }

    pub fn status(&self) -> PoolStatus {
        let inner = self.shared.inner.lock();
        PoolStatus {
            capacity: self.capacity(),
            size: inner.all.len(),
            available: inner.free.len(),
            in_use: inner.all.len() - inner.free.len(),
            waiting: inner.waiters.iter().filter(|w| !w.is_closed()).count(),
        }
    }

    /// Check out a connection, growing the pool or queueing as needed.
    ///
    /// Queued callers wait without a deadline; wrap the call in a timeout for
    /// a fail-fast policy. Returns [`Error::Unavailable`] if the pool is
    /// closed while waiting, or at once if its capacity is zero.
    pub async fn acquire(&self) -> Result<Pooled<M>> {
        loop {
            let step = {
                let mut inner = self.shared.inner.lock();
                if let Some(conn) = inner.free.pop() {
                    return Ok(Pooled::new(conn, inner.generation, &self.shared));
                }

                let capacity = self.capacity();
                if capacity == 0 {
                    return Err(Error::unavailable("connection pool has no capacity"));
                }
                let size = inner.all.len() + inner.reserved;
                let batch = if size == 0 {
                    1
                } else {
                    self.shared
                        .config
                        .grow_batch
                        .max(1)
                        .min(capacity.saturating_sub(size))
                };

                if batch > 0 && size + batch <= capacity {
                    inner.reserved += batch;
                    Step::Grow {
                        by: batch,
                        generation: inner.generation,
                    }
                } else {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push_back(tx);
                    tracing::debug!(
                        waiting = inner.waiters.len(),
                        "connection pool exhausted; queueing"
                    );
                    Step::Wait(rx)
                }
            };

            match step {
                Step::Grow { by, generation } => self.fill(by, generation).await?,
                Step::Wait(rx) => {
                    return match rx.await {
                        Ok(Some(conn)) => Ok(conn),
                        _ => Err(Error::unavailable("connection pool closed")),
                    };
                }
            }
        }
    }

    /// Return a connection to the pool. Equivalent to dropping it.
    pub fn recycle(&self, conn: Pooled<M>) {
        drop(conn);
    }

    /// Open `by` connections and make them available.
    ///
    /// Returns `Ok(false)` without touching the pool when the result would
    /// exceed capacity.
    pub async fn grow(&self, by: usize) -> Result<bool> {
        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.all.len() + inner.reserved + by > self.capacity() {
                return Ok(false);
            }
            inner.reserved += by;
            inner.generation
        };
        self.fill(by, generation).await?;
        Ok(true)
    }

    /// Connect `by` connections for slots already reserved in `generation`.
    async fn fill(&self, by: usize, generation: u64) -> Result<()> {
        let attempts = (0..by).map(|_| self.shared.manager.connect());
        let mut opened = Vec::with_capacity(by);
        let mut first_error = None;
        for result in join_all(attempts).await {
            match result {
                Ok(conn) => opened.push(Arc::new(conn)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to open store connection");
                    first_error.get_or_insert(e);
                }
            }
        }
        let count = opened.len();

        let stale = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                opened
            } else {
                inner.reserved -= by;
                if count == 0 && inner.all.is_empty() && inner.reserved == 0 {
                    // Nothing live or connecting can ever serve the queue.
                    for waiter in std::mem::take(&mut inner.waiters) {
                        let _ = waiter.send(None);
                    }
                }
                for conn in opened {
                    inner.all.push(Arc::clone(&conn));
                    hand_off(&self.shared, &mut inner, conn);
                }
                tracing::debug!(
                    opened = count,
                    size = inner.all.len(),
                    capacity = self.capacity(),
                    "grew connection pool"
                );
                Vec::new()
            }
        };

        if !stale.is_empty() {
            // The pool was closed while these were connecting.
            for conn in &stale {
                let _ = self.shared.manager.close(conn).await;
            }
            return Err(Error::unavailable("connection pool closed"));
        }

        match first_error {
            Some(e) if count == 0 => Err(e),
            _ => Ok(()),
        }
    }

    /// Close every connection and fail every waiter, leaving an empty pool.
    ///
    /// Safe to call repeatedly and while connections are checked out; those
    /// connections fail on next use and are discarded when returned.
    pub async fn close_all(&self) -> Result<usize> {
        let (conns, waiters) = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.reserved = 0;
            inner.free.clear();
            (
                std::mem::take(&mut inner.all),
                std::mem::take(&mut inner.waiters),
            )
        };

        for waiter in waiters {
            let _ = waiter.send(None);
        }

        if conns.is_empty() {
            return Ok(0);
        }

        let closing = join_all(conns.iter().map(|conn| self.shared.manager.close(conn)));
        match tokio::time::timeout(self.shared.config.close_timeout(), closing).await {
            Ok(results) => {
                for e in results.into_iter().filter_map(Result::err) {
                    tracing::warn!(error = %e, "failed to close store connection");
                }
            }
            Err(_) => {
                tracing::warn!(
                    count = conns.len(),
                    "timed out closing store connections"
                );
            }
        }

        tracing::info!(closed = conns.len(), "closed connection pool");
        Ok(conns.len())
    }
}

/// Give `conn` to the oldest live waiter, or make it available.
fn hand_off<M: ManageConnection>(
    shared: &Arc<Shared<M>>,
    inner: &mut Inner<M>,
    conn: Arc<M::Connection>,
) {
    let mut pooled = Pooled::new(conn, inner.generation, shared);
    while let Some(waiter) = inner.waiters.pop_front() {
        match waiter.send(Some(pooled)) {
            Ok(()) => return,
            // The waiter gave up; try the next one.
            Err(Some(returned)) => pooled = returned,
            Err(None) => return,
        }
    }
    pooled.armed = false;
    inner.free.push(Arc::clone(&pooled.conn));
}

impl<M: ManageConnection> Shared<M> {
    fn release(self: &Arc<Self>, conn: Arc<M::Connection>, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        hand_off(self, &mut inner, conn);
    }
}

impl<M: ManageConnection> Pooled<M> {
    fn new(conn: Arc<M::Connection>, generation: u64, shared: &Arc<Shared<M>>) -> Self {
        Self {
            conn,
            generation,
            shared: Arc::clone(shared),
            armed: true,
        }
    }
}

impl<M: ManageConnection> Deref for Pooled<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<M: ManageConnection> Drop for Pooled<M> {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.shared.release(Arc::clone(&self.conn), self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct TestConn {
        id: usize,
        closed: AtomicBool,
    }

    #[derive(Default)]
    struct TestManager {
        opened: AtomicUsize,
        closed: AtomicUsize,
        refuse: AtomicBool,
    }

    #[async_trait]
    impl ManageConnection for TestManager {
        type Connection = TestConn;

        async fn connect(&self) -> Result<TestConn> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(Error::unavailable("connection refused"));
            }
            Ok(TestConn {
                id: self.opened.fetch_add(1, Ordering::SeqCst),
                closed: AtomicBool::new(false),
            })
        }

        async fn close(&self, conn: &TestConn) -> Result<()> {
            conn.closed.store(true, Ordering::SeqCst);
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pool(max_size: usize) -> Pool<TestManager> {
        Pool::new(
            TestManager::default(),
            PoolConfig {
                max_size,
                grow_batch: 5,
                close_timeout_ms: 500,
            },
        )
    }

    fn assert_invariants(pool: &Pool<TestManager>) {
        let s = pool.status();
        assert!(s.available <= s.size);
        assert!(s.size <= s.capacity);
        assert_eq!(s.in_use, s.size - s.available);
    }

    async fn wait_for_waiters(pool: &Pool<TestManager>, n: usize) {
        while pool.status().waiting < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn first_growth_opens_one_then_batches() {
        let pool = pool(10);

        let a = pool.acquire().await.unwrap();
        assert_eq!(pool.status().size, 1);
        assert_eq!(pool.status().in_use, 1);

        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.status().size, 6);
        assert_eq!(pool.status().available, 4);
        assert_ne!(a.id, b.id);
        assert_invariants(&pool);
    }

    #[tokio::test]
    async fn most_recently_released_is_reused() {
        let pool = pool(10);
        let _a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let b_id = b.id;

        pool.recycle(b);
        let c = pool.acquire().await.unwrap();
        assert_eq!(c.id, b_id);
        assert_invariants(&pool);
    }

    #[tokio::test]
    async fn exhausted_pool_blocks_until_release() {
        let pool = pool(10);
        let mut held = Vec::new();
        for _ in 0..10 {
            held.push(pool.acquire().await.unwrap());
        }
        assert_eq!(pool.status().size, 10);
        assert_eq!(pool.status().available, 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(blocked.is_err());
        assert_eq!(pool.status().waiting, 0, "abandoned waiter must not count");

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| c.id) })
        };
        wait_for_waiters(&pool, 1).await;

        let released = held.pop().unwrap();
        let released_id = released.id;
        drop(released);

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got, released_id);
        assert_eq!(pool.status().size, 10);
        assert_invariants(&pool);
    }

    #[tokio::test]
    async fn waiters_are_served_in_arrival_order() {
        let pool = pool(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = pool.acquire().await.unwrap();

        let mut tasks = Vec::new();
        for label in ["first", "second", "third"] {
            let task_pool = pool.clone();
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let conn = task_pool.acquire().await.unwrap();
                order.lock().push(label);
                tokio::task::yield_now().await;
                drop(conn);
            }));
            wait_for_waiters(&pool, tasks.len()).await;
        }

        drop(held);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
        assert_eq!(pool.status().available, 1);
    }

    #[tokio::test]
    async fn grow_beyond_capacity_is_refused_without_change() {
        let pool = pool(3);
        assert!(!pool.grow(4).await.unwrap());
        assert_eq!(pool.status().size, 0);

        assert!(pool.grow(3).await.unwrap());
        assert_eq!(pool.status().size, 3);
        assert_eq!(pool.status().available, 3);
        assert!(!pool.grow(1).await.unwrap());
        assert_invariants(&pool);
    }

    #[tokio::test]
    async fn close_all_fails_waiters_and_is_idempotent() {
        let pool = pool(1);
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| c.id) })
        };
        wait_for_waiters(&pool, 1).await;

        assert_eq!(pool.close_all().await.unwrap(), 1);
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(Error::Unavailable(_))));

        // The checked-out connection was closed under its holder.
        assert!(held.closed.load(Ordering::SeqCst));
        drop(held);

        let empty = PoolStatus {
            capacity: 1,
            size: 0,
            available: 0,
            in_use: 0,
            waiting: 0,
        };
        assert_eq!(pool.status(), empty);
        assert_eq!(pool.close_all().await.unwrap(), 0);
        assert_eq!(pool.status(), empty);
        assert_eq!(pool.manager().closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pool_is_reusable_after_close() {
        let pool = pool(2);
        drop(pool.acquire().await.unwrap());
        pool.close_all().await.unwrap();

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(pool.status().size, 1);
    }

    #[tokio::test]
    async fn failed_connect_releases_reservation() {
        let pool = pool(2);
        pool.manager().refuse.store(true, Ordering::SeqCst);
        assert!(pool.acquire().await.is_err());
        assert_eq!(pool.status().size, 0);

        pool.manager().refuse.store(false, Ordering::SeqCst);
        assert!(pool.acquire().await.is_ok());
        assert_invariants(&pool);
    }

    #[tokio::test]
    async fn zero_capacity_fails_instead_of_queueing() {
        let pool = pool(0);
        let err = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
            .await
            .expect("acquire should not wait")
            .err()
            .expect("acquire should fail");
        assert!(matches!(err, Error::Unavailable(_)));

        let s = pool.status();
        assert_eq!(s.size, 0);
        assert_eq!(s.waiting, 0);
        assert_eq!(pool.manager().opened.load(Ordering::SeqCst), 0);
    }
}
