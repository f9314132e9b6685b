//! Connection pool
//!
//! A bounded pool of live connections to one peer. A `Manager` knows how to
//! create and destroy connections; the pool hands them out as `Pooled`
//! guards that go back to the pool when dropped, so every exit path of a
//! borrower returns its connection.

use std::fmt;
use std::future::Future;
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::client::PeerClient;

/// Lifecycle hooks for pooled connections
pub trait Manager: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection
    fn create(&self) -> impl Future<Output = io::Result<Self::Connection>> + Send;

    /// Whether an idle connection may be handed out again
    fn validate(&self, _conn: &Self::Connection) -> bool {
        true
    }

    /// Prepare a connection for a borrower
    fn activate(&self, _conn: &mut Self::Connection) {}

    /// Reset a connection before it goes idle
    fn passivate(&self, _conn: &mut Self::Connection) {}

    /// Close a connection for good
    fn destroy(&self, conn: Self::Connection);
}

/// Pool sizing
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Connections borrowed at the same time; further borrowers wait
    pub max_active: usize,
    /// Idle connections kept for reuse
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_active: 16,
            max_idle: 8,
        }
    }
}

/// Pool errors
#[derive(Debug)]
pub enum PoolError {
    /// The pool was closed
    Closed,

    /// A new connection could not be created
    Create(io::Error),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Closed => write!(f, "connection pool closed"),
            PoolError::Create(e) => write!(f, "connection failed: {}", e),
        }
    }
}

impl std::error::Error for PoolError {}

struct PoolInner<M: Manager> {
    manager: M,
    idle: Mutex<Vec<M::Connection>>,
    permits: Arc<Semaphore>,
    max_idle: usize,
    closed: AtomicBool,
}

impl<M: Manager> PoolInner<M> {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<M::Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn give_back(&self, mut conn: M::Connection) {
        if self.closed.load(Ordering::Acquire) {
            self.manager.destroy(conn);
            return;
        }

        self.manager.passivate(&mut conn);
        let mut idle = self.idle();
        if idle.len() < self.max_idle {
            idle.push(conn);
        } else {
            drop(idle);
            self.manager.destroy(conn);
        }
    }
}

/// Bounded pool of connections created by `M`
pub struct Pool<M: Manager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: Manager> Pool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        Pool {
            inner: Arc::new(PoolInner {
                manager,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(config.max_active.max(1))),
                max_idle: config.max_idle,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Borrow a connection, waiting while `max_active` are out
    pub async fn borrow(&self) -> Result<Pooled<M>, PoolError> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        loop {
            let candidate = self.inner.idle().pop();
            match candidate {
                Some(conn) if self.inner.manager.validate(&conn) => {
                    return Ok(self.checkout(conn, permit));
                }
                Some(conn) => self.inner.manager.destroy(conn),
                None => break,
            }
        }

        let conn = self
            .inner
            .manager
            .create()
            .await
            .map_err(PoolError::Create)?;
        Ok(self.checkout(conn, permit))
    }

    fn checkout(&self, mut conn: M::Connection, permit: OwnedSemaphorePermit) -> Pooled<M> {
        self.inner.manager.activate(&mut conn);
        Pooled {
            conn: Some(conn),
            pool: self.inner.clone(),
            _permit: permit,
        }
    }

    /// Number of idle connections
    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    /// Destroy idle connections and refuse further borrows
    ///
    /// Connections still borrowed are destroyed when they come back.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.permits.close();

        let idle = std::mem::take(&mut *self.inner.idle());
        for conn in idle {
            self.inner.manager.destroy(conn);
        }
    }
}

/// A borrowed connection; returned to its pool on drop
pub struct Pooled<M: Manager> {
    conn: Option<M::Connection>,
    pool: Arc<PoolInner<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: Manager> Pooled<M> {
    /// Destroy the connection instead of returning it
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.manager.destroy(conn);
        }
    }
}

impl<M: Manager> Deref for Pooled<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("pooled connection already released")
    }
}

impl<M: Manager> DerefMut for Pooled<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection already released")
    }
}

impl<M: Manager> Drop for Pooled<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(conn);
        }
    }
}

/// Creates `PeerClient` connections to one peer
pub struct PeerManager {
    addr: String,
    timeout: Duration,
}

impl PeerManager {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        PeerManager {
            addr: addr.into(),
            timeout,
        }
    }
}

impl Manager for PeerManager {
    type Connection = PeerClient;

    fn create(&self) -> impl Future<Output = io::Result<PeerClient>> + Send {
        let addr = self.addr.clone();
        let timeout = self.timeout;
        async move { PeerClient::connect(&addr, timeout).await }
    }

    fn destroy(&self, conn: PeerClient) {
        debug!("Closing connection to peer {}", conn.addr());
        // Dropping the stream closes the socket
        drop(conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        fail: AtomicBool,
    }

    impl Manager for Arc<Counting> {
        type Connection = usize;

        fn create(&self) -> impl Future<Output = io::Result<usize>> + Send {
            let result = if self.fail.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            } else {
                Ok(self.created.fetch_add(1, Ordering::SeqCst))
            };
            std::future::ready(result)
        }

        fn destroy(&self, _conn: usize) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool(max_active: usize, max_idle: usize) -> (Pool<Arc<Counting>>, Arc<Counting>) {
        let counting = Arc::new(Counting::default());
        let pool = Pool::new(counting.clone(), PoolConfig { max_active, max_idle });
        (pool, counting)
    }

    #[tokio::test]
    async fn test_connections_are_reused() {
        let (pool, counting) = pool(4, 4);

        let first = *pool.borrow().await.unwrap();
        let second = *pool.borrow().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(counting.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_discard_destroys() {
        let (pool, counting) = pool(4, 4);

        let conn = pool.borrow().await.unwrap();
        conn.discard();
        assert_eq!(counting.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_extra_idle_connections_destroyed() {
        let (pool, counting) = pool(4, 1);

        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(counting.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_borrow_waits_for_return() {
        let (pool, _) = pool(1, 1);
        let pool = Arc::new(pool);

        let held = pool.borrow().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { *pool.borrow().await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_failure_releases_permit() {
        let (pool, counting) = pool(1, 1);
        counting.fail.store(true, Ordering::SeqCst);
        assert!(matches!(pool.borrow().await, Err(PoolError::Create(_))));

        counting.fail.store(false, Ordering::SeqCst);
        assert!(pool.borrow().await.is_ok());
    }

    #[tokio::test]
    async fn test_close() {
        let (pool, counting) = pool(2, 2);
        let out = pool.borrow().await.unwrap();
        drop(pool.borrow().await.unwrap());
        assert_eq!(pool.idle_count(), 1);

        pool.close();
        assert!(matches!(pool.borrow().await, Err(PoolError::Closed)));
        assert_eq!(counting.destroyed.load(Ordering::SeqCst), 1);

        // Still-borrowed connections are destroyed on return
        drop(out);
        assert_eq!(counting.destroyed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_count(), 0);
    }
}
