/// Bounded pool of live connections to the cluster's writable nodes
///
/// Connections are created lazily against a node picked by the directory's
/// selector (uniform random by default). There is no per-node affinity and no
/// health scoring: failover happens because the next acquire simply picks a
/// different node. Broken connections must be destroyed, never released.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cluster::directory::NodeDirectory;
use crate::cluster::Node;
use crate::error::{SinkError, SinkResult};
use crate::sql::{ClientConnection, Connector};

/// Pool sizing and timing knobs
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrently-live connections (held + idle)
    pub max_connections: usize,
    /// Idle connections older than this are closed by the reaper
    pub idle_timeout: Duration,
    /// Period of the automatic directory refresh
    pub refresh_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            idle_timeout: Duration::from_secs(10),
            refresh_interval: Duration::from_secs(60),
        }
    }
}

/// A live connection checked out of the pool, bound to the node it was
/// opened against. Ownership enforces the single-holder rule; hand it back
/// via [`ConnectionPool::release`] or [`ConnectionPool::destroy`].
pub struct PooledConn<T> {
    conn: T,
    node: Node,
}

impl<T> PooledConn<T> {
    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn conn_mut(&mut self) -> &mut T {
        &mut self.conn
    }

    fn into_inner(self) -> T {
        self.conn
    }
}

struct IdleConn<T> {
    conn: PooledConn<T>,
    since: Instant,
}

struct PoolState<T> {
    idle: Vec<IdleConn<T>>,
    /// Total existing connections: held by callers plus idle
    live: usize,
    /// Acquirers parked at the max; woken with a connection on release or
    /// with `None` when a slot frees up
    waiters: VecDeque<oneshot::Sender<Option<PooledConn<T>>>>,
}

impl<T> PoolState<T> {
    fn new() -> Self {
        Self {
            idle: Vec::new(),
            live: 0,
            waiters: VecDeque::new(),
        }
    }
}

pub struct ConnectionPool<C: Connector> {
    directory: Arc<NodeDirectory<C>>,
    config: PoolConfig,
    state: Mutex<PoolState<C::Conn>>,
    closed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Create the pool and start its background tasks (periodic directory
    /// refresh, idle reaper).
    pub async fn start(directory: Arc<NodeDirectory<C>>, config: PoolConfig) -> Arc<Self> {
        let pool = Arc::new(Self {
            directory,
            config,
            state: Mutex::new(PoolState::new()),
            closed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        let refresher = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(pool.config.refresh_interval);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(e) = pool.directory.refresh(&pool).await {
                        info!("periodic node refresh failed: {e}");
                    }
                }
            })
        };

        let reaper = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let period = (pool.config.idle_timeout / 2).max(Duration::from_millis(10));
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    pool.evict_idle().await;
                }
            })
        };

        pool.tasks.lock().await.extend([refresher, reaper]);
        pool
    }

    /// Check a connection out of the pool.
    ///
    /// Reuses an idle connection when one exists, creates a new one below
    /// the maximum (refreshing the directory first if it is empty), and
    /// otherwise parks until a holder releases or destroys. A failed connect
    /// fails this acquire outright; the next acquire picks a fresh node.
    pub async fn acquire(&self) -> SinkResult<PooledConn<C::Conn>> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(SinkError::connection("connection pool is closed"));
            }

            let mut reuse = None;
            let mut waiter = None;
            let mut create = false;
            let expired = {
                let mut state = self.state.lock().await;
                let expired = Self::take_expired(&mut state, self.config.idle_timeout);
                if let Some(entry) = state.idle.pop() {
                    reuse = Some(entry.conn);
                } else if state.live < self.config.max_connections {
                    state.live += 1;
                    create = true;
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    waiter = Some(rx);
                }
                expired
            };

            for entry in expired {
                let _ = entry.conn.into_inner().disconnect().await;
            }

            if let Some(conn) = reuse {
                return Ok(conn);
            }
            if create {
                return self.create().await;
            }
            if let Some(rx) = waiter {
                match rx.await {
                    Ok(Some(conn)) => return Ok(conn),
                    Ok(None) | Err(_) => continue,
                }
            }
        }
    }

    /// Return a healthy connection for reuse.
    pub async fn release(&self, conn: PooledConn<C::Conn>) {
        if self.closed.load(Ordering::SeqCst) {
            self.destroy(conn).await;
            return;
        }

        let mut state = self.state.lock().await;
        let mut returned = conn;
        loop {
            match state.waiters.pop_front() {
                Some(tx) => match tx.send(Some(returned)) {
                    Ok(()) => return,
                    Err(payload) => match payload {
                        Some(conn) => returned = conn,
                        None => return,
                    },
                },
                None => {
                    state.idle.push(IdleConn {
                        conn: returned,
                        since: Instant::now(),
                    });
                    return;
                }
            }
        }
    }

    /// Close and discard a connection, e.g. after a connection-level error.
    pub async fn destroy(&self, conn: PooledConn<C::Conn>) {
        let endpoint = conn.node().endpoint();
        if let Err(e) = conn.into_inner().disconnect().await {
            debug!("error closing connection to {endpoint}: {e}");
        }
        self.forfeit_slot().await;
    }

    /// Stop background tasks and drain the pool. Held connections are closed
    /// when their holders release them.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        let (idle, waiters) = {
            let mut state = self.state.lock().await;
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.live -= idle.len();
            let waiters: Vec<_> = state.waiters.drain(..).collect();
            (idle, waiters)
        };
        for tx in waiters {
            let _ = tx.send(None);
        }
        for entry in idle {
            let _ = entry.conn.into_inner().disconnect().await;
        }
    }

    /// Number of currently-live connections (held + idle).
    pub async fn live_connections(&self) -> usize {
        self.state.lock().await.live
    }

    async fn create(&self) -> SinkResult<PooledConn<C::Conn>> {
        match self.try_create().await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                self.forfeit_slot().await;
                Err(e)
            }
        }
    }

    async fn try_create(&self) -> SinkResult<PooledConn<C::Conn>> {
        if self.directory.is_empty().await {
            self.directory.refresh_direct().await?;
        }
        let node = self
            .directory
            .pick()
            .await
            .ok_or_else(|| SinkError::connection("no writable nodes available"))?;
        let conn = self.directory.connect(&node).await?;
        debug!("opened pooled connection to {}", node.endpoint());
        Ok(PooledConn { conn, node })
    }

    /// Give up a live slot and let one parked acquirer retry.
    async fn forfeit_slot(&self) {
        let mut state = self.state.lock().await;
        state.live = state.live.saturating_sub(1);
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(None).is_ok() {
                break;
            }
        }
    }

    async fn evict_idle(&self) {
        let expired = {
            let mut state = self.state.lock().await;
            Self::take_expired(&mut state, self.config.idle_timeout)
        };
        for entry in expired {
            debug!("evicting idle connection to {}", entry.conn.node().endpoint());
            let _ = entry.conn.into_inner().disconnect().await;
        }
    }

    fn take_expired(
        state: &mut PoolState<C::Conn>,
        timeout: Duration,
    ) -> Vec<IdleConn<C::Conn>> {
        let mut expired = Vec::new();
        let mut index = 0;
        while index < state.idle.len() {
            if state.idle[index].since.elapsed() >= timeout {
                expired.push(state.idle.swap_remove(index));
            } else {
                index += 1;
            }
        }
        state.live -= expired.len();
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::mock::{MockCluster, MockConnector};

    fn coordinator() -> Node {
        Node {
            host: "master.db".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
        }
    }

    async fn pool_with(
        cluster: &MockCluster,
        config: PoolConfig,
    ) -> Arc<ConnectionPool<MockConnector>> {
        let directory = Arc::new(NodeDirectory::new(cluster.connector(), coordinator()));
        ConnectionPool::start(directory, config).await
    }

    #[tokio::test]
    async fn test_empty_directory_triggers_refresh_on_acquire() {
        let cluster = MockCluster::with_nodes(&[("10.0.0.1", 3306)]);
        let pool = pool_with(&cluster, PoolConfig::default()).await;

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.node().endpoint(), "10.0.0.1:3306");

        // discovery went through the coordinator, then the connection was
        // opened against the discovered node
        assert_eq!(
            cluster.connects(),
            vec!["master.db:3306".to_string(), "10.0.0.1:3306".to_string()]
        );
        pool.release(conn).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_release_makes_connection_reusable() {
        let cluster = MockCluster::with_nodes(&[("10.0.0.1", 3306)]);
        let pool = pool_with(&cluster, PoolConfig::default()).await;

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;
        let again = pool.acquire().await.unwrap();

        // one discovery connect plus exactly one node connect
        assert_eq!(cluster.connects().len(), 2);
        assert_eq!(pool.live_connections().await, 1);
        pool.release(again).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_acquire_blocks_at_max_until_release() {
        let cluster = MockCluster::with_nodes(&[("10.0.0.1", 3306)]);
        let config = PoolConfig {
            max_connections: 2,
            ..PoolConfig::default()
        };
        let pool = pool_with(&cluster, config).await;

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_eq!(pool.live_connections().await, 2);

        let pending = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        pool.release(first).await;
        let third = pending.await.unwrap().unwrap();
        assert_eq!(pool.live_connections().await, 2);

        pool.release(second).await;
        pool.release(third).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_destroy_frees_a_slot_for_waiters() {
        let cluster = MockCluster::with_nodes(&[("10.0.0.1", 3306)]);
        let config = PoolConfig {
            max_connections: 1,
            ..PoolConfig::default()
        };
        let pool = pool_with(&cluster, config).await;

        let held = pool.acquire().await.unwrap();
        let pending = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        pool.destroy(held).await;
        let replacement = pending.await.unwrap().unwrap();
        assert_eq!(pool.live_connections().await, 1);
        assert_eq!(cluster.disconnects().len(), 1);

        pool.release(replacement).await;
        pool.close().await;
    }

    #[tokio::test]
    async fn test_connect_failure_fails_acquire_without_leaking_slot() {
        let cluster = MockCluster::with_nodes(&[("10.0.0.1", 3306)]);
        cluster.refuse("10.0.0.1:3306");
        let pool = pool_with(&cluster, PoolConfig::default()).await;

        let result = pool.acquire().await;
        assert!(matches!(result, Err(SinkError::Connection { .. })));
        assert_eq!(pool.live_connections().await, 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_idle_connections_are_reaped() {
        let cluster = MockCluster::with_nodes(&[("10.0.0.1", 3306)]);
        let config = PoolConfig {
            idle_timeout: Duration::from_millis(30),
            ..PoolConfig::default()
        };
        let pool = pool_with(&cluster, config).await;

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(pool.live_connections().await, 0);
        assert_eq!(cluster.disconnects().len(), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_periodic_refresh_populates_directory() {
        let cluster = MockCluster::with_nodes(&[("10.0.0.7", 3306)]);
        let config = PoolConfig {
            refresh_interval: Duration::from_millis(20),
            ..PoolConfig::default()
        };
        let directory = Arc::new(NodeDirectory::new(cluster.connector(), coordinator()));
        let pool = ConnectionPool::start(Arc::clone(&directory), config).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(directory.nodes().await.len(), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_close_drains_idle_and_rejects_acquire() {
        let cluster = MockCluster::with_nodes(&[("10.0.0.1", 3306)]);
        let pool = pool_with(&cluster, PoolConfig::default()).await;

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;
        pool.close().await;

        assert_eq!(cluster.disconnects().len(), 1);
        assert!(pool.acquire().await.is_err());
        assert_eq!(pool.live_connections().await, 0);
    }
}
