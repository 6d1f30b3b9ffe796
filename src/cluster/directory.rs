/// Node directory: tracks the cluster's current writable nodes
///
/// The directory is seeded with the coordinator endpoint only. Refresh runs
/// the listing query against the cluster (preferring an already-pooled
/// connection, falling back to a direct coordinator connection) and replaces
/// the node list wholesale. Any refresh failure degrades the directory to
/// empty, which routes every subsequent connection attempt back through the
/// coordinator until a refresh succeeds.
use tokio::sync::RwLock;

use super::{Node, NodeSelector, RandomSelector};
use crate::error::{SinkError, SinkResult};
use crate::pool::ConnectionPool;
use crate::sql::{ClientConnection, Connector};

/// Statement listing the cluster's writable endpoints
const LIST_NODES: &str = "SHOW AGGREGATORS";

pub struct NodeDirectory<C: Connector> {
    connector: C,
    coordinator: Node,
    selector: Box<dyn NodeSelector>,
    nodes: RwLock<Vec<Node>>,
}

impl<C: Connector> NodeDirectory<C> {
    pub fn new(connector: C, coordinator: Node) -> Self {
        Self::with_selector(connector, coordinator, Box::new(RandomSelector))
    }

    pub fn with_selector(
        connector: C,
        coordinator: Node,
        selector: Box<dyn NodeSelector>,
    ) -> Self {
        Self {
            connector,
            coordinator,
            selector,
            nodes: RwLock::new(Vec::new()),
        }
    }

    pub fn coordinator(&self) -> &Node {
        &self.coordinator
    }

    pub async fn nodes(&self) -> Vec<Node> {
        self.nodes.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Pick the node a new connection should target.
    pub async fn pick(&self) -> Option<Node> {
        let nodes = self.nodes.read().await;
        self.selector.select(&nodes).cloned()
    }

    /// Open a connection to a specific node.
    pub async fn connect(&self, node: &Node) -> SinkResult<C::Conn> {
        log::info!("connecting to {}", node.endpoint());
        self.connector
            .connect(node)
            .await
            .map_err(|e| SinkError::connection(e.to_string()))
    }

    /// Open a direct, unpooled connection to the coordinator.
    pub async fn connect_coordinator(&self) -> SinkResult<C::Conn> {
        self.connect(&self.coordinator).await
    }

    /// Refresh the node list.
    ///
    /// With at least one known node the listing query runs over a pooled
    /// connection first; on query failure that connection is discarded and
    /// the query retried once over a direct coordinator connection. An empty
    /// directory always goes straight to the coordinator.
    pub async fn refresh(&self, pool: &ConnectionPool<C>) -> SinkResult<()> {
        if self.is_empty().await {
            return self.refresh_direct().await;
        }

        match pool.acquire().await {
            Ok(mut pooled) => {
                let reached = pooled.node().host.clone();
                match self.fetch_nodes(pooled.conn_mut(), &reached).await {
                    Ok(nodes) => {
                        self.replace(nodes).await;
                        pool.release(pooled).await;
                        Ok(())
                    }
                    Err(e) => {
                        pool.destroy(pooled).await;
                        log::debug!("node listing over pooled connection failed: {e}");
                        self.refresh_direct().await
                    }
                }
            }
            Err(e) => {
                log::debug!("could not acquire pooled connection for refresh: {e}");
                self.refresh_direct().await
            }
        }
    }

    /// Refresh via a dedicated coordinator connection, resetting the
    /// directory on failure.
    pub async fn refresh_direct(&self) -> SinkResult<()> {
        let mut conn = match self.connect_coordinator().await {
            Ok(conn) => conn,
            Err(e) => {
                self.reset().await;
                return Err(SinkError::discovery(format!(
                    "coordinator {} unreachable: {e}",
                    self.coordinator.endpoint()
                )));
            }
        };

        let fetched = self.fetch_nodes(&mut conn, &self.coordinator.host).await;
        let _ = conn.disconnect().await;

        match fetched {
            Ok(nodes) => {
                self.replace(nodes).await;
                Ok(())
            }
            Err(e) => {
                self.reset().await;
                Err(e)
            }
        }
    }

    /// Run the listing query on an open connection and parse the rows.
    /// Nodes that self-report as loopback (queried locally) are rewritten to
    /// the address that was used to reach them.
    async fn fetch_nodes(&self, conn: &mut C::Conn, reached: &str) -> SinkResult<Vec<Node>> {
        let rows = conn
            .query(LIST_NODES)
            .await
            .map_err(|e| SinkError::discovery(format!("node listing failed: {e}")))?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            let host = row
                .get_str("Host")
                .ok_or_else(|| SinkError::discovery("node listing row is missing Host"))?;
            let port = row
                .get_u16("Port")
                .ok_or_else(|| SinkError::discovery("node listing row is missing Port"))?;

            let host = if host == "127.0.0.1" {
                reached.to_string()
            } else {
                host.to_string()
            };

            nodes.push(Node {
                host,
                port,
                user: self.coordinator.user.clone(),
                password: self.coordinator.password.clone(),
            });
        }
        Ok(nodes)
    }

    async fn replace(&self, nodes: Vec<Node>) {
        log::debug!("directory now tracking {} nodes", nodes.len());
        *self.nodes.write().await = nodes;
    }

    pub async fn reset(&self) {
        self.nodes.write().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, nodes: Vec<Node>) {
        self.replace(nodes).await;
    }
}
