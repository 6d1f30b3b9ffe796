/// Scripted in-memory transport shared by pool, directory and batcher tests
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ClientConnection, Connector, SqlError, SqlRow, SqlValue};
use crate::cluster::Node;

#[derive(Default)]
pub(crate) struct MockState {
    /// (host, port) rows returned for node listing queries
    pub nodes_reply: Vec<(String, u16)>,
    /// Endpoints whose connection attempts are refused
    pub refuse_connect: HashSet<String>,
    /// Fail the next N listing queries
    pub fail_queries: usize,
    /// Fail the next N exec calls
    pub fail_execs: usize,
    /// Artificial latency applied to every exec call
    pub exec_delay: Option<std::time::Duration>,
    /// Every connect attempt, in order, as "host:port"
    pub connects: Vec<String>,
    /// Every clean disconnect, in order
    pub disconnects: Vec<String>,
    /// Every exec call: (endpoint, statement, params)
    pub execs: Vec<(String, String, Vec<SqlValue>)>,
}

/// Handle owning the scripted cluster state; clone freely across the
/// connector and assertions.
#[derive(Clone, Default)]
pub(crate) struct MockCluster {
    state: Arc<Mutex<MockState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: &[(&str, u16)]) -> Self {
        let cluster = Self::new();
        cluster.set_nodes(nodes);
        cluster
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            state: Arc::clone(&self.state),
        }
    }

    pub fn set_nodes(&self, nodes: &[(&str, u16)]) {
        self.lock().nodes_reply = nodes
            .iter()
            .map(|(host, port)| (host.to_string(), *port))
            .collect();
    }

    pub fn refuse(&self, endpoint: &str) {
        self.lock().refuse_connect.insert(endpoint.to_string());
    }

    pub fn fail_next_queries(&self, count: usize) {
        self.lock().fail_queries = count;
    }

    pub fn fail_next_execs(&self, count: usize) {
        self.lock().fail_execs = count;
    }

    pub fn delay_execs(&self, delay: std::time::Duration) {
        self.lock().exec_delay = Some(delay);
    }

    pub fn connects(&self) -> Vec<String> {
        self.lock().connects.clone()
    }

    pub fn disconnects(&self) -> Vec<String> {
        self.lock().disconnects.clone()
    }

    pub fn execs(&self) -> Vec<(String, String, Vec<SqlValue>)> {
        self.lock().execs.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Connector for MockConnector {
    type Conn = MockConn;

    async fn connect(&self, node: &Node) -> Result<MockConn, SqlError> {
        let endpoint = node.endpoint();
        let mut state = self.state.lock().unwrap();
        state.connects.push(endpoint.clone());
        if state.refuse_connect.contains(&endpoint) {
            return Err(SqlError::Connect(format!("{endpoint}: refused")));
        }
        Ok(MockConn {
            endpoint,
            state: Arc::clone(&self.state),
        })
    }
}

pub(crate) struct MockConn {
    endpoint: String,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl ClientConnection for MockConn {
    async fn query(&mut self, statement: &str) -> Result<Vec<SqlRow>, SqlError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_queries > 0 {
            state.fail_queries -= 1;
            return Err(SqlError::Query(format!("{statement}: scripted failure")));
        }
        if statement.starts_with("SHOW") {
            let rows = state
                .nodes_reply
                .iter()
                .map(|(host, port)| {
                    let mut row = SqlRow::new();
                    row.push("Host", SqlValue::Text(host.clone()));
                    row.push("Port", SqlValue::Int(i64::from(*port)));
                    row
                })
                .collect();
            return Ok(rows);
        }
        Ok(Vec::new())
    }

    async fn exec(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64, SqlError> {
        let delay = self.state.lock().unwrap().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_execs > 0 {
            state.fail_execs -= 1;
            return Err(SqlError::Exec(format!("{statement}: scripted failure")));
        }
        state
            .execs
            .push((self.endpoint.clone(), statement.to_string(), params.to_vec()));
        Ok(params.len() as u64)
    }

    async fn disconnect(self) -> Result<(), SqlError> {
        let MockConn { endpoint, state } = self;
        state.lock().unwrap().disconnects.push(endpoint);
        Ok(())
    }
}
