/// SQL transport contract consumed by the write path
///
/// The pool and the write batcher never talk to a concrete driver; they go
/// through the [`Connector`] / [`ClientConnection`] traits so that the
/// transport can be swapped (production driver, test double, instrumented
/// wrapper) without touching discovery, pooling or batching logic.
pub mod mysql;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::cluster::Node;

/// A single SQL parameter or result cell
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Null,
}

/// One result row, keyed by column name
#[derive(Debug, Clone, Default)]
pub struct SqlRow {
    columns: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    pub fn push<S: Into<String>>(&mut self, name: S, value: SqlValue) {
        self.columns.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column.as_str() == name)
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(SqlValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Fetch a column as a port-sized integer, tolerating drivers that
    /// report numeric columns as text.
    pub fn get_u16(&self, name: &str) -> Option<u16> {
        match self.get(name) {
            Some(SqlValue::Int(value)) => u16::try_from(*value).ok(),
            Some(SqlValue::UInt(value)) => u16::try_from(*value).ok(),
            Some(SqlValue::Text(text)) => text.parse().ok(),
            _ => None,
        }
    }
}

/// Transport-level error types
#[derive(Debug, Error)]
pub enum SqlError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("statement failed: {0}")]
    Exec(String),
}

/// Opens connections to cluster nodes
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: ClientConnection;

    async fn connect(&self, node: &Node) -> Result<Self::Conn, SqlError>;
}

/// One live connection to a cluster node
#[async_trait]
pub trait ClientConnection: Send + 'static {
    /// Run a statement and collect its result rows.
    async fn query(&mut self, statement: &str) -> Result<Vec<SqlRow>, SqlError>;

    /// Run a parameterized statement, returning the affected row count.
    async fn exec(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64, SqlError>;

    /// Run a series of parameterized statements sequentially on this
    /// connection, stopping at the first failure.
    async fn exec_series(&mut self, series: &[(String, Vec<SqlValue>)]) -> Result<u64, SqlError> {
        let mut affected = 0;
        for (statement, params) in series {
            affected += self.exec(statement, params).await?;
        }
        Ok(affected)
    }

    /// Tear the connection down cleanly.
    async fn disconnect(self) -> Result<(), SqlError>
    where
        Self: Sized;
}
