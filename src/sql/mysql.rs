/// Production transport speaking the MySQL wire protocol via sqlx
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Row};

use super::{ClientConnection, Connector, SqlError, SqlRow, SqlValue};
use crate::cluster::Node;

/// Connector that opens one plain MySQL-protocol connection per call
#[derive(Debug, Clone, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlClient;

    async fn connect(&self, node: &Node) -> Result<MySqlClient, SqlError> {
        let options = MySqlConnectOptions::new()
            .host(&node.host)
            .port(node.port)
            .username(&node.user)
            .password(&node.password);

        let conn = options
            .connect()
            .await
            .map_err(|e| SqlError::Connect(format!("{}: {e}", node.endpoint())))?;

        Ok(MySqlClient { conn })
    }
}

/// One live MySQL-protocol connection
pub struct MySqlClient {
    conn: MySqlConnection,
}

#[async_trait]
impl ClientConnection for MySqlClient {
    async fn query(&mut self, statement: &str) -> Result<Vec<SqlRow>, SqlError> {
        let rows = sqlx::query(statement)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| SqlError::Query(e.to_string()))?;

        Ok(rows.iter().map(convert_row).collect())
    }

    async fn exec(&mut self, statement: &str, params: &[SqlValue]) -> Result<u64, SqlError> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = match param {
                SqlValue::Text(value) => query.bind(value.clone()),
                SqlValue::Int(value) => query.bind(*value),
                SqlValue::UInt(value) => query.bind(*value),
                SqlValue::Float(value) => query.bind(*value),
                SqlValue::Null => query.bind(None::<String>),
            };
        }

        let result = query
            .execute(&mut self.conn)
            .await
            .map_err(|e| SqlError::Exec(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn disconnect(self) -> Result<(), SqlError> {
        self.conn
            .close()
            .await
            .map_err(|e| SqlError::Connect(e.to_string()))
    }
}

/// Lower a driver row into the transport-neutral row model. Column types are
/// probed widest-first; anything undecodable degrades to Null rather than
/// failing the whole result set.
fn convert_row(row: &MySqlRow) -> SqlRow {
    let mut out = SqlRow::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            v.map(SqlValue::Int).unwrap_or(SqlValue::Null)
        } else if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
            v.map(SqlValue::UInt).unwrap_or(SqlValue::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            v.map(SqlValue::Float).unwrap_or(SqlValue::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(index) {
            v.map(SqlValue::Text).unwrap_or(SqlValue::Null)
        } else {
            SqlValue::Null
        };
        out.push(column.name().to_string(), value);
    }
    out
}
