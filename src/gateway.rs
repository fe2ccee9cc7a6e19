//! Query gateway boundary
//!
//! Everything the analysis engine knows about the graph database goes
//! through [`QueryGateway`]: submit one Cypher query, get back fully
//! materialized rows of typed cells. Metric providers never see
//! driver-specific record objects.
//!
//! [`Neo4jGateway`] is the production implementation. Driver calls can
//! hang indefinitely on an unreachable server, so both the initial
//! connection and every query execution are wrapped in
//! `tokio::time::timeout`.

use std::time::Duration;

use neo4rs::{query, Graph};
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::config::ConnectionConfig;
use crate::errors::{AuditError, Result};

/// Default connection timeout (15 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default per-query timeout (60 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// One cell of a result row.
///
/// A `Null` cell means the underlying attribute is absent; callers treat
/// it as "not applicable", never as zero.
#[derive(Debug, Clone, PartialEq)]
pub enum CypherValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl CypherValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CypherValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CypherValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            CypherValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the cell. Integers widen to `f64` because Cypher
    /// aggregates return either depending on the column type.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            CypherValue::Float(f) => Some(*f),
            CypherValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// A fixed-arity result row, one cell per requested column.
pub type Row = Vec<CypherValue>;

/// Read-only query execution against the graph store.
///
/// Rows are consumed in full before the call returns. A transport or
/// auth failure surfaces as [`AuditError::DataSource`] and is fatal to
/// the run; implementations do not retry.
pub trait QueryGateway {
    fn run(
        &self,
        cypher: &str,
        columns: &[&str],
    ) -> impl std::future::Future<Output = Result<Vec<Row>>> + Send;
}

/// Gateway backed by a Neo4j bolt connection.
pub struct Neo4jGateway {
    graph: Graph,
    query_timeout: Duration,
}

impl Neo4jGateway {
    /// Connect with the default timeouts.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        Self::connect_with_timeouts(config, DEFAULT_CONNECT_TIMEOUT, DEFAULT_QUERY_TIMEOUT).await
    }

    pub async fn connect_with_timeouts(
        config: &ConnectionConfig,
        connect_timeout: Duration,
        query_timeout: Duration,
    ) -> Result<Self> {
        info!(
            "Connecting to graph database at {} as {}",
            config.uri, config.username
        );

        let connect = Graph::new(config.uri.as_str(), config.username.as_str(), config.password());
        let graph = match timeout(connect_timeout, connect).await {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => {
                error!("Connection to {} failed: {}", config.uri, e);
                return Err(AuditError::DataSource(format!(
                    "could not connect to {} -- check the URI, username, and password, \
                     and make sure the database is running ({})",
                    config.uri, e
                )));
            }
            Err(_) => {
                error!(
                    "Connection to {} timed out after {}s",
                    config.uri,
                    connect_timeout.as_secs()
                );
                return Err(AuditError::DataSource(format!(
                    "connection to {} timed out after {} seconds",
                    config.uri,
                    connect_timeout.as_secs()
                )));
            }
        };

        info!("Connected to {}", config.uri);
        Ok(Self {
            graph,
            query_timeout,
        })
    }
}

impl QueryGateway for Neo4jGateway {
    async fn run(&self, cypher: &str, columns: &[&str]) -> Result<Vec<Row>> {
        debug!("Executing query: {}", cypher.trim());

        let work = async {
            let mut stream = self.graph.execute(query(cypher)).await?;
            let mut rows: Vec<Row> = Vec::new();
            while let Some(record) = stream.next().await? {
                let mut row = Row::with_capacity(columns.len());
                for column in columns {
                    row.push(cell(&record, column));
                }
                rows.push(row);
            }
            Ok(rows)
        };

        match timeout(self.query_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Query timed out after {}s: {}",
                    self.query_timeout.as_secs(),
                    cypher.trim()
                );
                Err(AuditError::DataSource(format!(
                    "query did not complete within {} seconds",
                    self.query_timeout.as_secs()
                )))
            }
        }
    }
}

/// Extract one named column as a typed cell. An absent column or an
/// attribute shape the engine does not compute over becomes `Null`.
fn cell(record: &neo4rs::Row, column: &str) -> CypherValue {
    if let Ok(s) = record.get::<String>(column) {
        return CypherValue::Str(s);
    }
    if let Ok(b) = record.get::<bool>(column) {
        return CypherValue::Bool(b);
    }
    if let Ok(i) = record.get::<i64>(column) {
        return CypherValue::Int(i);
    }
    if let Ok(f) = record.get::<f64>(column) {
        return CypherValue::Float(f);
    }
    CypherValue::Null
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-crate gateway double. Answers each query by the first configured
    //! marker found in the query text, so tests pick markers that are
    //! unique to the query under test.

    use super::*;

    pub(crate) struct FakeGateway {
        responses: Vec<(&'static str, Vec<Row>)>,
        fail: bool,
    }

    impl FakeGateway {
        pub(crate) fn new() -> Self {
            Self {
                responses: Vec::new(),
                fail: false,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                responses: Vec::new(),
                fail: true,
            }
        }

        pub(crate) fn with(mut self, marker: &'static str, rows: Vec<Row>) -> Self {
            self.responses.push((marker, rows));
            self
        }
    }

    impl QueryGateway for FakeGateway {
        async fn run(&self, cypher: &str, _columns: &[&str]) -> Result<Vec<Row>> {
            if self.fail {
                return Err(AuditError::DataSource("gateway unavailable".into()));
            }
            for (marker, rows) in &self.responses {
                if cypher.contains(marker) {
                    return Ok(rows.clone());
                }
            }
            Ok(Vec::new())
        }
    }

    pub(crate) fn str_row(value: &str) -> Row {
        vec![CypherValue::Str(value.to_string())]
    }

    pub(crate) fn int_row(value: i64) -> Row {
        vec![CypherValue::Int(value)]
    }
}
