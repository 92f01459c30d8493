//! Connection abstraction the save pipeline writes through.
//!
//! The pipeline opens one connection per flush and sends one statement per
//! batch. [`PostgresConnector`] is the live implementation;
//! [`DryRunConnector`] logs statements and reports every row as written.

use std::future::Future;

use sqlx::PgPool;
use sqlx::pool::PoolConnection;
use sqlx::postgres::Postgres;

use crate::error::DbError;
use crate::query::Statement;

/// Opens connections for a flush run.
pub trait SqlConnector: Send + Sync {
    /// Connection type handed out by [`connect`](Self::connect).
    type Connection: SqlConnection;

    /// Open a connection.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, DbError>> + Send;
}

/// One open connection.
pub trait SqlConnection: Send {
    /// Execute a statement text and return the number of rows it affected.
    fn execute(&mut self, statement: &Statement) -> impl Future<Output = Result<u64, DbError>> + Send;
}

/// [`SqlConnector`] over a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    pool: PgPool,
}

impl PostgresConnector {
    /// Wrap a pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A pooled `PostgreSQL` connection.
#[derive(Debug)]
pub struct PostgresConnection {
    conn: PoolConnection<Postgres>,
}

impl SqlConnector for PostgresConnector {
    type Connection = PostgresConnection;

    async fn connect(&self) -> Result<Self::Connection, DbError> {
        let conn = self.pool.acquire().await?;
        Ok(PostgresConnection { conn })
    }
}

impl SqlConnection for PostgresConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, DbError> {
        let result = sqlx::Executor::execute(&mut *self.conn, sqlx::raw_sql(&statement.sql)).await?;
        Ok(result.rows_affected())
    }
}

/// [`SqlConnector`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunConnector;

/// Connection handed out by [`DryRunConnector`].
#[derive(Debug, Default)]
pub struct DryRunConnection {
    executed: usize,
}

impl SqlConnector for DryRunConnector {
    type Connection = DryRunConnection;

    async fn connect(&self) -> Result<Self::Connection, DbError> {
        Ok(DryRunConnection::default())
    }
}

impl SqlConnection for DryRunConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, DbError> {
        self.executed = self.executed.saturating_add(1);
        tracing::info!(
            statement = self.executed,
            operation = %statement.operation,
            rows = statement.row_count(),
            sql = %statement.sql,
            "dry run"
        );
        Ok(u64::try_from(statement.row_count()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use ravenvault_types::{Operation, Row, SqlValue};
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn dry_run_reports_every_row_written() {
        const COLUMNS: &[&str] = &["Id"];
        let rows = [
            Row { table: "Item", columns: COLUMNS, key: Uuid::nil(), values: vec![SqlValue::Uuid(Uuid::nil())] },
            Row { table: "Item", columns: COLUMNS, key: Uuid::from_u128(1), values: vec![SqlValue::Uuid(Uuid::from_u128(1))] },
        ];
        let statement = crate::query::build(Operation::Insert, &rows);

        let conn = DryRunConnector.connect().await;
        assert!(conn.is_ok());
        let Ok(mut conn) = conn else { return };
        let affected = conn.execute(&statement).await;
        assert_eq!(affected.ok(), Some(2));
    }
}
