//! PostgreSQL Backend Implementation
//!
//! [`QueryExecutor`] implementations over a sqlx `PgPool` and over an open
//! transaction. Builders are compiled with `to_*_sql_with_params` and values
//! are always bound, never interpolated.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Pool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::debug;

use super::core::{DatabaseValue, QueryExecutor, Row, SqlDialect};
use crate::error::{OrmError, OrmResult};
use crate::query::{insert_sql_with_params, QueryBuilder};

const DIALECT: SqlDialect = SqlDialect::PostgreSQL;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub idle_timeout: Option<u64>,
    pub max_lifetime: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
            idle_timeout: Some(600), // 10 minutes
            max_lifetime: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

/// Executes builders against a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: Pool<Postgres>,
}

impl PostgresExecutor {
    /// Connect a new pool
    pub async fn connect(database_url: &str, config: PoolConfig) -> OrmResult<Self> {
        validate_database_url(database_url)?;

        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        if let Some(max_lifetime) = config.max_lifetime {
            options = options.max_lifetime(Duration::from_secs(max_lifetime));
        }

        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to create PostgreSQL pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Open a transaction; the returned executor is threaded into an
    /// [`OrmContext`](crate::OrmContext) by the caller, who also finishes it.
    pub async fn begin(&self) -> OrmResult<PostgresTransactionExecutor> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OrmError::Transaction(format!("Failed to begin transaction: {}", e)))?;
        Ok(PostgresTransactionExecutor {
            tx: Mutex::new(Some(tx)),
        })
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn select(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        let (sql, params) = query.to_sql_with_params(DIALECT);
        debug!(sql = %sql, "select");
        let rows = bind_all(&sql, &params)?.fetch_all(&self.pool).await?;
        rows.iter().map(postgres_row_to_row).collect()
    }

    async fn count(&self, query: &QueryBuilder) -> OrmResult<u64> {
        let (sql, params) = query.to_count_sql_with_params(DIALECT);
        debug!(sql = %sql, "count");
        let row = bind_all(&sql, &params)?.fetch_one(&self.pool).await?;
        read_count(&row)
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> OrmResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let (sql, params) = insert_sql_with_params(DIALECT, table, rows, None)?;
        debug!(sql = %sql, "insert");
        let result = bind_all(&sql, &params)?.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn insert_get_id(&self, table: &str, row: &Row, key_name: &str) -> OrmResult<DatabaseValue> {
        let (sql, params) = insert_sql_with_params(DIALECT, table, std::slice::from_ref(row), Some(key_name))?;
        debug!(sql = %sql, "insert returning key");
        let row = bind_all(&sql, &params)?.fetch_one(&self.pool).await?;
        postgres_value_to_database_value(&row, 0)
    }

    async fn update(&self, query: &QueryBuilder, values: &Row) -> OrmResult<u64> {
        let (sql, params) = query.to_update_sql_with_params(DIALECT, values)?;
        debug!(sql = %sql, "update");
        let result = bind_all(&sql, &params)?.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn increment(&self, query: &QueryBuilder, column: &str, amount: &DatabaseValue, extra: &Row) -> OrmResult<u64> {
        let (sql, params) = query.to_increment_sql_with_params(DIALECT, column, amount, extra)?;
        debug!(sql = %sql, "increment");
        let result = bind_all(&sql, &params)?.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, query: &QueryBuilder) -> OrmResult<u64> {
        let (sql, params) = query.to_delete_sql_with_params(DIALECT)?;
        debug!(sql = %sql, "delete");
        let result = bind_all(&sql, &params)?.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Executes builders inside an open transaction
pub struct PostgresTransactionExecutor {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PostgresTransactionExecutor {
    /// Commit the transaction
    pub async fn commit(&self) -> OrmResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(completed)?;
        tx.commit()
            .await
            .map_err(|e| OrmError::Transaction(format!("Transaction commit failed: {}", e)))
    }

    /// Rollback the transaction
    pub async fn rollback(&self) -> OrmResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(completed)?;
        tx.rollback()
            .await
            .map_err(|e| OrmError::Transaction(format!("Transaction rollback failed: {}", e)))
    }
}

fn completed() -> OrmError {
    OrmError::Transaction("Transaction already completed".to_string())
}

#[async_trait]
impl QueryExecutor for PostgresTransactionExecutor {
    async fn select(&self, query: &QueryBuilder) -> OrmResult<Vec<Row>> {
        let (sql, params) = query.to_sql_with_params(DIALECT);
        debug!(sql = %sql, "select (transaction)");
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(completed)?;
        let rows = bind_all(&sql, &params)?.fetch_all(&mut **tx).await?;
        rows.iter().map(postgres_row_to_row).collect()
    }

    async fn count(&self, query: &QueryBuilder) -> OrmResult<u64> {
        let (sql, params) = query.to_count_sql_with_params(DIALECT);
        debug!(sql = %sql, "count (transaction)");
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(completed)?;
        let row = bind_all(&sql, &params)?.fetch_one(&mut **tx).await?;
        read_count(&row)
    }

    async fn insert(&self, table: &str, rows: &[Row]) -> OrmResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let (sql, params) = insert_sql_with_params(DIALECT, table, rows, None)?;
        debug!(sql = %sql, "insert (transaction)");
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(completed)?;
        let result = bind_all(&sql, &params)?.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn insert_get_id(&self, table: &str, row: &Row, key_name: &str) -> OrmResult<DatabaseValue> {
        let (sql, params) = insert_sql_with_params(DIALECT, table, std::slice::from_ref(row), Some(key_name))?;
        debug!(sql = %sql, "insert returning key (transaction)");
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(completed)?;
        let row = bind_all(&sql, &params)?.fetch_one(&mut **tx).await?;
        postgres_value_to_database_value(&row, 0)
    }

    async fn update(&self, query: &QueryBuilder, values: &Row) -> OrmResult<u64> {
        let (sql, params) = query.to_update_sql_with_params(DIALECT, values)?;
        debug!(sql = %sql, "update (transaction)");
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(completed)?;
        let result = bind_all(&sql, &params)?.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn increment(&self, query: &QueryBuilder, column: &str, amount: &DatabaseValue, extra: &Row) -> OrmResult<u64> {
        let (sql, params) = query.to_increment_sql_with_params(DIALECT, column, amount, extra)?;
        debug!(sql = %sql, "increment (transaction)");
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(completed)?;
        let result = bind_all(&sql, &params)?.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, query: &QueryBuilder) -> OrmResult<u64> {
        let (sql, params) = query.to_delete_sql_with_params(DIALECT)?;
        debug!(sql = %sql, "delete (transaction)");
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(completed)?;
        let result = bind_all(&sql, &params)?.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

fn validate_database_url(database_url: &str) -> OrmResult<()> {
    let parsed = url::Url::parse(database_url)
        .map_err(|e| OrmError::Connection(format!("Invalid database URL: {}", e)))?;

    match parsed.scheme() {
        "postgres" | "postgresql" => Ok(()),
        other => Err(OrmError::Connection(format!("Invalid PostgreSQL URL scheme '{}'", other))),
    }
}

fn read_count(row: &PgRow) -> OrmResult<u64> {
    use sqlx::Row as _;

    let count: i64 = row.try_get(0)?;
    Ok(count.max(0) as u64)
}

fn bind_all<'q>(sql: &'q str, params: &[DatabaseValue]) -> OrmResult<Query<'q, Postgres, PgArguments>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_database_value(query, param)?;
    }
    Ok(query)
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> OrmResult<Query<'q, Postgres, PgArguments>> {
    match value {
        DatabaseValue::Null => Ok(query.bind(Option::<String>::None)),
        DatabaseValue::Bool(b) => Ok(query.bind(*b)),
        DatabaseValue::Int32(i) => Ok(query.bind(*i)),
        DatabaseValue::Int64(i) => Ok(query.bind(*i)),
        DatabaseValue::Float32(f) => Ok(query.bind(*f)),
        DatabaseValue::Float64(f) => Ok(query.bind(*f)),
        DatabaseValue::String(s) => Ok(query.bind(s.clone())),
        DatabaseValue::Bytes(b) => Ok(query.bind(b.clone())),
        DatabaseValue::Uuid(u) => Ok(query.bind(*u)),
        DatabaseValue::DateTime(dt) => Ok(query.bind(*dt)),
        DatabaseValue::Date(d) => Ok(query.bind(*d)),
        DatabaseValue::Time(t) => Ok(query.bind(*t)),
        DatabaseValue::Json(j) => Ok(query.bind(j.clone())),
        DatabaseValue::Array(_) => Err(OrmError::Query("Array binding is not supported for PostgreSQL".to_string())),
    }
}

fn postgres_row_to_row(row: &PgRow) -> OrmResult<Row> {
    use sqlx::{Column, Row as _};

    let mut map = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), postgres_value_to_database_value(row, i)?);
    }
    Ok(map)
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    use sqlx::{Column, Row as _, TypeInfo, ValueRef};

    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let column = &row.columns()[index];
    let type_name = column.type_info().name();

    let value = match type_name {
        "BOOL" => DatabaseValue::Bool(row.try_get(index)?),
        "INT2" => DatabaseValue::Int32(row.try_get::<i16, _>(index)? as i32),
        "INT4" => DatabaseValue::Int32(row.try_get(index)?),
        "INT8" => DatabaseValue::Int64(row.try_get(index)?),
        "FLOAT4" => DatabaseValue::Float32(row.try_get(index)?),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => DatabaseValue::String(row.try_get(index)?),
        "BYTEA" => DatabaseValue::Bytes(row.try_get(index)?),
        "UUID" => DatabaseValue::Uuid(row.try_get(index)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get(index)?),
        "TIMESTAMP" => {
            let naive: chrono::NaiveDateTime = row.try_get(index)?;
            DatabaseValue::DateTime(naive.and_utc())
        }
        "DATE" => DatabaseValue::Date(row.try_get(index)?),
        "TIME" => DatabaseValue::Time(row.try_get(index)?),
        "JSON" | "JSONB" => DatabaseValue::Json(row.try_get(index)?),
        _ => {
            // Fallback: try to get as string
            let value: String = row.try_get(index).map_err(|e| {
                OrmError::Query(format!("Failed to get value as string for unknown type '{}': {}", type_name, e))
            })?;
            DatabaseValue::String(value)
        }
    };
    Ok(value)
}
