//! PostgreSQL implementation of the store backend.
//!
//! Statements are assembled with [`sqlx::QueryBuilder`]. Table and column
//! identifiers only ever come from the [`Table`] allowlists; every value is
//! bound. Rows come back as `to_jsonb(t)` so one code path serves all
//! tables.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::query::{Direction, Filter, ReadQuery};
use super::{Row, StoreBackend, Table};
use crate::config::ConsoleConfig;
use crate::error::StoreError;

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the pool cannot connect.
    pub async fn connect(config: &ConsoleConfig, database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the bundled schema and NOTIFY triggers from `./migrations`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when a migration fails to apply.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::with_code(e.to_string(), "migrate"))?;
        Ok(())
    }

    /// Returns the underlying pool (shared with the change feed listener).
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreBackend for PostgresStore {
    async fn read(&self, table: Table, query: &ReadQuery) -> Result<Vec<Row>, StoreError> {
        query.validate(table)?;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT to_jsonb(t) FROM ");
        qb.push(table.name());
        qb.push(" AS t");

        for (i, filter) in query.filters.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            push_filter(&mut qb, filter);
        }
        if let Some(order) = query.order {
            qb.push(" ORDER BY t.");
            qb.push(order.column);
            qb.push(match order.direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(limit));
        }

        let values = qb
            .build_query_scalar::<Value>()
            .fetch_all(&self.pool)
            .await?;
        Ok(values.into_iter().filter_map(into_row).collect())
    }

    async fn insert(&self, table: Table, row: Row) -> Result<Row, StoreError> {
        let columns = checked_columns(table, &row)?;
        let list = columns.join(", ");

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
        qb.push(table.name());
        qb.push(" (");
        qb.push(&list);
        qb.push(") SELECT ");
        qb.push(&list);
        qb.push(" FROM jsonb_populate_record(NULL::");
        qb.push(table.name());
        qb.push(", ");
        qb.push_bind(Value::Object(row));
        qb.push(") RETURNING to_jsonb(");
        qb.push(table.name());
        qb.push(".*)");

        let value = qb.build_query_scalar::<Value>().fetch_one(&self.pool).await?;
        into_row(value).ok_or_else(|| StoreError::with_code("insert returned no object", "decode"))
    }

    async fn update(&self, table: Table, key: &str, patch: Row) -> Result<Row, StoreError> {
        let columns = checked_columns(table, &patch)?;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(table.name());
        qb.push(" SET ");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(*column);
            qb.push(" = r.");
            qb.push(*column);
        }
        qb.push(" FROM jsonb_populate_record(NULL::");
        qb.push(table.name());
        qb.push(", ");
        qb.push_bind(Value::Object(patch));
        qb.push(") AS r WHERE ");
        qb.push(table.name());
        qb.push(".");
        qb.push(table.key_column());
        qb.push("::text = ");
        qb.push_bind(key.to_string());
        qb.push(" RETURNING to_jsonb(");
        qb.push(table.name());
        qb.push(".*)");

        let value = qb
            .build_query_scalar::<Value>()
            .fetch_optional(&self.pool)
            .await?;
        value
            .and_then(into_row)
            .ok_or_else(|| not_found(table, key))
    }

    async fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(table.name());
        qb.push(" WHERE ");
        qb.push(table.key_column());
        qb.push("::text = ");
        qb.push_bind(key.to_string());

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(not_found(table, key));
        }
        Ok(())
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::Eq { column, value } => {
            qb.push("t.");
            qb.push(*column);
            match value {
                Value::Null => {
                    qb.push(" IS NULL");
                }
                Value::String(s) => {
                    qb.push("::text = ");
                    qb.push_bind(s.clone());
                }
                other => {
                    qb.push("::text = ");
                    qb.push_bind(other.to_string());
                }
            }
        }
        Filter::Contains { column, needle } => {
            qb.push("t.");
            qb.push(*column);
            qb.push("::text ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(needle)));
        }
        Filter::AnyOf { column, values } => {
            qb.push("t.");
            qb.push(*column);
            qb.push("::text = ANY(");
            qb.push_bind(values.clone());
            qb.push(")");
        }
        Filter::Compare { column, op, at } => {
            qb.push("t.");
            qb.push(*column);
            qb.push(" ");
            qb.push(op.sql());
            qb.push(" ");
            qb.push_bind(*at);
        }
    }
}

fn checked_columns(table: Table, row: &Row) -> Result<Vec<&'static str>, StoreError> {
    if row.is_empty() {
        return Err(StoreError::with_code("empty row", "invalid"));
    }
    row.keys()
        .map(|key| {
            table
                .columns()
                .iter()
                .copied()
                .find(|c| c == key)
                .ok_or_else(|| {
                    StoreError::with_code(
                        format!("{} has no column {key:?}", table.name()),
                        "unknown_column",
                    )
                })
        })
        .collect()
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn into_row(value: Value) -> Option<Row> {
    match value {
        Value::Object(row) => Some(row),
        _ => None,
    }
}

fn not_found(table: Table, key: &str) -> StoreError {
    StoreError::with_code(format!("no row {key} in {}", table.name()), "not_found")
}
