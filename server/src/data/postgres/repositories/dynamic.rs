//! Backing table DDL and row writes for PostgreSQL
//!
//! Every identifier reaching these functions has already been sanitized, and
//! is additionally passed through `quote_ident` before interpolation. All DDL
//! is idempotent so concurrent writers converge without locking.

use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres};

use crate::data::dynamic::evolution::{
    ObjectEntry, apply_widenings, plan_widenings, required_columns, resolve_row,
};
use crate::data::dynamic::ident::MAX_IDENTIFIER_LEN;
use crate::data::dynamic::schema::{
    ColumnInfo, ID_COLUMN, SCALAR_VALUE_COLUMNS, TS_COLUMN, TableSchema, VALUE_TYPE_COLUMN,
};
use crate::data::dynamic::types::{ColumnType, ColumnValue, ScalarRow, TopicShape};
use crate::data::postgres::PostgresError;
use crate::utils::sql::quote_ident;

// ============================================================================
// SQL builders
// ============================================================================

pub fn create_table_sql(table: &str, shape: TopicShape) -> String {
    let mut columns = vec![
        format!("{} BIGSERIAL PRIMARY KEY", quote_ident(ID_COLUMN)),
        format!("{} TIMESTAMPTZ NOT NULL DEFAULT now()", quote_ident(TS_COLUMN)),
    ];
    if shape == TopicShape::Scalar {
        columns.push(format!("{} TEXT NOT NULL", quote_ident(VALUE_TYPE_COLUMN)));
        for (name, column_type) in SCALAR_VALUE_COLUMNS {
            columns.push(format!("{} {}", quote_ident(name), column_type.as_sql()));
        }
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        columns.join(", ")
    )
}

pub fn create_ts_index_sql(table: &str) -> String {
    let mut index = format!("{}_ts_idx", table);
    index.truncate(MAX_IDENTIFIER_LEN);
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(&index),
        quote_ident(table),
        quote_ident(TS_COLUMN)
    )
}

pub fn add_column_sql(table: &str, column: &str, column_type: ColumnType) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        quote_ident(table),
        quote_ident(column),
        column_type.as_sql()
    )
}

pub fn widen_column_sql(table: &str, column: &str, to: ColumnType) -> String {
    let quoted = quote_ident(column);
    format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
        quote_ident(table),
        quoted,
        to.as_sql(),
        quoted,
        to.as_sql()
    )
}

pub fn insert_row_sql(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
    }
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

fn scalar_insert_columns() -> Vec<&'static str> {
    std::iter::once(VALUE_TYPE_COLUMN)
        .chain(SCALAR_VALUE_COLUMNS.iter().map(|(name, _)| *name))
        .collect()
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &ColumnValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        ColumnValue::Null(ColumnType::Boolean) => query.bind(None::<bool>),
        ColumnValue::Null(ColumnType::BigInt) => query.bind(None::<i64>),
        ColumnValue::Null(ColumnType::DoublePrecision) => query.bind(None::<f64>),
        ColumnValue::Null(ColumnType::Text) => query.bind(None::<String>),
        ColumnValue::Null(ColumnType::Jsonb) => query.bind(None::<Json<Value>>),
        ColumnValue::Bool(b) => query.bind(*b),
        ColumnValue::BigInt(i) => query.bind(*i),
        ColumnValue::Double(f) => query.bind(*f),
        ColumnValue::Text(s) => query.bind(s.clone()),
        ColumnValue::Json(v) => query.bind(Json(v.clone())),
    }
}

// ============================================================================
// DDL
// ============================================================================

/// Create the backing table for a topic if it does not exist
pub async fn ensure_topic_table(
    pool: &PgPool,
    table: &str,
    shape: TopicShape,
) -> Result<(), PostgresError> {
    sqlx::query(&create_table_sql(table, shape))
        .execute(pool)
        .await?;
    sqlx::query(&create_ts_index_sql(table))
        .execute(pool)
        .await?;
    Ok(())
}

/// Read the live column set of a table
pub async fn table_columns(
    conn: &mut PgConnection,
    table: &str,
) -> Result<TableSchema, PostgresError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT column_name::text, data_type::text
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(conn)
    .await?;

    if rows.is_empty() {
        return Err(PostgresError::MissingTable(table.to_string()));
    }

    Ok(TableSchema::new(
        rows.into_iter()
            .map(|(name, data_type)| ColumnInfo::new(name, data_type))
            .collect(),
    ))
}

/// Requested columns absent from `schema`
pub fn missing_columns<'a>(
    schema: &TableSchema,
    columns: &'a [(String, ColumnType)],
) -> Vec<&'a (String, ColumnType)> {
    columns
        .iter()
        .filter(|(column, _)| !schema.contains(column))
        .collect()
}

/// Add every requested column that is not present yet
///
/// Returns the live column set read back after the additions, so a column
/// created concurrently with another type is reported with its real type.
pub async fn ensure_columns(
    conn: &mut PgConnection,
    table: &str,
    columns: &[(String, ColumnType)],
) -> Result<TableSchema, PostgresError> {
    let schema = table_columns(&mut *conn, table).await?;
    let missing = missing_columns(&schema, columns);
    if missing.is_empty() {
        return Ok(schema);
    }
    for (column, column_type) in missing {
        sqlx::query(&add_column_sql(table, column, *column_type))
            .execute(&mut *conn)
            .await?;
        tracing::info!(table, column = %column, column_type = %column_type, "Added column");
    }
    table_columns(&mut *conn, table).await
}

/// Change a column's type in place, converting stored values with a cast
pub async fn widen_column(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
    to: ColumnType,
) -> Result<(), PostgresError> {
    sqlx::query(&widen_column_sql(table, column, to))
        .execute(conn)
        .await?;
    tracing::info!(table, column, to = %to, "Widened column");
    Ok(())
}

// ============================================================================
// Rows
// ============================================================================

/// Insert one row whose values already match the column types
pub async fn insert_object_row(
    conn: &mut PgConnection,
    table: &str,
    values: &[(String, ColumnValue)],
) -> Result<(), PostgresError> {
    let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
    let sql = insert_row_sql(table, &columns);
    let mut query = sqlx::query(&sql);
    for (_, value) in values {
        query = bind_value(query, value);
    }
    query.execute(conn).await?;
    Ok(())
}

/// Evolve the table for `entries` and insert the row in one transaction
///
/// Returns the table layout after evolution.
pub async fn write_object_row(
    pool: &PgPool,
    table: &str,
    entries: &[ObjectEntry],
) -> Result<TableSchema, PostgresError> {
    let mut tx = pool.begin().await?;

    let mut schema = ensure_columns(&mut tx, table, &required_columns(entries)).await?;
    let widenings = plan_widenings(&schema, entries);
    for widening in &widenings {
        widen_column(&mut tx, table, &widening.column, widening.to).await?;
    }
    apply_widenings(&mut schema, &widenings);

    let values = resolve_row(&schema, entries);
    insert_object_row(&mut tx, table, &values).await?;

    tx.commit().await?;
    Ok(schema)
}

/// Insert one tagged-union row into a scalar-shape table
pub async fn insert_scalar_row(
    pool: &PgPool,
    table: &str,
    row: &ScalarRow,
) -> Result<(), PostgresError> {
    let sql = insert_row_sql(table, &scalar_insert_columns());
    sqlx::query(&sql)
        .bind(row.kind.as_str())
        .bind(row.value_int)
        .bind(row.value_float)
        .bind(row.value_bool)
        .bind(row.value_text.clone())
        .bind(row.value_json.clone().map(Json))
        .execute(pool)
        .await?;
    Ok(())
}
