//! In-memory TopicStore for tests
//!
//! Mirrors the PostgreSQL store closely enough to exercise the engine: rows
//! are rejected when a value's bound type does not match its column, widening
//! casts stored values, and history plans are evaluated in Rust.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::data::dynamic::evolution::{
    ObjectEntry, apply_widenings, plan_widenings, required_columns, resolve_row,
};
use crate::data::dynamic::schema::{SCALAR_VALUE_COLUMNS, TS_COLUMN, VALUE_TYPE_COLUMN};
use crate::data::dynamic::types::value_to_text;
use crate::data::dynamic::{
    ColumnType, ColumnValue, ScalarKind, ScalarRow, TableSchema, TopicRecord, TopicShape,
};
use crate::data::error::DataError;
use crate::data::query::{
    AggFunc, BUCKET_COLUMN, HistoryQuery, HistoryRow, QueryMode, SCALAR_AGGREGATE_COLUMN,
    SortOrder,
};
use crate::data::traits::TopicStore;

#[derive(Debug, Clone)]
struct MemRow {
    ts: DateTime<Utc>,
    values: HashMap<String, Value>,
}

#[derive(Debug)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<MemRow>,
}

#[derive(Debug, Default)]
struct Inner {
    topics: BTreeMap<String, TopicRecord>,
    tables: HashMap<String, MemTable>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
    ddl_statements: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the timestamp assigned to subsequent inserts
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.inner.lock().unwrap().now = Some(now);
    }

    /// Make every row write fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of column-level DDL statements executed
    pub fn ddl_count(&self) -> usize {
        self.ddl_statements.load(Ordering::SeqCst)
    }

    /// Stored rows of a table, oldest first, as `(ts, column -> value)`
    pub fn rows(&self, table: &str) -> Vec<(DateTime<Utc>, HashMap<String, Value>)> {
        let inner = self.inner.lock().unwrap();
        inner
            .tables
            .get(table)
            .map(|t| t.rows.iter().map(|r| (r.ts, r.values.clone())).collect())
            .unwrap_or_default()
    }

    /// Add missing columns outside a row write
    pub fn ensure_columns(
        &self,
        table: &str,
        columns: &[(String, ColumnType)],
    ) -> Result<TableSchema, DataError> {
        let mut inner = self.inner.lock().unwrap();
        self.add_columns(&mut inner, table, columns)
    }

    fn missing(table: &str) -> DataError {
        DataError::schema(format!("table {} does not exist", table))
    }

    fn check_writable(&self) -> Result<(), DataError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DataError::schema("writes disabled"));
        }
        Ok(())
    }

    fn add_columns(
        &self,
        inner: &mut Inner,
        table: &str,
        columns: &[(String, ColumnType)],
    ) -> Result<TableSchema, DataError> {
        let mem = inner.tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        for (column, column_type) in columns {
            if !mem.schema.contains(column) {
                mem.schema.upsert(column, *column_type);
                self.ddl_statements.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(mem.schema.clone())
    }

    fn alter_type(
        &self,
        inner: &mut Inner,
        table: &str,
        column: &str,
        to: ColumnType,
    ) -> Result<(), DataError> {
        let mem = inner.tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        if !mem.schema.contains(column) {
            return Err(DataError::schema(format!("column {} does not exist", column)));
        }
        for row in &mut mem.rows {
            if let Some(value) = row.values.get_mut(column) {
                *value = cast(value, to);
            }
        }
        mem.schema.upsert(column, to);
        self.ddl_statements.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn insert(
        &self,
        inner: &mut Inner,
        table: &str,
        values: &[(String, ColumnValue)],
    ) -> Result<(), DataError> {
        self.check_writable()?;
        let ts = inner.now.unwrap_or_else(Utc::now);
        let mem = inner.tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        let mut stored = HashMap::new();
        for (column, value) in values {
            let Some(info) = mem.schema.get(column) else {
                return Err(DataError::schema(format!("column {} does not exist", column)));
            };
            if info.column_type != Some(value.bind_type()) {
                return Err(DataError::schema(format!(
                    "column {} is of type {} but expression is of type {}",
                    column,
                    info.data_type,
                    value.bind_type()
                )));
            }
            stored.insert(column.clone(), value.to_json());
        }
        mem.rows.push(MemRow { ts, values: stored });
        Ok(())
    }
}

fn cast(value: &Value, to: ColumnType) -> Value {
    match (value, to) {
        (Value::Null, _) => Value::Null,
        (v, ColumnType::Text) => Value::String(value_to_text(v)),
        (Value::Number(n), ColumnType::DoublePrecision) => {
            n.as_f64().map(Value::from).unwrap_or(Value::Null)
        }
        (v, _) => v.clone(),
    }
}

fn render_ts(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339())
}

fn aggregate(func: AggFunc, values: &[f64]) -> Value {
    if func == AggFunc::Count {
        return Value::from(values.len() as i64);
    }
    if values.is_empty() {
        return Value::Null;
    }
    let result = match func {
        AggFunc::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggFunc::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggFunc::Sum => values.iter().sum(),
        AggFunc::Avg => values.iter().sum::<f64>() / values.len() as f64,
        AggFunc::Count => unreachable!(),
    };
    Value::from(result)
}

fn scalar_numeric(row: &MemRow) -> Option<f64> {
    let kind = row.values.get(VALUE_TYPE_COLUMN)?.as_str()?;
    if kind == ScalarKind::Float.as_str() {
        row.values.get("value_float")?.as_f64()
    } else if kind == ScalarKind::Int.as_str() {
        row.values.get("value_int")?.as_f64()
    } else {
        None
    }
}

fn evaluate(rows: &[MemRow], query: &HistoryQuery) -> Vec<HistoryRow> {
    let mut selected: Vec<&MemRow> = rows
        .iter()
        .filter(|r| query.from.is_none_or(|from| r.ts >= from))
        .filter(|r| query.to.is_none_or(|to| r.ts <= to))
        .collect();
    selected.sort_by_key(|r| r.ts);

    match &query.mode {
        QueryMode::Raw { limit, order } => {
            if *order == SortOrder::Desc {
                selected.reverse();
            }
            selected
                .into_iter()
                .take(*limit as usize)
                .map(|r| {
                    let mut out = Map::new();
                    out.insert(TS_COLUMN.to_string(), render_ts(r.ts));
                    for field in &query.fields {
                        let value = r.values.get(field).cloned().unwrap_or(Value::Null);
                        out.insert(field.clone(), value);
                    }
                    out
                })
                .collect()
        }
        QueryMode::Aggregate { func, bucket } => {
            let width = bucket.width_secs();
            let mut buckets: BTreeMap<i64, Vec<&MemRow>> = BTreeMap::new();
            for row in selected {
                let start = row.ts.timestamp().div_euclid(width) * width;
                buckets.entry(start).or_default().push(row);
            }
            buckets
                .into_iter()
                .map(|(start, rows)| {
                    let mut out = Map::new();
                    let bucket_ts = Utc.timestamp_opt(start, 0).single().unwrap_or_default();
                    out.insert(BUCKET_COLUMN.to_string(), render_ts(bucket_ts));
                    match query.shape {
                        TopicShape::Object => {
                            for field in &query.fields {
                                let values: Vec<f64> = rows
                                    .iter()
                                    .filter_map(|r| r.values.get(field).and_then(Value::as_f64))
                                    .collect();
                                out.insert(field.clone(), aggregate(*func, &values));
                            }
                        }
                        TopicShape::Scalar => {
                            let values: Vec<f64> =
                                rows.iter().filter_map(|r| scalar_numeric(r)).collect();
                            out.insert(
                                SCALAR_AGGREGATE_COLUMN.to_string(),
                                aggregate(*func, &values),
                            );
                        }
                    }
                    out
                })
                .collect()
        }
    }
}

#[async_trait]
impl TopicStore for MemoryStore {
    async fn ensure_topic_table(&self, table: &str, shape: TopicShape) -> Result<(), DataError> {
        let mut inner = self.inner.lock().unwrap();
        inner.tables.entry(table.to_string()).or_insert_with(|| MemTable {
            schema: TableSchema::bootstrap(shape),
            rows: Vec::new(),
        });
        Ok(())
    }

    async fn register_topic(
        &self,
        topic: &str,
        table: &str,
        shape: TopicShape,
    ) -> Result<bool, DataError> {
        let mut inner = self.inner.lock().unwrap();
        let taken = inner.topics.contains_key(topic)
            || inner.topics.values().any(|r| r.table_name == table);
        if taken {
            return Ok(false);
        }
        inner.topics.insert(
            topic.to_string(),
            TopicRecord {
                topic: topic.to_string(),
                table_name: table.to_string(),
                shape,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn find_topic(&self, topic: &str) -> Result<Option<TopicRecord>, DataError> {
        Ok(self.inner.lock().unwrap().topics.get(topic).cloned())
    }

    async fn list_topics(&self) -> Result<Vec<TopicRecord>, DataError> {
        Ok(self.inner.lock().unwrap().topics.values().cloned().collect())
    }

    async fn table_schema(&self, table: &str) -> Result<TableSchema, DataError> {
        let inner = self.inner.lock().unwrap();
        inner
            .tables
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| Self::missing(table))
    }

    async fn insert_object_row(
        &self,
        table: &str,
        values: &[(String, ColumnValue)],
    ) -> Result<(), DataError> {
        let mut inner = self.inner.lock().unwrap();
        self.insert(&mut inner, table, values)
    }

    async fn write_object_row(
        &self,
        table: &str,
        entries: &[ObjectEntry],
    ) -> Result<TableSchema, DataError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        let mut schema = self.add_columns(&mut inner, table, &required_columns(entries))?;
        let widenings = plan_widenings(&schema, entries);
        for widening in &widenings {
            self.alter_type(&mut inner, table, &widening.column, widening.to)?;
        }
        apply_widenings(&mut schema, &widenings);
        let values = resolve_row(&schema, entries);
        self.insert(&mut inner, table, &values)?;
        Ok(schema)
    }

    async fn insert_scalar_row(&self, table: &str, row: &ScalarRow) -> Result<(), DataError> {
        let mut values = vec![(
            VALUE_TYPE_COLUMN.to_string(),
            ColumnValue::Text(row.kind.as_str().to_string()),
        )];
        let populated = [
            row.value_int.map(ColumnValue::BigInt),
            row.value_float.map(ColumnValue::Double),
            row.value_bool.map(ColumnValue::Bool),
            row.value_text.clone().map(ColumnValue::Text),
            row.value_json.clone().map(ColumnValue::Json),
        ];
        for ((name, column_type), value) in SCALAR_VALUE_COLUMNS.iter().zip(populated) {
            values.push((
                name.to_string(),
                value.unwrap_or(ColumnValue::Null(*column_type)),
            ));
        }
        let mut inner = self.inner.lock().unwrap();
        self.insert(&mut inner, table, &values)
    }

    async fn run_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRow>, DataError> {
        let inner = self.inner.lock().unwrap();
        let table = inner
            .tables
            .get(&query.table)
            .ok_or_else(|| Self::missing(&query.table))?;
        Ok(evaluate(&table.rows, query))
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_ensure_topic_table_is_idempotent() {
        let store = MemoryStore::new();
        store.ensure_topic_table("t", TopicShape::Object).await.unwrap();
        store
            .ensure_columns("t", &[("temp".into(), ColumnType::BigInt)])
            .unwrap();
        store.ensure_topic_table("t", TopicShape::Object).await.unwrap();
        let schema = store.table_schema("t").await.unwrap();
        assert_eq!(schema.field_names(), vec!["temp"]);
    }

    #[tokio::test]
    async fn test_ensure_columns_twice_gives_same_schema() {
        let store = MemoryStore::new();
        store.ensure_topic_table("t", TopicShape::Object).await.unwrap();
        let columns = vec![
            ("temp".to_string(), ColumnType::DoublePrecision),
            ("humid".to_string(), ColumnType::BigInt),
        ];
        let first = store.ensure_columns("t", &columns).unwrap();
        let second = store.ensure_columns("t", &columns).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.ddl_count(), 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_type_mismatch() {
        let store = MemoryStore::new();
        store.ensure_topic_table("t", TopicShape::Object).await.unwrap();
        store
            .ensure_columns("t", &[("v".into(), ColumnType::BigInt)])
            .unwrap();
        let result = store
            .insert_object_row("t", &[("v".into(), ColumnValue::Text("x".into()))])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_widen_casts_existing_rows() {
        let store = MemoryStore::new();
        store.ensure_topic_table("t", TopicShape::Object).await.unwrap();
        store
            .write_object_row("t", &[("v".into(), json!(40))])
            .await
            .unwrap();
        store
            .write_object_row("t", &[("v".into(), json!("40%"))])
            .await
            .unwrap();
        let rows = store.rows("t");
        assert_eq!(rows[0].1["v"], json!("40"));
        assert_eq!(rows[1].1["v"], json!("40%"));
    }

    #[tokio::test]
    async fn test_register_topic_first_wins_on_table_collision() {
        let store = MemoryStore::new();
        assert!(
            store
                .register_topic("site-a/temp", "temp", TopicShape::Scalar)
                .await
                .unwrap()
        );
        assert!(
            !store
                .register_topic("site-b/temp", "temp", TopicShape::Scalar)
                .await
                .unwrap()
        );
        assert!(store.find_topic("site-b/temp").await.unwrap().is_none());
    }
}
