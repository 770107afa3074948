//! In-memory view of registry rows and backing table layouts

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{ColumnType, TopicShape};

/// Surrogate key column present in every backing table
pub const ID_COLUMN: &str = "id";

/// Arrival timestamp column present in every backing table
pub const TS_COLUMN: &str = "ts";

/// Columns owned by the engine, never derived from payload keys
pub const RESERVED_COLUMNS: [&str; 2] = [ID_COLUMN, TS_COLUMN];

/// Tag column of a scalar-shape table
pub const VALUE_TYPE_COLUMN: &str = "value_type";

/// Fixed value columns of a scalar-shape table
pub const SCALAR_VALUE_COLUMNS: [(&str, ColumnType); 5] = [
    ("value_int", ColumnType::BigInt),
    ("value_float", ColumnType::DoublePrecision),
    ("value_bool", ColumnType::Boolean),
    ("value_text", ColumnType::Text),
    ("value_json", ColumnType::Jsonb),
];

pub fn is_reserved_column(name: &str) -> bool {
    RESERVED_COLUMNS.contains(&name)
}

/// One registered topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicRecord {
    pub topic: String,
    pub table_name: String,
    pub shape: TopicShape,
    pub created_at: DateTime<Utc>,
}

/// One live column of a backing table
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    /// Raw `information_schema` type name
    pub data_type: String,
    /// Position in the lattice, `None` for types the engine never creates
    pub column_type: Option<ColumnType>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::from_sql(&data_type),
            data_type,
        }
    }

    pub fn typed(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type: column_type.as_sql().to_string(),
            column_type: Some(column_type),
        }
    }
}

/// Ordered column set of a backing table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSchema {
    columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self { columns }
    }

    /// Bootstrap layout created by `ensure_topic_table`
    pub fn bootstrap(shape: TopicShape) -> Self {
        let mut columns = vec![
            ColumnInfo::new(ID_COLUMN, "bigint"),
            ColumnInfo::new(TS_COLUMN, "timestamp with time zone"),
        ];
        if shape == TopicShape::Scalar {
            columns.push(ColumnInfo::typed(VALUE_TYPE_COLUMN, ColumnType::Text));
            for (name, column_type) in SCALAR_VALUE_COLUMNS {
                columns.push(ColumnInfo::typed(name, column_type));
            }
        }
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.get(name).and_then(|c| c.column_type)
    }

    /// Append a column, or replace the type of an existing one
    pub fn upsert(&mut self, name: &str, column_type: ColumnType) {
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => *existing = ColumnInfo::typed(name, column_type),
            None => self.columns.push(ColumnInfo::typed(name, column_type)),
        }
    }

    /// Queryable columns: everything except `id` and `ts`, in table order
    pub fn field_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !is_reserved_column(&c.name))
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }
}
