//! Column evolution planning for object-shape tables
//!
//! Stores call these functions inside their write transaction:
//! [`required_columns`] feeds `ensure_columns`, [`plan_widenings`] yields the
//! `ALTER COLUMN ... TYPE` steps against the post-add schema, and
//! [`resolve_row`] normalizes every value against the final column types.

use serde_json::{Map, Value};

use super::ident::key_to_column;
use super::schema::{TableSchema, is_reserved_column};
use super::types::{ColumnType, ColumnValue, infer_type, normalize_for_column, widen};

/// A payload value keyed by its sanitized column name
pub type ObjectEntry = (String, Value);

/// One in-place type change
#[derive(Debug, Clone, PartialEq)]
pub struct Widening {
    pub column: String,
    /// Current type, `None` when the column holds a type outside the lattice
    pub from: Option<ColumnType>,
    pub to: ColumnType,
}

/// Sanitize payload keys into column entries
///
/// Keys that sanitize to `id` or `ts` are dropped. When two keys sanitize to
/// the same column the later value wins, at the position of the first key.
pub fn collect_entries(payload: Map<String, Value>) -> Vec<ObjectEntry> {
    let mut columns: Map<String, Value> = Map::new();
    for (key, value) in payload {
        let column = key_to_column(&key);
        if is_reserved_column(&column) {
            tracing::debug!(key = %key, column = %column, "Skipping payload key mapped to reserved column");
            continue;
        }
        columns.insert(column, value);
    }
    columns.into_iter().collect()
}

/// Columns that must exist before the row can be inserted
///
/// Null values never create a column; the first non-null value decides the
/// initial type.
pub fn required_columns(entries: &[ObjectEntry]) -> Vec<(String, ColumnType)> {
    entries
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(column, value)| (column.clone(), infer_type(value)))
        .collect()
}

/// Type changes needed before the row can be inserted
pub fn plan_widenings(schema: &TableSchema, entries: &[ObjectEntry]) -> Vec<Widening> {
    entries
        .iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(column, value)| {
            let info = schema.get(column)?;
            let to = match info.column_type {
                Some(current) => widen(current, infer_type(value))?,
                None => ColumnType::Text,
            };
            Some(Widening {
                column: column.clone(),
                from: info.column_type,
                to,
            })
        })
        .collect()
}

/// Apply planned widenings to a schema snapshot
pub fn apply_widenings(schema: &mut TableSchema, widenings: &[Widening]) {
    for widening in widenings {
        schema.upsert(&widening.column, widening.to);
    }
}

/// Normalize every entry against the final column types
///
/// Entries whose column does not exist (only possible for null values) are
/// left out of the insert.
pub fn resolve_row(schema: &TableSchema, entries: &[ObjectEntry]) -> Vec<(String, ColumnValue)> {
    entries
        .iter()
        .filter_map(|(column, value)| {
            let info = schema.get(column)?;
            let column_type = info.column_type.unwrap_or(ColumnType::Text);
            Some((column.clone(), normalize_for_column(value, column_type)))
        })
        .collect()
}

/// Row for a schema that needs no DDL, or `None` when evolution is required
pub fn fast_path_row(
    schema: &TableSchema,
    entries: &[ObjectEntry],
) -> Option<Vec<(String, ColumnValue)>> {
    let needs_ddl = entries
        .iter()
        .filter(|(_, value)| !value.is_null())
        .any(|(column, value)| match schema.get(column) {
            None => true,
            Some(info) => match info.column_type {
                None => true,
                Some(current) => widen(current, infer_type(value)).is_some(),
            },
        });

    if needs_ddl {
        None
    } else {
        Some(resolve_row(schema, entries))
    }
}
