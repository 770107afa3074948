//! Identifier sanitization for topic tables and payload columns
//!
//! Table and column names are derived from wire data, so they must stay a pure
//! function of their input: existing tables remain addressable only as long as
//! the same topic always sanitizes to the same name.

use std::sync::LazyLock;

use regex::Regex;

use super::types::TopicShape;

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1)
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Fallback prefix for table names
pub const TABLE_PREFIX: &str = "topic";

/// Fallback prefix for column names
pub const COLUMN_PREFIX: &str = "field";

static INVALID_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").expect("Invalid regex"));

/// Turn an arbitrary string into a safe, bounded SQL identifier
///
/// Lower-cases, collapses every run of characters outside `[a-z0-9_]` into a
/// single underscore, trims underscores, falls back to `prefix` when nothing
/// is left, prefixes names starting with a digit, and truncates to 63 bytes.
pub fn sanitize(raw: &str, prefix: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let replaced = INVALID_RUN.replace_all(&lowered, "_");
    let trimmed = replaced.trim_matches('_');

    let mut cleaned = if trimmed.is_empty() {
        prefix.to_string()
    } else {
        trimmed.to_string()
    };

    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        cleaned = format!("{}_{}", prefix, cleaned);
    }

    // Only ASCII survives the replacement, so byte truncation is char-safe
    cleaned.truncate(MAX_IDENTIFIER_LEN);
    cleaned
}

/// Derive the backing table name for a topic
///
/// Object-shaped topics use the full topic path; scalar topics use only the
/// last path segment.
pub fn topic_to_table(topic: &str, shape: TopicShape) -> String {
    match shape {
        TopicShape::Object => sanitize(topic, TABLE_PREFIX),
        TopicShape::Scalar => {
            let last = topic.rsplit('/').next().unwrap_or(topic);
            sanitize(last, TABLE_PREFIX)
        }
    }
}

/// Derive the column name for a payload key
pub fn key_to_column(key: &str) -> String {
    sanitize(key, COLUMN_PREFIX)
}
