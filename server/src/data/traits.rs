//! Repository trait for topic storage
//!
//! The ingestion pipeline and the history service only talk to storage
//! through [`TopicStore`]. PostgreSQL implements it for production; tests use
//! an in-memory implementation with the same semantics.

use async_trait::async_trait;

use crate::data::dynamic::evolution::ObjectEntry;
use crate::data::dynamic::{ColumnValue, ScalarRow, TableSchema, TopicRecord, TopicShape};
use crate::data::error::DataError;
use crate::data::query::{HistoryQuery, HistoryRow};

#[async_trait]
pub trait TopicStore: Send + Sync {
    // ==================== Registry ====================

    /// Create the backing table if absent (idempotent)
    async fn ensure_topic_table(&self, table: &str, shape: TopicShape) -> Result<(), DataError>;

    /// Record a topic; returns false when the topic or table was already taken
    async fn register_topic(
        &self,
        topic: &str,
        table: &str,
        shape: TopicShape,
    ) -> Result<bool, DataError>;

    async fn find_topic(&self, topic: &str) -> Result<Option<TopicRecord>, DataError>;

    /// All registered topics, ordered by topic
    async fn list_topics(&self) -> Result<Vec<TopicRecord>, DataError>;

    // ==================== Schema ====================

    /// Live column set of a backing table
    async fn table_schema(&self, table: &str) -> Result<TableSchema, DataError>;

    // ==================== Rows ====================

    /// Insert a row whose values already match the live column types
    async fn insert_object_row(
        &self,
        table: &str,
        values: &[(String, ColumnValue)],
    ) -> Result<(), DataError>;

    /// Add columns, widen, normalize and insert as one atomic unit
    ///
    /// Returns the table layout after evolution.
    async fn write_object_row(
        &self,
        table: &str,
        entries: &[ObjectEntry],
    ) -> Result<TableSchema, DataError>;

    async fn insert_scalar_row(&self, table: &str, row: &ScalarRow) -> Result<(), DataError>;

    // ==================== Reads ====================

    async fn run_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRow>, DataError>;

    /// Whether the store currently answers queries
    async fn ping(&self) -> bool;
}
