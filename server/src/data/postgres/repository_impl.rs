//! TopicStore trait implementation for PostgreSQL
//!
//! Implements the TopicStore trait for Arc<PostgresService>, delegating to
//! the repository functions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::data::dynamic::evolution::ObjectEntry;
use crate::data::dynamic::{ColumnValue, ScalarRow, TableSchema, TopicRecord, TopicShape};
use crate::data::error::DataError;
use crate::data::query::{HistoryQuery, HistoryRow};
use crate::data::traits::TopicStore;

use super::PostgresService;
use super::PostgresError;
use super::repositories::{dynamic, history, registry};

#[async_trait]
impl TopicStore for Arc<PostgresService> {
    // ==================== Registry ====================

    async fn ensure_topic_table(&self, table: &str, shape: TopicShape) -> Result<(), DataError> {
        dynamic::ensure_topic_table(self.pool(), table, shape)
            .await
            .map_err(Into::into)
    }

    async fn register_topic(
        &self,
        topic: &str,
        table: &str,
        shape: TopicShape,
    ) -> Result<bool, DataError> {
        registry::register_topic(self.pool(), topic, table, shape)
            .await
            .map_err(Into::into)
    }

    async fn find_topic(&self, topic: &str) -> Result<Option<TopicRecord>, DataError> {
        registry::find_topic(self.pool(), topic)
            .await
            .map_err(Into::into)
    }

    async fn list_topics(&self) -> Result<Vec<TopicRecord>, DataError> {
        registry::list_topics(self.pool()).await.map_err(Into::into)
    }

    // ==================== Schema ====================

    async fn table_schema(&self, table: &str) -> Result<TableSchema, DataError> {
        let mut conn = self.pool().acquire().await.map_err(PostgresError::from)?;
        dynamic::table_columns(&mut conn, table)
            .await
            .map_err(Into::into)
    }

    // ==================== Rows ====================

    async fn insert_object_row(
        &self,
        table: &str,
        values: &[(String, ColumnValue)],
    ) -> Result<(), DataError> {
        let mut conn = self.pool().acquire().await.map_err(PostgresError::from)?;
        dynamic::insert_object_row(&mut conn, table, values)
            .await
            .map_err(Into::into)
    }

    async fn write_object_row(
        &self,
        table: &str,
        entries: &[ObjectEntry],
    ) -> Result<TableSchema, DataError> {
        dynamic::write_object_row(self.pool(), table, entries)
            .await
            .map_err(Into::into)
    }

    async fn insert_scalar_row(&self, table: &str, row: &ScalarRow) -> Result<(), DataError> {
        dynamic::insert_scalar_row(self.pool(), table, row)
            .await
            .map_err(Into::into)
    }

    // ==================== Reads ====================

    async fn run_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRow>, DataError> {
        history::run_history(self.pool(), query)
            .await
            .map_err(Into::into)
    }

    async fn ping(&self) -> bool {
        PostgresService::ping(self).await
    }
}
