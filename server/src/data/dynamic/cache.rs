//! Registry and column-state caches
//!
//! Registry rows never change once written, so a hit is always valid until
//! an administrator deletes the topic; the TTL bounds that window. Table
//! schemas are refreshed after every DDL-causing write and invalidated when
//! a write against the cached layout fails.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::schema::{TableSchema, TopicRecord};

const CACHE_MAX_CAPACITY: u64 = 10_000;

#[derive(Clone)]
pub struct SchemaCache {
    topics: Cache<String, TopicRecord>,
    tables: Cache<String, Arc<TableSchema>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        let topics = Cache::builder()
            .max_capacity(CACHE_MAX_CAPACITY)
            .time_to_live(ttl)
            .build();
        let tables = Cache::builder()
            .max_capacity(CACHE_MAX_CAPACITY)
            .time_to_live(ttl)
            .build();
        Self { topics, tables }
    }

    pub async fn topic(&self, topic: &str) -> Option<TopicRecord> {
        self.topics.get(topic).await
    }

    pub async fn put_topic(&self, record: TopicRecord) {
        self.topics.insert(record.topic.clone(), record).await;
    }

    pub async fn table(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables.get(table).await
    }

    pub async fn put_table(&self, table: &str, schema: TableSchema) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        self.tables
            .insert(table.to_string(), Arc::clone(&schema))
            .await;
        schema
    }

    pub async fn invalidate_table(&self, table: &str) {
        self.tables.invalidate(table).await;
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("topics", &self.topics.entry_count())
            .field("tables", &self.tables.entry_count())
            .finish()
    }
}
