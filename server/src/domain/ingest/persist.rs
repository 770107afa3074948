//! Per-message persistence
//!
//! Resolves the topic's registry row, evolves the backing table when needed,
//! and inserts one row. Failures are contained here: the pipeline only sees
//! a logged, dropped message.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::payload::{decode_payload, round_object, round_value};
use super::source::InboundMessage;
use crate::data::dynamic::evolution::{collect_entries, fast_path_row};
use crate::data::dynamic::ident::topic_to_table;
use crate::data::dynamic::{ScalarRow, SchemaCache, TopicRecord, TopicShape};
use crate::data::{DataError, TopicStore};
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, retry_transient_async};

/// Column used when a bare value arrives on an object-shape topic
pub const WRAPPED_VALUE_KEY: &str = "value";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] DataError),

    /// The derived table name is registered to another topic
    #[error("Table {table} for topic {topic} is owned by another topic")]
    TableTaken { topic: String, table: String },
}

impl IngestError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::TableTaken { .. } => false,
        }
    }
}

pub struct MessageIngestor {
    store: Arc<dyn TopicStore>,
    cache: SchemaCache,
    float_precision: u32,
}

impl MessageIngestor {
    pub fn new(store: Arc<dyn TopicStore>, cache: SchemaCache, float_precision: u32) -> Self {
        Self {
            store,
            cache,
            float_precision,
        }
    }

    /// Persist one message, logging and dropping it on failure
    pub async fn handle(&self, message: &InboundMessage) {
        let result = retry_transient_async(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_BASE_DELAY_MS,
            IngestError::is_transient,
            || self.ingest(message),
        )
        .await;

        match result {
            Ok((record, attempts)) => {
                tracing::trace!(
                    topic = %message.topic,
                    table = %record.table_name,
                    attempts,
                    "Stored message"
                );
            }
            Err((e @ IngestError::TableTaken { .. }, _)) => {
                tracing::warn!(topic = %message.topic, error = %e, "Dropping message");
            }
            Err((e, attempts)) => {
                tracing::error!(
                    topic = %message.topic,
                    error = %e,
                    attempts,
                    "Failed to store message, dropping"
                );
            }
        }
    }

    /// Persist one message
    pub async fn ingest(&self, message: &InboundMessage) -> Result<TopicRecord, IngestError> {
        let value = decode_payload(&message.payload);
        let record = self
            .resolve_topic(&message.topic, TopicShape::of(&value))
            .await?;

        match record.shape {
            TopicShape::Object => {
                let map = match value {
                    Value::Object(map) => map,
                    other => {
                        let mut map = Map::new();
                        map.insert(WRAPPED_VALUE_KEY.to_string(), other);
                        map
                    }
                };
                let map = round_object(map, self.float_precision);
                self.write_object(&record.table_name, map).await?;
            }
            TopicShape::Scalar => {
                let row = ScalarRow::from_value(round_value(value, self.float_precision));
                self.store
                    .insert_scalar_row(&record.table_name, &row)
                    .await?;
            }
        }

        Ok(record)
    }

    /// Find the registry row for a topic, creating table and row on first sight
    async fn resolve_topic(
        &self,
        topic: &str,
        observed: TopicShape,
    ) -> Result<TopicRecord, IngestError> {
        if let Some(record) = self.cache.topic(topic).await {
            return Ok(record);
        }
        if let Some(record) = self.store.find_topic(topic).await? {
            self.cache.put_topic(record.clone()).await;
            return Ok(record);
        }

        let table = topic_to_table(topic, observed);
        self.store.ensure_topic_table(&table, observed).await?;
        if self.store.register_topic(topic, &table, observed).await? {
            tracing::info!(topic, table = %table, shape = %observed, "Registered topic");
        }

        match self.store.find_topic(topic).await? {
            Some(record) => {
                self.cache.put_topic(record.clone()).await;
                Ok(record)
            }
            None => Err(IngestError::TableTaken {
                topic: topic.to_string(),
                table,
            }),
        }
    }

    async fn write_object(&self, table: &str, map: Map<String, Value>) -> Result<(), IngestError> {
        let entries = collect_entries(map);

        if let Some(schema) = self.cache.table(table).await
            && let Some(values) = fast_path_row(&schema, &entries)
        {
            if let Err(e) = self.store.insert_object_row(table, &values).await {
                self.cache.invalidate_table(table).await;
                return Err(e.into());
            }
            return Ok(());
        }

        match self.store.write_object_row(table, &entries).await {
            Ok(schema) => {
                self.cache.put_table(table, schema).await;
                Ok(())
            }
            Err(e) => {
                self.cache.invalidate_table(table).await;
                Err(e.into())
            }
        }
    }
}
